//! MCP tool server exposing the scan / extract / fill flow over stdio.

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::{BrowserConfig, CompletionConfig, Config, Timing};
use crate::fields::ReviewedValue;
use crate::{Provider, Session};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct NavigateRequest {
    #[schemars(description = "URL of the page holding the form")]
    pub url: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExtractRequest {
    #[schemars(description = "Email text to pull field values from")]
    pub email: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FieldValueRequest {
    #[schemars(description = "Field index from scan_fields")]
    pub index: usize,
    #[schemars(description = "Value to write; \"true\"/\"false\" for checkboxes")]
    pub value: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FillRequest {
    #[schemars(description = "Reviewed values, one per field to fill")]
    pub values: Vec<FieldValueRequest>,
}

fn err(e: impl std::fmt::Display) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None::<Value>)
}

fn no_page() -> ErrorData {
    ErrorData::internal_error("No page open. Use navigate first.", None::<Value>)
}

fn text_ok(s: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(s.into())]))
}

fn json_ok(value: &impl serde::Serialize) -> Result<CallToolResult, ErrorData> {
    text_ok(serde_json::to_string_pretty(value).map_err(err)?)
}

#[derive(Clone)]
pub struct MailfillServer {
    session: Arc<Mutex<Option<Session>>>,
    browser: BrowserConfig,
    timing: Timing,
    provider: Option<Provider>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MailfillServer {
    pub fn new(browser: BrowserConfig, timing: Timing, provider: Option<Provider>) -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            browser,
            timing,
            provider,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Navigate to the form page. Launches the browser on first call.")]
    async fn navigate(
        &self,
        req: Parameters<NavigateRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            let session = Session::launch(&self.browser, self.timing.clone())
                .await
                .map_err(err)?;
            *guard = Some(session);
        }
        let session = guard.as_mut().ok_or_else(no_page)?;
        session.open(&req.0.url).await.map_err(err)?;
        let url = session.page().url().await.map_err(err)?;
        let title = session.page().title().await.map_err(err)?;
        text_ok(format!("Navigated to: {}\nTitle: {}", url, title))
    }

    #[tool(
        description = "Find the form fields on the page and mark them. Returns one line per field: [index] label (type)."
    )]
    async fn scan_fields(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(no_page)?;
        let fields = session.scan().await.map_err(err)?;
        if fields.is_empty() {
            return text_ok("No form fields found.");
        }
        let lines: Vec<String> = fields.iter().map(ToString::to_string).collect();
        text_ok(lines.join("\n"))
    }

    #[tool(description = "Open each custom dropdown on the page and list its options as JSON.")]
    async fn probe_dropdowns(&self) -> Result<CallToolResult, ErrorData> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(no_page)?;
        let dropdowns = session.probe_dropdowns().await.map_err(err)?;
        json_ok(&dropdowns)
    }

    #[tool(
        description = "Ask the completion endpoint for field values from an email. Scans first if needed. Returns review rows as JSON; nothing is written to the page."
    )]
    async fn extract_fields(
        &self,
        req: Parameters<ExtractRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            ErrorData::internal_error("No completion endpoint configured.", None::<Value>)
        })?;
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(no_page)?;
        let extraction = session.extract(provider, &req.0.email).await.map_err(err)?;
        json_ok(&extraction.rows)
    }

    #[tool(
        description = "Write reviewed values into the fields found by the last scan_fields. Returns per-field outcomes."
    )]
    async fn fill_fields(&self, req: Parameters<FillRequest>) -> Result<CallToolResult, ErrorData> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(no_page)?;
        let values: Vec<ReviewedValue> = req
            .0
            .values
            .into_iter()
            .map(|v| ReviewedValue::new(v.index, v.value))
            .collect();
        let report = session.fill(&values).await.map_err(err)?;
        json_ok(&report)
    }

    #[tool(description = "Close the browser and release resources.")]
    async fn close(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            session.close().await.map_err(err)?;
        }
        text_ok("Browser closed.")
    }
}

#[tool_handler]
impl ServerHandler for MailfillServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mailfill".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Form filling from email text. Use 'navigate' to open the form page, \
                 'scan_fields' to list its fields, 'extract_fields' with the email text \
                 to get suggested values, then 'fill_fields' with the reviewed values. \
                 'probe_dropdowns' lists options of custom dropdowns."
                    .into(),
            ),
        }
    }
}

/// Serve on stdio until the client disconnects.
///
/// With a job file, its browser, timing and completion settings are used.
/// Without one, the chat protocol is used with `OPENAI_API_KEY` from the
/// environment when it is set.
pub async fn run_server(config: Option<Config>) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    let (browser, timing, completion) = match config {
        Some(config) => (config.browser, config.timing, config.completion),
        None => {
            let completion = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(|key| CompletionConfig::chat("https://api.openai.com/v1", key));
            (BrowserConfig::default(), Timing::default(), completion)
        }
    };
    let provider = completion.as_ref().map(Provider::from_config).transpose()?;
    info!(
        "starting MCP server (completion endpoint: {})",
        if provider.is_some() { "configured" } else { "none" }
    );

    let server = MailfillServer::new(browser, timing, provider);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
