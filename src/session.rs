use eoka::{Browser, Page};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::completion::{build_prompt, CompletionResponse, Provider};
use crate::config::{BrowserConfig, Timing};
use crate::fields::{self, DropdownOptions, FieldDescriptor, FillReport, ReviewedValue};
use crate::parse::{parse_response, ExtractedFields};
use crate::review::{build_rows, ReviewRow};
use crate::{Error, Result};

/// Outcome of one extraction round trip.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    /// Reply as received, kept for `--raw` output.
    pub response: CompletionResponse,
    pub values: ExtractedFields,
    /// Rows ready for review, one per field.
    pub rows: Vec<ReviewRow>,
}

/// Ask the completion endpoint for values for `fields`.
///
/// Needs no browser: the fields come from an earlier scan.
pub async fn extract_values(
    provider: &Provider,
    email: &str,
    fields: &[FieldDescriptor],
) -> Result<Extraction> {
    if email.trim().is_empty() {
        return Err(Error::Input("email text is empty".into()));
    }
    if fields.is_empty() {
        return Err(Error::Input("no form fields to extract".into()));
    }

    let prompt = build_prompt(email, fields);
    debug!("prompt is {} bytes for {} fields", prompt.len(), fields.len());
    let response = provider.complete(&prompt).await?;
    let values = parse_response(&response, fields)?;
    let rows = build_rows(fields, &values);
    info!("extracted values for {}/{} fields", values.len(), fields.len());

    Ok(Extraction {
        response,
        values,
        rows,
    })
}

/// A browser page holding the target form.
pub struct Session {
    browser: Browser,
    page: Page,
    timing: Timing,
    fields: Vec<FieldDescriptor>,
}

impl Session {
    /// Launch a browser with `config` and open a blank page.
    pub async fn launch(config: &BrowserConfig, timing: Timing) -> Result<Self> {
        let stealth = eoka::StealthConfig {
            headless: config.headless,
            proxy: config.proxy.clone(),
            user_agent: config.user_agent.clone(),
            viewport_width: config.viewport.as_ref().map(|v| v.width).unwrap_or(1280),
            viewport_height: config.viewport.as_ref().map(|v| v.height).unwrap_or(720),
            ..Default::default()
        };

        debug!(
            "Launching browser (headless: {}, proxy: {:?})",
            config.headless, config.proxy
        );
        let browser = Browser::launch_with_config(stealth).await?;
        let page = browser.new_page("about:blank").await?;

        Ok(Self {
            browser,
            page,
            timing,
            fields: Vec::new(),
        })
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate to the form. Forgets fields from any earlier scan.
    pub async fn open(&mut self, url: &str) -> Result<()> {
        info!("Navigating to: {}", url);
        self.page.goto(url).await?;
        // Pages with long-polling never go idle
        if let Err(e) = self.page.wait_for_network_idle(500, 10_000).await {
            warn!("network did not go idle, continuing: {}", e);
        }
        self.fields.clear();
        Ok(())
    }

    /// Locate and mark the form fields currently on the page.
    pub async fn scan(&mut self) -> Result<&[FieldDescriptor]> {
        self.fields = fields::locate_fields(&self.page).await?;
        info!("found {} form fields", self.fields.len());
        Ok(&self.fields)
    }

    /// Open every dropdown widget and read its options.
    pub async fn probe_dropdowns(&self) -> Result<Vec<DropdownOptions>> {
        fields::probe_dropdowns(&self.page, &self.timing).await
    }

    /// Extract values for the scanned fields, scanning first if needed.
    pub async fn extract(&mut self, provider: &Provider, email: &str) -> Result<Extraction> {
        if self.fields.is_empty() {
            self.scan().await?;
        }
        extract_values(provider, email, &self.fields).await
    }

    /// Write reviewed values into the marked fields.
    pub async fn fill(&self, values: &[ReviewedValue]) -> Result<FillReport> {
        fields::fill_fields(&self.page, values, &self.timing).await
    }

    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }
}
