//! Completion endpoint clients.
//!
//! [`Provider`] is the one capability the rest of the crate needs: send the
//! extraction prompt, get the reply envelope back. The wire protocol is picked
//! by [`Protocol`] in the job file.

mod assistant;
mod chat;

pub use assistant::AssistantClient;
pub use chat::ChatClient;

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::config::{CompletionConfig, Protocol};
use crate::fields::FieldDescriptor;
use crate::{Error, Result};

/// Raw reply from the completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CompletionResponse {
    /// Full `/chat/completions` response body.
    Chat(Value),
    /// The assistant-authored entry from the thread's message list.
    Assistant(Value),
}

impl CompletionResponse {
    pub fn raw(&self) -> &Value {
        match self {
            Self::Chat(v) | Self::Assistant(v) => v,
        }
    }
}

/// A configured completion endpoint.
#[derive(Debug, Clone)]
pub enum Provider {
    Chat(ChatClient),
    Assistant(AssistantClient),
}

impl Provider {
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(match config.protocol {
            Protocol::Chat => Self::Chat(ChatClient::new(http, config)),
            Protocol::Assistant => Self::Assistant(AssistantClient::new(http, config)?),
        })
    }

    /// Submit the prompt and return the reply envelope.
    pub async fn complete(&self, prompt: &str) -> Result<CompletionResponse> {
        match self {
            Self::Chat(c) => c.complete(prompt).await,
            Self::Assistant(c) => c.complete(prompt).await,
        }
    }
}

/// Build the extraction prompt: the email verbatim, then one line per field.
pub fn build_prompt(email: &str, fields: &[FieldDescriptor]) -> String {
    let field_lines: Vec<String> = fields
        .iter()
        .map(|f| format!("[{}] {} ({})", f.index, f.label, f.field_type))
        .collect();
    format!(
        "Given the following email content:\n\n\
         {}\n\n\
         Please fill out the following form fields based on the information in the email:\n\n\
         {}\n\n\
         Provide your response in JSON format, with the field label as the key and the extracted value as the value. \
         If two fields share a label, use the bracketed field number as the key instead. \
         If a value cannot be determined, use null.\n",
        email,
        field_lines.join("\n")
    )
}

/// Turn a non-success status into `Error::Api`, keeping the body.
async fn check_status(response: reqwest::Response, step: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("{} failed: {} {}", step, status.as_u16(), body);
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
