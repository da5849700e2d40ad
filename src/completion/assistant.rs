use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{check_status, join_url, CompletionResponse};
use crate::config::CompletionConfig;
use crate::{Error, Result};

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Deserialize)]
struct RunStatus {
    status: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<Value>,
}

/// Thread/run client for a stateful assistant.
///
/// One `complete` call creates a thread, posts the prompt, starts a run,
/// polls it until it leaves `queued`/`in_progress`, then returns the first
/// assistant-authored message of the thread.
#[derive(Debug, Clone)]
pub struct AssistantClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    assistant_id: String,
    poll_interval: Duration,
    run_timeout: Duration,
}

impl AssistantClient {
    pub fn new(http: reqwest::Client, config: &CompletionConfig) -> Result<Self> {
        let assistant_id = config
            .assistant_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config("completion.assistant_id is required".into()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            assistant_id,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            run_timeout: Duration::from_millis(config.run_timeout_ms),
        })
    }

    pub async fn complete(&self, prompt: &str) -> Result<CompletionResponse> {
        let thread: Created = self.post("threads", &json!({}), "thread creation").await?;
        debug!("created thread {}", thread.id);

        let _: Value = self
            .post(
                &format!("threads/{}/messages", thread.id),
                &json!({ "role": "user", "content": prompt }),
                "message creation",
            )
            .await?;

        let run: Created = self
            .post(
                &format!("threads/{}/runs", thread.id),
                &json!({ "assistant_id": self.assistant_id }),
                "run creation",
            )
            .await?;
        info!("started run {} on thread {}", run.id, thread.id);

        let status = self.wait_for_run(&thread.id, &run.id).await?;
        if status != "completed" {
            return Err(Error::RunFailed(status));
        }

        let messages: MessageList = self
            .get(&format!("threads/{}/messages", thread.id), "messages retrieval")
            .await?;
        let message = messages
            .data
            .into_iter()
            .find(|m| m.get("role").and_then(Value::as_str) == Some("assistant"))
            .ok_or_else(|| Error::Parse("no assistant message found".into()))?;

        Ok(CompletionResponse::Assistant(message))
    }

    async fn wait_for_run(&self, thread_id: &str, run_id: &str) -> Result<String> {
        let deadline = Instant::now() + self.run_timeout;
        loop {
            tokio::time::sleep(self.poll_interval).await;
            let run: RunStatus = self
                .get(
                    &format!("threads/{}/runs/{}", thread_id, run_id),
                    "run status check",
                )
                .await?;
            debug!("run {} status: {}", run_id, run.status);
            if run.status != "in_progress" && run.status != "queued" {
                return Ok(run.status);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "run {} still {} after {}ms",
                    run_id,
                    run.status,
                    self.run_timeout.as_millis()
                )));
            }
        }
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Value,
        step: &str,
    ) -> Result<T> {
        let response = self
            .http
            .post(join_url(&self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .json(body)
            .send()
            .await?;
        Ok(check_status(response, step).await?.json().await?)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, step: &str) -> Result<T> {
        let response = self
            .http
            .get(join_url(&self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .send()
            .await?;
        Ok(check_status(response, step).await?.json().await?)
    }
}
