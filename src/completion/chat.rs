use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{check_status, join_url, CompletionResponse};
use crate::config::CompletionConfig;
use crate::Result;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Stateless `POST /chat/completions` client.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl ChatClient {
    pub fn new(http: reqwest::Client, config: &CompletionConfig) -> Self {
        Self {
            http,
            url: join_url(&config.base_url, "chat/completions"),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }

    pub async fn complete(&self, prompt: &str) -> Result<CompletionResponse> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        debug!("POST {} (model {})", self.url, self.model);
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body: Value = check_status(response, "chat completion").await?.json().await?;
        Ok(CompletionResponse::Chat(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> ChatClient {
        ChatClient::new(reqwest::Client::new(), &CompletionConfig::chat(base, "test-key"))
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mock_server = MockServer::start().await;

        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "{\"Attendee\":\"Bob\"}" },
                "finish_reason": "stop"
            }]
        });

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .and(matchers::header("authorization", "Bearer test-key"))
            .and(matchers::body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{ "role": "user", "content": "hello" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = client(&mock_server.uri()).complete("hello").await.unwrap();
        assert_eq!(response, CompletionResponse::Chat(body));
    }

    #[tokio::test]
    async fn test_complete_api_error_keeps_status_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client(&mock_server.uri()).complete("hello").await.unwrap_err();
        match err {
            Error::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Invalid API key");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }
}
