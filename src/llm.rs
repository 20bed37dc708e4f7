use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// A single text-completion call: prompt in, free text out.
///
/// The reply carries no guaranteed structure; callers extract what they
/// need from it themselves.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String, timeout: Duration) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_llm(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.1
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Generation(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AgentError::Generation(format!("Failed to parse LLM response: {}", e)))?;

        if !status.is_success() {
            let message = response_json["error"]["message"]
                .as_str()
                .unwrap_or("no error message");
            return Err(AgentError::Generation(format!(
                "LLM API returned {}: {}",
                status, message
            )));
        }

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AgentError::Generation("No content in LLM response".to_string()))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Calling {} with a {} character prompt", self.model, prompt.len());
        match tokio::time::timeout(self.timeout, self.call_llm(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Generation(format!(
                "LLM call timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = LlmClient::new(
            "test".to_string(),
            "test-model".to_string(),
            "http://localhost:9999/v1/".to_string(),
            Duration::from_secs(1),
        );
        assert_eq!(client.base_url, "http://localhost:9999/v1");
        assert_eq!(client.model(), "test-model");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_generation_error() {
        let client = LlmClient::new(
            "test".to_string(),
            "test-model".to_string(),
            "http://127.0.0.1:9".to_string(),
            Duration::from_secs(5),
        );
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)));
    }

    #[tokio::test]
    async fn test_silent_endpoint_hits_deadline() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = LlmClient::new(
            "test".to_string(),
            "test-model".to_string(),
            format!("http://{}/v1", addr),
            Duration::from_millis(100),
        );
        let err = client.complete("hello").await.unwrap_err();
        assert!(matches!(err, AgentError::Generation(_)));
        assert!(err.to_string().contains("timed out"));
        server.abort();
    }
}
