//! HTTP client for an OpenAI-compatible completion and embedding server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Embedder, LanguageModel};
use crate::config::Config;
use crate::error::LlmError;
use crate::metrics;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct LlmClient {
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: Option<String>,
    temperature: f32,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        info!(
            "LLM client initialized with backend: {} (model: {})",
            config.llm_base_url, config.llm_model
        );
        Self {
            base_url: config.llm_base_url.trim_end_matches('/').to_string(),
            model: config.llm_model.clone(),
            embedding_model: config.embedding_model.clone(),
            api_key: config.llm_api_key.clone(),
            temperature: config.llm_temperature,
            timeout: config.llm_timeout(),
            http_client: reqwest::Client::builder()
                .timeout(config.llm_timeout())
                .build()
                .unwrap_or_default(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.base_url)
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self.http_client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn request_completion(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            stream: false,
        };

        let response = self
            .post(&self.completions_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::Unavailable(format!("request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("LLM backend returned {}: {}", status, body);
            return Err(LlmError::Unavailable(format!("backend returned {}", status)));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::BadResponse(format!("failed to parse completion: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .ok_or_else(|| LlmError::BadResponse("completion had no choices".to_string()))
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        debug!("LLM completion request ({} chars)", prompt.len());
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.request_completion(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout)),
        };
        metrics::observe_llm_duration(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!("LLM completion failed: {}", e);
        }
        result
    }
}

#[async_trait]
impl Embedder for LlmClient {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        debug!("Generating embeddings for {} text(s)", expected);

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response = self
            .post(&self.embeddings_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Embedding request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Embedding endpoint returned {}: {}", status, body));
        }

        let embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse embedding response: {}", e))?;
        let embeddings: Vec<Vec<f32>> = embedding_response
            .data
            .into_iter()
            .map(|d| d.embedding)
            .collect();

        if embeddings.len() != expected {
            return Err(anyhow::anyhow!(
                "Embedding endpoint returned {} vectors for {} inputs",
                embeddings.len(),
                expected
            ));
        }
        debug!(
            "Generated {} embeddings (dim={})",
            embeddings.len(),
            embeddings.first().map(|e| e.len()).unwrap_or(0)
        );
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(url: &str, api_key: Option<&str>) -> LlmClient {
        let config = Config {
            llm_base_url: url.to_string(),
            llm_api_key: api_key.map(str::to_string),
            llm_timeout_seconds: 5,
            ..Config::default()
        };
        LlmClient::new(&config)
    }

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"```sql\nSELECT 1\n```"}}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), Some("secret"));
        let text = client.complete("hello").await.unwrap();
        assert_eq!(text, "```sql\nSELECT 1\n```");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        match client.complete("hello").await {
            Err(LlmError::Unavailable(msg)) => assert!(msg.contains("503")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_bad_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        assert!(matches!(client.complete("hello").await, Err(LlmError::BadResponse(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let client = client_for("http://127.0.0.1:9", None);
        assert!(matches!(
            client.complete("hello").await,
            Err(LlmError::Unavailable(_)) | Err(LlmError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_embed_parses_vectors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[0.3,0.4]}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        let vectors = client
            .embed(vec!["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert!(client.embed(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embed_count_mismatch_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[0.1]}]}"#)
            .create_async()
            .await;

        let client = client_for(&server.url(), None);
        assert!(client.embed(vec!["a".into(), "b".into()]).await.is_err());
    }
}
