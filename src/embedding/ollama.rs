//! Ollama 로컬 임베딩
//!
//! `/api/embed` 배치 엔드포인트를 사용합니다.
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_dimension, EmbeddingProvider};

/// 한 번에 보낼 최대 입력 수
const BATCH_SIZE: usize = 32;

/// Ollama 임베딩 구현체
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (예: http://localhost:11434)
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 모델 출력 차원
    pub fn new(base_url: &str, model: &str, dimension: usize) -> Result<Self> {
        if model.trim().is_empty() {
            anyhow::bail!("Embedding model name cannot be empty");
        }
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than 0");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimension,
        })
    }

    /// 배치 하나 임베딩
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.base_url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                anyhow::bail!("Ollama API error ({}): {}", status, error.error);
            }
            anyhow::bail!("Ollama API error ({}): {}", status, body);
        }

        let parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        if parsed.embeddings.len() != texts.len() {
            anyhow::bail!(
                "Ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            );
        }

        for embedding in &parsed.embeddings {
            check_dimension(embedding, self.dimension)?;
        }

        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Ollama returned no embedding"))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(BATCH_SIZE)
            );
            results.extend(self.embed_batch(batch).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_client_configuration() {
        let embedder = OllamaEmbedding::new("http://test-host:1234/", "test-model", 8).unwrap();
        assert_eq!(embedder.base_url, "http://test-host:1234");
        assert_eq!(embedder.name(), "test-model");
        assert_eq!(embedder.dimension(), 8);

        assert!(OllamaEmbedding::new("http://localhost:11434", "", 8).is_err());
        assert!(OllamaEmbedding::new("http://localhost:11434", "m", 0).is_err());
    }

    #[tokio::test]
    async fn test_embed_documents_preserves_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .and(body_partial_json(serde_json::json!({
                "model": "all-minilm",
                "input": ["first", "second"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[1.0, 0.0], [0.0, 1.0]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedding::new(&server.uri(), "all-minilm", 2).unwrap();
        let vectors = embedder
            .embed_documents(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.25, 0.75]]
            })))
            .mount(&server)
            .await;

        let embedder = OllamaEmbedding::new(&server.uri(), "all-minilm", 2).unwrap();
        assert_eq!(embedder.embed_query("sky").await.unwrap(), vec![0.25, 0.75]);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model \"all-minilm\" not found, try pulling it first"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedding::new(&server.uri(), "all-minilm", 2).unwrap();
        let err = embedder.embed_query("sky").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_count_mismatch_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "embeddings": [[0.25, 0.75]]
            })))
            .mount(&server)
            .await;

        let embedder = OllamaEmbedding::new(&server.uri(), "all-minilm", 2).unwrap();
        let result = embedder
            .embed_documents(&["a".to_string(), "b".to_string()])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let embedder = OllamaEmbedding::new("http://127.0.0.1:1", "all-minilm", 2).unwrap();
        assert!(embedder.embed_query("sky").await.is_err());
    }
}
