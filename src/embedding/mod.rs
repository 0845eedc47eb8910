//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 문서 청크와 질문을 같은 모델로 벡터화합니다.
//! - Ollama: 로컬 모델 (기본 `all-minilm`, 384차원)
//! - Gemini: `gemini-embedding-001` (768/1536/3072차원)
//!
//! 실패는 재시도 없이 호출자에게 그대로 전달됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::new("http://localhost:11434", "all-minilm", 384)?;
//! let vectors = embedder.embed_documents(&chunks).await?;
//! let query = embedder.embed_query("What color is the sky?").await?;
//! ```

mod gemini;
mod ollama;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{EmbeddingBackend, EmbeddingSettings};

pub use gemini::GeminiEmbedding;
pub use ollama::OllamaEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// `embed_documents`와 `embed_query`는 반드시 같은 모델을 사용해야
/// 벡터끼리 비교할 수 있습니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 질문(단일 텍스트) 임베딩
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// 문서 배치 임베딩 (입력 순서 유지, 기본 구현: 순차 호출)
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_query(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match settings.backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedding::new(
            &settings.ollama_url,
            &settings.model,
            settings.dimension,
        )?),
        EmbeddingBackend::Gemini => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set.\n\
                     Set: export GEMINI_API_KEY=your-api-key\n\
                     Get your API key at: https://aistudio.google.com/app/apikey"
                )
            })?;
            Arc::new(
                GeminiEmbedding::with_dimension(api_key, settings.dimension)?
                    .with_base_url(&settings.gemini_url)
                    .with_model(&settings.model),
            )
        }
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

/// 벡터 차원 확인
pub(crate) fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        anyhow::bail!(
            "Embedding dimension mismatch: expected {}, got {}",
            expected,
            vector.len()
        );
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_create_ollama_embedder() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let embedder = create_embedder(&settings.embedding).unwrap();
        assert_eq!(embedder.dimension(), 384);
        assert_eq!(embedder.name(), "all-minilm");
    }

    #[test]
    fn test_create_gemini_embedder_without_key_returns_error() {
        let settings = Settings::from_lookup(|key| match key {
            "DOCQA_EMBEDDING_PROVIDER" => Some("gemini".to_string()),
            _ => None,
        })
        .unwrap();

        let result = create_embedder(&settings.embedding);
        assert!(result.is_err());
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(&[0.0; 3], 3).is_ok());
        assert!(check_dimension(&[0.0; 2], 3).is_err());
    }
}
