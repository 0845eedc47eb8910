//! Document Index - 임베딩 + 벡터 저장소 결합
//!
//! 텍스트 추가 시 전부 임베딩한 뒤 한 번에 저장하고(fail-fast),
//! 질문은 같은 임베더로 벡터화해 top-k 청크를 찾습니다.

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::embedding::EmbeddingProvider;

use super::vector::{Metadata, SearchResult, VectorRecord, VectorStore};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("texts and metadatas must have the same length ({texts} != {metadatas})")]
    LengthMismatch { texts: usize, metadatas: usize },
    #[error("embedder returned {embeddings} vectors for {texts} texts")]
    EmbeddingCountMismatch { texts: usize, embeddings: usize },
}

/// 문서 인덱스
///
/// 저장소는 서비스 시작 시 한 번 만들어져 요청 간에 공유됩니다.
pub struct DocumentIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Box<dyn VectorStore>,
}

impl DocumentIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Box<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// 텍스트 추가 (자동 임베딩)
    ///
    /// 임베딩이 하나라도 실패하면 아무것도 저장하지 않습니다.
    /// 같은 텍스트를 다시 추가하면 중복 레코드가 생깁니다.
    ///
    /// # Returns
    /// 저장된 레코드 수
    pub async fn add_texts(&self, texts: &[String], metadatas: &[Metadata]) -> Result<usize> {
        if texts.len() != metadatas.len() {
            return Err(IndexError::LengthMismatch {
                texts: texts.len(),
                metadatas: metadatas.len(),
            }
            .into());
        }

        if texts.is_empty() {
            return Ok(0);
        }

        let embeddings = self
            .embedder
            .embed_documents(texts)
            .await
            .context("Failed to embed chunks")?;

        if embeddings.len() != texts.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                texts: texts.len(),
                embeddings: embeddings.len(),
            }
            .into());
        }

        let records: Vec<VectorRecord> = texts
            .iter()
            .zip(metadatas)
            .zip(embeddings)
            .map(|((text, metadata), embedding)| VectorRecord {
                text: text.clone(),
                metadata: metadata.clone(),
                embedding,
            })
            .collect();

        let inserted = self
            .store
            .insert_batch(&records)
            .await
            .context("Failed to insert vectors")?;

        tracing::debug!("Indexed {} chunks into {} store", inserted, self.store.name());
        Ok(inserted)
    }

    /// 질문과 가장 유사한 청크 top-k 검색
    pub async fn similarity_search(&self, question: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;

        self.store
            .search(&query_embedding, k)
            .await
            .context("Vector search failed")
    }

    /// 저장된 청크 수
    pub async fn count(&self) -> Result<usize> {
        self.store.count().await
    }

    /// 벡터 저장소 백엔드 이름
    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }
}

// ============================================================================
// Tests
// ============================================================================
