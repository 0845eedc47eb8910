//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! 청크 텍스트, 임베딩, 메타데이터(`source`)를 한 레코드로 저장하고
//! 코사인 유사도 기준 top-k 검색을 제공합니다.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 출처 메타데이터 키
pub const SOURCE_KEY: &str = "source";

/// 레코드 메타데이터 (키 순서 고정)
pub type Metadata = BTreeMap<String, String>;

/// `{source: filename}` 메타데이터 생성
pub fn source_metadata(source: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), source.to_string());
    metadata
}

// ============================================================================
// Types
// ============================================================================

/// 벡터 레코드 (저장용)
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// 청크 텍스트
    pub text: String,
    /// 메타데이터
    pub metadata: Metadata,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 청크 텍스트
    pub text: String,
    /// 메타데이터
    pub metadata: Metadata,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

impl SearchResult {
    /// 출처 파일명
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 구현체는 `insert_batch`를 원자적으로 처리하고, 반환 전에 영속화해야 합니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 배치 삽입 (전부 저장되거나 전부 실패)
    async fn insert_batch(&self, records: &[VectorRecord]) -> Result<usize>;

    /// 유사도 내림차순 top-k 검색 (동점은 삽입 순서)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 저장된 레코드 수
    async fn count(&self) -> Result<usize>;

    /// 백엔드 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// (삽입 순번, 결과) 후보를 유사도 내림차순 → 순번 오름차순으로 정렬 후 상위 `limit`개 반환
pub fn rank_candidates(mut candidates: Vec<(i64, SearchResult)>, limit: usize) -> Vec<SearchResult> {
    candidates.sort_by(|(seq_a, a), (seq_b, b)| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(seq_a.cmp(seq_b))
    });
    candidates.truncate(limit);
    candidates.into_iter().map(|(_, result)| result).collect()
}

// ============================================================================
// Tests
// ============================================================================
