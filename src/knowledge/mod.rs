//! Knowledge 모듈 - 청킹 + 벡터 저장 + 유사도 검색
//!
//! - Chunker: 구분자 우선순위 기반 재귀 분할 (기본 500자, 겹침 100자)
//! - SQLite: 임베딩 BLOB 저장 + 전체 스캔 코사인 검색 (기본)
//! - LanceDB: 벡터 검색 (코사인 거리)
//! - Index: 임베더와 저장소를 묶어 텍스트 추가/질문 검색 제공

mod chunker;
mod index;
mod lance;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    recursive_chunker, ChunkConfig, Chunker, RecursiveChunker, DEFAULT_SEPARATORS,
};
pub use index::{DocumentIndex, IndexError};
pub use lance::LanceVectorStore;
pub use store::{SqliteVectorStore, StoreStats};
pub use vector::{
    cosine_similarity, rank_candidates, source_metadata, Metadata, SearchResult, VectorRecord,
    VectorStore, SOURCE_KEY,
};
