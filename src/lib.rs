//! docqa-rag - 업로드한 문서 기반 질의응답 RAG 서비스
//!
//! 문서(.txt, .pdf, .xlsx)를 청킹/임베딩해 벡터 저장소에 넣고,
//! 질문과 가장 유사한 청크만 컨텍스트로 언어 모델에 전달합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod pipeline;
pub mod server;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use config::{ConfigError, Settings};
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, OllamaEmbedding};
pub use extractor::{DocumentFormat, ExtractError};
pub use generation::{create_chat_model, AnswerGenerator, ChatModel, GeminiChat, OpenAiChat};
pub use knowledge::{
    ChunkConfig, Chunker, DocumentIndex, LanceVectorStore, RecursiveChunker, SearchResult,
    SqliteVectorStore, StoreStats, VectorStore,
};
pub use pipeline::{RagPipeline, UploadOutcome};
