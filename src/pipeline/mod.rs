//! RAG 파이프라인 - 업로드(추출 → 청킹 → 임베딩 → 저장)와 질문(검색 → 생성)
//!
//! 서비스 시작 시 한 번 생성되어 요청 핸들러들이 `Arc`로 공유합니다.

use anyhow::{Context, Result};

use crate::config::{Settings, VectorBackend};
use crate::embedding::create_embedder;
use crate::extractor::{self, DocumentFormat};
use crate::generation::{create_chat_model, format_context, AnswerGenerator};
use crate::knowledge::{
    recursive_chunker, source_metadata, Chunker, DocumentIndex, LanceVectorStore, SearchResult,
    SqliteVectorStore, VectorStore,
};

/// 업로드 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// 저장 완료 (저장된 청크 수)
    Stored { source: String, chunks: usize },
    /// 지원하지 않는 확장자
    Unsupported { extension: String },
}

/// RAG 파이프라인
pub struct RagPipeline {
    chunker: Box<dyn Chunker>,
    index: DocumentIndex,
    generator: Option<AnswerGenerator>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        chunker: Box<dyn Chunker>,
        index: DocumentIndex,
        generator: Option<AnswerGenerator>,
        top_k: usize,
    ) -> Self {
        Self {
            chunker,
            index,
            generator,
            top_k,
        }
    }

    /// 설정으로 전체 파이프라인 구성 (언어 모델 포함)
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let model = create_chat_model(&settings.llm).context("Failed to configure language model")?;
        let mut pipeline = Self::retrieval_only(settings).await?;
        pipeline.generator = Some(AnswerGenerator::new(model));
        Ok(pipeline)
    }

    /// 언어 모델 없이 구성 (업로드/검색 전용)
    pub async fn retrieval_only(settings: &Settings) -> Result<Self> {
        let chunker = recursive_chunker(settings.chunk.clone())?;
        let embedder = create_embedder(&settings.embedding)?;

        let store: Box<dyn VectorStore> = match settings.vector_backend {
            VectorBackend::Sqlite => Box::new(SqliteVectorStore::open(&settings.sqlite_path())?),
            VectorBackend::Lance => Box::new(
                LanceVectorStore::open(&settings.lance_path(), settings.embedding.dimension)
                    .await?,
            ),
        };

        tracing::info!(
            "Pipeline ready: {} chunker, {} store, top-k {}",
            chunker.name(),
            store.name(),
            settings.top_k
        );

        Ok(Self::new(
            chunker,
            DocumentIndex::new(embedder, store),
            None,
            settings.top_k,
        ))
    }

    /// 문서 업로드
    ///
    /// 추출 실패는 `ExtractError`로, 지원하지 않는 형식은 `UploadOutcome::Unsupported`로 반환합니다.
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadOutcome> {
        let format = DocumentFormat::from_filename(filename);
        if let DocumentFormat::Unsupported(extension) = format {
            tracing::info!("Rejected upload {:?}: unsupported extension", filename);
            return Ok(UploadOutcome::Unsupported { extension });
        }

        let size = bytes.len();
        let text = extractor::extract_text(&format, bytes)
            .await
            .with_context(|| format!("Failed to extract {}", filename))?;

        let chunks = self.chunker.chunk(&text);
        if chunks.is_empty() {
            tracing::warn!("No text content in {:?}; nothing indexed", filename);
        }

        let metadatas = vec![source_metadata(filename); chunks.len()];
        let stored = self.index.add_texts(&chunks, &metadatas).await?;

        tracing::info!(
            "Uploaded {:?} ({} bytes, {} chars) as {} chunks",
            filename,
            size,
            text.chars().count(),
            stored
        );

        Ok(UploadOutcome::Stored {
            source: filename.to_string(),
            chunks: stored,
        })
    }

    /// 질문에 대한 답변 (검색된 컨텍스트 기반)
    pub async fn ask(&self, question: &str) -> Result<String> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Language model is not configured"))?;

        let results = self.index.similarity_search(question, self.top_k).await?;
        tracing::debug!("Retrieved {} chunks for question", results.len());

        let context = format_context(&results);
        generator.generate(question, &context).await
    }

    /// 검색만 수행
    pub async fn search(&self, question: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.index.similarity_search(question, k).await
    }

    /// 저장된 청크 수
    pub async fn count(&self) -> Result<usize> {
        self.index.count().await
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn backend_name(&self) -> &'static str {
        self.index.backend_name()
    }
}

// ============================================================================
// Tests
// ============================================================================
