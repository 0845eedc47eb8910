//! 설정 모듈 - 환경변수 기반 서비스 설정
//!
//! 모든 값은 환경변수에서 읽고, 없으면 기본값을 사용합니다.
//! API 키는 로드 시점에 검증하지 않고, 클라이언트 생성 시 필요합니다.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::knowledge::ChunkConfig;

/// 기본 바인드 주소
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
/// 기본 검색 개수 (top-k)
pub const DEFAULT_TOP_K: usize = 5;
/// 기본 Ollama 주소
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
/// Groq OpenAI 호환 엔드포인트
pub const DEFAULT_GROQ_URL: &str = "https://api.groq.com/openai/v1";
/// Gemini API 엔드포인트
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.docqa-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("Invalid URL for {key}: {value}")]
    InvalidUrl { key: &'static str, value: String },
    #[error("Invalid chunking settings: {0}")]
    InvalidChunking(String),
}

// ============================================================================
// Backend Selection
// ============================================================================

/// 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    /// SQLite 정확 검색
    Sqlite,
    /// LanceDB ANN 검색
    Lance,
}

impl FromStr for VectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "lance" | "lancedb" => Ok(Self::Lance),
            other => Err(format!("expected sqlite or lance, got {}", other)),
        }
    }
}

/// 임베딩 프로바이더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    Ollama,
    Gemini,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("expected ollama or gemini, got {}", other)),
        }
    }
}

/// 언어 모델 프로바이더
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    /// OpenAI 호환 chat completions (Groq 기본)
    Groq,
    Gemini,
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" | "openai" => Ok(Self::Groq),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!("expected groq or gemini, got {}", other)),
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 임베딩 설정
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub dimension: usize,
    pub ollama_url: String,
    pub gemini_url: String,
    /// Gemini API 키 (Gemini 임베딩 사용 시)
    pub api_key: Option<String>,
}

/// 언어 모델 설정
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub backend: LlmBackend,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

/// 서비스 전체 설정
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub vector_backend: VectorBackend,
    pub embedding: EmbeddingSettings,
    pub llm: LlmSettings,
    pub chunk: ChunkConfig,
    pub top_k: usize,
}

impl Settings {
    /// 프로세스 환경변수에서 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    /// 키 조회 함수로 로드 (테스트에서 환경변수 대신 사용)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("DOCQA_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(get_data_dir);

        let bind: SocketAddr = parse_value(
            "DOCQA_BIND",
            lookup("DOCQA_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
        )?;

        let vector_backend = parse_or("DOCQA_VECTOR_BACKEND", &lookup, || VectorBackend::Sqlite)?;

        // 임베딩
        let embedding_backend =
            parse_or("DOCQA_EMBEDDING_PROVIDER", &lookup, || EmbeddingBackend::Ollama)?;
        let (default_model, default_dimension) = match embedding_backend {
            EmbeddingBackend::Ollama => ("all-minilm", 384),
            EmbeddingBackend::Gemini => ("gemini-embedding-001", 768),
        };
        let embedding = EmbeddingSettings {
            backend: embedding_backend,
            model: lookup("DOCQA_EMBEDDING_MODEL").unwrap_or_else(|| default_model.to_string()),
            dimension: parse_or("DOCQA_EMBEDDING_DIMENSION", &lookup, || default_dimension)?,
            ollama_url: url_or("OLLAMA_HOST", &lookup, DEFAULT_OLLAMA_URL)?,
            gemini_url: DEFAULT_GEMINI_URL.to_string(),
            api_key: gemini_key(&lookup),
        };
        if embedding.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DOCQA_EMBEDDING_DIMENSION",
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        // 언어 모델
        let llm_backend = parse_or("DOCQA_LLM_PROVIDER", &lookup, || LlmBackend::Groq)?;
        let (default_llm_model, default_llm_url, api_key) = match llm_backend {
            LlmBackend::Groq => ("llama-3.1-8b-instant", DEFAULT_GROQ_URL, lookup("GROQ_API_KEY")),
            LlmBackend::Gemini => (
                "gemini-2.0-flash",
                DEFAULT_GEMINI_URL,
                gemini_key(&lookup),
            ),
        };
        let llm = LlmSettings {
            backend: llm_backend,
            model: lookup("DOCQA_LLM_MODEL").unwrap_or_else(|| default_llm_model.to_string()),
            base_url: url_or("DOCQA_LLM_BASE_URL", &lookup, default_llm_url)?,
            api_key,
        };

        // 청킹
        let chunk = ChunkConfig::new(
            parse_or("DOCQA_CHUNK_SIZE", &lookup, || ChunkConfig::default().max_characters)?,
            parse_or("DOCQA_CHUNK_OVERLAP", &lookup, || {
                ChunkConfig::default().overlap_characters
            })?,
        );
        chunk
            .validate()
            .map_err(|e| ConfigError::InvalidChunking(e.to_string()))?;

        let top_k: usize = parse_or("DOCQA_TOP_K", &lookup, || DEFAULT_TOP_K)?;
        if top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DOCQA_TOP_K",
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(Self {
            data_dir,
            bind,
            vector_backend,
            embedding,
            llm,
            chunk,
            top_k,
        })
    }

    /// SQLite 벡터 DB 경로
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("chunks.db")
    }

    /// LanceDB 디렉토리 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("chunks.lance")
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Gemini API 키 조회
///
/// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
fn gemini_key<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("GEMINI_API_KEY").or_else(|| lookup("GOOGLE_AI_API_KEY"))
}

/// 값이 있으면 파싱, 없으면 기본값
fn parse_or<T, F, D>(key: &'static str, lookup: &F, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
    D: FnOnce() -> T,
{
    match lookup(key) {
        Some(value) => parse_value(key, value),
        None => Ok(default()),
    }
}

/// 문자열 값 파싱
fn parse_value<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key,
            reason: e.to_string(),
            value,
        })
}

/// URL 값 검증 (끝의 `/` 제거)
fn url_or<F>(key: &'static str, lookup: &F, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());
    let parsed = Url::parse(&value).map_err(|_| ConfigError::InvalidUrl {
        key,
        value: value.clone(),
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl { key, value });
    }

    Ok(value.trim_end_matches('/').to_string())
}

// ============================================================================
// Tests
// ============================================================================
