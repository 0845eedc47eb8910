//! CLI 모듈
//!
//! docqa-rag CLI 명령어 정의 및 구현

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{Settings, VectorBackend};
use crate::extractor::SUPPORTED_FORMATS_MESSAGE;
use crate::knowledge::SqliteVectorStore;
use crate::pipeline::{RagPipeline, UploadOutcome};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa-rag")]
#[command(version, about = "문서 질의응답 RAG 서비스", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// HTTP 서버 실행
    Serve {
        /// 바인드 주소 (기본: DOCQA_BIND 또는 127.0.0.1:8000)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// 로컬 문서를 업로드 (.txt, .pdf, .xlsx)
    Upload {
        /// 문서 파일 경로
        path: PathBuf,
    },

    /// 업로드된 문서 기반 질문
    Ask {
        /// 질문
        question: String,
    },

    /// 검색만 수행 (답변 생성 없음)
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                settings.bind = bind;
            }
            crate::server::serve(&settings).await
        }
        Commands::Upload { path } => cmd_upload(&settings, &path).await,
        Commands::Ask { question } => cmd_ask(&settings, &question).await,
        Commands::Search { query, k } => cmd_search(&settings, &query, k).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 업로드 명령어 (upload)
async fn cmd_upload(settings: &Settings, path: &Path) -> Result<()> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("잘못된 파일 경로: {:?}", path))?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("파일 읽기 실패: {:?}", path))?;

    println!("[*] 업로드 중: {} ({})", filename, format_bytes(bytes.len()));

    let pipeline = RagPipeline::retrieval_only(settings)
        .await
        .context("파이프라인 초기화 실패")?;

    match pipeline.upload(filename, bytes).await? {
        UploadOutcome::Stored { source, chunks } => {
            println!("[OK] Document uploaded successfully");
            println!("     출처: {}", source);
            println!("     청크: {} 개", chunks);
        }
        UploadOutcome::Unsupported { extension } => {
            println!("[!] 지원하지 않는 파일 형식: .{}", extension);
            println!("    {}", SUPPORTED_FORMATS_MESSAGE);
        }
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(settings: &Settings, question: &str) -> Result<()> {
    if question.trim().is_empty() {
        bail!("질문이 비어 있습니다");
    }

    let pipeline = RagPipeline::from_settings(settings)
        .await
        .context("파이프라인 초기화 실패")?;

    println!("[*] 질문: \"{}\"", question);

    let answer = pipeline.ask(question).await.context("답변 생성 실패")?;

    println!();
    println!("{}", answer.trim());

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(settings: &Settings, query: &str, k: Option<usize>) -> Result<()> {
    let pipeline = RagPipeline::retrieval_only(settings)
        .await
        .context("파이프라인 초기화 실패")?;
    let k = k.unwrap_or(pipeline.top_k());

    println!("[*] 검색 중: \"{}\"", query);

    let results = pipeline.search(query, k).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [점수: {:.4}] {}",
            i + 1,
            result.similarity,
            result.source().unwrap_or("-")
        );
        println!("   내용: {}", truncate_text(&result.text, 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("docqa-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());
    println!(
        "[*] 임베딩: {:?} / {} ({}차원)",
        settings.embedding.backend, settings.embedding.model, settings.embedding.dimension
    );
    println!("[*] 언어 모델: {:?} / {}", settings.llm.backend, settings.llm.model);
    println!(
        "[*] 청킹: {}자 (오버랩 {}자), top-k {}",
        settings.chunk.max_characters, settings.chunk.overlap_characters, settings.top_k
    );

    // API 키 상태
    if settings.llm.api_key.is_some() {
        println!("[OK] 언어 모델 API 키: 설정됨");
    } else {
        println!("[!] 언어 모델 API 키: 미설정");
        println!("    설정: export GROQ_API_KEY=your-key");
    }

    // 저장소 상태
    match settings.vector_backend {
        VectorBackend::Sqlite => match SqliteVectorStore::open(&settings.sqlite_path())
            .and_then(|store| store.stats())
        {
            Ok(stats) => {
                println!("[OK] 벡터 저장소 (sqlite): {}", stats.db_path.display());
                println!("     저장된 청크: {} 개", stats.chunk_count);
                println!("     총 텍스트: {}", format_bytes(stats.total_text_bytes));
            }
            Err(e) => println!("[!] 벡터 저장소 열기 실패: {}", e),
        },
        VectorBackend::Lance => match RagPipeline::retrieval_only(settings).await {
            Ok(pipeline) => match pipeline.count().await {
                Ok(count) => {
                    println!("[OK] 벡터 저장소 (lance): {}", settings.lance_path().display());
                    println!("     저장된 청크: {} 개", count);
                }
                Err(e) => println!("[!] 청크 수 조회 실패: {}", e),
            },
            Err(e) => {
                tracing::debug!("Pipeline init failed: {:#}", e);
                println!("[!] 벡터 저장소 열기 실패: {}", e);
            }
        },
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
