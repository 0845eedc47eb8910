//! 콘텐츠 추출 모듈
//!
//! 업로드된 파일 바이트에서 하나의 텍스트 스트림을 추출합니다.
//! - 텍스트 파일 (.txt): UTF-8 그대로 디코딩
//! - PDF 파일 (.pdf): pdf-extract로 페이지별 추출 후 `\n`으로 연결
//! - 스프레드시트 (.xlsx): 첫 시트의 각 행을 `헤더: 값 | ...` 형태로 렌더링
//!
//! 형식은 파일명 확장자(대소문자 무시)로만 판단합니다.

pub mod pdf;
pub mod sheet;

use std::io::Write;
use std::path::Path;
use std::string::FromUtf8Error;

use tempfile::NamedTempFile;
use thiserror::Error;

/// 지원 형식 안내 문구
pub const SUPPORTED_FORMATS_MESSAGE: &str = "Supported formats: .txt, .pdf, .xlsx";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("File is not valid UTF-8 text: {0}")]
    Decode(#[from] FromUtf8Error),
    #[error("Failed to extract text from PDF: {0}")]
    Pdf(String),
    #[error("Failed to read spreadsheet: {0}")]
    Spreadsheet(String),
    #[error("Failed to stage upload for extraction: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported file extension: '{0}'")]
    Unsupported(String),
}

// ============================================================================
// Document Format
// ============================================================================

/// 업로드 문서 형식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Spreadsheet,
    /// 지원하지 않는 확장자 (소문자, 점 제외, 없으면 빈 문자열)
    Unsupported(String),
}

impl DocumentFormat {
    /// 파일명 확장자로 형식 판단
    pub fn from_filename(filename: &str) -> Self {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" => Self::Text,
            "pdf" => Self::Pdf,
            "xlsx" => Self::Spreadsheet,
            _ => Self::Unsupported(extension),
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// 형식별 텍스트 추출
///
/// 바이너리 형식은 임시 파일을 거치며, 임시 파일은 성공/실패와 관계없이 삭제됩니다.
pub async fn extract_text(format: &DocumentFormat, bytes: Vec<u8>) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Text => decode_text(bytes),
        DocumentFormat::Pdf => pdf::extract_pdf(bytes).await,
        DocumentFormat::Spreadsheet => sheet::extract_sheet(bytes).await,
        DocumentFormat::Unsupported(ext) => Err(ExtractError::Unsupported(ext.clone())),
    }
}

/// UTF-8 디코딩 (BOM 포함 그대로 유지)
fn decode_text(bytes: Vec<u8>) -> Result<String, ExtractError> {
    Ok(String::from_utf8(bytes)?)
}

/// 업로드 바이트를 `dir` 아래 임시 파일로 기록
///
/// 반환된 파일은 drop 시 삭제됩니다.
fn stage_upload(dir: &Path, suffix: &str, bytes: &[u8]) -> Result<NamedTempFile, ExtractError> {
    let mut staged = tempfile::Builder::new()
        .prefix("docqa-upload-")
        .suffix(suffix)
        .tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.flush()?;
    Ok(staged)
}

/// 블로킹 추출 작업을 별도 스레드에서 실행
///
/// 추출 라이브러리의 패닉도 추출 실패로 취급합니다.
async fn run_blocking<F>(task: F, on_panic: fn(String) -> ExtractError) -> Result<String, ExtractError>
where
    F: FnOnce() -> Result<String, ExtractError> + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result,
        Err(e) => Err(on_panic(format!("extraction task aborted: {}", e))),
    }
}

// ============================================================================
// Tests
// ============================================================================
