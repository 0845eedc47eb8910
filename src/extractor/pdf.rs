//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 텍스트를 추출합니다.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::{run_blocking, stage_upload, ExtractError};

/// 업로드 바이트에서 PDF 텍스트 추출
///
/// 페이지 텍스트를 페이지 순서대로 `\n`으로 연결합니다.
pub async fn extract_pdf(bytes: Vec<u8>) -> Result<String, ExtractError> {
    extract_pdf_in(&std::env::temp_dir(), bytes).await
}

/// `staging_dir`에 임시 파일을 두고 추출
pub(crate) async fn extract_pdf_in(staging_dir: &Path, bytes: Vec<u8>) -> Result<String, ExtractError> {
    let staged = stage_upload(staging_dir, ".pdf", &bytes)?;

    // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    // staged는 작업이 끝난 뒤 drop되면서 삭제됨
    let path = staged.path().to_path_buf();
    let result = run_blocking(move || extract_text_from_pdf(&path), ExtractError::Pdf).await;
    drop(staged);

    result
}

/// PDF 파일에서 텍스트 추출
pub fn extract_text_from_pdf(path: &Path) -> Result<String, ExtractError> {
    let text = pdf_extract::extract_text(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;

    // 텍스트가 비어있으면 경고
    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(String::new());
    }

    let pages = split_pdf_pages(&text);
    tracing::debug!("Extracted {} PDF pages", pages.len());

    Ok(pages.join("\n"))
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)로 페이지 분리 시도
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // 페이지 구분자 패턴으로 시도 (일부 PDF에서 사용)
    // 예: "--- Page 1 ---"
    if page_marker().is_match(text) {
        let pages: Vec<String> = page_marker()
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    // 분리 실패 - 전체를 하나의 페이지로
    vec![text.trim().to_string()]
}

fn page_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
            .expect("Invalid regex")
    })
}

// ============================================================================
// Tests
// ============================================================================
