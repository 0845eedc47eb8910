//! 스프레드시트(.xlsx) 텍스트 추출 모듈
//!
//! 첫 번째 시트만 읽습니다. 첫 행은 헤더이고, 이후 각 행을
//! `헤더1: 값1 | 헤더2: 값2 | ...`로 렌더링해 `\n`으로 연결합니다.

use std::path::Path;

use calamine::{open_workbook, Data, Reader, Xlsx};

use super::{run_blocking, stage_upload, ExtractError};

/// 업로드 바이트에서 스프레드시트 텍스트 추출
pub async fn extract_sheet(bytes: Vec<u8>) -> Result<String, ExtractError> {
    extract_sheet_in(&std::env::temp_dir(), bytes).await
}

/// `staging_dir`에 임시 파일을 두고 추출
pub(crate) async fn extract_sheet_in(
    staging_dir: &Path,
    bytes: Vec<u8>,
) -> Result<String, ExtractError> {
    let staged = stage_upload(staging_dir, ".xlsx", &bytes)?;

    let path = staged.path().to_path_buf();
    let result = run_blocking(move || extract_text_from_sheet(&path), ExtractError::Spreadsheet).await;
    drop(staged);

    result
}

/// xlsx 파일의 첫 시트를 텍스트로 렌더링
pub fn extract_text_from_sheet(path: &Path) -> Result<String, ExtractError> {
    let mut workbook: Xlsx<_> =
        open_workbook(path).map_err(|e: calamine::XlsxError| ExtractError::Spreadsheet(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ExtractError::Spreadsheet("workbook has no worksheets".to_string()))?
        .map_err(|e| ExtractError::Spreadsheet(e.to_string()))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();

    tracing::debug!("Read {} spreadsheet rows (including header)", rows.len());
    Ok(render_rows(rows))
}

/// 셀 값의 문자열 표현 (빈 셀은 빈 문자열)
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// 헤더 행 + 데이터 행을 텍스트로 렌더링
///
/// 빈 헤더 셀은 `Unnamed: <열 번호>`가 되고, 모든 셀이 빈 행은 건너뜁니다.
pub fn render_rows(rows: Vec<Vec<String>>) -> String {
    let mut rows = rows.into_iter();

    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .into_iter()
            .enumerate()
            .map(|(i, h)| {
                if h.trim().is_empty() {
                    format!("Unnamed: {}", i)
                } else {
                    h
                }
            })
            .collect(),
        None => return String::new(),
    };

    rows.filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .map(|row| {
            headers
                .iter()
                .zip(row.iter().map(String::as_str).chain(std::iter::repeat("")))
                .map(|(header, value)| format!("{}: {}", header, value))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================
