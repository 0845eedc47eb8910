//! Text Chunking Module
//!
//! 재귀 구분자 계층(문단 → 줄 → 문장 → 단어 → 문자)으로 텍스트를 분할합니다.
//! 상위 구분자로 최대 길이를 맞출 수 없을 때만 하위 구분자로 내려갑니다.
//! 길이는 모두 문자(char) 수 기준입니다.

use std::collections::VecDeque;

use anyhow::Result;

/// 기본 구분자 우선순위 (문단, 줄, 문장, 단어, 문자)
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ".", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
    /// 인접 청크 간 오버랩 크기 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 500,
            overlap_characters: 100,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성
    pub fn new(max_characters: usize, overlap_characters: usize) -> Self {
        Self {
            max_characters,
            overlap_characters,
        }
    }

    /// 설정 검증 (overlap < max, max > 0)
    pub fn validate(&self) -> Result<()> {
        if self.max_characters == 0 {
            anyhow::bail!("Chunk size must be greater than 0");
        }
        if self.overlap_characters >= self.max_characters {
            anyhow::bail!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap_characters,
                self.max_characters
            );
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 구분자 청커
///
/// - 구분자는 다음 조각의 앞에 붙여 보존
/// - 최대 길이 미만 조각은 창(window)에 모아 병합
/// - 창이 넘치면 내보내고, 오버랩 이하가 될 때까지 앞에서 조각을 덜어냄
/// - 더 쪼갤 구분자가 없는 큰 조각은 그대로 (초과 크기) 내보냄
pub struct RecursiveChunker {
    config: ChunkConfig,
    separators: Vec<String>,
}

impl RecursiveChunker {
    /// 설정으로 생성 (기본 구분자)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        Self::with_separators(config, &DEFAULT_SEPARATORS)
    }

    /// 구분자 목록을 지정하여 생성
    pub fn with_separators(config: ChunkConfig, separators: &[&str]) -> Result<Self> {
        config.validate()?;
        if separators.is_empty() {
            anyhow::bail!("At least one separator is required");
        }

        Ok(Self {
            config,
            separators: separators.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 재귀 분할
    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keep_separator(text, separator) {
            if char_len(&piece) < self.config.max_characters {
                pending.push(piece);
                continue;
            }

            // 큰 조각을 만나면 지금까지 모은 조각부터 병합
            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending));
                pending.clear();
            }

            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    tracing::debug!(
                        "Emitting oversized chunk ({} chars > {})",
                        char_len(trimmed),
                        self.config.max_characters
                    );
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending));
        }

        chunks
    }

    /// 작은 조각들을 최대 길이 이내 청크로 병합 (오버랩 유지)
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let max = self.config.max_characters;
        let overlap = self.config.overlap_characters;

        let mut merged = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in splits {
            let len = char_len(piece);

            if total + len > max && !window.is_empty() {
                if let Some(chunk) = join_window(&window) {
                    merged.push(chunk);
                }

                // 오버랩 이하로 줄이고, 다음 조각이 들어갈 자리 확보
                while total > overlap || (total + len > max && total > 0) {
                    match window.pop_front() {
                        Some((_, front_len)) => total -= front_len,
                        None => break,
                    }
                }
            }

            window.push_back((piece.as_str(), len));
            total += len;
        }

        if let Some(chunk) = join_window(&window) {
            merged.push(chunk);
        }

        merged
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = self.split_recursive(text, &self.separators);
        chunks.retain(|c| !c.trim().is_empty());
        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 텍스트에 존재하는 첫 구분자와 나머지 하위 구분자 반환
///
/// 빈 구분자는 항상 일치합니다.
fn pick_separator<'a>(text: &str, separators: &'a [String]) -> (&'a str, &'a [String]) {
    for (i, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (separator.as_str(), &[]);
        }
        if text.contains(separator.as_str()) {
            return (separator.as_str(), &separators[i + 1..]);
        }
    }

    let last = separators.last().map(String::as_str).unwrap_or("");
    (last, &[])
}

/// 구분자를 다음 조각 앞에 붙인 채 분할 (빈 조각 제외)
///
/// 빈 구분자는 문자 단위로 분할합니다.
fn split_keep_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(text[start..idx].to_string());
        }
        start = idx;
    }

    if start < text.len() {
        pieces.push(text[start..].to_string());
    }

    pieces
}

/// 창의 조각을 이어붙이고 공백 제거 (비면 None)
fn join_window(window: &VecDeque<(&str, usize)>) -> Option<String> {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정을 지정하여 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(RecursiveChunker::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================
