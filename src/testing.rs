//! 테스트 전용 임베더/언어 모델
//!
//! 네트워크 없이 결정적으로 동작합니다.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::generation::ChatModel;

/// 키워드 해시 임베딩 차원
const KEYWORD_DIMENSION: usize = 256;

/// 소문자 영숫자 토큰을 FNV-1a로 버킷에 더하는 bag-of-words 임베딩
#[derive(Debug, Default)]
pub struct KeywordEmbedding;

impl KeywordEmbedding {
    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; KEYWORD_DIMENSION];
        let lowered = text.to_lowercase();

        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            vector[(hash % KEYWORD_DIMENSION as u64) as usize] += 1.0;
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vectorize(text))
    }

    fn dimension(&self) -> usize {
        KEYWORD_DIMENSION
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 항상 실패하는 임베더
#[derive(Debug, Default)]
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }

    fn dimension(&self) -> usize {
        KEYWORD_DIMENSION
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 고정 답변을 돌려주고 받은 프롬프트를 기록하는 언어 모델
pub struct ScriptedChat {
    answer: Option<String>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChat {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            prompts: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            prompts: Arc::default(),
        }
    }

    /// 받은 프롬프트 기록 (모델을 넘긴 뒤에도 확인 가능)
    pub fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .map_err(|_| anyhow::anyhow!("prompt log poisoned"))?
            .push(prompt.to_string());

        self.answer
            .clone()
            .ok_or_else(|| anyhow::anyhow!("language model unavailable"))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
