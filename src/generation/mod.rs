//! 답변 생성 모듈 - 검색된 컨텍스트로만 답하는 프롬프트 + 언어 모델 호출
//!
//! 컨텍스트는 검색 순서대로 청크를 빈 줄로 이어붙인 문자열입니다.
//! 모델은 temperature 0으로 호출하며, 답변이 컨텍스트에 근거하는지는
//! 모델에 맡기고 별도로 검증하지 않습니다.

mod gemini;
mod openai;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::{LlmBackend, LlmSettings};
use crate::knowledge::SearchResult;

pub use gemini::GeminiChat;
pub use openai::OpenAiChat;

/// 컨텍스트가 부족할 때 모델이 답해야 하는 고정 문구
pub const REFUSAL_ANSWER: &str = "I don't know based on the provided document.";

/// 결정적 디코딩
pub(crate) const TEMPERATURE: f32 = 0.0;

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 렌더링된 프롬프트를 보내고 원문 응답 텍스트를 받음
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

/// 설정에 맞는 언어 모델 생성
pub fn create_chat_model(settings: &LlmSettings) -> Result<Box<dyn ChatModel>> {
    let model: Box<dyn ChatModel> = match settings.backend {
        LlmBackend::Groq => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                anyhow::anyhow!("GROQ_API_KEY not set.\nSet: export GROQ_API_KEY=your-api-key")
            })?;
            Box::new(OpenAiChat::new(&settings.base_url, &settings.model, api_key)?)
        }
        LlmBackend::Gemini => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set.\n\
                     Set: export GEMINI_API_KEY=your-api-key"
                )
            })?;
            Box::new(GeminiChat::new(&settings.base_url, &settings.model, api_key)?)
        }
    };

    tracing::info!("Using language model: {}", model.name());
    Ok(model)
}

// ============================================================================
// Prompt
// ============================================================================

/// 질문 + 컨텍스트로 고정 프롬프트 렌더링
pub fn render_prompt(context: &str, question: &str) -> String {
    format!(
        r#"Answer the question using the context below.

If the context clearly describes or explains the concept asked about,
you may answer even if the exact wording of the question is not present.

Do NOT use outside knowledge.
If the answer cannot be reasonably inferred from the context, say:
"{refusal}"

Context:
{context}

Question:
{question}

Answer:
"#,
        refusal = REFUSAL_ANSWER,
        context = context,
        question = question,
    )
}

/// 검색 결과를 검색 순서대로 빈 줄로 이어붙임
pub fn format_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ============================================================================
// AnswerGenerator
// ============================================================================

/// 답변 생성기
pub struct AnswerGenerator {
    model: Box<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(model: Box<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// 컨텍스트 기반 답변 생성 (모델 원문 반환)
    pub async fn generate(&self, question: &str, context: &str) -> Result<String> {
        let prompt = render_prompt(context, question);

        tracing::debug!(
            "Prompting {} ({} context chars)",
            self.model.name(),
            context.chars().count()
        );

        self.model
            .complete(&prompt)
            .await
            .context("Language model call failed")
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }
}

// ============================================================================
// Tests
// ============================================================================
