//! 프롬프트 조립
//!
//! 페르소나, 지시문, 질문, 컨텍스트 지시문, 검색된 패시지 목록을 고정된 순서로 이어 붙입니다.
//! 모델 입력 예산을 넘으면 순위가 낮은 패시지부터 통째로 제외합니다.
//! 패시지 중간을 자르거나 페르소나/지시문/질문을 빼는 일은 없습니다.

use super::vector::RetrievedPassage;

/// 기본 페르소나
pub const DEFAULT_PERSONA: &str = "You will respond with the voice of roman emperor Marcus Aurelius.";

/// 기본 지시문
pub const DEFAULT_INSTRUCTION: &str = "Give response to the following question:";

/// 컨텍스트 사용 지시문
pub const CONTEXT_DIRECTIVE: &str = "Use only the content of the following list to give answer:";

/// 패시지 줄 접두사
pub const PASSAGE_PREFIX: &str = "- ";

/// gpt-3.5-turbo (4096 토큰) 기준 프롬프트 예산, 응답용 1024 토큰 제외
pub const DEFAULT_MAX_PROMPT_TOKENS: usize = 3072;

// ============================================================================
// Context Budget
// ============================================================================

/// 프롬프트 토큰 예산
///
/// 토큰 수는 문자 4개당 1토큰으로 추정합니다 (올림).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub max_tokens: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_PROMPT_TOKENS,
        }
    }
}

impl ContextBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// 예산 제한 없음
    pub fn unlimited() -> Self {
        Self {
            max_tokens: usize::MAX,
        }
    }

    /// 추정 토큰 수
    pub fn estimate_tokens(text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }

    pub fn fits(&self, text: &str) -> bool {
        Self::estimate_tokens(text) <= self.max_tokens
    }
}

// ============================================================================
// PromptAssembler
// ============================================================================

/// 조립 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub text: String,
    /// 포함된 패시지 수 (순위 상위부터)
    pub passages_used: usize,
    /// 예산 때문에 제외된 패시지 수
    pub passages_dropped: usize,
}

/// 프롬프트 조립기
#[derive(Debug, Clone, Default)]
pub struct PromptAssembler {
    budget: ContextBudget,
}

impl PromptAssembler {
    pub fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> ContextBudget {
        self.budget
    }

    /// 프롬프트 문자열 조립
    pub fn assemble(
        &self,
        persona: &str,
        instruction: &str,
        question: &str,
        retrieved: &[RetrievedPassage],
    ) -> String {
        self.assemble_with_report(persona, instruction, question, retrieved)
            .text
    }

    /// 프롬프트 조립 + 포함/제외 패시지 수
    pub fn assemble_with_report(
        &self,
        persona: &str,
        instruction: &str,
        question: &str,
        retrieved: &[RetrievedPassage],
    ) -> AssembledPrompt {
        let mut text = [persona, instruction, question, CONTEXT_DIRECTIVE].join("\n");

        if !self.budget.fits(&text) {
            tracing::warn!(
                "Prompt header alone is ~{} tokens (budget {}); sending without context",
                ContextBudget::estimate_tokens(&text),
                self.budget.max_tokens
            );
        }

        let mut used = 0;
        for passage in retrieved {
            let line = format!("\n{}{}", PASSAGE_PREFIX, passage.raw_text);
            let candidate_len = text.chars().count() + line.chars().count();
            if candidate_len.div_ceil(4) > self.budget.max_tokens {
                break;
            }
            text.push_str(&line);
            used += 1;
        }

        let dropped = retrieved.len() - used;
        if dropped > 0 {
            tracing::info!(
                "Context budget ({} tokens): kept {} passages, dropped {} lowest-ranked",
                self.budget.max_tokens,
                used,
                dropped
            );
        }

        AssembledPrompt {
            text,
            passages_used: used,
            passages_dropped: dropped,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
