//! 완성 모듈 - OpenAI Chat Completions API 호출
//!
//! 조립된 프롬프트를 user 메시지 하나로 보내고 첫 번째 choice의 본문만 사용합니다.
//! 샘플링 파라미터는 보내지 않습니다 (서버 기본값).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ApiConfig;
use crate::embedding::describe_api_error;
use crate::error::{RagError, Result};
use crate::retry::{Sleeper, TokioSleeper};

const SERVICE: &str = "completion";

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 텍스트 생성 프로바이더 트레이트
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 프롬프트에 대한 응답 생성
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Chat Completion
// ============================================================================

/// OpenAI 채팅 완성 구현체
///
/// ref: https://platform.openai.com/docs/api-reference/chat
pub struct OpenAiCompletion {
    client: reqwest::Client,
    config: ApiConfig,
    endpoint: Url,
    sleeper: Arc<dyn Sleeper>,
}

impl OpenAiCompletion {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            endpoint: config.endpoint("v1/chat/completions")?,
            config: config.clone(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// 재시도 대기에 사용할 Sleeper 교체
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    async fn request_once(&self, request: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.config.bearer_token())
            .json(request)
            .send()
            .await
            .map_err(|e| RagError::CompletionService {
                message: format!("Failed to send completion request: {}", e),
                retryable: true,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RagError::CompletionService {
            message: format!("Failed to read response body: {}", e),
            retryable: true,
        })?;

        if !status.is_success() {
            return Err(RagError::CompletionService {
                message: describe_api_error(status, &body),
                retryable: status.as_u16() == 429 || status.is_server_error(),
            });
        }

        parse_chat_response(&body)
    }
}

/// Chat Completions 요청 본문
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Chat Completions 응답
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// 응답 검증 후 첫 번째 choice의 content 반환
fn parse_chat_response(body: &str) -> Result<String> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| RagError::MalformedResponse {
            service: SERVICE,
            detail: format!("unexpected body: {}", e),
        })?;

    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| RagError::MalformedResponse {
            service: SERVICE,
            detail: "empty choices array".to_string(),
        })
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.completion_model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!(
            "Sending prompt to {} ({} chars)",
            self.config.completion_model,
            prompt.chars().count()
        );

        self.config
            .retry
            .run(self.sleeper.as_ref(), "completion request", || {
                self.request_once(&request)
            })
            .await
    }

    fn name(&self) -> &str {
        &self.config.completion_model
    }
}

// ============================================================================
// Tests
// ============================================================================
