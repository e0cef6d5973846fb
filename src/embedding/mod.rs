//! 임베딩 모듈 - OpenAI Embeddings API를 통한 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환합니다. 모델 ID가 같으면 결과도 같다고 가정하며,
//! 텍스트 하나당 독립적인 요청 하나를 보냅니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let config = ApiConfig::from_secret_file(Path::new("secretkey.txt"))?;
//! let embedder = OpenAiEmbedding::new(&config)?;
//! let embedding = embedder.embed("Rome was founded in 753 BC.").await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ApiConfig;
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, Sleeper, TokioSleeper};

const SERVICE: &str = "embedding";

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출, 입력 순서 유지)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OpenAI Embedding
// ============================================================================

/// OpenAI 임베딩 구현체
///
/// ref: https://platform.openai.com/docs/api-reference/embeddings
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    config: ApiConfig,
    endpoint: Url,
    sleeper: Arc<dyn Sleeper>,
}

impl OpenAiEmbedding {
    /// 설정으로 생성
    pub fn new(config: &ApiConfig) -> Result<Self> {
        if config.embedding_dimension == 0 {
            return Err(RagError::Config(
                "Embedding dimension must be positive".to_string(),
            ));
        }

        Ok(Self {
            client: config.http_client()?,
            endpoint: config.endpoint("v1/embeddings")?,
            config: config.clone(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// 재시도 대기에 사용할 Sleeper 교체
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// 한 번의 HTTP 요청
    async fn request_once(&self, request: &EmbedRequest<'_>) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.config.bearer_token())
            .json(request)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingService {
                message: format!("Failed to send embedding request: {}", e),
                retryable: true,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RagError::EmbeddingService {
            message: format!("Failed to read response body: {}", e),
            retryable: true,
        })?;

        if !status.is_success() {
            return Err(RagError::EmbeddingService {
                message: describe_api_error(status, &body),
                retryable: status.as_u16() == 429 || status.is_server_error(),
            });
        }

        parse_embedding_response(&body, self.config.embedding_dimension)
    }
}

/// Embeddings API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

/// Embeddings API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// API 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub(crate) error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorDetail {
    pub(crate) message: String,
    #[serde(default, rename = "type")]
    pub(crate) kind: Option<String>,
}

/// 비정상 상태 코드 응답을 사람이 읽을 수 있는 메시지로
pub(crate) fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(err) => format!(
            "API error ({}, {}): {}",
            status,
            err.error.kind.as_deref().unwrap_or("unknown"),
            err.error.message
        ),
        Err(_) => format!("API error ({}): {}", status, body.trim()),
    }
}

/// 응답 본문 검증 및 벡터 추출
///
/// `data[0].embedding`이 없거나 차원이 다르면 `MalformedResponse`.
fn parse_embedding_response(body: &str, expected_dimension: usize) -> Result<Vec<f32>> {
    let response: EmbedResponse =
        serde_json::from_str(body).map_err(|e| RagError::MalformedResponse {
            service: SERVICE,
            detail: format!("unexpected body: {}", e),
        })?;

    let embedding = response
        .data
        .into_iter()
        .next()
        .map(|d| d.embedding)
        .ok_or_else(|| RagError::MalformedResponse {
            service: SERVICE,
            detail: "empty data array".to_string(),
        })?;

    if embedding.len() != expected_dimension {
        return Err(RagError::MalformedResponse {
            service: SERVICE,
            detail: format!(
                "expected {} dimensions, got {}",
                expected_dimension,
                embedding.len()
            ),
        });
    }

    Ok(embedding)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            input: text,
            model: &self.config.embedding_model,
        };

        self.config
            .retry
            .run(self.sleeper.as_ref(), "embedding request", || {
                self.request_once(&request)
            })
            .await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // 요청당 텍스트 하나 (배치 보장 없음)
        let mut results = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    fn name(&self) -> &str {
        &self.config.embedding_model
    }
}

// ============================================================================
// Tests
// ============================================================================
