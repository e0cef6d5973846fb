//! 에러 타입
//!
//! 파이프라인의 각 단계(설정, 임베딩, 저장소, 인덱스, 완성)별 에러를 정의합니다.
//! 라이브러리는 `RagError`를 반환하고, CLI는 anyhow로 감싸 단계 정보를 덧붙입니다.

use thiserror::Error;

/// 라이브러리 공통 Result
pub type Result<T> = std::result::Result<T, RagError>;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 입력 파일/API 키 누락 또는 잘못된 설정
    #[error("configuration error: {0}")]
    Config(String),

    /// 임베딩 API 호출 실패 (전송 실패, 비정상 상태 코드)
    #[error("embedding service error: {message}")]
    EmbeddingService { message: String, retryable: bool },

    /// 채팅 완성 API 호출 실패
    #[error("completion service error: {message}")]
    CompletionService { message: String, retryable: bool },

    /// 저장소 제약 위반 또는 SQLite 에러
    #[error("storage error: {0}")]
    Storage(String),

    /// 인덱스 빌드 실패 (빈 저장소, lists = 0)
    #[error("index build error: {0}")]
    IndexBuild(String),

    /// API 응답이 예상 스키마와 다름
    #[error("malformed response from {service}: {detail}")]
    MalformedResponse {
        service: &'static str,
        detail: String,
    },
}

impl RagError {
    /// 재시도로 회복 가능한 에러인지 (429, 5xx, 전송 실패)
    pub fn is_retryable(&self) -> bool {
        match self {
            RagError::EmbeddingService { retryable, .. }
            | RagError::CompletionService { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// 실패한 단계 이름 (사용자 출력용)
    pub fn stage(&self) -> &'static str {
        match self {
            RagError::Config(_) => "config",
            RagError::EmbeddingService { .. } => "embedding",
            RagError::CompletionService { .. } => "completion",
            RagError::Storage(_) => "storage",
            RagError::IndexBuild(_) => "index",
            RagError::MalformedResponse { service, .. } => service,
        }
    }
}

impl From<rusqlite::Error> for RagError {
    fn from(e: rusqlite::Error) -> Self {
        RagError::Storage(e.to_string())
    }
}
