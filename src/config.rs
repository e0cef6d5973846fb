//! 설정 모듈 - API 자격 증명, 엔드포인트, 모델, 데이터 디렉토리
//!
//! API 키는 고정 경로의 평문 파일에서 한 번 읽어 `ApiConfig`에 담고,
//! 임베딩/완성 클라이언트 생성자에 명시적으로 전달합니다. 전역 상태는 없습니다.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, Secret};
use url::Url;

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// 기본 API 키 파일 이름 (작업 디렉토리 기준)
pub const DEFAULT_SECRET_FILE: &str = "secretkey.txt";

/// API 키 파일이 없을 때 사용하는 환경변수
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// 기본 API 엔드포인트
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// text-embedding-ada-002 벡터 차원
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// 기본 채팅 모델
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";

/// HTTP 요청 타임아웃 기본값
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.aurelius-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aurelius-rag")
}

/// 기본 저장소 파일 경로
pub fn default_db_path() -> PathBuf {
    get_data_dir().join("passages.db")
}

// ============================================================================
// API Key
// ============================================================================

/// API 키 로드
///
/// 우선순위:
/// 1. `path` 파일 내용 (앞뒤 공백 제거)
/// 2. 파일이 없으면 `OPENAI_API_KEY` 환경변수
pub fn load_api_key(path: &Path) -> Result<Secret<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let key = contents.trim();
            if key.is_empty() {
                return Err(RagError::Config(format!(
                    "API key file {} is empty",
                    path.display()
                )));
            }
            tracing::debug!("Using API key from {}", path.display());
            Ok(Secret::new(key.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            match std::env::var(API_KEY_ENV) {
                Ok(key) if !key.trim().is_empty() => {
                    tracing::debug!("Using API key from {}", API_KEY_ENV);
                    Ok(Secret::new(key.trim().to_string()))
                }
                _ => Err(RagError::Config(format!(
                    "API key not found. Put it in {} or set {}",
                    path.display(),
                    API_KEY_ENV
                ))),
            }
        }
        Err(e) => Err(RagError::Config(format!(
            "Failed to read API key file {}: {}",
            path.display(),
            e
        ))),
    }
}

// ============================================================================
// ApiConfig
// ============================================================================

/// 외부 API 설정
///
/// 한 번 생성해서 `OpenAiEmbedding`, `OpenAiCompletion`에 전달합니다.
/// `Debug` 출력에서 API 키는 가려집니다.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: Secret<String>,
    pub base_url: Url,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub completion_model: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ApiConfig {
    /// 기본값으로 생성
    pub fn new(api_key: Secret<String>) -> Result<Self> {
        Ok(Self {
            api_key,
            base_url: parse_base_url(DEFAULT_BASE_URL)?,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry: RetryPolicy::fail_fast(),
        })
    }

    /// 키 파일에서 로드하여 생성
    pub fn from_secret_file(path: &Path) -> Result<Self> {
        Self::new(load_api_key(path)?)
    }

    /// 엔드포인트 변경 (프록시, 테스트 서버 등)
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self> {
        self.base_url = parse_base_url(base_url)?;
        Ok(self)
    }

    /// 임베딩 모델과 차원 지정
    pub fn with_embedding_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.embedding_model = model.into();
        self.embedding_dimension = dimension;
        self
    }

    /// 채팅 모델 지정
    pub fn with_completion_model(mut self, model: impl Into<String>) -> Self {
        self.completion_model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `base_url` 기준 엔드포인트 URL
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| RagError::Config(format!("Invalid endpoint path {}: {}", path, e)))
    }

    /// Authorization 헤더 값
    pub(crate) fn bearer_token(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// 공용 HTTP 클라이언트 생성
    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| RagError::Config(format!("Invalid base URL {}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(RagError::Config(format!("Base URL {} cannot be a base", raw)));
    }

    // 마지막 경로 세그먼트가 join에서 사라지지 않도록 '/'로 끝나게 함
    let mut url = url;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
