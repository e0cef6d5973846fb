//! CLI 모듈
//!
//! aurelius-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{
    default_db_path, get_data_dir, ApiConfig, DEFAULT_SECRET_FILE, DEFAULT_TIMEOUT_SECS,
};
use crate::knowledge::{
    PreprocessorKind, RagPipeline, SqliteVectorStore, DEFAULT_LISTS, DEFAULT_PROBES,
    DEFAULT_TOP_K,
};
use crate::retry::{RetryPolicy, DEFAULT_INITIAL_BACKOFF_MS};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "aurelius-rag")]
#[command(version, about = "마르쿠스 아우렐리우스 페르소나 RAG 질의응답", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 텍스트 파일을 패시지로 나눠 저장하고 인덱스 빌드
    Ingest {
        /// 적재할 텍스트 파일
        #[arg(short = 't', long = "textfile")]
        textfile: PathBuf,

        /// IVF 리스트 수
        #[arg(short = 'n', long, default_value_t = DEFAULT_LISTS)]
        lists: usize,

        /// 임베딩 전 불용어 제거 + 표제어 변환
        #[arg(long)]
        preprocess: bool,

        /// 저장소 파일 경로
        #[arg(long)]
        db: Option<PathBuf>,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// 질문하고 답변 받기
    Query {
        /// 질문
        #[arg(short = 'u', long = "question")]
        question: String,

        /// 질문과 검색된 패시지 목록도 출력
        #[arg(short, long)]
        verbose: bool,

        /// 프롬프트에 넣을 최대 패시지 수
        #[arg(short = 'k', long = "top", default_value_t = DEFAULT_TOP_K)]
        top: usize,

        /// ANN 검색 시 탐색할 리스트 수
        #[arg(long, default_value_t = DEFAULT_PROBES)]
        probes: usize,

        /// 저장소 파일 경로
        #[arg(long)]
        db: Option<PathBuf>,

        #[command(flatten)]
        api: ApiArgs,
    },

    /// 상태 확인
    Status {
        /// 저장소 파일 경로
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// OpenAI 연결 옵션
#[derive(Args, Debug, Clone)]
pub struct ApiArgs {
    /// API 키 파일 (없으면 OPENAI_API_KEY 사용)
    #[arg(long, default_value = DEFAULT_SECRET_FILE)]
    pub secret_file: PathBuf,

    /// 요청당 타임아웃 (초)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// 429/5xx/타임아웃 시 최대 시도 횟수 (1이면 재시도 없음)
    #[arg(long, default_value_t = 1)]
    pub max_attempts: u32,

    /// API 베이스 URL (프록시 등)
    #[arg(long)]
    pub base_url: Option<String>,
}

impl ApiArgs {
    fn retry_policy(&self) -> RetryPolicy {
        if self.max_attempts <= 1 {
            RetryPolicy::fail_fast()
        } else {
            RetryPolicy::exponential(
                self.max_attempts,
                Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            )
        }
    }

    fn to_config(&self) -> Result<ApiConfig> {
        let mut config = ApiConfig::from_secret_file(&self.secret_file)
            .context("API 키 로드 실패")?
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_retry(self.retry_policy());

        if let Some(ref base_url) = self.base_url {
            config = config
                .with_base_url(base_url)
                .context("API 베이스 URL이 올바르지 않습니다")?;
        }

        Ok(config)
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            textfile,
            lists,
            preprocess,
            db,
            api,
        } => cmd_ingest(&textfile, lists, preprocess, &resolve_db(db), &api).await,
        Commands::Query {
            question,
            verbose,
            top,
            probes,
            db,
            api,
        } => cmd_query(&question, verbose, top, probes, &resolve_db(db), &api).await,
        Commands::Status { db } => cmd_status(&resolve_db(db)),
    }
}

fn resolve_db(db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(default_db_path)
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 적재 명령어 (ingest)
///
/// 텍스트 파일을 문단 단위로 나눠 임베딩과 함께 저장하고 IVF 인덱스를 빌드합니다.
async fn cmd_ingest(
    textfile: &Path,
    lists: usize,
    preprocess: bool,
    db_path: &Path,
    api: &ApiArgs,
) -> Result<()> {
    if lists == 0 {
        bail!("--lists는 1 이상이어야 합니다");
    }

    let config = api.to_config()?;
    let kind = if preprocess {
        PreprocessorKind::Lemmatize
    } else {
        PreprocessorKind::Identity
    };

    let pipeline = RagPipeline::open(&config, db_path)
        .context("저장소 초기화 실패")?
        .with_preprocessor(kind);

    println!("[*] 적재 중: {}", textfile.display());
    println!("    저장소: {}", db_path.display());
    println!("    전처리: {}", kind.as_str());

    let report = pipeline
        .ingest_file(textfile, lists)
        .await
        .with_context(|| format!("적재 실패: {}", textfile.display()))?;

    println!(
        "[OK] 패시지 {} 건 저장 완료",
        report.passage_ids.len()
    );
    println!(
        "     인덱스: {} 리스트, 전체 {} 패시지 (k-means {} 회)",
        report.index.lists, report.index.passages, report.index.iterations
    );

    Ok(())
}

/// 질의 명령어 (query)
///
/// stdout에는 답변(verbose 모드면 질문과 패시지 목록 포함)만 출력합니다.
async fn cmd_query(
    question: &str,
    verbose: bool,
    top: usize,
    probes: usize,
    db_path: &Path,
    api: &ApiArgs,
) -> Result<()> {
    if question.trim().is_empty() {
        bail!("질문이 비어 있습니다");
    }
    if !db_path.exists() {
        bail!(
            "저장소가 없습니다: {}\n먼저 `aurelius-rag ingest -t <파일>`을 실행하세요",
            db_path.display()
        );
    }

    let config = api.to_config()?;
    let pipeline = RagPipeline::open(&config, db_path)
        .context("저장소 열기 실패")?
        .with_probes(probes);

    let answer = pipeline
        .ask(question, top)
        .await
        .context("질의 실패")?;

    if answer.passages.is_empty() {
        tracing::warn!("No passages retrieved; answering without context");
    }

    println!("{}", answer.render(verbose));
    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status(db_path: &Path) -> Result<()> {
    println!("aurelius-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    println!("[*] 저장소: {}", db_path.display());

    if !db_path.exists() {
        println!("[!] 저장소가 아직 없습니다. `aurelius-rag ingest`로 생성하세요.");
        return Ok(());
    }

    if let Ok(meta) = std::fs::metadata(db_path) {
        println!("     파일 크기: {}", format_bytes(meta.len() as usize));
    }

    let store = match SqliteVectorStore::open_read_only(db_path) {
        Ok(store) => store,
        Err(e) => {
            println!("[!] 저장소 열기 실패: {}", e);
            return Ok(());
        }
    };

    let stats = store.stats().context("통계 조회 실패")?;
    println!("[OK] 저장된 패시지: {} 건", stats.passage_count);
    println!("     임베딩 차원: {}", stats.dimension);
    println!("     인덱스: {}", stats.index);
    if let Some(ref built_at) = stats.index_built_at {
        println!("     인덱스 빌드 시각: {}", built_at);
    }
    println!(
        "     전처리: {}",
        stats.preprocessor.as_deref().unwrap_or("-")
    );

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
