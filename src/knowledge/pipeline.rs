//! RAG 파이프라인 - 적재와 질의 흐름 통합
//!
//! 적재: 원문 → 청킹 → 전처리 → 임베딩 → 저장 → IVF 인덱스 빌드
//! 질의: 질문 → 전처리 → 임베딩 → 검색 → 프롬프트 조립 → 채팅 완성
//!
//! 적재는 실행 단위로 전부 성공 또는 전부 실패입니다.
//! 모든 임베딩을 먼저 계산한 뒤 한 트랜잭션으로 저장합니다.

use std::fmt::Write as _;
use std::path::Path;

use serde::Serialize;

use crate::completion::{CompletionProvider, OpenAiCompletion};
use crate::config::ApiConfig;
use crate::embedding::{EmbeddingProvider, OpenAiEmbedding};
use crate::error::{RagError, Result};

use super::chunker::{default_chunker, Chunker};
use super::preprocess::{preprocessor_for, Preprocessor, PreprocessorKind};
use super::prompt::{PromptAssembler, DEFAULT_INSTRUCTION, DEFAULT_PERSONA, PASSAGE_PREFIX};
use super::retriever::Retriever;
use super::store::{SqliteVectorStore, StoreStats};
use super::vector::{IndexBuildStats, NewPassage, PassageId, RetrievedPassage, VectorStore};

/// 기본 IVF 리스트 수
pub const DEFAULT_LISTS: usize = 100;

/// 기본 검색 결과 수
pub const DEFAULT_TOP_K: usize = 10;

// ============================================================================
// Types
// ============================================================================

/// 적재 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// 이번 실행에서 저장한 패시지 ID (청크 순서)
    pub passage_ids: Vec<PassageId>,
    /// 적재 후 인덱스 빌드 결과
    pub index: IndexBuildStats,
}

/// 질의 응답
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    /// 검색된 패시지 (순위 순)
    pub passages: Vec<RetrievedPassage>,
    /// 모델 답변
    pub text: String,
}

impl Answer {
    /// 출력용 문자열
    ///
    /// verbose 모드는 질문과 검색된 패시지 목록을 답변 앞에 붙입니다.
    pub fn render(&self, verbose: bool) -> String {
        if !verbose {
            return self.text.clone();
        }

        let mut out = format!("question : {}\ndblist :\n", self.question);
        for passage in &self.passages {
            let _ = writeln!(out, "{}{}", PASSAGE_PREFIX, passage.raw_text);
        }
        out.push_str(&self.text);
        out
    }
}

// ============================================================================
// RagPipeline
// ============================================================================

/// RAG 파이프라인
///
/// 저장소, 임베딩/완성 클라이언트, 청커, 전처리기, 프롬프트 조립기를 소유합니다.
pub struct RagPipeline {
    store: SqliteVectorStore,
    embedder: Box<dyn EmbeddingProvider>,
    completer: Box<dyn CompletionProvider>,
    chunker: Box<dyn Chunker>,
    preprocessor: Box<dyn Preprocessor>,
    assembler: PromptAssembler,
    persona: String,
    instruction: String,
}

impl RagPipeline {
    /// 구성 요소로 생성 (기본 청커, 전처리 없음, 기본 페르소나)
    pub fn new(
        store: SqliteVectorStore,
        embedder: Box<dyn EmbeddingProvider>,
        completer: Box<dyn CompletionProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            completer,
            chunker: default_chunker(),
            preprocessor: preprocessor_for(PreprocessorKind::default()),
            assembler: PromptAssembler::default(),
            persona: DEFAULT_PERSONA.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }

    /// OpenAI 클라이언트와 DB 파일로 생성
    ///
    /// 저장소에 적재 시 전처리기가 기록되어 있으면 그것을 사용합니다.
    pub fn open(config: &ApiConfig, db_path: &Path) -> Result<Self> {
        let store = SqliteVectorStore::open(db_path, config.embedding_dimension)?;
        let embedder = OpenAiEmbedding::new(config)?;
        let completer = OpenAiCompletion::new(config)?;

        Self::from_store(store, Box::new(embedder), Box::new(completer))
    }

    /// 기존 저장소로 생성 (기록된 전처리기 사용)
    pub fn from_store(
        store: SqliteVectorStore,
        embedder: Box<dyn EmbeddingProvider>,
        completer: Box<dyn CompletionProvider>,
    ) -> Result<Self> {
        let kind: PreprocessorKind = match store.preprocessor()? {
            Some(name) => name.parse().map_err(RagError::Config)?,
            None => PreprocessorKind::default(),
        };

        tracing::debug!(
            "Opened pipeline: db={}, embedder={}, completer={}, preprocessor={}",
            store.db_path().display(),
            embedder.name(),
            completer.name(),
            kind.as_str()
        );

        Ok(Self::new(store, embedder, completer).with_preprocessor(kind))
    }

    pub fn with_preprocessor(mut self, kind: PreprocessorKind) -> Self {
        self.preprocessor = preprocessor_for(kind);
        self
    }

    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_assembler(mut self, assembler: PromptAssembler) -> Self {
        self.assembler = assembler;
        self
    }

    /// 페르소나와 지시문 교체
    pub fn with_persona(mut self, persona: impl Into<String>, instruction: impl Into<String>) -> Self {
        self.persona = persona.into();
        self.instruction = instruction.into();
        self
    }

    /// ANN 검색 시 탐색할 리스트 수
    pub fn with_probes(mut self, probes: usize) -> Self {
        self.store = self.store.with_probes(probes);
        self
    }

    /// 텍스트 적재 후 인덱스 (재)빌드
    ///
    /// # Arguments
    /// * `text` - 원문 전체
    /// * `lists` - IVF 리스트 수 (패시지 수로 제한됨)
    pub async fn ingest_text(&self, text: &str, lists: usize) -> Result<IngestReport> {
        self.check_preprocessor().await?;

        // 1. 청킹
        let chunks = self.chunker.chunk(text);
        if chunks.is_empty() {
            tracing::warn!("No passages found in input text");
        }

        // 2. 전처리 + 임베딩 (저장 전 전부 계산)
        let normalized: Vec<String> = chunks
            .iter()
            .map(|chunk| self.preprocessor.normalize(chunk))
            .collect();
        let embeddings = self.embedder.embed_batch(&normalized).await?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::MalformedResponse {
                service: "embedding",
                detail: format!(
                    "expected {} vectors, got {}",
                    chunks.len(),
                    embeddings.len()
                ),
            });
        }

        // 3. 단일 트랜잭션 저장
        let entries: Vec<NewPassage> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(raw_text, embedding)| NewPassage {
                raw_text,
                embedding,
            })
            .collect();
        let passage_ids = self.store.insert_batch(&entries).await?;
        self.store.set_preprocessor(self.preprocessor.name())?;

        // 4. 인덱스 빌드
        let index = self.store.build_index(lists).await?;

        tracing::info!(
            "Ingested {} passages (index: {} lists over {} passages)",
            passage_ids.len(),
            index.lists,
            index.passages
        );

        Ok(IngestReport { passage_ids, index })
    }

    /// 텍스트 파일 적재
    pub async fn ingest_file(&self, path: &Path, lists: usize) -> Result<IngestReport> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        tracing::info!("Read {} ({} bytes)", path.display(), text.len());
        self.ingest_text(&text, lists).await
    }

    /// 질문에 답변
    ///
    /// # Arguments
    /// * `question` - 사용자 질문
    /// * `k` - 프롬프트에 넣을 최대 패시지 수
    pub async fn ask(&self, question: &str, k: usize) -> Result<Answer> {
        let retriever = Retriever::new(
            self.embedder.as_ref(),
            &self.store,
            self.preprocessor.as_ref(),
        );
        let passages = retriever.search(question, k).await?;

        let prompt =
            self.assembler
                .assemble(&self.persona, &self.instruction, question, &passages);
        tracing::debug!("Prompt assembled ({} chars)", prompt.chars().count());

        let text = self.completer.complete(&prompt).await?;

        Ok(Answer {
            question: question.to_string(),
            passages,
            text,
        })
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }

    /// 현재 전처리기 이름
    pub fn preprocessor_name(&self) -> &'static str {
        self.preprocessor.name()
    }

    /// 내부 저장소 접근
    pub fn store(&self) -> &SqliteVectorStore {
        &self.store
    }

    /// 기존 패시지와 다른 전처리기로 적재하면 에러
    async fn check_preprocessor(&self) -> Result<()> {
        if self.store.count().await? == 0 {
            return Ok(());
        }

        match self.store.preprocessor()? {
            Some(recorded) if recorded != self.preprocessor.name() => {
                Err(RagError::Config(format!(
                    "Store was ingested with preprocessor '{}', refusing to mix with '{}'",
                    recorded,
                    self.preprocessor.name()
                )))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use secrecy::Secret;
    use tempfile::TempDir;

    use super::*;
    use crate::knowledge::prompt::CONTEXT_DIRECTIVE;
    use crate::knowledge::testing::{KeywordEmbedder, RecordingCompleter};
    use crate::config::DEFAULT_EMBEDDING_DIMENSION;
    use crate::knowledge::vector::IndexStatus;

    const ROME_TEXT: &str = "Rome was founded\nin 753 BC.\n\nXII\n\nThe Senate governed Rome.\n";

    fn pipeline_with(embedder: KeywordEmbedder, completer: RecordingCompleter) -> RagPipeline {
        let store = SqliteVectorStore::open_in_memory(embedder.dimension()).unwrap();
        RagPipeline::new(store, Box::new(embedder), Box::new(completer))
    }

    fn rome_pipeline() -> (RagPipeline, RecordingCompleter) {
        let completer = RecordingCompleter::new("Romulus, by the will of the gods.");
        (pipeline_with(KeywordEmbedder::rome(), completer.clone()), completer)
    }

    #[tokio::test]
    async fn test_ingest_builds_index_over_passages() {
        let (pipeline, _) = rome_pipeline();

        let report = pipeline.ingest_text(ROME_TEXT, DEFAULT_LISTS).await.unwrap();
        assert_eq!(report.passage_ids.len(), 2);
        assert_eq!(report.index.lists, 2);

        let stats = pipeline.stats().unwrap();
        assert_eq!(stats.passage_count, 2);
        assert_eq!(stats.index, IndexStatus::Fresh { lists: 2 });
        assert_eq!(stats.preprocessor.as_deref(), Some("identity"));
    }

    #[tokio::test]
    async fn test_ask_rome_scenario() {
        let (pipeline, completer) = rome_pipeline();
        pipeline.ingest_text(ROME_TEXT, DEFAULT_LISTS).await.unwrap();

        let answer = pipeline.ask("Who founded Rome?", 1).await.unwrap();
        assert_eq!(answer.passages.len(), 1);
        assert_eq!(answer.passages[0].raw_text, "Rome was founded in 753 BC.");
        assert_eq!(answer.text, "Romulus, by the will of the gods.");

        let prompts = completer.prompts();
        assert_eq!(prompts.len(), 1);
        let prompt = &prompts[0];
        assert!(prompt.starts_with(DEFAULT_PERSONA));
        assert!(prompt.contains(CONTEXT_DIRECTIVE));
        assert!(prompt.lines().any(|l| l == "- Rome was founded in 753 BC."));
    }

    #[tokio::test]
    async fn test_default_lists_query_returns_min_k_and_corpus() {
        let (pipeline, _) = rome_pipeline();
        let text = "Rome was founded in 753 BC.\n\n\
                    The Senate governed Rome.\n\n\
                    Rome, rome and the senate.\n\n\
                    Founded again in 753.\n\n\
                    The senate governed the senate.\n\n\
                    753 years of Rome governed.";

        let report = pipeline.ingest_text(text, DEFAULT_LISTS).await.unwrap();
        assert_eq!(report.passage_ids.len(), 6);
        assert_eq!(report.index.lists, 6);

        let all = pipeline.ask("Who founded Rome?", 100).await.unwrap();
        assert_eq!(all.passages.len(), 6);
        assert_eq!(all.passages[0].raw_text, "Rome was founded in 753 BC.");

        let top = pipeline.ask("Who founded Rome?", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(top.passages.len(), 6);
        assert_eq!(top.passages, all.passages);

        let three = pipeline.ask("Who founded Rome?", 3).await.unwrap();
        assert_eq!(three.passages[..], all.passages[..3]);
    }

    #[tokio::test]
    async fn test_query_uses_preprocessor_recorded_at_ingest() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("lemma.db");
        let embedder = KeywordEmbedder::new(&["rome", "found", "senate", "govern", "753"]);
        let completer = RecordingCompleter::new("Romulus.");

        {
            let store = SqliteVectorStore::open(&db_path, embedder.dimension()).unwrap();
            let ingest = RagPipeline::new(
                store,
                Box::new(embedder.clone()),
                Box::new(completer.clone()),
            )
            .with_preprocessor(PreprocessorKind::Lemmatize);
            ingest.ingest_text(ROME_TEXT, DEFAULT_LISTS).await.unwrap();
        }
        assert_eq!(
            embedder.inputs(),
            vec!["rome found 753 bc", "senate govern rome"]
        );

        // 기본 전처리기(identity)로 만들어도 저장소 기록을 따름
        let store = SqliteVectorStore::open(&db_path, embedder.dimension()).unwrap();
        let query = RagPipeline::from_store(
            store,
            Box::new(embedder.clone()),
            Box::new(completer.clone()),
        )
        .unwrap();
        assert_eq!(query.preprocessor_name(), "lemmatize");

        let answer = query.ask("Who founded Rome?", 1).await.unwrap();
        let inputs = embedder.inputs();
        assert_eq!(inputs.last().map(String::as_str), Some("found rome"));
        assert_eq!(answer.passages[0].raw_text, "Rome was founded in 753 BC.");
    }

    #[test]
    fn test_open_reads_recorded_preprocessor() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("passages.db");
        {
            let store = SqliteVectorStore::open(&db_path, DEFAULT_EMBEDDING_DIMENSION).unwrap();
            store.set_preprocessor("lemmatize").unwrap();
        }

        let config = ApiConfig::new(Secret::new("sk-test".to_string())).unwrap();
        let pipeline = RagPipeline::open(&config, &db_path).unwrap();
        assert_eq!(pipeline.preprocessor_name(), "lemmatize");

        let fresh = RagPipeline::open(&config, &dir.path().join("fresh.db")).unwrap();
        assert_eq!(fresh.preprocessor_name(), "identity");
    }

    #[tokio::test]
    async fn test_malformed_embedding_inserts_nothing() {
        let completer = RecordingCompleter::new("unused");
        let pipeline = pipeline_with(KeywordEmbedder::rome().failing_on("Senate"), completer);

        let err = pipeline.ingest_text(ROME_TEXT, DEFAULT_LISTS).await.unwrap_err();
        assert!(matches!(err, RagError::MalformedResponse { .. }));
        assert_eq!(pipeline.store().count().await.unwrap(), 0);
        assert_eq!(pipeline.stats().unwrap().index, IndexStatus::Missing);
    }

    #[tokio::test]
    async fn test_empty_text_fails_index_build() {
        let (pipeline, _) = rome_pipeline();
        let err = pipeline.ingest_text("\n\n  \n", DEFAULT_LISTS).await.unwrap_err();
        assert!(matches!(err, RagError::IndexBuild(_)));
    }

    #[tokio::test]
    async fn test_refuses_mixed_preprocessors() {
        let (pipeline, _) = rome_pipeline();
        pipeline.ingest_text(ROME_TEXT, DEFAULT_LISTS).await.unwrap();

        let pipeline = pipeline.with_preprocessor(PreprocessorKind::Lemmatize);
        let err = pipeline
            .ingest_text("Marcus Aurelius wrote the Meditations.", DEFAULT_LISTS)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
        assert_eq!(pipeline.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_file_missing_is_config_error() {
        let (pipeline, _) = rome_pipeline();
        let err = pipeline
            .ingest_file(Path::new("/nonexistent/meditations.txt"), DEFAULT_LISTS)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn test_ingest_file_reads_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rome.txt");
        std::fs::write(&path, ROME_TEXT).unwrap();

        let (pipeline, _) = rome_pipeline();
        let report = pipeline.ingest_file(&path, 1).await.unwrap();
        assert_eq!(report.passage_ids.len(), 2);
        assert_eq!(report.index.lists, 1);
    }

    #[test]
    fn test_answer_render() {
        let answer = Answer {
            question: "Who founded Rome?".to_string(),
            passages: vec![RetrievedPassage {
                id: PassageId(1),
                raw_text: "Rome was founded in 753 BC.".to_string(),
                distance: 0.18,
            }],
            text: "Romulus.".to_string(),
        };

        assert_eq!(answer.render(false), "Romulus.");
        assert_eq!(
            answer.render(true),
            "question : Who founded Rome?\ndblist :\n- Rome was founded in 753 BC.\nRomulus."
        );
    }
}
