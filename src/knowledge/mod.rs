//! Knowledge 모듈 - 패시지 저장소와 검색 증강 생성 흐름
//!
//! - Chunker: 빈 줄 기준 문단 분할
//! - Preprocessor: 임베딩 전 정규화 (그대로 / 표제어)
//! - Store: SQLite 패시지 저장 + IVF-flat ANN 인덱스
//! - Retriever: 질문 임베딩 후 코사인 거리 순 검색
//! - Prompt: 페르소나 + 지시문 + 질문 + 컨텍스트 조립
//! - Pipeline: 적재/질의 흐름 통합

mod chunker;
mod ivf;
mod pipeline;
mod preprocess;
mod prompt;
mod retriever;
mod store;
mod vector;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use chunker::{default_chunker, ChunkConfig, Chunker, ParagraphChunker};
pub use pipeline::{Answer, IngestReport, RagPipeline, DEFAULT_LISTS, DEFAULT_TOP_K};
pub use preprocess::{
    preprocessor_for, IdentityPreprocessor, LemmatizingPreprocessor, Preprocessor,
    PreprocessorKind,
};
pub use prompt::{
    AssembledPrompt, ContextBudget, PromptAssembler, CONTEXT_DIRECTIVE, DEFAULT_INSTRUCTION,
    DEFAULT_MAX_PROMPT_TOKENS, DEFAULT_PERSONA, PASSAGE_PREFIX,
};
pub use retriever::Retriever;
pub use store::{SqliteVectorStore, StoreStats, DEFAULT_PROBES};
pub use vector::{
    cosine_distance, cosine_similarity, IndexBuildStats, IndexStatus, NewPassage, PassageId,
    RetrievedPassage, VectorStore,
};
