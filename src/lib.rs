//! aurelius-rag - 최소 구성 RAG 파이프라인
//!
//! 텍스트 코퍼스를 문단 단위로 나눠 OpenAI 임베딩과 함께 SQLite에 저장하고,
//! IVF 인덱스로 검색한 패시지를 컨텍스트로 채팅 모델에 질문합니다.

pub mod cli;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod retry;

// Re-exports
pub use completion::{CompletionProvider, OpenAiCompletion};
pub use config::{default_db_path, get_data_dir, load_api_key, ApiConfig};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use error::{RagError, Result};
pub use knowledge::{
    Answer, Chunker, IngestReport, PreprocessorKind, PromptAssembler, RagPipeline,
    RetrievedPassage, Retriever, SqliteVectorStore, StoreStats, VectorStore,
};
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
