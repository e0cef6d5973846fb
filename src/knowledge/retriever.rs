//! 검색기 - 질문 임베딩 후 벡터 저장소 검색
//!
//! 결과 순서: 코사인 거리 오름차순, 같은 거리면 삽입 순서.
//! 저장소가 동률 순서를 보장하지 않더라도 여기서 한 번 더 정렬합니다.

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::preprocess::Preprocessor;
use super::vector::{rank_results, RetrievedPassage, VectorStore};

/// 검색기 (읽기 전용)
pub struct Retriever<'a> {
    embedder: &'a dyn EmbeddingProvider,
    store: &'a dyn VectorStore,
    preprocessor: &'a dyn Preprocessor,
}

impl<'a> Retriever<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingProvider,
        store: &'a dyn VectorStore,
        preprocessor: &'a dyn Preprocessor,
    ) -> Self {
        Self {
            embedder,
            store,
            preprocessor,
        }
    }

    /// 상위 k개 패시지 검색
    ///
    /// # Arguments
    /// * `query` - 사용자 질문 (원문)
    /// * `k` - 최대 결과 수 (0이면 빈 결과)
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let normalized = self.preprocessor.normalize(query);
        let query_embedding = self.embedder.embed(&normalized).await?;

        if query_embedding.len() != self.store.dimension() {
            return Err(RagError::Storage(format!(
                "Query embedding has {} dimensions, store expects {}",
                query_embedding.len(),
                self.store.dimension()
            )));
        }

        let mut results = self.store.search(&query_embedding, k).await?;
        rank_results(&mut results, k);

        tracing::debug!(
            "Retrieved {} passages for query ({} requested)",
            results.len(),
            k
        );
        Ok(results)
    }
}

// ============================================================================
// Tests
// ============================================================================
