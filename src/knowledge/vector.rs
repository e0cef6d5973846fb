//! Vector Store - 벡터 저장소 트레이트 및 거리 유틸리티
//!
//! 패시지 저장, ANN 인덱스 수명 주기, 코사인 거리 기반 검색의 공통 인터페이스입니다.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 저장소가 부여하는 패시지 ID (삽입 순서대로 증가)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PassageId(pub i64);

impl fmt::Display for PassageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 삽입할 패시지
#[derive(Debug, Clone)]
pub struct NewPassage {
    /// 원문 텍스트 (전처리 전)
    pub raw_text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과 한 건
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedPassage {
    pub id: PassageId,
    pub raw_text: String,
    /// 코사인 거리 (0.0 ~ 2.0, 작을수록 유사)
    pub distance: f32,
}

/// ANN 인덱스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexStatus {
    /// 인덱스 없음 (선형 스캔)
    Missing,
    /// 모든 패시지를 포함하는 인덱스
    Fresh { lists: usize },
    /// 빌드 이후 삽입된 패시지가 있음 (재빌드 전까지 선형 스캔)
    Stale { lists: usize, unindexed: usize },
}

impl IndexStatus {
    pub fn is_fresh(&self) -> bool {
        matches!(self, IndexStatus::Fresh { .. })
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexStatus::Missing => write!(f, "none (linear scan)"),
            IndexStatus::Fresh { lists } => write!(f, "ivfflat, {} lists", lists),
            IndexStatus::Stale { lists, unindexed } => write!(
                f,
                "ivfflat, {} lists, stale ({} unindexed passages)",
                lists, unindexed
            ),
        }
    }
}

/// 인덱스 빌드 결과
#[derive(Debug, Clone, Serialize)]
pub struct IndexBuildStats {
    /// 실제 생성된 리스트 수 (요청값과 패시지 수 중 작은 값)
    pub lists: usize,
    pub passages: usize,
    /// k-means 반복 횟수
    pub iterations: usize,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 인덱스는 대량 삽입 후 한 번 빌드합니다. 빌드 이후의 삽입은 인덱스를 stale로 만들고,
/// stale 또는 인덱스 없음 상태의 검색은 전체 선형 스캔으로 처리됩니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 패시지 삽입
    async fn insert(&self, raw_text: &str, embedding: &[f32]) -> Result<PassageId>;

    /// 패시지 배치 삽입 (단일 트랜잭션, 전부 성공 또는 전부 실패)
    async fn insert_batch(&self, entries: &[NewPassage]) -> Result<Vec<PassageId>>;

    /// IVF 인덱스 (재)빌드
    async fn build_index(&self, lists: usize) -> Result<IndexBuildStats>;

    /// 코사인 거리 오름차순 검색 (동률은 삽입 순서)
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<RetrievedPassage>>;

    /// 패시지 개수
    async fn count(&self) -> Result<usize>;

    /// 인덱스 상태
    async fn index_status(&self) -> Result<IndexStatus>;

    /// 임베딩 차원
    fn dimension(&self) -> usize;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위이며, 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 코사인 거리 (1 - 코사인 유사도)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// 검색 결과 정렬 순서: 거리 오름차순, 동률이면 ID(삽입 순서) 오름차순
pub fn compare_ranked(a: &RetrievedPassage, b: &RetrievedPassage) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.id.cmp(&b.id))
}

/// 결과를 안정 정렬 순서로 정렬하고 k개로 자름
pub fn rank_results(results: &mut Vec<RetrievedPassage>, k: usize) {
    results.sort_by(compare_ranked);
    results.truncate(k);
}

// ============================================================================
// Tests
// ============================================================================
