//! IVF (Inverted File) 인덱스 학습
//!
//! 코사인 거리 기반 k-means로 벡터 공간을 `lists`개 파티션으로 나눕니다.
//! 검색 시 쿼리와 가까운 파티션(`probes`개)만 스캔하는 IVF-flat 방식입니다.
//!
//! ref: https://github.com/pgvector/pgvector#ivfflat

use super::vector::cosine_distance;

/// k-means 최대 반복 횟수
pub const MAX_ITERATIONS: usize = 25;

/// 학습된 IVF 파티션
#[derive(Debug, Clone)]
pub struct IvfPartition {
    /// 리스트별 중심 벡터 (list_no = 인덱스)
    pub centroids: Vec<Vec<f32>>,
    /// 입력 벡터별 소속 리스트 (입력 순서)
    pub assignments: Vec<usize>,
    /// 실제 수행한 반복 횟수
    pub iterations: usize,
}

/// k-means 학습
///
/// 초기 중심은 입력에서 균등 간격으로 고르므로 같은 입력이면 결과도 같습니다.
/// `lists`는 벡터 수로 제한됩니다. 호출자가 빈 입력과 `lists == 0`을 걸러야 합니다.
pub fn train(vectors: &[Vec<f32>], lists: usize, max_iterations: usize) -> IvfPartition {
    if vectors.is_empty() || lists == 0 {
        return IvfPartition {
            centroids: vec![],
            assignments: vec![],
            iterations: 0,
        };
    }

    let k = lists.min(vectors.len());
    let dim = vectors[0].len();
    let step = vectors.len() / k;

    let mut centroids: Vec<Vec<f32>> = (0..k)
        .map(|i| vectors[(i * step).min(vectors.len() - 1)].clone())
        .collect();
    let mut assignments: Vec<usize> = vectors.iter().map(|v| nearest(v, &centroids)).collect();
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        // 중심 재계산 (빈 클러스터는 이전 중심 유지)
        let mut sums: Vec<Vec<f32>> = vec![vec![0.0; dim]; k];
        let mut counts: Vec<usize> = vec![0; k];

        for (vector, &list) in vectors.iter().zip(assignments.iter()) {
            counts[list] += 1;
            for (sum, value) in sums[list].iter_mut().zip(vector.iter()) {
                *sum += value;
            }
        }

        for (list, sum) in sums.into_iter().enumerate() {
            if counts[list] > 0 {
                let n = counts[list] as f32;
                centroids[list] = sum.into_iter().map(|v| v / n).collect();
            }
        }

        // 재할당
        let mut changed = false;
        for (vector, assignment) in vectors.iter().zip(assignments.iter_mut()) {
            let best = nearest(vector, &centroids);
            if *assignment != best {
                *assignment = best;
                changed = true;
            }
        }

        if !changed {
            break;
        }
    }

    IvfPartition {
        centroids,
        assignments,
        iterations,
    }
}

/// 가장 가까운 중심 (동률이면 낮은 list_no)
pub fn nearest(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    nearest_lists(vector, centroids, 1)
        .into_iter()
        .next()
        .unwrap_or(0)
}

/// 쿼리와 가까운 순서로 `probes`개 리스트 번호
pub fn nearest_lists(query: &[f32], centroids: &[Vec<f32>], probes: usize) -> Vec<usize> {
    let mut ranked: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(list, centroid)| (list, cosine_distance(query, centroid)))
        .collect();

    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(probes);
    ranked.into_iter().map(|(list, _)| list).collect()
}

// ============================================================================
// Tests
// ============================================================================
