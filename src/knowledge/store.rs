//! Passage Store - rusqlite 기반 벡터 저장소 + IVF-flat 인덱스
//!
//! 패시지 원문과 임베딩(리틀 엔디언 f32 BLOB)을 저장하고,
//! 같은 DB 파일 안에 IVF 중심 벡터와 리스트 할당을 유지합니다.
//! 기본 저장 위치: ~/.aurelius-rag/passages.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use serde::Serialize;

use crate::error::{RagError, Result};

use super::ivf;
use super::vector::{
    cosine_distance, rank_results, IndexBuildStats, IndexStatus, NewPassage, PassageId,
    RetrievedPassage, VectorStore,
};

/// ANN 검색 시 기본 탐색 리스트 수 (pgvector ivfflat.probes 기본값)
pub const DEFAULT_PROBES: usize = 1;

const META_DIMENSION: &str = "dimension";
const META_INDEX_LISTS: &str = "index_lists";
const META_INDEX_BUILT_AT: &str = "index_built_at";
const META_INDEX_VALID: &str = "index_valid";
const META_PREPROCESSOR: &str = "preprocessor";

// ============================================================================
// Types
// ============================================================================

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub passage_count: usize,
    pub dimension: usize,
    pub index: IndexStatus,
    pub index_built_at: Option<String>,
    pub preprocessor: Option<String>,
    pub db_path: PathBuf,
}

/// DB에서 읽은 패시지 행
struct StoredPassage {
    id: PassageId,
    raw_text: String,
    embedding: Vec<f32>,
}

// ============================================================================
// SqliteVectorStore
// ============================================================================

/// SQLite 벡터 저장소
///
/// 모든 메서드는 내부적으로 동기 호출이며, 잠금을 `.await` 너머로 들고 있지 않습니다.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
    dimension: usize,
    probes: usize,
}

impl SqliteVectorStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로
    /// * `dimension` - 임베딩 차원. 기존 저장소와 다르면 에러
    pub fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RagError::Storage(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::from_connection(conn, path.to_path_buf(), dimension)
    }

    /// 기존 저장소를 읽기 전용으로 열기 (상태 조회용)
    ///
    /// 파일을 만들거나 스키마/메타데이터를 쓰지 않습니다. 차원은 저장된 값을 사용합니다.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let stored = get_meta(&conn, META_DIMENSION)?.ok_or_else(|| {
            RagError::Storage(format!("{} has no recorded dimension", path.display()))
        })?;
        let dimension: usize = stored
            .parse()
            .map_err(|_| RagError::Storage(format!("Invalid stored dimension: {}", stored)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
            dimension,
            probes: DEFAULT_PROBES,
        })
    }

    /// 메모리 DB로 열기 (테스트, 일회성 실행)
    pub fn open_in_memory(dimension: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"), dimension)
    }

    fn from_connection(conn: Connection, db_path: PathBuf, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::Storage(
                "Embedding dimension must be positive".to_string(),
            ));
        }

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
            dimension,
            probes: DEFAULT_PROBES,
        };

        store.initialize()?;
        Ok(store)
    }

    /// ANN 검색 시 탐색할 리스트 수
    pub fn with_probes(mut self, probes: usize) -> Self {
        self.probes = probes.max(1);
        self
    }

    pub fn probes(&self) -> usize {
        self.probes
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::Storage(format!("Lock error: {}", e)))
    }

    /// 스키마 초기화 및 차원 확인
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS passages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                raw_text TEXT NOT NULL CHECK (length(trim(raw_text)) > 0),
                embedding BLOB NOT NULL,
                list_no INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_passages_list_no ON passages(list_no);

            CREATE TABLE IF NOT EXISTS ivf_centroids (
                list_no INTEGER PRIMARY KEY,
                centroid BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        match get_meta(&conn, META_DIMENSION)? {
            Some(stored) => {
                let stored: usize = stored.parse().map_err(|_| {
                    RagError::Storage(format!("Invalid stored dimension: {}", stored))
                })?;
                if stored != self.dimension {
                    return Err(RagError::Storage(format!(
                        "Store at {} was created with dimension {}, got {}",
                        self.db_path.display(),
                        stored,
                        self.dimension
                    )));
                }
            }
            None => set_meta(&conn, META_DIMENSION, &self.dimension.to_string())?,
        }

        tracing::debug!(
            "Passage store initialized at {:?} (dimension={})",
            self.db_path,
            self.dimension
        );
        Ok(())
    }

    /// 임베딩 차원/값 검증
    fn validate_embedding(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(RagError::Storage(format!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            )));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Storage(
                "Embedding contains non-finite values".to_string(),
            ));
        }
        Ok(())
    }

    /// 단일 행 삽입 (트랜잭션 내부)
    fn insert_row(tx: &Transaction<'_>, raw_text: &str, embedding: &[f32]) -> Result<PassageId> {
        tx.execute(
            "INSERT INTO passages (raw_text, embedding, list_no, created_at)
             VALUES (?1, ?2, NULL, ?3)",
            params![raw_text, encode_embedding(embedding), Utc::now().to_rfc3339()],
        )?;
        Ok(PassageId(tx.last_insert_rowid()))
    }

    /// 인덱스가 있으면 stale 표시
    fn mark_index_stale(tx: &Transaction<'_>) -> Result<()> {
        if get_meta(tx, META_INDEX_LISTS)?.is_some() {
            set_meta(tx, META_INDEX_VALID, "0")?;
        }
        Ok(())
    }

    fn insert_entries(&self, entries: &[(&str, &[f32])]) -> Result<Vec<PassageId>> {
        for (_, embedding) in entries {
            self.validate_embedding(embedding)?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut ids = Vec::with_capacity(entries.len());
        for (raw_text, embedding) in entries {
            ids.push(Self::insert_row(&tx, raw_text, embedding)?);
        }
        if !ids.is_empty() {
            Self::mark_index_stale(&tx)?;
        }

        tx.commit()?;
        Ok(ids)
    }

    /// IVF 인덱스 빌드
    fn build_index_blocking(&self, lists: usize) -> Result<IndexBuildStats> {
        if lists == 0 {
            return Err(RagError::IndexBuild(
                "lists must be a positive number".to_string(),
            ));
        }

        let mut conn = self.lock()?;
        let rows = load_passages(
            &conn,
            "SELECT id, raw_text, embedding FROM passages ORDER BY id",
            [],
            self.dimension,
        )?;

        if rows.is_empty() {
            return Err(RagError::IndexBuild(
                "cannot build an index over an empty store".to_string(),
            ));
        }

        let vectors: Vec<Vec<f32>> = rows.iter().map(|r| r.embedding.clone()).collect();
        let partition = ivf::train(&vectors, lists, ivf::MAX_ITERATIONS);

        let tx = conn.transaction()?;
        tx.execute("DELETE FROM ivf_centroids", [])?;
        {
            let mut insert_centroid =
                tx.prepare("INSERT INTO ivf_centroids (list_no, centroid) VALUES (?1, ?2)")?;
            for (list_no, centroid) in partition.centroids.iter().enumerate() {
                insert_centroid.execute(params![list_no as i64, encode_embedding(centroid)])?;
            }

            let mut assign = tx.prepare("UPDATE passages SET list_no = ?1 WHERE id = ?2")?;
            for (row, list_no) in rows.iter().zip(partition.assignments.iter()) {
                assign.execute(params![*list_no as i64, row.id.0])?;
            }
        }
        set_meta(&tx, META_INDEX_LISTS, &partition.centroids.len().to_string())?;
        set_meta(&tx, META_INDEX_BUILT_AT, &Utc::now().to_rfc3339())?;
        set_meta(&tx, META_INDEX_VALID, "1")?;
        tx.commit()?;

        if partition.centroids.len() < lists {
            tracing::warn!(
                "Requested {} lists but only {} passages are stored; using {} lists",
                lists,
                rows.len(),
                partition.centroids.len()
            );
        }
        tracing::info!(
            "Built IVF index: {} lists over {} passages ({} k-means iterations)",
            partition.centroids.len(),
            rows.len(),
            partition.iterations
        );

        Ok(IndexBuildStats {
            lists: partition.centroids.len(),
            passages: rows.len(),
            iterations: partition.iterations,
        })
    }

    fn index_status_locked(conn: &Connection) -> Result<IndexStatus> {
        let lists = match get_meta(conn, META_INDEX_LISTS)? {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| RagError::Storage(format!("Invalid index_lists: {}", value)))?,
            None => return Ok(IndexStatus::Missing),
        };

        let valid = get_meta(conn, META_INDEX_VALID)?.as_deref() == Some("1");
        let unindexed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM passages WHERE list_no IS NULL",
            [],
            |row| row.get(0),
        )?;

        if valid && unindexed == 0 {
            Ok(IndexStatus::Fresh { lists })
        } else {
            Ok(IndexStatus::Stale {
                lists,
                unindexed: unindexed as usize,
            })
        }
    }

    fn search_blocking(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Ok(vec![]);
        }
        if query.len() != self.dimension {
            return Err(RagError::Storage(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }

        let conn = self.lock()?;
        let candidates = match Self::index_status_locked(&conn)? {
            IndexStatus::Fresh { lists } => {
                let centroids = load_centroids(&conn, self.dimension)?;
                let probes = self.probes.min(lists);
                let mut candidates = Vec::new();
                let mut probed = 0;

                // 후보가 k개 미만이면 다음으로 가까운 리스트까지 확장
                for list_no in ivf::nearest_lists(query, &centroids, centroids.len()) {
                    if probed >= probes && candidates.len() >= k {
                        break;
                    }
                    candidates.extend(load_passages(
                        &conn,
                        "SELECT id, raw_text, embedding FROM passages WHERE list_no = ?1",
                        params![list_no as i64],
                        self.dimension,
                    )?);
                    probed += 1;
                }
                tracing::debug!(
                    "ANN search: {} of {} lists probed ({} requested), {} candidates",
                    probed,
                    lists,
                    probes,
                    candidates.len()
                );
                candidates
            }
            status => {
                if let IndexStatus::Stale { unindexed, .. } = status {
                    tracing::warn!(
                        "Index is stale ({} passages inserted after build); using linear scan",
                        unindexed
                    );
                }
                load_passages(
                    &conn,
                    "SELECT id, raw_text, embedding FROM passages",
                    [],
                    self.dimension,
                )?
            }
        };
        drop(conn);

        let mut results: Vec<RetrievedPassage> = candidates
            .into_iter()
            .map(|p| RetrievedPassage {
                distance: cosine_distance(query, &p.embedding),
                id: p.id,
                raw_text: p.raw_text,
            })
            .collect();

        rank_results(&mut results, k);
        Ok(results)
    }

    fn count_blocking(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 적재 시 사용한 전처리기 기록
    pub fn set_preprocessor(&self, name: &str) -> Result<()> {
        let conn = self.lock()?;
        set_meta(&conn, META_PREPROCESSOR, name)
    }

    /// 적재 시 사용한 전처리기 (기록이 없으면 None)
    pub fn preprocessor(&self) -> Result<Option<String>> {
        let conn = self.lock()?;
        get_meta(&conn, META_PREPROCESSOR)
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;

        Ok(StoreStats {
            passage_count: count as usize,
            dimension: self.dimension,
            index: Self::index_status_locked(&conn)?,
            index_built_at: get_meta(&conn, META_INDEX_BUILT_AT)?,
            preprocessor: get_meta(&conn, META_PREPROCESSOR)?,
            db_path: self.db_path.clone(),
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, raw_text: &str, embedding: &[f32]) -> Result<PassageId> {
        let ids = self.insert_entries(&[(raw_text, embedding)])?;
        ids.into_iter()
            .next()
            .ok_or_else(|| RagError::Storage("Insert returned no id".to_string()))
    }

    async fn insert_batch(&self, entries: &[NewPassage]) -> Result<Vec<PassageId>> {
        let rows: Vec<(&str, &[f32])> = entries
            .iter()
            .map(|e| (e.raw_text.as_str(), e.embedding.as_slice()))
            .collect();
        self.insert_entries(&rows)
    }

    async fn build_index(&self, lists: usize) -> Result<IndexBuildStats> {
        self.build_index_blocking(lists)
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<RetrievedPassage>> {
        self.search_blocking(query_embedding, k)
    }

    async fn count(&self) -> Result<usize> {
        self.count_blocking()
    }

    async fn index_status(&self) -> Result<IndexStatus> {
        let conn = self.lock()?;
        Self::index_status_locked(&conn)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn load_passages<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    dimension: usize,
) -> Result<Vec<StoredPassage>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Vec<u8>>(2)?,
        ))
    })?;

    let mut passages = Vec::new();
    for row in rows {
        let (id, raw_text, blob) = row?;
        passages.push(StoredPassage {
            id: PassageId(id),
            raw_text,
            embedding: decode_embedding(&blob, dimension)?,
        });
    }
    Ok(passages)
}

fn load_centroids(conn: &Connection, dimension: usize) -> Result<Vec<Vec<f32>>> {
    let mut stmt = conn.prepare("SELECT centroid FROM ivf_centroids ORDER BY list_no")?;
    let blobs = stmt
        .query_map([], |row| row.get::<_, Vec<u8>>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    blobs
        .iter()
        .map(|blob| decode_embedding(blob, dimension))
        .collect()
}

/// f32 벡터 → 리틀 엔디언 바이트
fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// 리틀 엔디언 바이트 → f32 벡터 (길이 검증)
fn decode_embedding(blob: &[u8], dimension: usize) -> Result<Vec<f32>> {
    let expected_len = dimension * std::mem::size_of::<f32>();
    if blob.len() != expected_len {
        return Err(RagError::Storage(format!(
            "Invalid embedding byte length: expected {}, got {}",
            expected_len,
            blob.len()
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
