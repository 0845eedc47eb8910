//! SQLite Vector Store - rusqlite 기반 정확(exact) 벡터 저장소
//!
//! 레코드(청크 텍스트, 임베딩, 메타데이터)를 SQLite 파일에 저장하고
//! 검색 시 전체 코사인 스캔으로 top-k를 계산합니다.
//! 저장 위치 기본값: <data_dir>/chunks.db

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

use super::vector::{
    cosine_similarity, rank_candidates, Metadata, SearchResult, VectorRecord, VectorStore,
};

// ============================================================================
// Types
// ============================================================================

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub total_text_bytes: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// SqliteVectorStore
// ============================================================================

/// SQLite 벡터 저장소
///
/// 삽입은 트랜잭션 단위로 커밋되며, 검색 동점은 rowid(삽입 순서)로 정렬합니다.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteVectorStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로
    pub fn open(path: &Path) -> Result<Self> {
        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create chunks table")?;

        tracing::debug!("Vector store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .context("Failed to count chunks")?;

        let total_size: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(text AS BLOB))), 0) FROM chunks",
                [],
                |row| row.get(0),
            )
            .context("Failed to sum chunk sizes")?;

        Ok(StoreStats {
            chunk_count: count as usize,
            total_text_bytes: total_size as usize,
            db_path: self.db_path.clone(),
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (text, metadata, embedding, dimension, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            for record in records {
                let metadata = serde_json::to_string(&record.metadata)
                    .context("Failed to serialize metadata")?;

                stmt.execute(params![
                    record.text,
                    metadata,
                    encode_embedding(&record.embedding),
                    record.embedding.len() as i64,
                    now,
                ])
                .context("Failed to insert chunk")?;
            }
        }
        tx.commit().context("Failed to commit chunks")?;

        tracing::debug!("Inserted {} chunks into {:?}", records.len(), self.db_path);
        Ok(records.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT id, text, metadata, embedding, dimension FROM chunks ORDER BY id")?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut candidates = Vec::new();
        let mut mismatched = 0usize;

        for row in rows {
            let (id, text, metadata, embedding, dimension) = row.context("Failed to read chunk row")?;

            // 다른 모델로 만든 벡터는 비교 불가
            if dimension as usize != query_embedding.len() {
                mismatched += 1;
                continue;
            }

            let metadata: Metadata =
                serde_json::from_str(&metadata).context("Failed to parse chunk metadata")?;
            let similarity = cosine_similarity(query_embedding, &decode_embedding(&embedding));

            candidates.push((
                id,
                SearchResult {
                    text,
                    metadata,
                    similarity,
                },
            ));
        }

        if mismatched > 0 {
            tracing::warn!(
                "Skipped {} chunks with embedding dimension != {}",
                mismatched,
                query_embedding.len()
            );
        }

        Ok(rank_candidates(candidates, limit))
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// f32 벡터를 little-endian 바이트로 인코딩
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// little-endian 바이트를 f32 벡터로 디코딩
fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
