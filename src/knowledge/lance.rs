//! LanceDB Vector Store - ANN 벡터 검색
//!
//! 코사인 거리로 검색한 뒤 삽입 순번(`seq`)으로 동점을 정렬합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use tokio::sync::Mutex;

use super::vector::{rank_candidates, Metadata, SearchResult, VectorRecord, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 임베딩 차원은 테이블 스키마(FixedSizeList)에 고정됩니다.
/// 쓰기는 `write_lock`으로 직렬화되어 테이블 생성과 `seq` 할당이 겹치지 않습니다.
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
    write_lock: Mutex<()>,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than 0");
        }

        // 부모 디렉토리 생성
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self {
            db,
            dimension,
            write_lock: Mutex::new(()),
        })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("seq", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(&self, records: &[VectorRecord], first_seq: i64) -> Result<RecordBatch> {
        if records.is_empty() {
            anyhow::bail!("Cannot create batch from empty records");
        }

        if let Some(bad) = records
            .iter()
            .find(|r| r.embedding.len() != self.dimension as usize)
        {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                bad.embedding.len()
            );
        }

        let seqs: Vec<i64> = (0..records.len() as i64).map(|i| first_seq + i).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let metadatas = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to serialize metadata")?;

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(Int64Array::from(seqs)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(metadatas)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        // 존재 확인 → 생성/추가까지 한 번에
        let _guard = self.write_lock.lock().await;

        if self.table_exists().await {
            // 기존 테이블에 추가 (seq는 현재 행 수부터)
            let table = self.open_table().await?;
            let first_seq = table.count_rows(None).await.context("Failed to count rows")? as i64;

            let batch = self.records_to_batch(records, first_seq)?;
            let schema = batch.schema();
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            // 새 테이블 생성
            let batch = self.records_to_batch(records, 0)?;
            let schema = batch.schema();
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(records.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        if query_embedding.len() != self.dimension as usize {
            anyhow::bail!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query_embedding.len()
            );
        }

        let table = self.open_table().await?;

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut candidates = Vec::new();

        for batch in batches {
            let seqs = batch
                .column_by_name("seq")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing seq column"))?;

            let texts = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing text column"))?;

            let metadatas = batch
                .column_by_name("metadata")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing metadata column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가, cosine distance = 1 - similarity)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let metadata: Metadata = serde_json::from_str(metadatas.value(i))
                    .context("Failed to parse chunk metadata")?;

                candidates.push((
                    seqs.value(i),
                    SearchResult {
                        text: texts.value(i).to_string(),
                        metadata,
                        similarity: 1.0 - distances.value(i),
                    },
                ));
            }
        }

        Ok(rank_candidates(candidates, limit))
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }

    fn name(&self) -> &'static str {
        "lance"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::vector::source_metadata;
    use tempfile::TempDir;

    const DIM: usize = 4;

    fn record(text: &str, embedding: [f32; DIM]) -> VectorRecord {
        VectorRecord {
            text: text.to_string(),
            metadata: source_metadata("doc.txt"),
            embedding: embedding.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("test.lance");

        let store = LanceVectorStore::open(&lance_path, DIM).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);

        let records = vec![
            record("one", [1.0, 0.0, 0.0, 0.0]),
            record("two", [0.0, 1.0, 0.0, 0.0]),
        ];
        assert_eq!(store.insert_batch(&records).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        // 두 번째 배치는 기존 테이블에 추가
        store
            .insert_batch(&[record("three", [0.0, 0.0, 1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_lance_search() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("search_test.lance");

        let store = LanceVectorStore::open(&lance_path, DIM).await.unwrap();
        store
            .insert_batch(&[
                record("x axis", [1.0, 0.0, 0.0, 0.0]),
                record("y axis", [0.0, 1.0, 0.0, 0.0]),
                record("mostly x", [0.9, 0.1, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "x axis");
        assert_eq!(results[1].text, "mostly x");
        assert_eq!(results[0].source(), Some("doc.txt"));
        assert!((results[0].similarity - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_lance_rejects_wrong_dimension() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("dim.lance"), DIM)
            .await
            .unwrap();

        let bad = VectorRecord {
            text: "bad".to_string(),
            metadata: source_metadata("doc.txt"),
            embedding: vec![1.0; DIM + 1],
        };
        assert!(store.insert_batch(&[bad]).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    /// 저장된 seq 값 (정렬)
    async fn stored_seqs(store: &LanceVectorStore) -> Vec<i64> {
        let table = store.open_table().await.unwrap();
        let batches: Vec<RecordBatch> = table
            .query()
            .execute()
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let mut seqs: Vec<i64> = batches
            .iter()
            .flat_map(|batch| {
                let column = batch
                    .column_by_name("seq")
                    .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                    .unwrap();
                (0..column.len()).map(|i| column.value(i)).collect::<Vec<_>>()
            })
            .collect();
        seqs.sort_unstable();
        seqs
    }

    #[tokio::test]
    async fn test_lance_ties_break_by_insertion_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("ties.lance"), DIM)
            .await
            .unwrap();

        store
            .insert_batch(&[
                record("first", [0.0, 1.0, 0.0, 0.0]),
                record("second", [0.0, 1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();
        store
            .insert_batch(&[record("third", [0.0, 1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let results = store.search(&[0.0, 1.0, 0.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_lance_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let lance_path = temp_dir.path().join("persist.lance");

        {
            let store = LanceVectorStore::open(&lance_path, DIM).await.unwrap();
            store
                .insert_batch(&[
                    record("x axis", [1.0, 0.0, 0.0, 0.0]),
                    record("y axis", [0.0, 1.0, 0.0, 0.0]),
                ])
                .await
                .unwrap();
        }

        let store = LanceVectorStore::open(&lance_path, DIM).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let results = store.search(&[1.0, 0.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].text, "x axis");
        assert_eq!(results[0].source(), Some("doc.txt"));

        // seq는 기존 행 수부터 이어짐
        store
            .insert_batch(&[record("z axis", [0.0, 0.0, 1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(stored_seqs(&store).await, vec![0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lance_concurrent_inserts_on_fresh_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            LanceVectorStore::open(&temp_dir.path().join("race.lance"), DIM)
                .await
                .unwrap(),
        );

        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|text| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .insert_batch(&[record(text, [1.0, 0.0, 0.0, 0.0])])
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 1);
        }

        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(stored_seqs(&store).await, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_lance_empty_search() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("empty.lance"), DIM)
            .await
            .unwrap();
        assert!(store.search(&[1.0; DIM], 3).await.unwrap().is_empty());
    }
}
