//! In-process flat index with paired-snapshot persistence.
//!
//! Exact nearest-neighbor search by inner product over all stored vectors.
//! Every successful upsert rewrites a full snapshot: a generation-numbered
//! bincode vector block plus a JSON metadata sidecar. The sidecar carries
//! the live generation and its atomic rename is the commit point, so a
//! crash at any moment leaves either the prior or the new snapshot on disk
//! in full, never a mix. In-memory state is swapped only after persistence
//! succeeds; readers keep the old `Arc<Snapshot>` until then.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::{VectorStore, validate_batch};
use crate::error::StoreError;
use crate::models::{ChunkMetadata, ChunkRecord, SearchHit, StoreStats};
use crate::utils::{dot, l2_normalize};

pub const FLAT_BACKEND: &str = "flat";

/// One complete, immutable index state.
#[derive(Debug, Default)]
struct Snapshot {
    generation: u64,
    next_id: i64,
    vectors: Vec<Vec<f32>>,
    records: Vec<ChunkRecord>,
}

/// On-disk vector block, index-aligned with the sidecar records.
#[derive(Serialize, Deserialize)]
struct VectorBlock {
    generation: u64,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// On-disk metadata sidecar; its rename commits the snapshot pair.
#[derive(Serialize, Deserialize)]
struct MetadataSidecar {
    generation: u64,
    dimension: usize,
    next_id: i64,
    records: Vec<ChunkRecord>,
}

pub struct FlatIndexStore {
    index_path: PathBuf,
    dimension: usize,
    state: RwLock<Option<Arc<Snapshot>>>,
    write_lock: Arc<Mutex<()>>,
}

impl FlatIndexStore {
    pub fn new(index_path: PathBuf, dimension: usize) -> Self {
        let write_lock = write_lock_for(&index_path);
        Self {
            index_path,
            dimension,
            state: RwLock::new(None),
            write_lock,
        }
    }

    fn sidecar_path(&self) -> PathBuf {
        sidecar_path(&self.index_path)
    }

    fn vector_path(&self, generation: u64) -> PathBuf {
        vector_path(&self.index_path, generation)
    }

    /// Lazily load the snapshot on first use; starts empty when no
    /// sidecar exists yet.
    async fn snapshot(&self) -> Result<Arc<Snapshot>, StoreError> {
        if let Some(snapshot) = self.state.read().await.as_ref() {
            return Ok(snapshot.clone());
        }

        let mut guard = self.state.write().await;
        if let Some(snapshot) = guard.as_ref() {
            return Ok(snapshot.clone());
        }

        let snapshot = Arc::new(self.read_from_disk()?);
        *guard = Some(snapshot.clone());
        Ok(snapshot)
    }

    fn read_from_disk(&self) -> Result<Snapshot, StoreError> {
        let sidecar_path = self.sidecar_path();
        if !sidecar_path.exists() {
            info!(path = %self.index_path.display(), "no snapshot found, starting empty");
            return Ok(Snapshot::default());
        }

        let sidecar_raw = std::fs::read(&sidecar_path)
            .map_err(|e| StoreError::Persistence(format!("failed to read sidecar: {e}")))?;
        let sidecar: MetadataSidecar = serde_json::from_slice(&sidecar_raw)
            .map_err(|e| StoreError::Persistence(format!("corrupt metadata sidecar: {e}")))?;

        if sidecar.dimension != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: sidecar.dimension,
            });
        }

        let block_path = self.vector_path(sidecar.generation);
        let block_raw = std::fs::read(&block_path)
            .map_err(|e| StoreError::Persistence(format!("failed to read vector block: {e}")))?;
        let block: VectorBlock = bincode::deserialize(&block_raw)
            .map_err(|e| StoreError::Persistence(format!("corrupt vector block: {e}")))?;

        if block.generation != sidecar.generation || block.vectors.len() != sidecar.records.len() {
            return Err(StoreError::Persistence(format!(
                "snapshot pair out of sync: block generation {} with {} vectors, sidecar generation {} with {} records",
                block.generation,
                block.vectors.len(),
                sidecar.generation,
                sidecar.records.len()
            )));
        }

        info!(
            path = %self.index_path.display(),
            generation = sidecar.generation,
            vectors = block.vectors.len(),
            "loaded flat index snapshot"
        );

        Ok(Snapshot {
            generation: sidecar.generation,
            next_id: sidecar.next_id,
            vectors: block.vectors,
            records: sidecar.records,
        })
    }

    /// Write the new snapshot pair. The vector block lands first at its
    /// generation-numbered path; the sidecar rename then commits both.
    fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let dir = self
            .index_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Persistence(format!("failed to create index dir: {e}")))?;

        let block = VectorBlock {
            generation: snapshot.generation,
            dimension: self.dimension,
            vectors: snapshot.vectors.clone(),
        };
        let block_bytes = bincode::serialize(&block)
            .map_err(|e| StoreError::Persistence(format!("failed to encode vector block: {e}")))?;
        write_atomic(&dir, &self.vector_path(snapshot.generation), &block_bytes)?;

        let sidecar = MetadataSidecar {
            generation: snapshot.generation,
            dimension: self.dimension,
            next_id: snapshot.next_id,
            records: snapshot.records.clone(),
        };
        let sidecar_bytes = serde_json::to_vec(&sidecar)
            .map_err(|e| StoreError::Persistence(format!("failed to encode sidecar: {e}")))?;
        write_atomic(&dir, &self.sidecar_path(), &sidecar_bytes)?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for FlatIndexStore {
    async fn upsert(
        &self,
        texts: &[String],
        embeddings: &[Vec<f32>],
        metadata: &[ChunkMetadata],
    ) -> Result<usize, StoreError> {
        validate_batch(texts, embeddings, metadata, self.dimension)?;

        // Single-writer discipline per index path: persistence is a full
        // snapshot rewrite, so unserialized writers would corrupt it.
        let write_lock = self.write_lock.clone();
        let _writer = write_lock.lock().await;

        let current = self.snapshot().await?;

        let mut vectors = current.vectors.clone();
        let mut records = current.records.clone();
        let mut next_id = current.next_id;
        let created_at = chrono::Utc::now().to_rfc3339();

        let mut positions: HashMap<(String, u32), usize> = records
            .iter()
            .enumerate()
            .map(|(i, r)| ((r.metadata.source.clone(), r.metadata.chunk_index), i))
            .collect();

        for ((text, embedding), meta) in texts.iter().zip(embeddings).zip(metadata) {
            let normalized = l2_normalize(embedding);
            let key = (meta.source.clone(), meta.chunk_index);

            match positions.get(&key) {
                Some(&pos) => {
                    vectors[pos] = normalized;
                    records[pos].content = text.clone();
                    records[pos].metadata = meta.clone();
                }
                None => {
                    positions.insert(key, records.len());
                    records.push(ChunkRecord {
                        id: next_id,
                        content: text.clone(),
                        metadata: meta.clone(),
                        created_at: created_at.clone(),
                    });
                    vectors.push(normalized);
                    next_id += 1;
                }
            }
        }

        let count = texts.len();
        let next = Snapshot {
            generation: current.generation + 1,
            next_id,
            vectors,
            records,
        };

        self.persist(&next)?;
        *self.state.write().await = Some(Arc::new(next));

        // The superseded vector block is garbage now; removal is best
        // effort and never fails the upsert.
        if current.generation > 0
            && let Err(e) = std::fs::remove_file(self.vector_path(current.generation))
        {
            warn!(generation = current.generation, "failed to remove stale vector block: {e}");
        }

        Ok(count)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let snapshot = self.snapshot().await?;
        if snapshot.records.is_empty() {
            return Ok(Vec::new());
        }

        let normalized = l2_normalize(query);
        let mut scored: Vec<(usize, f32)> = snapshot
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&normalized, v)))
            .collect();

        // Strict ordering: score descending, then id ascending so equal
        // scores resolve to the earliest-inserted chunk.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| snapshot.records[a.0].id.cmp(&snapshot.records[b.0].id))
        });

        let hits = scored
            .into_iter()
            .take(k.min(snapshot.records.len()))
            .map(|(i, score)| {
                let record = &snapshot.records[i];
                let metadata = serde_json::to_value(&record.metadata)
                    .map_err(|e| StoreError::SearchError(e.to_string()))?;
                Ok(SearchHit {
                    id: record.id,
                    content: record.content.clone(),
                    source: record.metadata.source.clone(),
                    chunk_index: record.metadata.chunk_index,
                    metadata,
                    score,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats, StoreError> {
        let snapshot = self.snapshot().await?;
        Ok(StoreStats {
            total_vectors: snapshot.records.len() as u64,
            dimension: self.dimension,
            backend: FLAT_BACKEND.to_string(),
        })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let write_lock = self.write_lock.clone();
        let _writer = write_lock.lock().await;

        let current = self.snapshot().await?;
        let next = Snapshot {
            generation: current.generation + 1,
            next_id: current.next_id,
            vectors: Vec::new(),
            records: Vec::new(),
        };
        self.persist(&next)?;
        *self.state.write().await = Some(Arc::new(next));

        if current.generation > 0 {
            let _ = std::fs::remove_file(self.vector_path(current.generation));
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        FLAT_BACKEND
    }
}

fn sidecar_path(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    name.push_str("_metadata.json");
    index_path.with_file_name(name)
}

fn vector_path(index_path: &Path, generation: u64) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    name.push_str(&format!(".{generation}"));
    index_path.with_file_name(name)
}

/// Write bytes to a temp file in `dir`, sync, then atomically rename.
fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| StoreError::Persistence(format!("failed to create temp file: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| StoreError::Persistence(format!("failed to write temp file: {e}")))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| StoreError::Persistence(format!("failed to sync temp file: {e}")))?;
    tmp.persist(target)
        .map_err(|e| StoreError::Persistence(format!("failed to rename into place: {e}")))?;
    Ok(())
}

/// Writers for the same index path share one lock, even across store
/// instances within the process.
fn write_lock_for(path: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| StdMutex::new(HashMap::new()));
    let mut map = locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    map.entry(path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(source: &str, index: u32) -> ChunkMetadata {
        ChunkMetadata::new(source, index, 1, 16)
    }

    fn store(dir: &Path) -> FlatIndexStore {
        FlatIndexStore::new(dir.join("flat.index"), 4)
    }

    #[tokio::test]
    async fn test_round_trip_self_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let embedding = vec![0.1, 0.9, 0.3, 0.2];
        let count = store
            .upsert(
                &["hello chunk".to_string()],
                std::slice::from_ref(&embedding),
                &[meta("doc", 0)],
            )
            .await
            .unwrap();
        assert_eq!(count, 1);

        let hits = store.search(&embedding, 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "hello chunk");
        assert_eq!(hits[0].source, "doc");
        assert!((hits[0].score - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store
            .upsert(
                &["first version".to_string()],
                &[vec![1.0, 0.0, 0.0, 0.0]],
                &[meta("doc", 0)],
            )
            .await
            .unwrap();
        let first_id = store.search(&[1.0, 0.0, 0.0, 0.0], 1).await.unwrap()[0].id;

        store
            .upsert(
                &["second version".to_string()],
                &[vec![0.0, 1.0, 0.0, 0.0]],
                &[meta("doc", 0)],
            )
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 1);

        let hits = store.search(&[0.0, 1.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].content, "second version");
        assert_eq!(hits[0].id, first_id);
    }

    #[tokio::test]
    async fn test_k_clamped_to_total() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let texts: Vec<String> = (0..2).map(|i| format!("chunk {i}")).collect();
        let embeddings = vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]];
        let metadata = vec![meta("doc", 0), meta("doc", 1)];
        store.upsert(&texts, &embeddings, &metadata).await.unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn test_top_k_strictly_descending() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let texts: Vec<String> = (0..5).map(|i| format!("chunk {i}")).collect();
        let embeddings: Vec<Vec<f32>> = (0..5)
            .map(|i| l2_normalize(&[1.0, i as f32 * 0.2, 0.0, 0.1]))
            .collect();
        let metadata: Vec<ChunkMetadata> = (0..5).map(|i| meta("doc", i)).collect();
        store.upsert(&texts, &embeddings, &metadata).await.unwrap();

        let hits = store.search(&[1.0, 1.0, 0.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].score > hits[1].score);
        assert!(hits[1].score > hits[2].score);
    }

    #[tokio::test]
    async fn test_equal_scores_tie_break_by_ascending_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let same = vec![0.0, 0.0, 1.0, 0.0];
        store
            .upsert(
                &["a".to_string(), "b".to_string(), "c".to_string()],
                &[same.clone(), same.clone(), same.clone()],
                &[meta("doc", 0), meta("doc", 1), meta("doc", 2)],
            )
            .await
            .unwrap();

        let hits = store.search(&same, 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits[0].id < hits[1].id);
        assert!(hits[1].id < hits[2].id);
    }

    #[tokio::test]
    async fn test_dimension_enforced_at_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let err = store
            .upsert(
                &["x".to_string()],
                &[vec![1.0, 0.0]],
                &[meta("doc", 0)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));

        let err = store.search(&[1.0, 0.0], 1).await.unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = store(dir.path());
            store
                .upsert(
                    &["persisted chunk".to_string()],
                    &[vec![0.5, 0.5, 0.5, 0.5]],
                    &[meta("doc", 0)],
                )
                .await
                .unwrap();
        }

        let reopened = store(dir.path());
        let hits = reopened.search(&[0.5, 0.5, 0.5, 0.5], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "persisted chunk");
    }

    #[tokio::test]
    async fn test_uncommitted_vector_block_leaves_prior_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("flat.index");
        {
            let store = FlatIndexStore::new(index_path.clone(), 4);
            store
                .upsert(
                    &["committed".to_string()],
                    &[vec![1.0, 0.0, 0.0, 0.0]],
                    &[meta("doc", 0)],
                )
                .await
                .unwrap();
        }

        // Simulate a crash between the two snapshot writes: a newer vector
        // block exists but the sidecar was never renamed over.
        let orphan = VectorBlock {
            generation: 2,
            dimension: 4,
            vectors: vec![vec![0.0, 1.0, 0.0, 0.0], vec![0.0, 0.0, 1.0, 0.0]],
        };
        std::fs::write(
            vector_path(&index_path, 2),
            bincode::serialize(&orphan).unwrap(),
        )
        .unwrap();

        let reopened = FlatIndexStore::new(index_path, 4);
        let stats = reopened.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 1);
        let hits = reopened.search(&[1.0, 0.0, 0.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].content, "committed");
    }

    #[tokio::test]
    async fn test_clear_empties_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        store
            .upsert(
                &["x".to_string()],
                &[vec![1.0, 0.0, 0.0, 0.0]],
                &[meta("doc", 0)],
            )
            .await
            .unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.stats().await.unwrap().total_vectors, 0);
        assert!(store.search(&[1.0, 0.0, 0.0, 0.0], 5).await.unwrap().is_empty());
    }
}
