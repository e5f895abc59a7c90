use crate::chunking::TextChunk;
use crate::embeddings::Embedding;
use crate::error::{RagError, Result};
use crate::store::{Metric, QueryResult, ScoredChunk, StoredPoint, VectorStore};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryPoint {
    values: Vec<f32>,
    chunk: TextChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryCollection {
    dim: u64,
    metric: Metric,
    // Ordered so snapshots and score ties are deterministic
    points: BTreeMap<String, MemoryPoint>,
}

/// In-process vector store with brute-force search.
///
/// With a snapshot path, state is loaded on open and rewritten after every
/// mutation, so collections survive restarts.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
    snapshot: Option<PathBuf>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    /// Create an empty, non-persistent store
    pub fn new() -> Self {
        MemoryStore {
            collections: RwLock::new(HashMap::new()),
            snapshot: None,
        }
    }

    /// Open a store persisted at `path`, loading it if the file exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let collections: HashMap<String, MemoryCollection> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                RagError::Store(format!("corrupt snapshot {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(RagError::Store(format!(
                    "failed to read snapshot {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        info!(
            "Opened vector store snapshot {} ({} collections)",
            path.display(),
            collections.len()
        );

        Ok(MemoryStore {
            collections: RwLock::new(collections),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, collections: &HashMap<String, MemoryCollection>) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };

        let bytes = serde_json::to_vec(collections)
            .map_err(|e| RagError::Store(format!("failed to encode snapshot: {}", e)))?;
        write_atomically(path, &bytes).await
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let to_store_error =
        |e: std::io::Error| RagError::Store(format!("failed to write {}: {}", path.display(), e));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(to_store_error)?;
    }
    tokio::fs::write(&tmp, bytes).await.map_err(to_store_error)?;
    tokio::fs::rename(&tmp, path).await.map_err(to_store_error)
}

/// Score of `candidate` against `query` under `metric`
fn score(metric: Metric, query: &[f32], candidate: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => {
            let dot = dot(query, candidate);
            let norm = dot_norm(query) * dot_norm(candidate);
            if norm == 0.0 {
                0.0
            } else {
                dot / norm
            }
        }
        Metric::Dot => dot(query, candidate),
        Metric::Euclid => query
            .iter()
            .zip(candidate)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt(),
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn dot_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, name: &str, dim: u64, metric: Metric) -> Result<()> {
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(name) {
            if existing.dim == dim && existing.metric == metric {
                return Ok(());
            }
            return Err(RagError::CollectionConflict {
                name: name.to_string(),
                existing_dim: existing.dim,
                existing_metric: existing.metric.to_string(),
                requested_dim: dim,
                requested_metric: metric.to_string(),
            });
        }

        collections.insert(
            name.to_string(),
            MemoryCollection {
                dim,
                metric,
                points: BTreeMap::new(),
            },
        );
        info!("Created collection {} ({} dims, {})", name, dim, metric);
        self.persist(&collections).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.remove(name).is_some() {
            info!("Deleted collection {}", name);
            self.persist(&collections).await?;
        }
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<StoredPoint>) -> Result<Vec<String>> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        if let Some(bad) = points
            .iter()
            .find(|p| p.embedding.dimensions() as u64 != collection.dim)
        {
            return Err(RagError::Store(format!(
                "vector of {} dimensions does not fit collection {} ({} dimensions)",
                bad.embedding.dimensions(),
                name,
                collection.dim
            )));
        }

        let mut ids = Vec::with_capacity(points.len());
        for point in points {
            let id = point.id.unwrap_or_else(|| Uuid::new_v4().to_string());
            collection.points.insert(
                id.clone(),
                MemoryPoint {
                    values: point.embedding.values,
                    chunk: point.chunk,
                },
            );
            ids.push(id);
        }

        debug!("Upserted {} points into {}", ids.len(), name);
        self.persist(&collections).await?;
        Ok(ids)
    }

    async fn query(&self, name: &str, embedding: &Embedding, k: u64) -> Result<QueryResult> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))?;

        if embedding.dimensions() as u64 != collection.dim {
            return Err(RagError::Store(format!(
                "query vector of {} dimensions does not fit collection {} ({} dimensions)",
                embedding.dimensions(),
                name,
                collection.dim
            )));
        }

        let metric = collection.metric;
        let mut results: Vec<ScoredChunk> = collection
            .points
            .iter()
            .map(|(id, point)| ScoredChunk {
                id: id.clone(),
                chunk: point.chunk.clone(),
                score: score(metric, &embedding.values, &point.values),
            })
            .collect();

        results.sort_by(|a, b| {
            let order = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
            if metric.higher_is_closer() {
                order.reverse()
            } else {
                order
            }
        });
        results.truncate(k as usize);

        Ok(results)
    }
}
