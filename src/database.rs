use crate::chunking::{estimate_token_count, TextChunk};
use crate::embeddings::Embedding;
use crate::error::{RagError, Result};
use crate::store::{Metric, QueryResult, ScoredChunk, StoredPoint, VectorStore};
use async_trait::async_trait;
use log::{debug, info};
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointId, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Qdrant, QdrantError};
use std::collections::HashMap;
use uuid::Uuid;

/// Vector store backed by a Qdrant server
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Create a new Qdrant client
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let config_builder = Qdrant::from_url(url);
        let config_builder = if let Some(api_key) = api_key {
            config_builder.api_key(api_key)
        } else {
            config_builder
        };

        let client = config_builder
            .build()
            .map_err(|e| RagError::config(format!("invalid Qdrant settings: {}", e)))?;

        Ok(QdrantStore { client })
    }

    /// Read back the vector size and distance of an existing collection
    async fn collection_params(&self, name: &str) -> Result<Option<(u64, Option<Metric>)>> {
        let info = match self.client.collection_info(name).await {
            Ok(info) => info,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(store_error("Failed to read collection info", name, e)),
        };

        let params = info
            .result
            .and_then(|info| info.config)
            .and_then(|config| config.params)
            .and_then(|params| params.vectors_config)
            .and_then(|vectors| vectors.config);

        match params {
            Some(VectorsConfigKind::Params(params)) => {
                let metric = Distance::try_from(params.distance)
                    .ok()
                    .and_then(metric_from_distance);
                Ok(Some((params.size, metric)))
            }
            // Named vectors are never created by this crate
            _ => Ok(Some((0, None))),
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dim: u64, metric: Metric) -> Result<()> {
        if let Some(existing) = self.collection_params(name).await? {
            return check_compatible(name, existing, dim, metric);
        }

        let create_collection = CreateCollectionBuilder::new(name)
            .vectors_config(VectorParamsBuilder::new(dim, distance_from_metric(metric)));

        match self.client.create_collection(create_collection).await {
            Ok(_) => {
                info!("Created collection {} ({} dims, {})", name, dim, metric);
                Ok(())
            }
            Err(e) => match self.collection_params(name).await? {
                // Created concurrently by another writer
                Some(existing) => check_compatible(name, existing, dim, metric),
                None => Err(store_error("Failed to create collection", name, e)),
            },
        }
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collection_params(name).await?.is_some())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            return Ok(());
        }

        self.client
            .delete_collection(name)
            .await
            .map_err(|e| store_error("Failed to delete collection", name, e))?;

        info!("Deleted collection {}", name);
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<StoredPoint>) -> Result<Vec<String>> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(points.len());
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|point| {
                let id = point.id.unwrap_or_else(|| Uuid::new_v4().to_string());
                ids.push(id.clone());
                PointStruct::new(id, point.embedding.values, chunk_payload(&point.chunk))
            })
            .collect();

        let upsert_request = UpsertPointsBuilder::new(name, points).wait(true);

        self.client
            .upsert_points(upsert_request)
            .await
            .map_err(|e| store_error("Failed to upsert points in collection", name, e))?;

        debug!("Upserted {} points into {}", ids.len(), name);
        Ok(ids)
    }

    async fn query(&self, name: &str, embedding: &Embedding, k: u64) -> Result<QueryResult> {
        let search_request =
            SearchPointsBuilder::new(name, embedding.values.clone(), k).with_payload(true);

        let search_response = self
            .client
            .search_points(search_request)
            .await
            .map_err(|e| store_error("Failed to search collection", name, e))?;

        // Convert search results back to chunks
        let results = search_response
            .result
            .into_iter()
            .filter_map(|scored_point| {
                let id = scored_point.id.and_then(point_id_to_string)?;
                let chunk = chunk_from_payload(&scored_point.payload)?;
                Some(ScoredChunk {
                    id,
                    chunk,
                    score: scored_point.score,
                })
            })
            .collect();

        Ok(results)
    }
}

fn is_not_found(err: &QdrantError) -> bool {
    matches!(
        err,
        QdrantError::ResponseError { status } if status.code() == tonic::Code::NotFound
    )
}

fn store_error(action: &str, name: &str, err: QdrantError) -> RagError {
    if is_not_found(&err) {
        RagError::CollectionNotFound(name.to_string())
    } else {
        RagError::Store(format!("{} {}: {}", action, name, err))
    }
}

fn check_compatible(
    name: &str,
    existing: (u64, Option<Metric>),
    dim: u64,
    metric: Metric,
) -> Result<()> {
    let (existing_dim, existing_metric) = existing;
    if existing_dim == dim && existing_metric == Some(metric) {
        return Ok(());
    }

    Err(RagError::CollectionConflict {
        name: name.to_string(),
        existing_dim,
        existing_metric: existing_metric
            .map(|m| m.to_string())
            .unwrap_or_else(|| "unsupported".to_string()),
        requested_dim: dim,
        requested_metric: metric.to_string(),
    })
}

fn distance_from_metric(metric: Metric) -> Distance {
    match metric {
        Metric::Cosine => Distance::Cosine,
        Metric::Dot => Distance::Dot,
        Metric::Euclid => Distance::Euclid,
    }
}

fn metric_from_distance(distance: Distance) -> Option<Metric> {
    match distance {
        Distance::Cosine => Some(Metric::Cosine),
        Distance::Dot => Some(Metric::Dot),
        Distance::Euclid => Some(Metric::Euclid),
        _ => None,
    }
}

fn point_id_to_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(num) => Some(num.to_string()),
    }
}

fn chunk_payload(chunk: &TextChunk) -> HashMap<String, Value> {
    let mut payload = HashMap::with_capacity(5);
    payload.insert("text".to_string(), chunk.text.clone().into());
    payload.insert("source_id".to_string(), chunk.source_id.clone().into());
    payload.insert("page_number".to_string(), (chunk.page_number as i64).into());
    payload.insert("chunk_index".to_string(), (chunk.chunk_index as i64).into());
    payload.insert("start_offset".to_string(), (chunk.start_offset as i64).into());
    payload
}

fn chunk_from_payload(payload: &HashMap<String, Value>) -> Option<TextChunk> {
    let text = payload.get("text")?.as_str()?.to_string();
    let integer = |key: &str| {
        payload
            .get(key)
            .and_then(|v| v.as_integer())
            .map(|v| v as usize)
            .unwrap_or(0)
    };

    Some(TextChunk {
        token_count: estimate_token_count(&text),
        source_id: payload
            .get("source_id")
            .and_then(|v| v.as_str())
            .cloned()
            .unwrap_or_default(),
        page_number: integer("page_number"),
        chunk_index: integer("chunk_index"),
        start_offset: integer("start_offset"),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_keeps_chunk_metadata() {
        let chunk = TextChunk {
            text: "Net income rose by 5%.".to_string(),
            token_count: 7,
            source_id: "q1-report.pdf".to_string(),
            page_number: 3,
            chunk_index: 2,
            start_offset: 840,
        };

        let restored = chunk_from_payload(&chunk_payload(&chunk)).unwrap();
        assert_eq!(restored, chunk);
    }

    #[test]
    fn test_payload_without_text_is_skipped() {
        assert!(chunk_from_payload(&HashMap::new()).is_none());
    }

    #[test]
    fn test_point_ids() {
        let uuid = Uuid::new_v4().to_string();
        assert_eq!(point_id_to_string(PointId::from(uuid.clone())), Some(uuid));
        assert_eq!(point_id_to_string(PointId::from(7u64)), Some("7".to_string()));
    }

    #[test]
    fn test_conflict_detection() {
        assert!(check_compatible("fin-docs", (1536, Some(Metric::Cosine)), 1536, Metric::Cosine).is_ok());

        let err = check_compatible("fin-docs", (768, Some(Metric::Cosine)), 1536, Metric::Cosine)
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::CollectionConflict {
                existing_dim: 768,
                requested_dim: 1536,
                ..
            }
        ));

        assert!(check_compatible("fin-docs", (1536, Some(Metric::Dot)), 1536, Metric::Cosine).is_err());
    }

    #[test]
    fn test_not_found_status_is_missing_collection() {
        let err = QdrantError::ResponseError {
            status: tonic::Status::not_found("Collection `fin-docs` doesn't exist!"),
        };
        assert!(is_not_found(&err));
        assert!(matches!(
            store_error("Failed to search collection", "fin-docs", err),
            RagError::CollectionNotFound(name) if name == "fin-docs"
        ));

        let err = QdrantError::ResponseError {
            status: tonic::Status::unavailable("connection refused"),
        };
        assert!(!is_not_found(&err));
        assert!(matches!(
            store_error("Failed to search collection", "fin-docs", err),
            RagError::Store(_)
        ));
    }

    #[test]
    fn test_metric_distance_mapping() {
        for metric in [Metric::Cosine, Metric::Dot, Metric::Euclid] {
            assert_eq!(metric_from_distance(distance_from_metric(metric)), Some(metric));
        }
        assert_eq!(metric_from_distance(Distance::Manhattan), None);
    }
}
