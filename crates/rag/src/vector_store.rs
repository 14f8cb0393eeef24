//! Vector Store using Qdrant
//!
//! Each corpus version gets its own collection (`{prefix}_v{version}`), so a
//! rebuild never touches the points an in-flight query is searching.

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
        UpsertPointsBuilder, VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;

use docchat_config::RetrievalConfig;
use docchat_core::{Chunk, CorpusVersion, SemanticHit, SemanticIndex};

use crate::embeddings::Embedder;
use crate::semantic::embedding_text;
use crate::RagError;

const CHUNK_ID_KEY: &str = "chunk_id";
const UPSERT_BATCH: usize = 256;

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name prefix
    pub collection_prefix: String,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl From<&RetrievalConfig> for VectorStoreConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            endpoint: config.qdrant_endpoint.clone(),
            collection_prefix: config.qdrant_collection_prefix.clone(),
            api_key: None,
        }
    }
}

impl VectorStoreConfig {
    pub fn collection_name(&self, version: CorpusVersion) -> String {
        format!("{}_v{}", self.collection_prefix, version.get())
    }
}

/// Qdrant-backed semantic index for one corpus version
pub struct QdrantVectorIndex {
    version: CorpusVersion,
    client: Qdrant,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl QdrantVectorIndex {
    /// Create the version's collection and upsert every chunk embedding
    pub async fn build(
        config: &VectorStoreConfig,
        version: CorpusVersion,
        chunks: &[Chunk],
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        let collection = config.collection_name(version);

        let exists = client
            .collection_exists(&collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;
        if exists {
            // Leftover from an earlier process; versions restart at 1
            client
                .delete_collection(&collection)
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }

        client
            .create_collection(CreateCollectionBuilder::new(&collection).vectors_config(
                VectorParamsBuilder::new(embedder.dimension() as u64, Distance::Cosine),
            ))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        let texts: Vec<String> = chunks.iter().map(embedding_text).collect();
        let embeddings = embedder.embed_batch(&texts).await?;

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, vector))| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert(CHUNK_ID_KEY.to_string(), chunk.id.clone().into());
                PointStruct::new(i as u64, vector, payload)
            })
            .collect();

        for batch in points.chunks(UPSERT_BATCH) {
            client
                .upsert_points(UpsertPointsBuilder::new(&collection, batch.to_vec()).wait(true))
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }

        tracing::info!(
            version = %version,
            collection = %collection,
            points = points.len(),
            "Built Qdrant collection"
        );

        Ok(Self {
            version,
            client,
            collection,
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl SemanticIndex for QdrantVectorIndex {
    fn version(&self) -> CorpusVersion {
        self.version
    }

    async fn embed(&self, text: &str) -> docchat_core::Result<Vec<f32>> {
        Ok(self.embedder.embed(text).await?)
    }

    async fn search(
        &self,
        embedding: &[f32],
        version: CorpusVersion,
        k: usize,
    ) -> docchat_core::Result<Vec<SemanticHit>> {
        self.check_version(version)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, embedding.to_vec(), k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        let hits = response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point
                    .payload
                    .get(CHUNK_ID_KEY)
                    .and_then(|v| match &v.kind {
                        Some(Kind::StringValue(s)) => Some(s.clone()),
                        _ => None,
                    })?;
                Some((id, point.score))
            })
            .collect();

        Ok(hits)
    }
}
