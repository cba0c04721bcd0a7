//! In-process reference engine
//!
//! Brute-force exact search over a `DashMap`, scored with trueno SIMD dot
//! products. Collections live in a [`MemoryServer`] shared by every
//! collaborator the plugin builds and are keyed by the benchmark host, so a
//! configurator, an uploader and N searchers built for the same host see the
//! same data, exactly as they would against a remote engine.
//!
//! Useful for dry runs of experiment files and as a baseline: results are
//! exact, so they double as ground truth for small datasets.

use super::batch::{upload_in_batches, BatchParams};
use super::EnginePlugin;
use crate::client::{
    CollectionSchema, Configurator, Distance, Query, Record, ScoredPoint, Searcher, UploadReport,
    Uploader,
};
use crate::params::{parse_params, ParamRole, Params};
use crate::topk::{top_k, SortOrder};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use trueno::Vector;

/// Engine identifier.
pub const ENGINE: &str = "memory";

/// Collection creation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryCollectionParams {
    /// Pre-allocated point capacity
    pub capacity: Option<usize>,
}

/// One search variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemorySearchParams {
    /// Collections at least this large are scanned in parallel
    pub parallel_scan_threshold: usize,
}

impl Default for MemorySearchParams {
    fn default() -> Self {
        Self {
            parallel_scan_threshold: 4096,
        }
    }
}

fn simd_dot(a: &[f32], b: &[f32]) -> Result<f32> {
    Vector::from_slice(a)
        .dot(&Vector::from_slice(b))
        .map_err(|e| Error::Other(format!("SIMD dot product failed: {e:?}")))
}

#[derive(Debug)]
struct StoredPoint {
    vector: Vec<f32>,
    norm_sq: f32,
    payload: Option<Params>,
}

/// One provisioned collection.
#[derive(Debug)]
pub struct MemoryCollection {
    schema: CollectionSchema,
    points: DashMap<u64, StoredPoint>,
}

impl MemoryCollection {
    fn new(schema: CollectionSchema, capacity: Option<usize>) -> Self {
        Self {
            schema,
            points: capacity.map_or_else(DashMap::new, DashMap::with_capacity),
        }
    }

    /// Schema the collection was created with.
    #[must_use]
    pub const fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Number of stored points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the collection holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn prepare(&self, vector: &[f32]) -> Result<(Vec<f32>, f32)> {
        if vector.len() != self.schema.vector_size {
            return Err(Error::InvalidInput(format!(
                "expected {} dimensions, got {}",
                self.schema.vector_size,
                vector.len()
            )));
        }
        let norm_sq = simd_dot(vector, vector)?;
        if self.schema.distance == Distance::Cosine && norm_sq > 0.0 {
            let norm = norm_sq.sqrt();
            return Ok((vector.iter().map(|x| x / norm).collect(), 1.0));
        }
        Ok((vector.to_vec(), norm_sq))
    }

    /// Insert or overwrite a point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on dimension mismatch.
    pub fn upsert(&self, record: &Record) -> Result<()> {
        let (vector, norm_sq) = self.prepare(&record.vector)?;
        self.points.insert(
            record.id,
            StoredPoint {
                vector,
                norm_sq,
                payload: record.payload.clone(),
            },
        );
        Ok(())
    }

    fn score(&self, query: &[f32], query_norm_sq: f32, point: &StoredPoint) -> Result<f32> {
        let dot = simd_dot(query, &point.vector)?;
        Ok(match self.schema.distance {
            Distance::Cosine | Distance::Dot => dot,
            Distance::Euclid => (query_norm_sq + point.norm_sq - 2.0 * dot).max(0.0).sqrt(),
        })
    }

    /// Exact nearest neighbours, best first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] on dimension mismatch.
    pub fn search(
        &self,
        query: &Query,
        parallel_scan_threshold: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let (vector, norm_sq) = self.prepare(&query.vector)?;
        let filter = query.filter.as_ref();
        let order = if self.schema.distance.higher_is_better() {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };

        let scored: Vec<ScoredPoint> = if self.points.len() >= parallel_scan_threshold {
            self.points
                .par_iter()
                .filter(|entry| filter.map_or(true, |f| f.matches(entry.value().payload.as_ref())))
                .map(|entry| {
                    Ok(ScoredPoint {
                        id: *entry.key(),
                        score: self.score(&vector, norm_sq, entry.value())?,
                    })
                })
                .collect::<Result<_>>()?
        } else {
            self.points
                .iter()
                .filter(|entry| filter.map_or(true, |f| f.matches(entry.value().payload.as_ref())))
                .map(|entry| {
                    Ok(ScoredPoint {
                        id: *entry.key(),
                        score: self.score(&vector, norm_sq, entry.value())?,
                    })
                })
                .collect::<Result<_>>()?
        };
        Ok(top_k(scored, query.top, order))
    }
}

/// Process-local "server" holding one collection per host.
#[derive(Debug, Default)]
pub struct MemoryServer {
    collections: DashMap<String, Arc<MemoryCollection>>,
}

impl MemoryServer {
    /// Empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection provisioned for `host`, if any.
    #[must_use]
    pub fn collection(&self, host: &str) -> Option<Arc<MemoryCollection>> {
        self.collections.get(host).map(|c| Arc::clone(c.value()))
    }

    fn require(&self, host: &str) -> Result<Arc<MemoryCollection>> {
        self.collection(host).ok_or_else(|| Error::Backend {
            engine: ENGINE.to_string(),
            status: 404,
            body: format!("no collection on host {host:?}"),
        })
    }
}

/// Creates and drops the host's collection.
pub struct MemoryConfigurator {
    server: Arc<MemoryServer>,
    host: String,
    typed: MemoryCollectionParams,
    collection_params: Params,
    connection_params: Params,
}

#[async_trait]
impl Configurator for MemoryConfigurator {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn collection_params(&self) -> &Params {
        &self.collection_params
    }

    fn connection_params(&self) -> &Params {
        &self.connection_params
    }

    async fn delete(&self) -> Result<()> {
        self.server.collections.remove(&self.host);
        Ok(())
    }

    async fn recreate(&self, schema: &CollectionSchema) -> Result<()> {
        if schema.vector_size == 0 {
            return Err(Error::InvalidSchema("vector_size must be positive".to_string()));
        }
        self.server.collections.insert(
            self.host.clone(),
            Arc::new(MemoryCollection::new(schema.clone(), self.typed.capacity)),
        );
        info!(engine = ENGINE, host = %self.host, dim = schema.vector_size, "collection created");
        Ok(())
    }
}

/// Upserts records into the host's collection.
pub struct MemoryUploader {
    server: Arc<MemoryServer>,
    host: String,
    typed: BatchParams,
    connection_params: Params,
    upload_params: Params,
}

#[async_trait]
impl Uploader for MemoryUploader {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn connection_params(&self) -> &Params {
        &self.connection_params
    }

    fn upload_params(&self) -> &Params {
        &self.upload_params
    }

    async fn upload(&self, records: &[Record]) -> Result<UploadReport> {
        let collection = self.server.require(&self.host)?;
        upload_in_batches(ENGINE, records, self.typed, |offset, batch| {
            let collection = Arc::clone(&collection);
            async move {
                let mut failed = Vec::new();
                let mut reason = None;
                for (i, record) in batch.iter().enumerate() {
                    if let Err(e) = collection.upsert(record) {
                        failed.push(offset + i);
                        reason.get_or_insert_with(|| e.to_string());
                    }
                }
                match reason {
                    None => Ok(()),
                    Some(reason) => Err(Error::PartialUpload {
                        engine: ENGINE.to_string(),
                        failed,
                        reason,
                    }),
                }
            }
        })
        .await
    }
}

/// Exact search under one variant.
pub struct MemorySearcher {
    server: Arc<MemoryServer>,
    host: String,
    typed: MemorySearchParams,
    connection_params: Params,
    search_params: Params,
}

#[async_trait]
impl Searcher for MemorySearcher {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn connection_params(&self) -> &Params {
        &self.connection_params
    }

    fn search_params(&self) -> &Params {
        &self.search_params
    }

    async fn search(&self, query: &Query) -> Result<Vec<ScoredPoint>> {
        let collection = self.server.require(&self.host)?;
        let threshold = self.typed.parallel_scan_threshold;
        let query = query.clone();
        let hits = tokio::task::spawn_blocking(move || collection.search(&query, threshold))
            .await
            .map_err(|e| Error::Other(format!("search task failed: {e}")))??;
        debug!(engine = ENGINE, hits = hits.len(), "search done");
        Ok(hits)
    }
}

/// Registers the in-process engine.
#[derive(Debug, Default, Clone)]
pub struct MemoryPlugin {
    server: Arc<MemoryServer>,
}

impl MemoryPlugin {
    /// Plugin with a fresh server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plugin backed by an existing server.
    #[must_use]
    pub const fn with_server(server: Arc<MemoryServer>) -> Self {
        Self { server }
    }

    /// The server collaborators of this plugin talk to.
    #[must_use]
    pub fn server(&self) -> Arc<MemoryServer> {
        Arc::clone(&self.server)
    }
}

impl EnginePlugin for MemoryPlugin {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> Result<Box<dyn Configurator>> {
        Ok(Box::new(MemoryConfigurator {
            server: self.server(),
            host: host.to_string(),
            typed: parse_params(ENGINE, ParamRole::Collection, collection_params)?,
            collection_params: collection_params.clone(),
            connection_params: connection_params.clone(),
        }))
    }

    fn uploader(
        &self,
        host: &str,
        connection_params: &Params,
        upload_params: &Params,
    ) -> Result<Box<dyn Uploader>> {
        Ok(Box::new(MemoryUploader {
            server: self.server(),
            host: host.to_string(),
            typed: parse_params(ENGINE, ParamRole::Upload, upload_params)?,
            connection_params: connection_params.clone(),
            upload_params: upload_params.clone(),
        }))
    }

    fn searcher(
        &self,
        host: &str,
        connection_params: &Params,
        search_params: &Params,
    ) -> Result<Box<dyn Searcher>> {
        Ok(Box::new(MemorySearcher {
            server: self.server(),
            host: host.to_string(),
            typed: parse_params(ENGINE, ParamRole::Search, search_params)?,
            connection_params: connection_params.clone(),
            search_params: search_params.clone(),
        }))
    }
}
