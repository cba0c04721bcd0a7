//! Qdrant over its REST API

use super::batch::{reject_batch, upload_in_batches, BatchParams};
use super::http::{id_from_value, poll_interval, ApiKeyStyle, HttpEngine};
use super::EnginePlugin;
use crate::client::{
    CollectionSchema, Configurator, Distance, FieldType, Filter, Query, Record, ScoredPoint,
    Searcher, UploadReport, Uploader,
};
use crate::params::{merge_into, parse_params, ParamRole, Params};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Engine identifier.
pub const ENGINE: &str = "qdrant";
/// Default REST port.
pub const DEFAULT_PORT: u16 = 6333;
/// Collection used by every benchmark run.
pub const COLLECTION: &str = "benchmark";

/// Collection creation options.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QdrantCollectionParams {
    /// Merged into the `vectors` section (e.g. `on_disk`)
    pub vectors_config: Params,
    /// HNSW graph options (`m`, `ef_construct`, ...)
    pub hnsw_config: Option<Value>,
    /// Optimizer options
    pub optimizers_config: Option<Value>,
    /// Quantization options
    pub quantization_config: Option<Value>,
    /// Remaining top-level collection options, forwarded verbatim
    #[serde(flatten)]
    pub extra: Params,
}

/// Upload options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QdrantUploadParams {
    /// Batching
    #[serde(flatten)]
    pub batch: BatchParams,
    /// Block each batch until it is persisted
    pub wait: bool,
    /// Collection status poll interval after upload, in milliseconds
    pub poll_interval_ms: u64,
    /// Give up waiting for indexing after this many seconds
    pub indexing_timeout: u64,
}

impl Default for QdrantUploadParams {
    fn default() -> Self {
        Self {
            batch: BatchParams::default(),
            wait: true,
            poll_interval_ms: 1000,
            indexing_timeout: 3600,
        }
    }
}

/// One search variant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QdrantSearchParams {
    /// Forwarded as the request's `params` section
    pub config: Params,
    /// Shorthand for `config.hnsw_ef`
    pub hnsw_ef: Option<u64>,
    /// Engine-neutral spelling of `hnsw_ef`
    pub ef: Option<u64>,
    /// Shorthand for `config.exact`
    pub exact: Option<bool>,
    /// Keys interpreted elsewhere (`parallel`) or ignored
    #[serde(flatten)]
    pub extra: Params,
}

impl QdrantSearchParams {
    /// The request `params` section.
    #[must_use]
    pub fn request_params(&self) -> Params {
        let mut params = self.config.clone();
        if let Some(ef) = self.hnsw_ef.or(self.ef) {
            params.insert("hnsw_ef".into(), json!(ef));
        }
        if let Some(exact) = self.exact {
            params.insert("exact".into(), json!(exact));
        }
        params
    }
}

const fn distance_name(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "Cosine",
        Distance::Euclid => "Euclid",
        Distance::Dot => "Dot",
    }
}

const fn field_schema(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Keyword => "keyword",
        FieldType::Int => "integer",
        FieldType::Float => "float",
        FieldType::Text => "text",
    }
}

/// Collection creation body.
#[must_use]
pub fn create_collection_body(schema: &CollectionSchema, params: &QdrantCollectionParams) -> Value {
    let mut vectors = Params::new();
    vectors.insert("size".into(), json!(schema.vector_size));
    vectors.insert("distance".into(), json!(distance_name(schema.distance)));
    merge_into(&mut vectors, &params.vectors_config);

    let mut body = params.extra.clone();
    body.insert("vectors".into(), Value::Object(vectors));
    for (key, section) in [
        ("hnsw_config", &params.hnsw_config),
        ("optimizers_config", &params.optimizers_config),
        ("quantization_config", &params.quantization_config),
    ] {
        if let Some(section) = section {
            body.insert(key.into(), section.clone());
        }
    }
    Value::Object(body)
}

fn condition(filter: &Filter) -> Value {
    match filter {
        Filter::Match { field, value } => json!({"key": field, "match": {"value": value}}),
        Filter::Range { field, range } => {
            let bounds: Params = range.bounds().map(|(op, v)| (op.to_string(), json!(v))).collect();
            json!({"key": field, "range": bounds})
        }
        Filter::And(filters) => json!({"must": filters.iter().map(condition).collect::<Vec<_>>()}),
        Filter::Or(filters) => json!({"should": filters.iter().map(condition).collect::<Vec<_>>()}),
    }
}

/// Translate a filter into Qdrant's `filter` object.
#[must_use]
pub fn translate_filter(filter: &Filter) -> Value {
    match filter {
        Filter::And(_) | Filter::Or(_) => condition(filter),
        leaf => json!({"must": [condition(leaf)]}),
    }
}

/// Search request body.
#[must_use]
pub fn search_body(query: &Query, params: &QdrantSearchParams) -> Value {
    let mut body = json!({
        "vector": query.vector,
        "limit": query.top,
        "with_payload": false,
        "params": params.request_params(),
    });
    if let Some(filter) = &query.filter {
        body["filter"] = translate_filter(filter);
    }
    body
}

/// Provisions the `benchmark` collection.
pub struct QdrantConfigurator {
    transport: HttpEngine,
    typed: QdrantCollectionParams,
    collection_params: Params,
    connection_params: Params,
}

#[async_trait]
impl Configurator for QdrantConfigurator {
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
        self.transport
            .json_allow_missing(Method::DELETE, &format!("collections/{COLLECTION}"), None)
            .await?;
        Ok(())
    }

    async fn recreate(&self, schema: &CollectionSchema) -> Result<()> {
        let body = create_collection_body(schema, &self.typed);
        self.transport
            .json(Method::PUT, &format!("collections/{COLLECTION}"), Some(&body))
            .await?;
        for (field, field_type) in &schema.payload {
            let index = json!({"field_name": field, "field_schema": field_schema(*field_type)});
            let path = format!("collections/{COLLECTION}/index?wait=true");
            self.transport.json(Method::PUT, &path, Some(&index)).await?;
        }
        info!(engine = ENGINE, dim = schema.vector_size, "collection created");
        Ok(())
    }
}

/// Upserts points in batches.
pub struct QdrantUploader {
    transport: HttpEngine,
    typed: QdrantUploadParams,
    poll_interval: Duration,
    connection_params: Params,
    upload_params: Params,
}

#[async_trait]
impl Uploader for QdrantUploader {
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
        let path = format!("collections/{COLLECTION}/points?wait={}", self.typed.wait);
        upload_in_batches(ENGINE, records, self.typed.batch, |offset, batch| {
            let transport = self.transport.clone();
            let path = path.clone();
            async move {
                let points: Vec<Value> = batch
                    .iter()
                    .map(|r| {
                        json!({
                            "id": r.id,
                            "vector": r.vector,
                            "payload": r.payload.clone().unwrap_or_default(),
                        })
                    })
                    .collect();
                transport
                    .json(Method::PUT, &path, Some(&json!({ "points": points })))
                    .await
                    .map(drop)
                    .map_err(|e| reject_batch(e, offset, batch.len()))
            }
        })
        .await
    }

    async fn post_upload(&self) -> Result<()> {
        let started = Instant::now();
        let deadline = Duration::from_secs(self.typed.indexing_timeout);
        loop {
            let info = self
                .transport
                .json(Method::GET, &format!("collections/{COLLECTION}"), None)
                .await?;
            let status = info["result"]["status"].as_str().unwrap_or_default();
            if status == "green" {
                debug!(engine = ENGINE, elapsed = ?started.elapsed(), "collection green");
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(Error::Backend {
                    engine: ENGINE.to_string(),
                    status: 0,
                    body: format!("collection still {status:?} after {deadline:?}"),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    id: Value,
    score: f32,
}

/// Searches under one variant.
pub struct QdrantSearcher {
    transport: HttpEngine,
    typed: QdrantSearchParams,
    connection_params: Params,
    search_params: Params,
}

#[async_trait]
impl Searcher for QdrantSearcher {
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
        let body = search_body(query, &self.typed);
        let response = self
            .transport
            .json(Method::POST, &format!("collections/{COLLECTION}/points/search"), Some(&body))
            .await?;
        let response: SearchResponse = serde_json::from_value(response)?;
        response
            .result
            .into_iter()
            .map(|hit| {
                Ok(ScoredPoint {
                    id: id_from_value(ENGINE, &hit.id)?,
                    score: hit.score,
                })
            })
            .collect()
    }
}

/// Registers the Qdrant collaborators.
#[derive(Debug, Default, Clone, Copy)]
pub struct QdrantPlugin;

impl EnginePlugin for QdrantPlugin {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> Result<Box<dyn Configurator>> {
        Ok(Box::new(QdrantConfigurator {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::Header,
            )?,
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
        let typed: QdrantUploadParams = parse_params(ENGINE, ParamRole::Upload, upload_params)?;
        Ok(Box::new(QdrantUploader {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::Header,
            )?,
            poll_interval: poll_interval(ENGINE, typed.poll_interval_ms)?,
            typed,
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
        Ok(Box::new(QdrantSearcher {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::Header,
            )?,
            typed: parse_params(ENGINE, ParamRole::Search, search_params)?,
            connection_params: connection_params.clone(),
            search_params: search_params.clone(),
        }))
    }
}
