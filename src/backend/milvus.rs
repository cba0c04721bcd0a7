//! Milvus over the v2 RESTful API

use super::batch::{reject_batch, upload_in_batches, BatchParams};
use super::http::{id_from_value, poll_interval, ApiKeyStyle, HttpEngine};
use super::EnginePlugin;
use crate::client::{
    CollectionSchema, Configurator, Distance, FieldType, Filter, Query, Record, ScoredPoint,
    Searcher, UploadReport, Uploader,
};
use crate::params::{parse_params, ParamRole, Params};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Engine identifier.
pub const ENGINE: &str = "milvus";
/// Default port (REST and gRPC share it).
pub const DEFAULT_PORT: u16 = 19530;
/// Collection used by every benchmark run.
pub const COLLECTION: &str = "benchmark";

const VARCHAR_MAX: u32 = 65_535;

/// Collection creation options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MilvusCollectionParams {
    /// Index type (`HNSW`, `IVF_FLAT`, ...)
    pub index_type: String,
    /// Index build parameters (`M`, `efConstruction`, `nlist`)
    pub index_params: Params,
    /// Shard count
    pub shards_num: Option<u32>,
}

impl Default for MilvusCollectionParams {
    fn default() -> Self {
        Self {
            index_type: "HNSW".to_string(),
            index_params: Params::new(),
            shards_num: None,
        }
    }
}

/// Upload options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MilvusUploadParams {
    /// Batching
    #[serde(flatten)]
    pub batch: BatchParams,
    /// Load-state poll interval after upload, in milliseconds
    pub poll_interval_ms: u64,
    /// Give up waiting for the load after this many seconds
    pub load_timeout: u64,
}

impl Default for MilvusUploadParams {
    fn default() -> Self {
        Self {
            batch: BatchParams::default(),
            poll_interval_ms: 1000,
            load_timeout: 3600,
        }
    }
}

/// One search variant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MilvusSearchParams {
    /// Forwarded as `searchParams.params` (`ef`, `nprobe`)
    pub params: Params,
    /// Shorthand for `params.ef`
    pub ef: Option<u64>,
    /// Nested form: `{"config": {"ef": 128}}`
    pub config: Params,
}

impl MilvusSearchParams {
    /// The `searchParams.params` section.
    #[must_use]
    pub fn request_params(&self) -> Params {
        let mut params = self.config.clone();
        params.extend(self.params.clone());
        if let Some(ef) = self.ef {
            params.insert("ef".into(), json!(ef));
        }
        params
    }
}

const fn metric_type(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "COSINE",
        Distance::Euclid => "L2",
        Distance::Dot => "IP",
    }
}

fn payload_field(name: &str, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Keyword => json!({
            "fieldName": name,
            "dataType": "VarChar",
            "elementTypeParams": {"max_length": 256},
        }),
        FieldType::Text => json!({
            "fieldName": name,
            "dataType": "VarChar",
            "elementTypeParams": {"max_length": VARCHAR_MAX},
        }),
        FieldType::Int => json!({"fieldName": name, "dataType": "Int64"}),
        FieldType::Float => json!({"fieldName": name, "dataType": "Double"}),
    }
}

/// Collection creation body, including the vector index.
#[must_use]
pub fn create_collection_body(schema: &CollectionSchema, params: &MilvusCollectionParams) -> Value {
    let mut fields = vec![
        json!({"fieldName": "id", "dataType": "Int64", "isPrimary": true}),
        json!({
            "fieldName": "vector",
            "dataType": "FloatVector",
            "elementTypeParams": {"dim": schema.vector_size},
        }),
    ];
    fields.extend(schema.payload.iter().map(|(name, t)| payload_field(name, *t)));

    let mut body = json!({
        "collectionName": COLLECTION,
        "schema": {"autoId": false, "enableDynamicField": false, "fields": fields},
        "indexParams": [{
            "fieldName": "vector",
            "indexName": "vector_index",
            "metricType": metric_type(schema.distance),
            "indexType": params.index_type,
            "params": params.index_params,
        }],
    });
    if let Some(shards) = params.shards_num {
        body["params"] = json!({"shardsNum": shards});
    }
    body
}

fn literal(value: &Value) -> Result<String> {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => Ok(value.to_string()),
        other => Err(Error::InvalidFilter(format!("milvus cannot match on {other}"))),
    }
}

/// Translate a filter into a Milvus boolean expression.
///
/// # Errors
///
/// Returns [`Error::InvalidFilter`] for match values that have no literal form.
pub fn translate_filter(filter: &Filter) -> Result<String> {
    match filter {
        Filter::Match { field, value } => Ok(format!("{field} == {}", literal(value)?)),
        Filter::Range { field, range } => Ok(range
            .bounds()
            .map(|(op, v)| {
                let op = match op {
                    "gt" => ">",
                    "gte" => ">=",
                    "lt" => "<",
                    _ => "<=",
                };
                format!("{field} {op} {v}")
            })
            .collect::<Vec<_>>()
            .join(" and ")),
        Filter::And(filters) | Filter::Or(filters) => {
            let joiner = if matches!(filter, Filter::And(_)) { " and " } else { " or " };
            let parts = filters
                .iter()
                .map(|f| translate_filter(f).map(|expr| format!("({expr})")))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(joiner))
        }
    }
}

/// Search request body.
///
/// # Errors
///
/// Propagates filter translation failures.
pub fn search_body(query: &Query, params: &MilvusSearchParams) -> Result<Value> {
    let mut body = json!({
        "collectionName": COLLECTION,
        "data": [query.vector],
        "annsField": "vector",
        "limit": query.top,
        "outputFields": ["id"],
        "searchParams": {"params": params.request_params()},
    });
    if let Some(filter) = &query.filter {
        body["filter"] = json!(translate_filter(filter)?);
    }
    Ok(body)
}

/// Unwrap the `{code, data, message}` envelope; Milvus reports failures with HTTP 200.
fn check(response: Value) -> Result<Value> {
    match response["code"].as_i64() {
        Some(0) | None => Ok(response["data"].clone()),
        Some(code) => Err(Error::Backend {
            engine: ENGINE.to_string(),
            status: 400,
            body: format!(
                "code {code}: {}",
                response["message"].as_str().unwrap_or_default()
            ),
        }),
    }
}

/// Provisions the `benchmark` collection.
pub struct MilvusConfigurator {
    transport: HttpEngine,
    typed: MilvusCollectionParams,
    collection_params: Params,
    connection_params: Params,
}

#[async_trait]
impl Configurator for MilvusConfigurator {
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
        let body = json!({"collectionName": COLLECTION});
        // Dropping a missing collection succeeds in Milvus.
        check(
            self.transport
                .json(Method::POST, "v2/vectordb/collections/drop", Some(&body))
                .await?,
        )?;
        Ok(())
    }

    async fn recreate(&self, schema: &CollectionSchema) -> Result<()> {
        let body = create_collection_body(schema, &self.typed);
        check(
            self.transport
                .json(Method::POST, "v2/vectordb/collections/create", Some(&body))
                .await?,
        )?;
        info!(engine = ENGINE, dim = schema.vector_size, "collection created");
        Ok(())
    }
}

/// Inserts entities in batches.
pub struct MilvusUploader {
    transport: HttpEngine,
    typed: MilvusUploadParams,
    poll_interval: Duration,
    connection_params: Params,
    upload_params: Params,
}

#[async_trait]
impl Uploader for MilvusUploader {
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
        upload_in_batches(ENGINE, records, self.typed.batch, |offset, batch| {
            let transport = self.transport.clone();
            async move {
                let data: Vec<Value> = batch
                    .iter()
                    .map(|r| {
                        let mut entity = r.payload.clone().unwrap_or_default();
                        entity.insert("id".into(), json!(r.id));
                        entity.insert("vector".into(), json!(r.vector));
                        Value::Object(entity)
                    })
                    .collect();
                let body = json!({"collectionName": COLLECTION, "data": data});
                transport
                    .json(Method::POST, "v2/vectordb/entities/insert", Some(&body))
                    .await
                    .and_then(check)
                    .map(drop)
                    .map_err(|e| reject_batch(e, offset, batch.len()))
            }
        })
        .await
    }

    async fn post_upload(&self) -> Result<()> {
        let body = json!({"collectionName": COLLECTION});
        check(
            self.transport
                .json(Method::POST, "v2/vectordb/collections/load", Some(&body))
                .await?,
        )?;
        let started = Instant::now();
        let deadline = Duration::from_secs(self.typed.load_timeout);
        loop {
            let state = check(
                self.transport
                    .json(Method::POST, "v2/vectordb/collections/get_load_state", Some(&body))
                    .await?,
            )?;
            let state = state["loadState"].as_str().unwrap_or_default();
            if state == "LoadStateLoaded" {
                debug!(engine = ENGINE, elapsed = ?started.elapsed(), "collection loaded");
                return Ok(());
            }
            if started.elapsed() >= deadline {
                return Err(Error::Backend {
                    engine: ENGINE.to_string(),
                    status: 0,
                    body: format!("collection still {state:?} after {deadline:?}"),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// Searches under one variant.
pub struct MilvusSearcher {
    transport: HttpEngine,
    typed: MilvusSearchParams,
    connection_params: Params,
    search_params: Params,
}

#[async_trait]
impl Searcher for MilvusSearcher {
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
        let body = search_body(query, &self.typed)?;
        let data = check(
            self.transport
                .json(Method::POST, "v2/vectordb/entities/search", Some(&body))
                .await?,
        )?;
        data.as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|hit| {
                Ok(ScoredPoint {
                    id: id_from_value(ENGINE, &hit["id"])?,
                    score: hit["distance"].as_f64().unwrap_or_default() as f32,
                })
            })
            .collect()
    }
}

/// Registers the Milvus collaborators.
#[derive(Debug, Default, Clone, Copy)]
pub struct MilvusPlugin;

impl EnginePlugin for MilvusPlugin {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> Result<Box<dyn Configurator>> {
        Ok(Box::new(MilvusConfigurator {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::Bearer,
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
        let typed: MilvusUploadParams = parse_params(ENGINE, ParamRole::Upload, upload_params)?;
        Ok(Box::new(MilvusUploader {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::Bearer,
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
        Ok(Box::new(MilvusSearcher {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::Bearer,
            )?,
            typed: parse_params(ENGINE, ParamRole::Search, search_params)?,
            connection_params: connection_params.clone(),
            search_params: search_params.clone(),
        }))
    }
}
