//! Elasticsearch dense-vector kNN
//!
//! The bulk NDJSON codec and the bool-query filter translation are shared with
//! the OpenSearch plugin.

use super::batch::{reject_batch, upload_in_batches, BatchParams};
use super::http::{id_from_value, ApiKeyStyle, HttpEngine};
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
use std::time::Instant;
use tracing::{debug, info};

/// Engine identifier.
pub const ENGINE: &str = "elastic";
/// Default REST port.
pub const DEFAULT_PORT: u16 = 9200;
/// Index used by every benchmark run.
pub const INDEX: &str = "bench";
/// Document field holding the embedding.
pub const VECTOR_FIELD: &str = "vector";

/// Index creation options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElasticCollectionParams {
    /// Primary shards
    pub number_of_shards: u32,
    /// Replicas
    pub number_of_replicas: u32,
    /// Refresh interval while loading
    pub refresh_interval: String,
    /// HNSW options of the vector field (`m`, `ef_construction`)
    pub index_options: Params,
    /// Extra index settings, merged last
    pub settings: Params,
}

impl Default for ElasticCollectionParams {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 0,
            refresh_interval: "-1".to_string(),
            index_options: Params::new(),
            settings: Params::new(),
        }
    }
}

/// One search variant.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElasticSearchParams {
    /// Candidate pool per shard
    pub num_candidates: Option<usize>,
    /// Nested form used by benchmark configs: `{"config": {"num_candidates": 128}}`
    pub config: ElasticSearchConfig,
    /// Engine-neutral alias of `num_candidates`
    pub ef: Option<usize>,
}

/// Nested `config` section of [`ElasticSearchParams`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElasticSearchConfig {
    /// Candidate pool per shard
    pub num_candidates: Option<usize>,
}

impl ElasticSearchParams {
    /// Candidate pool for a query returning `top` hits; never below `top`.
    #[must_use]
    pub fn candidates(&self, top: usize) -> usize {
        self.num_candidates
            .or(self.config.num_candidates)
            .or(self.ef)
            .unwrap_or(100)
            .max(top)
    }
}

const fn similarity(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "cosine",
        Distance::Euclid => "l2_norm",
        Distance::Dot => "dot_product",
    }
}

/// Field mapping type shared by Elasticsearch and OpenSearch.
pub(crate) const fn field_mapping(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Keyword => "keyword",
        FieldType::Int => "long",
        FieldType::Float => "double",
        FieldType::Text => "text",
    }
}

/// Payload properties of an index mapping.
pub(crate) fn payload_properties(schema: &CollectionSchema) -> Params {
    schema
        .payload
        .iter()
        .map(|(name, field_type)| (name.clone(), json!({"type": field_mapping(*field_type)})))
        .collect()
}

/// Index creation body.
#[must_use]
pub fn create_index_body(schema: &CollectionSchema, params: &ElasticCollectionParams) -> Value {
    let mut index_options = Params::new();
    index_options.insert("type".into(), json!("hnsw"));
    merge_into(&mut index_options, &params.index_options);

    let mut properties = payload_properties(schema);
    properties.insert(
        VECTOR_FIELD.into(),
        json!({
            "type": "dense_vector",
            "dims": schema.vector_size,
            "index": true,
            "similarity": similarity(schema.distance),
            "index_options": index_options,
        }),
    );

    let mut settings = json!({
        "index": {
            "number_of_shards": params.number_of_shards,
            "number_of_replicas": params.number_of_replicas,
            "refresh_interval": params.refresh_interval,
        }
    })
    .as_object()
    .cloned()
    .unwrap_or_default();
    merge_into(&mut settings, &params.settings);

    json!({
        "settings": settings,
        "mappings": {
            "_source": {"excludes": [VECTOR_FIELD]},
            "properties": properties,
        }
    })
}

/// Translate a filter into a query-DSL clause.
#[must_use]
pub fn translate_filter(filter: &Filter) -> Value {
    match filter {
        Filter::Match { field, value } => json!({"term": {field.as_str(): value}}),
        Filter::Range { field, range } => {
            let bounds: Params = range.bounds().map(|(op, v)| (op.to_string(), json!(v))).collect();
            json!({"range": {field.as_str(): bounds}})
        }
        Filter::And(filters) => json!({
            "bool": {
                "must": filters.iter().map(translate_filter).collect::<Vec<_>>(),
            }
        }),
        Filter::Or(filters) => json!({
            "bool": {
                "should": filters.iter().map(translate_filter).collect::<Vec<_>>(),
                "minimum_should_match": 1,
            }
        }),
    }
}

/// kNN search body.
#[must_use]
pub fn search_body(query: &Query, params: &ElasticSearchParams) -> Value {
    let mut knn = json!({
        "field": VECTOR_FIELD,
        "query_vector": query.vector,
        "k": query.top,
        "num_candidates": params.candidates(query.top),
    });
    if let Some(filter) = &query.filter {
        knn["filter"] = translate_filter(filter);
    }
    json!({
        "knn": knn,
        "size": query.top,
        "_source": false,
        "stored_fields": "_none_",
    })
}

/// Encode records as a `_bulk` index request.
#[must_use]
pub fn bulk_body(index: &str, records: &[Record]) -> String {
    let mut body = String::new();
    for record in records {
        let mut doc = record.payload.clone().unwrap_or_default();
        doc.insert(VECTOR_FIELD.into(), json!(record.vector));
        let action = json!({"index": {"_index": index, "_id": record.id.to_string()}});
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&Value::Object(doc).to_string());
        body.push('\n');
    }
    body
}

/// Indices (shifted by `offset`) and reasons of the items a `_bulk` response rejected.
#[must_use]
pub fn bulk_failures(response: &Value, offset: usize) -> Vec<(usize, String)> {
    if !response["errors"].as_bool().unwrap_or(false) {
        return Vec::new();
    }
    response["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| {
                    let outcome = item.as_object()?.values().next()?;
                    let error = outcome.get("error")?;
                    let reason = error["reason"]
                        .as_str()
                        .map_or_else(|| error.to_string(), str::to_string);
                    Some((offset + i, reason))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Send one bulk batch, reporting per-item failures.
pub(crate) async fn send_bulk(
    transport: &HttpEngine,
    index: &str,
    offset: usize,
    batch: &[Record],
) -> Result<()> {
    let response = transport
        .ndjson(&format!("{index}/_bulk"), bulk_body(index, batch))
        .await
        .map_err(|e| reject_batch(e, offset, batch.len()))?;
    let failures = bulk_failures(&response, offset);
    match failures.first() {
        None => Ok(()),
        Some((_, reason)) => Err(Error::PartialUpload {
            engine: transport.engine().to_string(),
            reason: reason.clone(),
            failed: failures.iter().map(|(i, _)| *i).collect(),
        }),
    }
}

#[derive(Deserialize)]
pub(crate) struct SearchResponse {
    pub(crate) hits: Hits,
}

#[derive(Deserialize)]
pub(crate) struct Hits {
    pub(crate) hits: Vec<Hit>,
}

#[derive(Deserialize)]
pub(crate) struct Hit {
    #[serde(rename = "_id")]
    pub(crate) id: Value,
    #[serde(rename = "_score")]
    pub(crate) score: f32,
}

/// Decode the hits of a `_search` response.
pub(crate) fn parse_hits(engine: &str, response: Value) -> Result<Vec<ScoredPoint>> {
    let response: SearchResponse = serde_json::from_value(response)?;
    response
        .hits
        .hits
        .into_iter()
        .map(|hit| {
            Ok(ScoredPoint {
                id: id_from_value(engine, &hit.id)?,
                score: hit.score,
            })
        })
        .collect()
}

/// Provisions the `bench` index.
pub struct ElasticConfigurator {
    transport: HttpEngine,
    typed: ElasticCollectionParams,
    collection_params: Params,
    connection_params: Params,
}

#[async_trait]
impl Configurator for ElasticConfigurator {
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
        self.transport.json_allow_missing(Method::DELETE, INDEX, None).await?;
        Ok(())
    }

    async fn recreate(&self, schema: &CollectionSchema) -> Result<()> {
        let body = create_index_body(schema, &self.typed);
        self.transport.json(Method::PUT, INDEX, Some(&body)).await?;
        info!(engine = ENGINE, dim = schema.vector_size, "index created");
        Ok(())
    }
}

/// Bulk-indexes documents.
pub struct ElasticUploader {
    transport: HttpEngine,
    typed: BatchParams,
    connection_params: Params,
    upload_params: Params,
}

#[async_trait]
impl Uploader for ElasticUploader {
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
        upload_in_batches(ENGINE, records, self.typed, |offset, batch| {
            let transport = self.transport.clone();
            async move { send_bulk(&transport, INDEX, offset, &batch).await }
        })
        .await
    }

    async fn post_upload(&self) -> Result<()> {
        let started = Instant::now();
        self.transport
            .json(
                Method::POST,
                &format!("{INDEX}/_forcemerge?max_num_segments=1&wait_for_completion=true"),
                None,
            )
            .await?;
        self.transport.json(Method::POST, &format!("{INDEX}/_refresh"), None).await?;
        debug!(engine = ENGINE, elapsed = ?started.elapsed(), "index merged");
        Ok(())
    }
}

/// Searches under one variant.
pub struct ElasticSearcher {
    transport: HttpEngine,
    typed: ElasticSearchParams,
    connection_params: Params,
    search_params: Params,
}

#[async_trait]
impl Searcher for ElasticSearcher {
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
            .json(Method::POST, &format!("{INDEX}/_search"), Some(&body))
            .await?;
        parse_hits(ENGINE, response)
    }
}

/// Registers the Elasticsearch collaborators.
#[derive(Debug, Default, Clone, Copy)]
pub struct ElasticPlugin;

impl EnginePlugin for ElasticPlugin {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> Result<Box<dyn Configurator>> {
        Ok(Box::new(ElasticConfigurator {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::ApiKey,
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
        Ok(Box::new(ElasticUploader {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::ApiKey,
            )?,
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
        Ok(Box::new(ElasticSearcher {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::ApiKey,
            )?,
            typed: parse_params(ENGINE, ParamRole::Search, search_params)?,
            connection_params: connection_params.clone(),
            search_params: search_params.clone(),
        }))
    }
}
