//! Weaviate over REST (schema, batch) and GraphQL (search)

use super::batch::{reject_batch, upload_in_batches, BatchParams};
use super::http::{ApiKeyStyle, HttpEngine};
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
use tracing::{debug, info};
use uuid::Uuid;

/// Engine identifier.
pub const ENGINE: &str = "weaviate";
/// Default REST port.
pub const DEFAULT_PORT: u16 = 8090;
/// Class used by every benchmark run.
pub const CLASS: &str = "Benchmark";

/// Class creation options.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeaviateCollectionParams {
    /// HNSW options (`efConstruction`, `maxConnections`, ...)
    #[serde(rename = "vectorIndexConfig", alias = "vector_index_config")]
    pub vector_index_config: Params,
}

/// One search variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeaviateSearchParams {
    /// Query-time HNSW `ef`
    pub ef: Option<i64>,
    /// Nested form: `{"config": {"ef": 128}}`
    pub config: WeaviateSearchConfig,
}

/// Nested `config` section of [`WeaviateSearchParams`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WeaviateSearchConfig {
    /// Query-time HNSW `ef`
    pub ef: Option<i64>,
}

/// Point id as a Weaviate object UUID.
#[must_use]
pub fn object_id(id: u64) -> Uuid {
    Uuid::from_u128(u128::from(id))
}

/// Point id back from an object UUID.
///
/// # Errors
///
/// Returns [`Error::Backend`] for UUIDs not produced by [`object_id`].
pub fn point_id(uuid: &str) -> Result<u64> {
    Uuid::parse_str(uuid)
        .ok()
        .and_then(|u| u64::try_from(u.as_u128()).ok())
        .ok_or_else(|| Error::Backend {
            engine: ENGINE.to_string(),
            status: 0,
            body: format!("unexpected object id {uuid:?}"),
        })
}

const fn distance_name(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "cosine",
        Distance::Euclid => "l2-squared",
        Distance::Dot => "dot",
    }
}

fn property(name: &str, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Keyword => json!({"name": name, "dataType": ["text"], "tokenization": "field"}),
        FieldType::Int => json!({"name": name, "dataType": ["int"]}),
        FieldType::Float => json!({"name": name, "dataType": ["number"]}),
        FieldType::Text => json!({"name": name, "dataType": ["text"]}),
    }
}

/// Class creation body.
#[must_use]
pub fn create_class_body(schema: &CollectionSchema, params: &WeaviateCollectionParams) -> Value {
    let mut index_config = Params::new();
    index_config.insert("distance".into(), json!(distance_name(schema.distance)));
    merge_into(&mut index_config, &params.vector_index_config);
    json!({
        "class": CLASS,
        "vectorizer": "none",
        "vectorIndexType": "hnsw",
        "vectorIndexConfig": index_config,
        "properties": schema
            .payload
            .iter()
            .map(|(name, field_type)| property(name, *field_type))
            .collect::<Vec<_>>(),
    })
}

fn graphql_value(value: &Value) -> Result<String> {
    let (key, literal) = match value {
        Value::String(s) => ("valueText", serde_json::to_string(s)?),
        Value::Bool(b) => ("valueBoolean", b.to_string()),
        Value::Number(n) if n.is_i64() || n.is_u64() => ("valueInt", n.to_string()),
        Value::Number(n) => ("valueNumber", n.to_string()),
        other => return Err(Error::InvalidFilter(format!("weaviate cannot match on {other}"))),
    };
    Ok(format!("{key}: {literal}"))
}

/// Translate a filter into a GraphQL `where` argument.
///
/// # Errors
///
/// Returns [`Error::InvalidFilter`] for match values Weaviate cannot compare.
pub fn translate_filter(filter: &Filter) -> Result<String> {
    match filter {
        Filter::Match { field, value } => Ok(format!(
            "{{path: [{}], operator: Equal, {}}}",
            serde_json::to_string(field)?,
            graphql_value(value)?
        )),
        Filter::Range { field, range } => {
            let path = serde_json::to_string(field)?;
            let operands: Vec<String> = range
                .bounds()
                .map(|(op, v)| {
                    let operator = match op {
                        "gt" => "GreaterThan",
                        "gte" => "GreaterThanEqual",
                        "lt" => "LessThan",
                        _ => "LessThanEqual",
                    };
                    format!("{{path: [{path}], operator: {operator}, valueNumber: {v}}}")
                })
                .collect();
            Ok(format!("{{operator: And, operands: [{}]}}", operands.join(", ")))
        }
        Filter::And(filters) | Filter::Or(filters) => {
            let operator = if matches!(filter, Filter::And(_)) { "And" } else { "Or" };
            let operands = filters.iter().map(translate_filter).collect::<Result<Vec<_>>>()?;
            Ok(format!("{{operator: {operator}, operands: [{}]}}", operands.join(", ")))
        }
    }
}

/// GraphQL `nearVector` query.
///
/// # Errors
///
/// Propagates filter translation failures.
pub fn search_query(query: &Query) -> Result<String> {
    let mut arguments = format!(
        "nearVector: {{vector: {}}}, limit: {}",
        serde_json::to_string(&query.vector)?,
        query.top
    );
    if let Some(filter) = &query.filter {
        arguments.push_str(", where: ");
        arguments.push_str(&translate_filter(filter)?);
    }
    Ok(format!("{{ Get {{ {CLASS}({arguments}) {{ _additional {{ id distance }} }} }} }}"))
}

/// Indices (shifted by `offset`) and reasons of rejected batch objects.
#[must_use]
pub fn batch_failures(response: &Value, offset: usize) -> Vec<(usize, String)> {
    response
        .as_array()
        .map(|objects| {
            objects
                .iter()
                .enumerate()
                .filter_map(|(i, object)| {
                    let errors = object["result"]["errors"]["error"].as_array()?;
                    let reason = errors.first()?["message"]
                        .as_str()
                        .unwrap_or("rejected")
                        .to_string();
                    Some((offset + i, reason))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Provisions the `Benchmark` class.
pub struct WeaviateConfigurator {
    transport: HttpEngine,
    typed: WeaviateCollectionParams,
    collection_params: Params,
    connection_params: Params,
}

#[async_trait]
impl Configurator for WeaviateConfigurator {
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
            .json_allow_missing(Method::DELETE, &format!("v1/schema/{CLASS}"), None)
            .await?;
        Ok(())
    }

    async fn recreate(&self, schema: &CollectionSchema) -> Result<()> {
        let body = create_class_body(schema, &self.typed);
        self.transport.json(Method::POST, "v1/schema", Some(&body)).await?;
        info!(engine = ENGINE, dim = schema.vector_size, "class created");
        Ok(())
    }
}

/// Sends batch object imports.
pub struct WeaviateUploader {
    transport: HttpEngine,
    typed: BatchParams,
    connection_params: Params,
    upload_params: Params,
}

#[async_trait]
impl Uploader for WeaviateUploader {
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
            async move {
                let objects: Vec<Value> = batch
                    .iter()
                    .map(|r| {
                        json!({
                            "class": CLASS,
                            "id": object_id(r.id).to_string(),
                            "vector": r.vector,
                            "properties": r.payload.clone().unwrap_or_default(),
                        })
                    })
                    .collect();
                let response = transport
                    .json(Method::POST, "v1/batch/objects", Some(&json!({ "objects": objects })))
                    .await
                    .map_err(|e| reject_batch(e, offset, batch.len()))?;
                let failures = batch_failures(&response, offset);
                match failures.first() {
                    None => Ok(()),
                    Some((_, reason)) => Err(Error::PartialUpload {
                        engine: ENGINE.to_string(),
                        reason: reason.clone(),
                        failed: failures.iter().map(|(i, _)| *i).collect(),
                    }),
                }
            }
        })
        .await
    }
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Option<Value>,
}

/// Searches under one variant.
pub struct WeaviateSearcher {
    transport: HttpEngine,
    typed: WeaviateSearchParams,
    connection_params: Params,
    search_params: Params,
}

#[async_trait]
impl Searcher for WeaviateSearcher {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn connection_params(&self) -> &Params {
        &self.connection_params
    }

    fn search_params(&self) -> &Params {
        &self.search_params
    }

    async fn setup(&self) -> Result<()> {
        let Some(ef) = self.typed.ef.or(self.typed.config.ef) else {
            return Ok(());
        };
        let path = format!("v1/schema/{CLASS}");
        let mut class = self.transport.json(Method::GET, &path, None).await?;
        class["vectorIndexConfig"]["ef"] = json!(ef);
        self.transport.json(Method::PUT, &path, Some(&class)).await?;
        debug!(engine = ENGINE, ef, "ef applied");
        Ok(())
    }

    async fn search(&self, query: &Query) -> Result<Vec<ScoredPoint>> {
        let body = json!({ "query": search_query(query)? });
        let raw = self
            .transport
            .json(Method::POST, "v1/graphql", Some(&body))
            .await?;
        let response: GraphQlResponse = serde_json::from_value(raw)?;
        if let Some(errors) = response.errors {
            return Err(Error::Backend {
                engine: ENGINE.to_string(),
                status: 200,
                body: errors.to_string(),
            });
        }
        let data = response.data.unwrap_or_default();
        data["Get"][CLASS]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|hit| {
                let additional = &hit["_additional"];
                Ok(ScoredPoint {
                    id: point_id(additional["id"].as_str().unwrap_or_default())?,
                    score: additional["distance"].as_f64().unwrap_or_default() as f32,
                })
            })
            .collect()
    }
}

/// Registers the Weaviate collaborators.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeaviatePlugin;

impl EnginePlugin for WeaviatePlugin {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> Result<Box<dyn Configurator>> {
        Ok(Box::new(WeaviateConfigurator {
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
        Ok(Box::new(WeaviateUploader {
            transport: HttpEngine::connect(
                ENGINE,
                host,
                DEFAULT_PORT,
                connection_params,
                ApiKeyStyle::Bearer,
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
        Ok(Box::new(WeaviateSearcher {
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
