//! OpenSearch k-NN plugin

use super::batch::{upload_in_batches, BatchParams};
use super::elastic::{parse_hits, payload_properties, send_bulk, translate_filter, VECTOR_FIELD};
use super::http::{ApiKeyStyle, HttpEngine};
use super::EnginePlugin;
use crate::client::{
    CollectionSchema, Configurator, Distance, Query, Record, ScoredPoint, Searcher, UploadReport,
    Uploader,
};
use crate::params::{merge_into, parse_params, ParamRole, Params};
use crate::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Engine identifier.
pub const ENGINE: &str = "opensearch";
/// Default REST port.
pub const DEFAULT_PORT: u16 = 9200;
/// Index used by every benchmark run.
pub const INDEX: &str = "bench";

/// Index creation options.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OpenSearchCollectionParams {
    /// Primary shards
    pub number_of_shards: u32,
    /// Replicas
    pub number_of_replicas: u32,
    /// Refresh interval while loading
    pub refresh_interval: String,
    /// k-NN library (`lucene`, `faiss`, `nmslib`)
    pub engine: String,
    /// HNSW parameters (`m`, `ef_construction`)
    pub method: Params,
    /// Extra index settings, merged last
    pub settings: Params,
}

impl Default for OpenSearchCollectionParams {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 0,
            refresh_interval: "-1".to_string(),
            engine: "lucene".to_string(),
            method: Params::new(),
            settings: Params::new(),
        }
    }
}

/// One search variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenSearchSearchParams {
    /// `index.knn.algo_param.ef_search`
    pub ef_search: Option<usize>,
    /// Engine-neutral alias of `ef_search`
    pub ef: Option<usize>,
    /// Nested form: `{"config": {"ef_search": 128}}`
    pub config: OpenSearchSearchConfig,
}

/// Nested `config` section of [`OpenSearchSearchParams`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OpenSearchSearchConfig {
    /// `index.knn.algo_param.ef_search`
    pub ef_search: Option<usize>,
}

impl OpenSearchSearchParams {
    /// Effective `ef_search`, if the variant sets one.
    #[must_use]
    pub const fn effective_ef(&self) -> Option<usize> {
        match (self.ef_search, self.config.ef_search, self.ef) {
            (Some(ef), _, _) | (None, Some(ef), _) | (None, None, Some(ef)) => Some(ef),
            (None, None, None) => None,
        }
    }
}

const fn space_type(distance: Distance) -> &'static str {
    match distance {
        Distance::Cosine => "cosinesimil",
        Distance::Euclid => "l2",
        Distance::Dot => "innerproduct",
    }
}

/// Index creation body.
#[must_use]
pub fn create_index_body(schema: &CollectionSchema, params: &OpenSearchCollectionParams) -> Value {
    let mut properties = payload_properties(schema);
    properties.insert(
        VECTOR_FIELD.into(),
        json!({
            "type": "knn_vector",
            "dimension": schema.vector_size,
            "method": {
                "name": "hnsw",
                "engine": params.engine,
                "space_type": space_type(schema.distance),
                "parameters": params.method,
            }
        }),
    );

    let mut settings = json!({
        "index": {
            "knn": true,
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
        "mappings": {"properties": properties},
    })
}

/// k-NN search body.
#[must_use]
pub fn search_body(query: &Query) -> Value {
    let mut knn = json!({"vector": query.vector, "k": query.top});
    if let Some(filter) = &query.filter {
        knn["filter"] = translate_filter(filter);
    }
    json!({
        "size": query.top,
        "_source": false,
        "query": {"knn": {VECTOR_FIELD: knn}},
    })
}

/// Provisions the `bench` k-NN index.
pub struct OpenSearchConfigurator {
    transport: HttpEngine,
    typed: OpenSearchCollectionParams,
    collection_params: Params,
    connection_params: Params,
}

#[async_trait]
impl Configurator for OpenSearchConfigurator {
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
pub struct OpenSearchUploader {
    transport: HttpEngine,
    typed: BatchParams,
    connection_params: Params,
    upload_params: Params,
}

#[async_trait]
impl Uploader for OpenSearchUploader {
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
        self.transport
            .json(
                Method::POST,
                &format!("{INDEX}/_forcemerge?max_num_segments=1&wait_for_completion=true"),
                None,
            )
            .await?;
        self.transport.json(Method::POST, &format!("{INDEX}/_refresh"), None).await?;
        Ok(())
    }
}

/// Searches under one variant.
pub struct OpenSearchSearcher {
    transport: HttpEngine,
    typed: OpenSearchSearchParams,
    connection_params: Params,
    search_params: Params,
}

#[async_trait]
impl Searcher for OpenSearchSearcher {
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
        if let Some(ef) = self.typed.effective_ef() {
            let body = json!({"index": {"knn.algo_param.ef_search": ef}});
            self.transport
                .json(Method::PUT, &format!("{INDEX}/_settings"), Some(&body))
                .await?;
            debug!(engine = ENGINE, ef, "ef_search applied");
        }
        Ok(())
    }

    async fn search(&self, query: &Query) -> Result<Vec<ScoredPoint>> {
        let response = self
            .transport
            .json(Method::POST, &format!("{INDEX}/_search"), Some(&search_body(query)))
            .await?;
        parse_hits(ENGINE, response)
    }
}

/// Registers the OpenSearch collaborators.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenSearchPlugin;

impl EnginePlugin for OpenSearchPlugin {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> Result<Box<dyn Configurator>> {
        Ok(Box::new(OpenSearchConfigurator {
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
        Ok(Box::new(OpenSearchUploader {
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
        Ok(Box::new(OpenSearchSearcher {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Filter;
    use crate::params::params_from;

    #[test]
    fn test_create_index_body() {
        let params: OpenSearchCollectionParams = parse_params(
            ENGINE,
            ParamRole::Collection,
            &params_from(json!({"method": {"m": 16, "ef_construction": 128}, "engine": "faiss"})),
        )
        .unwrap();
        let body = create_index_body(&CollectionSchema::new(8, Distance::Cosine), &params);
        let vector = &body["mappings"]["properties"]["vector"];
        assert_eq!(vector["type"], json!("knn_vector"));
        assert_eq!(vector["method"]["space_type"], json!("cosinesimil"));
        assert_eq!(vector["method"]["engine"], json!("faiss"));
        assert_eq!(vector["method"]["parameters"]["m"], json!(16));
        assert_eq!(body["settings"]["index"]["knn"], json!(true));
    }

    #[test]
    fn test_effective_ef_precedence() {
        let params: OpenSearchSearchParams = parse_params(
            ENGINE,
            ParamRole::Search,
            &params_from(json!({"ef": 32, "config": {"ef_search": 64}})),
        )
        .unwrap();
        assert_eq!(params.effective_ef(), Some(64));
        assert_eq!(OpenSearchSearchParams::default().effective_ef(), None);
    }

    #[test]
    fn test_search_body() {
        let query = Query::new(vec![0.1, 0.2]).top(7).filter(Filter::matches_value("a", 1));
        let body = search_body(&query);
        assert_eq!(body["query"]["knn"]["vector"]["k"], json!(7));
        assert_eq!(body["query"]["knn"]["vector"]["filter"], json!({"term": {"a": 1}}));
    }
}
