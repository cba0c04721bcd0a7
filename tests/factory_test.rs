//! Client assembly tests
//!
//! Covers the assembly contract: names are preserved, one searcher per
//! search variant in declaration order (or exactly one when none are given),
//! unsupported engines fail before anything is built, and builds are
//! independent of each other.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vdb_bench::backend::{BackendRegistry, EnginePlugin, MemoryPlugin};
use vdb_bench::client::{Configurator, Searcher, Uploader};
use vdb_bench::params::params_from;
use vdb_bench::{ClientFactory, Error, ExperimentDeclaration, Params};

fn declaration(value: serde_json::Value) -> ExperimentDeclaration {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_qdrant_two_variants_in_order() {
    let factory = ClientFactory::with_default_backends("localhost");
    let decl = declaration(json!({
        "name": "r1",
        "engine": "qdrant",
        "search_params": [{"ef": 64}, {"ef": 128}],
    }));

    let client = factory.build_client(&decl).unwrap();
    assert_eq!(client.name(), "r1");
    assert_eq!(client.configurator().engine(), "qdrant");
    assert_eq!(client.uploader().engine(), "qdrant");

    let efs: Vec<_> = client.searchers().iter().map(|s| s.search_params()["ef"].clone()).collect();
    assert_eq!(efs, vec![json!(64), json!(128)]);
}

#[test]
fn test_unknown_engine_is_rejected() {
    let factory = ClientFactory::with_default_backends("localhost");
    let decl = declaration(json!({"name": "r2", "engine": "unknown-engine"}));

    match factory.build_client(&decl) {
        Err(Error::UnsupportedEngine { engine, supported }) => {
            assert_eq!(engine, "unknown-engine");
            assert!(supported.contains(&"qdrant".to_string()));
        }
        other => panic!("expected unsupported engine, got {other:?}"),
    }
}

#[test]
fn test_missing_search_params_yield_one_empty_searcher() {
    let factory = ClientFactory::with_default_backends("localhost");
    let client = factory
        .build_client(&declaration(json!({"name": "r3", "engine": "qdrant"})))
        .unwrap();

    assert_eq!(client.searchers().len(), 1);
    assert!(client.searchers()[0].search_params().is_empty());
}

#[test]
fn test_empty_search_params_yield_one_searcher() {
    let factory = ClientFactory::with_default_backends("localhost");
    let client = factory
        .build_client(&declaration(json!({"name": "e", "engine": "milvus", "search_params": []})))
        .unwrap();
    assert_eq!(client.searchers().len(), 1);
}

#[test]
fn test_omitted_params_are_empty_mappings() {
    let factory = ClientFactory::with_default_backends("localhost");
    let client = factory
        .build_client(&declaration(json!({"name": "d", "engine": "elastic"})))
        .unwrap();

    assert!(client.configurator().collection_params().is_empty());
    assert!(client.configurator().connection_params().is_empty());
    assert!(client.uploader().upload_params().is_empty());
    assert!(client.uploader().connection_params().is_empty());
}

#[test]
fn test_params_are_forwarded_verbatim() {
    let factory = ClientFactory::with_default_backends("localhost");
    let decl = declaration(json!({
        "name": "weaviate-m-16",
        "engine": "weaviate",
        "collection_params": {"vectorIndexConfig": {"efConstruction": 128, "maxConnections": 16}},
        "connection_params": {"timeout": 30},
        "upload_params": {"batch_size": 256, "parallel": 4},
        "search_params": [{"parallel": 8, "config": {"ef": 64}}],
    }));
    let client = factory.build_client(&decl).unwrap();

    assert_eq!(client.configurator().collection_params(), decl.collection_params());
    assert_eq!(client.configurator().connection_params(), decl.connection_params());
    assert_eq!(client.uploader().upload_params(), decl.upload_params());
    assert_eq!(client.searchers()[0].connection_params(), decl.connection_params());
    assert_eq!(client.searchers()[0].parallel(), 8);
}

#[test]
fn test_every_default_engine_assembles() {
    let factory = ClientFactory::with_default_backends("localhost");
    for engine in factory.registry().engines() {
        let client = factory
            .build_client(&ExperimentDeclaration::new(format!("{engine}-default"), engine.clone()))
            .unwrap();
        assert_eq!(client.configurator().engine(), engine);
        assert_eq!(client.uploader().engine(), engine);
        assert_eq!(client.searchers()[0].engine(), engine);
    }
}

#[test]
fn test_redis_is_not_registered() {
    let factory = ClientFactory::with_default_backends("localhost");
    assert!(matches!(
        factory.build_client(&ExperimentDeclaration::new("redis-default", "redis")),
        Err(Error::UnsupportedEngine { .. })
    ));
}

#[test]
fn test_invalid_connection_params_propagate() {
    let factory = ClientFactory::with_default_backends("localhost");
    let decl = ExperimentDeclaration::builder("t", "qdrant")
        .connection_params(params_from(json!({"timeout": -1})))
        .build();
    assert!(matches!(
        factory.build_client(&decl),
        Err(Error::InvalidParams { role: "connection", .. })
    ));
}

#[test]
fn test_malformed_host_is_a_connection_error() {
    let factory = ClientFactory::with_default_backends("http://");
    assert!(matches!(
        factory.build_client(&ExperimentDeclaration::new("h", "opensearch")),
        Err(Error::Connection(_))
    ));
}

#[test]
fn test_builds_are_independent() {
    let factory = ClientFactory::with_default_backends("localhost");
    let decl = ExperimentDeclaration::builder("twice", "qdrant")
        .search_variant(params_from(json!({"ef": 32})))
        .build();

    let mut first = factory.build_client(&decl).unwrap().into_parts();
    let second = factory.build_client(&decl).unwrap().into_parts();

    first.name.push_str("-edited");
    first.searchers.clear();
    let extra = factory
        .registry()
        .resolve("qdrant")
        .unwrap()
        .searcher("localhost", &Params::new(), &params_from(json!({"ef": 512})))
        .unwrap();
    first.searchers.push(extra);
    assert_eq!(first.searchers[0].search_params()["ef"], json!(512));

    assert_eq!(second.name, "twice");
    assert_eq!(second.searchers.len(), 1);
    assert_eq!(second.searchers[0].search_params()["ef"], json!(32));

    let third = factory.build_client(&decl).unwrap();
    assert_eq!(third.name(), "twice");
    assert_eq!(third.searchers()[0].search_params()["ef"], json!(32));
}

#[test]
fn test_oversized_timeout_fails_build() {
    let factory = ClientFactory::with_default_backends("localhost");
    let decl = ExperimentDeclaration::builder("slow", "qdrant")
        .connection_params(params_from(json!({"timeout": 1e20})))
        .build();
    assert!(matches!(
        factory.build_client(&decl).err().unwrap(),
        Error::InvalidParams { role: "connection", .. }
    ));
}

/// Plugin that records how many collaborators it built.
struct CountingPlugin {
    inner: MemoryPlugin,
    built: AtomicUsize,
}

impl EnginePlugin for CountingPlugin {
    fn engine(&self) -> &str {
        "counting"
    }

    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> vdb_bench::Result<Box<dyn Configurator>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.inner.configurator(host, collection_params, connection_params)
    }

    fn uploader(
        &self,
        host: &str,
        connection_params: &Params,
        upload_params: &Params,
    ) -> vdb_bench::Result<Box<dyn Uploader>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.inner.uploader(host, connection_params, upload_params)
    }

    fn searcher(
        &self,
        host: &str,
        connection_params: &Params,
        search_params: &Params,
    ) -> vdb_bench::Result<Box<dyn Searcher>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        self.inner.searcher(host, connection_params, search_params)
    }
}

#[test]
fn test_custom_plugin_builds_one_of_each_role_per_variant() {
    let plugin = Arc::new(CountingPlugin {
        inner: MemoryPlugin::new(),
        built: AtomicUsize::new(0),
    });
    let mut registry = BackendRegistry::new();
    registry.register(plugin.clone()).unwrap();
    let factory = ClientFactory::new("local", Arc::new(registry));

    let decl = ExperimentDeclaration::builder("c", "counting")
        .search_params(vec![Params::new(), Params::new(), Params::new()])
        .build();
    let client = factory.build_client(&decl).unwrap();
    assert_eq!(client.searchers().len(), 3);
    assert_eq!(plugin.built.load(Ordering::SeqCst), 5);

    assert!(factory.build_client(&ExperimentDeclaration::new("q", "qdrant")).is_err());
    assert_eq!(plugin.built.load(Ordering::SeqCst), 5);
}
