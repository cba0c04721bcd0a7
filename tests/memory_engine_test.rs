//! End-to-end tests through the in-process engine
//!
//! Drives the full lifecycle a benchmark run goes through: assemble,
//! configure, upload, post-upload, then search from every variant
//! concurrently.

use serde_json::json;
use std::sync::Arc;
use vdb_bench::backend::{BackendRegistry, MemoryPlugin};
use vdb_bench::client::{CollectionSchema, Distance, FieldType, Filter, Query, Record};
use vdb_bench::params::params_from;
use vdb_bench::{ClientFactory, Error, ExperimentDeclaration};

fn records(n: u64) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let angle = i as f32 * 0.1;
            Record::new(i, vec![angle.cos(), angle.sin(), 1.0]).with_payload(params_from(json!({
                "parity": if i % 2 == 0 { "even" } else { "odd" },
                "rank": i,
            })))
        })
        .collect()
}

fn schema(distance: Distance) -> CollectionSchema {
    CollectionSchema::new(3, distance)
        .with_field("parity", FieldType::Keyword)
        .with_field("rank", FieldType::Int)
}

#[tokio::test]
async fn test_full_lifecycle_with_concurrent_searchers() -> anyhow::Result<()> {
    let factory = ClientFactory::with_default_backends("bench-host");
    let decl = ExperimentDeclaration::builder("memory-e2e", "memory")
        .upload_params(params_from(json!({"batch_size": 7, "parallel": 3})))
        .search_variant(params_from(json!({"parallel_scan_threshold": 0})))
        .search_variant(params_from(json!({"parallel_scan_threshold": 1_000_000})))
        .build();
    let parts = factory.build_client(&decl)?.into_parts();

    parts.configurator.configure(&schema(Distance::Cosine)).await?;
    let data = records(100);
    let report = parts.uploader.ingest(&data).await?;
    assert_eq!(report.records, 100);
    assert_eq!(report.batches, 15);
    assert_eq!(report.total_time(), report.upload_time + report.post_upload_time);

    let query = Query::new(data[42].vector.clone()).top(5);
    let mut handles = Vec::new();
    for searcher in parts.searchers {
        let query = query.clone();
        handles.push(tokio::spawn(async move {
            searcher.setup().await?;
            searcher.search(&query).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await??);
    }
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0][0].id, 42);
    assert_eq!(results[0].len(), 5);
    Ok(())
}

#[tokio::test]
async fn test_filtered_search() -> anyhow::Result<()> {
    let factory = ClientFactory::with_default_backends("filter-host");
    let client = factory.build_client(&ExperimentDeclaration::new("filtered", "memory"))?;
    client.configurator().configure(&schema(Distance::Euclid)).await?;
    client.uploader().upload(&records(50)).await?;

    let filter = Filter::from_conditions(&json!({
        "and": [
            {"parity": {"match": {"value": "odd"}}},
            {"rank": {"range": {"gte": 10, "lt": 20}}}
        ]
    }))?;
    let hits = client.searchers()[0]
        .search(&Query::new(vec![1.0, 0.0, 1.0]).top(50).filter(filter))
        .await?;

    let mut ids: Vec<u64> = hits.iter().map(|h| h.id).collect();
    assert!(hits.windows(2).all(|w| w[0].score <= w[1].score));
    ids.sort_unstable();
    assert_eq!(ids, vec![11, 13, 15, 17, 19]);
    Ok(())
}

#[tokio::test]
async fn test_unbounded_top_returns_every_point() -> anyhow::Result<()> {
    let client = ClientFactory::with_default_backends("all-host")
        .build_client(&ExperimentDeclaration::new("all", "memory"))?;
    client.configurator().configure(&schema(Distance::Dot)).await?;
    client.uploader().upload(&records(12)).await?;

    let hits = client.searchers()[0]
        .search(&Query::new(vec![1.0, 0.0, 0.0]).top(usize::MAX))
        .await?;
    assert_eq!(hits.len(), 12);
    assert_eq!(hits[0].id, 0);
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    Ok(())
}

#[tokio::test]
async fn test_hosts_are_isolated() -> anyhow::Result<()> {
    let registry = Arc::new(BackendRegistry::with_default_backends());
    let a = ClientFactory::new("host-a", registry.clone())
        .build_client(&ExperimentDeclaration::new("a", "memory"))?;
    let b = ClientFactory::new("host-b", registry)
        .build_client(&ExperimentDeclaration::new("b", "memory"))?;

    a.configurator().configure(&schema(Distance::Dot)).await?;
    a.uploader().upload(&records(3)).await?;

    let err = b.uploader().upload(&records(3)).await.unwrap_err();
    assert!(matches!(err, Error::Backend { status: 404, .. }));
    Ok(())
}

#[tokio::test]
async fn test_reconfigure_drops_points() -> anyhow::Result<()> {
    let plugin = MemoryPlugin::new();
    let server = plugin.server();
    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(plugin))?;
    let client = ClientFactory::new("h", Arc::new(registry))
        .build_client(&ExperimentDeclaration::new("r", "memory"))?;

    client.configurator().configure(&schema(Distance::Dot)).await?;
    client.uploader().upload(&records(10)).await?;
    assert_eq!(server.collection("h").map(|c| c.len()), Some(10));

    client.configurator().configure(&schema(Distance::Dot)).await?;
    assert_eq!(server.collection("h").map(|c| c.len()), Some(0));

    client.configurator().delete().await?;
    assert!(server.collection("h").is_none());
    // deleting twice is fine
    client.configurator().delete().await?;
    Ok(())
}

#[tokio::test]
async fn test_query_dimension_mismatch() -> anyhow::Result<()> {
    let client = ClientFactory::with_default_backends("dim-host")
        .build_client(&ExperimentDeclaration::new("dim", "memory"))?;
    client.configurator().configure(&schema(Distance::Cosine)).await?;

    let err = client.searchers()[0].search(&Query::new(vec![1.0])).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    Ok(())
}

#[tokio::test]
async fn test_zero_dimension_schema_rejected() -> anyhow::Result<()> {
    let client = ClientFactory::with_default_backends("zero")
        .build_client(&ExperimentDeclaration::new("zero", "memory"))?;
    let err = client
        .configurator()
        .configure(&CollectionSchema::new(0, Distance::Dot))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSchema(_)));
    Ok(())
}
