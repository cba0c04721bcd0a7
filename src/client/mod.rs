//! Capability contracts every engine plugin satisfies
//!
//! A benchmark run is split into three phases, each behind its own trait so
//! the driver can time them in isolation and fan one provisioned collection
//! out across many query configurations:
//!
//! - [`Configurator`]: provision or drop the collection
//! - [`Uploader`]: bulk-ingest records
//! - [`Searcher`]: run queries under one fixed parameter variant
//!
//! Constructors live on the engine plugins ([`crate::backend::EnginePlugin`]);
//! no trait method runs during construction, so assembling a client never
//! touches the network.

mod composite;
mod filter;
mod record;
mod schema;

pub use composite::{BenchClient, ClientParts};
pub use filter::{Filter, Range};
pub use record::{Query, Record, ScoredPoint, UploadReport, DEFAULT_TOP};
pub use schema::{CollectionSchema, Distance, FieldType};

use crate::params::Params;
use crate::Result;
use async_trait::async_trait;
use std::time::Instant;

/// Provisions and tears down the benchmark collection.
#[async_trait]
pub trait Configurator: Send + Sync {
    /// Engine identifier this configurator talks to.
    fn engine(&self) -> &str;

    /// Collection parameters it was built with (possibly empty).
    fn collection_params(&self) -> &Params;

    /// Connection parameters it was built with (possibly empty).
    fn connection_params(&self) -> &Params;

    /// Drop the collection. A missing collection is not an error.
    async fn delete(&self) -> Result<()>;

    /// Create the collection for `schema`.
    async fn recreate(&self, schema: &CollectionSchema) -> Result<()>;

    /// Reset the collection: delete, then recreate.
    async fn configure(&self, schema: &CollectionSchema) -> Result<()> {
        self.delete().await?;
        self.recreate(schema).await
    }
}

/// Bulk-ingests records into a configured collection.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Engine identifier this uploader talks to.
    fn engine(&self) -> &str;

    /// Connection parameters it was built with (possibly empty).
    fn connection_params(&self) -> &Params;

    /// Upload parameters it was built with (possibly empty).
    fn upload_params(&self) -> &Params;

    /// Send `records` in batches.
    ///
    /// Rejected records are reported through [`crate::Error::PartialUpload`]
    /// with their indices into `records`.
    async fn upload(&self, records: &[Record]) -> Result<UploadReport>;

    /// Wait until the engine has indexed everything uploaded so far.
    async fn post_upload(&self) -> Result<()> {
        Ok(())
    }

    /// Upload `records`, then wait in [`Uploader::post_upload`]; the report
    /// carries the duration of both phases.
    async fn ingest(&self, records: &[Record]) -> Result<UploadReport> {
        let report = self.upload(records).await?;
        let started = Instant::now();
        self.post_upload().await?;
        Ok(report.with_post_upload_time(started.elapsed()))
    }
}

/// Executes queries under one fixed query-time configuration.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Engine identifier this searcher talks to.
    fn engine(&self) -> &str;

    /// Connection parameters it was built with (possibly empty).
    fn connection_params(&self) -> &Params;

    /// The search-parameter variant it was built with, verbatim.
    fn search_params(&self) -> &Params;

    /// Client-side parallelism requested by the variant (`parallel`, default 1).
    fn parallel(&self) -> usize {
        self.search_params()
            .get("parallel")
            .and_then(serde_json::Value::as_u64)
            .and_then(|p| usize::try_from(p).ok())
            .filter(|p| *p > 0)
            .unwrap_or(1)
    }

    /// Apply engine-side settings of this variant before querying.
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Run one query, results ranked best first.
    async fn search(&self, query: &Query) -> Result<Vec<ScoredPoint>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const SETTLE: Duration = Duration::from_millis(30);

    // Accepts everything at once, then reports ready after a fixed wait.
    struct SlowIndexer {
        params: Params,
        waits: AtomicUsize,
    }

    #[async_trait]
    impl Uploader for SlowIndexer {
        fn engine(&self) -> &str {
            "slow"
        }

        fn connection_params(&self) -> &Params {
            &self.params
        }

        fn upload_params(&self) -> &Params {
            &self.params
        }

        async fn upload(&self, records: &[Record]) -> Result<UploadReport> {
            Ok(UploadReport {
                records: records.len(),
                batches: 1,
                ..UploadReport::default()
            })
        }

        async fn post_upload(&self) -> Result<()> {
            self.waits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(SETTLE).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_ingest_reports_indexing_wait() {
        let uploader = SlowIndexer {
            params: Params::new(),
            waits: AtomicUsize::new(0),
        };
        let report = uploader
            .ingest(&[Record::new(1, vec![0.5]), Record::new(2, vec![0.25])])
            .await
            .unwrap();
        assert_eq!(uploader.waits.load(Ordering::SeqCst), 1);
        assert_eq!(report.records, 2);
        assert!(report.post_upload_time >= SETTLE);
        assert_eq!(report.total_time(), report.upload_time + report.post_upload_time);
    }

    #[tokio::test]
    async fn test_ingest_stops_on_upload_error() {
        struct Rejecting(Params);

        #[async_trait]
        impl Uploader for Rejecting {
            fn engine(&self) -> &str {
                "rejecting"
            }

            fn connection_params(&self) -> &Params {
                &self.0
            }

            fn upload_params(&self) -> &Params {
                &self.0
            }

            async fn upload(&self, _records: &[Record]) -> Result<UploadReport> {
                Err(crate::Error::InvalidInput("no".to_string()))
            }

            async fn post_upload(&self) -> Result<()> {
                panic!("post_upload after a failed upload");
            }
        }

        let err = Rejecting(Params::new()).ingest(&[]).await.unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
    }
}
