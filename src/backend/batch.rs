//! Batched, optionally parallel upload loop shared by all uploaders

use crate::client::{Record, UploadReport};
use crate::{Error, Result};
use serde::Deserialize;
use std::future::Future;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Default records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// Batching options common to every uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BatchParams {
    /// Records per request
    pub batch_size: usize,
    /// Concurrent in-flight batches
    pub parallel: usize,
}

impl Default for BatchParams {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parallel: 1,
        }
    }
}

/// Split `records` into batches and hand each to `send`.
///
/// `send` receives the offset of the batch within `records` and an owned copy
/// of the batch; it reports rejected records as [`Error::PartialUpload`] with
/// indices already shifted by that offset. Partial failures are collected
/// across all batches; any other error aborts the upload.
pub(crate) async fn upload_in_batches<F, Fut>(
    engine: &str,
    records: &[Record],
    params: BatchParams,
    send: F,
) -> Result<UploadReport>
where
    F: Fn(usize, Vec<Record>) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let batch_size = params.batch_size.max(1);
    let parallel = params.parallel.max(1);
    let started = Instant::now();

    let mut in_flight = JoinSet::new();
    let mut failed = Vec::new();
    let mut first_reason = None;
    let mut batches = 0;

    for (n, chunk) in records.chunks(batch_size).enumerate() {
        if in_flight.len() >= parallel {
            if let Some(joined) = in_flight.join_next().await {
                absorb(joined, &mut failed, &mut first_reason)?;
            }
        }
        in_flight.spawn(send(n * batch_size, chunk.to_vec()));
        batches += 1;
    }
    while let Some(joined) = in_flight.join_next().await {
        absorb(joined, &mut failed, &mut first_reason)?;
    }

    let upload_time = started.elapsed();
    debug!(engine, records = records.len(), batches, ?upload_time, "upload finished");

    if !failed.is_empty() {
        failed.sort_unstable();
        warn!(engine, failed = failed.len(), "records rejected");
        return Err(Error::PartialUpload {
            engine: engine.to_string(),
            failed,
            reason: first_reason.unwrap_or_default(),
        });
    }

    Ok(UploadReport {
        records: records.len(),
        batches,
        upload_time,
        ..UploadReport::default()
    })
}

/// Turn a client-side (4xx) rejection of a whole batch into a partial failure
/// covering `offset..offset + len`; transport and server errors pass through.
pub(crate) fn reject_batch(error: Error, offset: usize, len: usize) -> Error {
    match error {
        Error::Backend {
            engine,
            status,
            body,
        } if (400..500).contains(&status) => Error::PartialUpload {
            engine,
            failed: (offset..offset + len).collect(),
            reason: format!("{status}: {body}"),
        },
        other => other,
    }
}

fn absorb(
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
    failed: &mut Vec<usize>,
    first_reason: &mut Option<String>,
) -> Result<()> {
    match joined.map_err(|e| Error::Other(format!("upload task failed: {e}")))? {
        Ok(()) => Ok(()),
        Err(Error::PartialUpload {
            failed: batch_failed,
            reason,
            ..
        }) => {
            failed.extend(batch_failed);
            first_reason.get_or_insert(reason);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn records(n: u64) -> Vec<Record> {
        (0..n).map(|i| Record::new(i, vec![0.0; 2])).collect()
    }

    #[tokio::test]
    async fn test_batches_cover_all_records() {
        let seen = Arc::new(AtomicUsize::new(0));
        let params = BatchParams {
            batch_size: 3,
            parallel: 2,
        };
        let report = upload_in_batches("memory", &records(10), params, |_, batch| {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(batch.len(), Ordering::SeqCst);
                Ok(())
            }
        })
        .await
        .unwrap();

        assert_eq!(report.records, 10);
        assert_eq!(report.batches, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_partial_failures_collected_with_offsets() {
        let params = BatchParams {
            batch_size: 4,
            parallel: 1,
        };
        let err = upload_in_batches("memory", &records(8), params, |offset, _| async move {
            Err(Error::PartialUpload {
                engine: "memory".into(),
                failed: vec![offset + 1],
                reason: "bad vector".into(),
            })
        })
        .await
        .unwrap_err();

        match err {
            Error::PartialUpload { failed, reason, .. } => {
                assert_eq!(failed, vec![1, 5]);
                assert_eq!(reason, "bad vector");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_hard_error_aborts() {
        let err = upload_in_batches("memory", &records(4), BatchParams::default(), |_, _| async {
            Err(Error::Connection("down".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_reject_batch_only_client_errors() {
        let rejected = reject_batch(
            Error::Backend {
                engine: "qdrant".into(),
                status: 400,
                body: "wrong dim".into(),
            },
            10,
            3,
        );
        assert!(matches!(
            rejected,
            Error::PartialUpload { ref failed, .. } if failed == &vec![10, 11, 12]
        ));

        let passed = reject_batch(
            Error::Backend {
                engine: "qdrant".into(),
                status: 503,
                body: "busy".into(),
            },
            0,
            1,
        );
        assert!(matches!(passed, Error::Backend { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_empty_upload() {
        let report =
            upload_in_batches("memory", &[], BatchParams::default(), |_, _| async { Ok(()) })
                .await
                .unwrap();
        assert_eq!(report.batches, 0);
    }
}
