//! Records, queries and results exchanged with the engines

use super::Filter;
use crate::params::Params;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of neighbours requested per query.
pub const DEFAULT_TOP: usize = 10;

/// One vector with its id and optional payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Point id
    pub id: u64,
    /// Embedding
    pub vector: Vec<f32>,
    /// Payload attributes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Params>,
}

impl Record {
    /// Record without payload.
    #[must_use]
    pub const fn new(id: u64, vector: Vec<f32>) -> Self {
        Self {
            id,
            vector,
            payload: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Params) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// A single nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Query embedding
    pub vector: Vec<f32>,
    /// Optional payload filter
    pub filter: Option<Filter>,
    /// Number of neighbours to return
    pub top: usize,
}

impl Query {
    /// Unfiltered query for the default number of neighbours.
    #[must_use]
    pub const fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            filter: None,
            top: DEFAULT_TOP,
        }
    }

    /// Set the number of neighbours.
    #[must_use]
    pub const fn top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    /// Restrict results by payload.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// A ranked search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    /// Point id
    pub id: u64,
    /// Engine-reported score or distance
    pub score: f32,
}

/// Outcome of an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Records accepted by the engine
    pub records: usize,
    /// Batches sent
    pub batches: usize,
    /// Time spent sending batches
    pub upload_time: Duration,
    /// Time spent waiting for indexing after the last batch
    pub post_upload_time: Duration,
}

impl UploadReport {
    /// Total wall time of the upload.
    #[must_use]
    pub fn total_time(&self) -> Duration {
        self.upload_time + self.post_upload_time
    }

    /// Same report with the post-upload wait recorded.
    #[must_use]
    pub const fn with_post_upload_time(mut self, elapsed: Duration) -> Self {
        self.post_upload_time = elapsed;
        self
    }
}
