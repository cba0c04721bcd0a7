//! Composite client handed to the benchmark driver

use super::{Configurator, Searcher, Uploader};
use std::fmt;

/// One experiment's fully wired collaborators.
///
/// Immutable once assembled; holds exactly one configurator, one uploader and
/// at least one searcher, in the order of the declaration's search variants.
pub struct BenchClient {
    name: String,
    configurator: Box<dyn Configurator>,
    uploader: Box<dyn Uploader>,
    searchers: Vec<Box<dyn Searcher>>,
}

/// Owned collaborators of a [`BenchClient`].
pub struct ClientParts {
    /// Experiment name
    pub name: String,
    /// Collection provisioning
    pub configurator: Box<dyn Configurator>,
    /// Bulk ingestion
    pub uploader: Box<dyn Uploader>,
    /// One searcher per search variant, in declaration order
    pub searchers: Vec<Box<dyn Searcher>>,
}

impl BenchClient {
    pub(crate) fn new(
        name: String,
        configurator: Box<dyn Configurator>,
        uploader: Box<dyn Uploader>,
        searchers: Vec<Box<dyn Searcher>>,
    ) -> Self {
        debug_assert!(!searchers.is_empty(), "a client always carries a searcher");
        Self {
            name,
            configurator,
            uploader,
            searchers,
        }
    }

    /// Experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection configurator.
    #[must_use]
    pub fn configurator(&self) -> &dyn Configurator {
        self.configurator.as_ref()
    }

    /// Record uploader.
    #[must_use]
    pub fn uploader(&self) -> &dyn Uploader {
        self.uploader.as_ref()
    }

    /// Searchers in declaration order.
    #[must_use]
    pub fn searchers(&self) -> &[Box<dyn Searcher>] {
        &self.searchers
    }

    /// Take ownership of the collaborators.
    #[must_use]
    pub fn into_parts(self) -> ClientParts {
        ClientParts {
            name: self.name,
            configurator: self.configurator,
            uploader: self.uploader,
            searchers: self.searchers,
        }
    }
}

impl fmt::Debug for BenchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchClient")
            .field("name", &self.name)
            .field("engine", &self.configurator.engine())
            .field(
                "searchers",
                &self.searchers.iter().map(|s| s.search_params()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
