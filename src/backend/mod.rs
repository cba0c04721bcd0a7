//! Engine plugins and the registry that selects between them
//!
//! Each supported engine contributes one [`EnginePlugin`]: a single object
//! that knows how to build all three collaborators (configurator, uploader,
//! searcher) for that engine. Keeping the three constructors on one object
//! means the set of engines that can configure, upload and search is the
//! same set, with no way for the three tables to drift apart.
//!
//! The [`BackendRegistry`] is filled once at start-up, either explicitly via
//! [`BackendRegistry::register`] or through
//! [`BackendRegistry::with_default_backends`], and is read-only afterwards.
//!
//! Toyota Way Principles:
//! - **Poka-Yoke**: duplicate engine ids are rejected at registration time
//! - **Jidoka**: unknown engines stop assembly before anything is built

mod batch;
pub mod elastic;
mod http;
pub mod memory;
pub mod milvus;
pub mod opensearch;
pub mod qdrant;
pub mod weaviate;

pub use batch::{BatchParams, DEFAULT_BATCH_SIZE};
pub use elastic::ElasticPlugin;
pub use http::HttpConnectionParams;
pub use memory::{MemoryPlugin, MemoryServer};
pub use milvus::MilvusPlugin;
pub use opensearch::OpenSearchPlugin;
pub use qdrant::QdrantPlugin;
pub use weaviate::WeaviatePlugin;

use crate::client::{Configurator, Searcher, Uploader};
use crate::params::Params;
use crate::{Error, Result};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Constructors for one engine's collaborators.
///
/// Implementations must not perform I/O: construction validates and
/// translates parameters, nothing more. Errors are reported as
/// [`Error::InvalidParams`] naming the offending role.
pub trait EnginePlugin: Send + Sync {
    /// Engine identifier as written in experiment declarations.
    fn engine(&self) -> &str;

    /// Build a configurator for `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be translated.
    fn configurator(
        &self,
        host: &str,
        collection_params: &Params,
        connection_params: &Params,
    ) -> Result<Box<dyn Configurator>>;

    /// Build an uploader for `host`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be translated.
    fn uploader(
        &self,
        host: &str,
        connection_params: &Params,
        upload_params: &Params,
    ) -> Result<Box<dyn Uploader>>;

    /// Build a searcher for `host` under one search-parameter variant.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be translated.
    fn searcher(
        &self,
        host: &str,
        connection_params: &Params,
        search_params: &Params,
    ) -> Result<Box<dyn Searcher>>;
}

/// Engine id to plugin table.
#[derive(Default, Clone)]
pub struct BackendRegistry {
    plugins: FxHashMap<String, Arc<dyn EnginePlugin>>,
}

impl BackendRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in engine: `qdrant`, `weaviate`,
    /// `milvus`, `elastic`, `opensearch` and the in-process `memory` engine.
    #[must_use]
    pub fn with_default_backends() -> Self {
        let builtin: [Arc<dyn EnginePlugin>; 6] = [
            Arc::new(QdrantPlugin),
            Arc::new(WeaviatePlugin),
            Arc::new(MilvusPlugin),
            Arc::new(ElasticPlugin),
            Arc::new(OpenSearchPlugin),
            Arc::new(MemoryPlugin::new()),
        ];
        let mut plugins = FxHashMap::default();
        for plugin in builtin {
            plugins.insert(plugin.engine().to_string(), plugin);
        }
        Self { plugins }
    }

    /// Add a plugin under its own engine id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateEngine`] if the id is already taken.
    pub fn register(&mut self, plugin: Arc<dyn EnginePlugin>) -> Result<()> {
        let engine = plugin.engine().to_string();
        if self.plugins.contains_key(&engine) {
            return Err(Error::DuplicateEngine(engine));
        }
        debug!(engine = %engine, "engine registered");
        self.plugins.insert(engine, plugin);
        Ok(())
    }

    /// Look up the plugin for `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEngine`] listing the registered engines.
    pub fn resolve(&self, engine: &str) -> Result<Arc<dyn EnginePlugin>> {
        self.plugins
            .get(engine)
            .map(Arc::clone)
            .ok_or_else(|| Error::UnsupportedEngine {
                engine: engine.to_string(),
                supported: self.engines(),
            })
    }

    /// Whether `engine` is registered.
    #[must_use]
    pub fn contains(&self, engine: &str) -> bool {
        self.plugins.contains_key(engine)
    }

    /// Registered engine ids, sorted.
    #[must_use]
    pub fn engines(&self) -> Vec<String> {
        let mut engines: Vec<String> = self.plugins.keys().cloned().collect();
        engines.sort_unstable();
        engines
    }

    /// Number of registered engines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no engine is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry").field("engines", &self.engines()).finish()
    }
}
