//! Client assembly
//!
//! Turns an [`ExperimentDeclaration`] into a [`BenchClient`]: resolve the
//! engine's plugin, then build one configurator, one uploader and one
//! searcher per search variant. Assembly performs no I/O; every collaborator
//! is handed its own copy of the host and parameters, so two clients built
//! from the same declaration share nothing mutable.

use crate::backend::BackendRegistry;
use crate::client::BenchClient;
use crate::experiment::ExperimentDeclaration;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds benchmark clients against one host.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    host: String,
    registry: Arc<BackendRegistry>,
}

impl ClientFactory {
    /// Factory using an explicit registry.
    #[must_use]
    pub fn new(host: impl Into<String>, registry: Arc<BackendRegistry>) -> Self {
        Self {
            host: host.into(),
            registry,
        }
    }

    /// Factory over [`BackendRegistry::with_default_backends`].
    #[must_use]
    pub fn with_default_backends(host: impl Into<String>) -> Self {
        Self::new(host, Arc::new(BackendRegistry::with_default_backends()))
    }

    /// Target host handed to every collaborator.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Registry engines are resolved against.
    #[must_use]
    pub const fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    /// Assemble the client for one experiment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedEngine`] before constructing
    /// anything if the engine is not registered, or the first construction
    /// error reported by the engine's plugin.
    pub fn build_client(&self, experiment: &ExperimentDeclaration) -> Result<BenchClient> {
        let plugin = self.registry.resolve(experiment.engine())?;

        let configurator = plugin.configurator(
            &self.host,
            experiment.collection_params(),
            experiment.connection_params(),
        )?;
        let uploader = plugin.uploader(
            &self.host,
            experiment.connection_params(),
            experiment.upload_params(),
        )?;
        let searchers = experiment
            .search_params()
            .iter()
            .map(|variant| plugin.searcher(&self.host, experiment.connection_params(), variant))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            experiment = experiment.name(),
            collection_keys = experiment.collection_params().len(),
            upload_keys = experiment.upload_params().len(),
            "collaborators built"
        );
        info!(
            experiment = experiment.name(),
            engine = experiment.engine(),
            host = %self.host,
            searchers = searchers.len(),
            "client assembled"
        );
        Ok(BenchClient::new(experiment.name().to_string(), configurator, uploader, searchers))
    }

    /// Assemble a client per experiment; each result is independent.
    #[must_use]
    pub fn build_clients(&self, experiments: &[ExperimentDeclaration]) -> Vec<Result<BenchClient>> {
        experiments.iter().map(|e| self.build_client(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::params_from;
    use crate::Error;
    use serde_json::json;

    #[test]
    fn test_build_qdrant_client() {
        let factory = ClientFactory::with_default_backends("localhost");
        let decl = ExperimentDeclaration::builder("r1", "qdrant")
            .search_variant(params_from(json!({"ef": 64})))
            .search_variant(params_from(json!({"ef": 128})))
            .build();
        let client = factory.build_client(&decl).unwrap();
        assert_eq!(client.name(), "r1");
        assert_eq!(client.configurator().engine(), "qdrant");
        assert_eq!(client.searchers().len(), 2);
        assert_eq!(client.searchers()[1].search_params()["ef"], json!(128));
    }

    #[test]
    fn test_unknown_engine() {
        let factory = ClientFactory::with_default_backends("localhost");
        let err = factory
            .build_client(&ExperimentDeclaration::new("r2", "unknown-engine"))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedEngine { .. }));
    }

    #[test]
    fn test_invalid_search_variant_fails_build() {
        let factory = ClientFactory::with_default_backends("localhost");
        let decl = ExperimentDeclaration::builder("bad", "memory")
            .search_variant(params_from(json!({"parallel_scan_threshold": "lots"})))
            .build();
        assert!(matches!(
            factory.build_client(&decl).unwrap_err(),
            Error::InvalidParams { role: "search", .. }
        ));
    }

    #[test]
    fn test_build_clients_independent_results() {
        let factory = ClientFactory::with_default_backends("localhost");
        let results = factory.build_clients(&[
            ExperimentDeclaration::new("a", "memory"),
            ExperimentDeclaration::new("b", "redis"),
            ExperimentDeclaration::new("c", "elastic"),
        ]);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }
}
