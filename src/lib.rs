//! # vdb-bench: backend selection for vector-search benchmarks
//!
//! **Version**: 0.1.0
//!
//! Given a declarative experiment naming one of several vector-search
//! engines, vdb-bench assembles the collaborators a benchmark driver needs:
//! a configurator (collection setup), an uploader (bulk ingestion) and one
//! searcher per search-parameter variant. All three are engine-agnostic
//! traits, so the driver never branches on which engine it is talking to.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke**: engine ids resolve through one registry table; a plugin
//!   builds all three roles, so no engine can configure without searching
//! - **Jidoka**: unsupported engines fail assembly before anything is built
//! - **Heijunka**: parameter defaults are applied once, when a declaration is
//!   parsed, never downstream
//!
//! ## Engines
//!
//! | Engine       | Transport        | Default port |
//! |--------------|------------------|--------------|
//! | `qdrant`     | REST             | 6333         |
//! | `weaviate`   | REST + GraphQL   | 8090         |
//! | `milvus`     | REST v2          | 19530        |
//! | `elastic`    | REST             | 9200         |
//! | `opensearch` | REST             | 9200         |
//! | `memory`     | in-process       | n/a          |
//!
//! ## Example Usage
//!
//! ```rust
//! use vdb_bench::client::{CollectionSchema, Distance, Query, Record};
//! use vdb_bench::{ClientFactory, ExperimentDeclaration};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> vdb_bench::Result<()> {
//! let factory = ClientFactory::with_default_backends("local");
//! let client = factory.build_client(&ExperimentDeclaration::new("dry-run", "memory"))?;
//!
//! client.configurator().configure(&CollectionSchema::new(2, Distance::Dot)).await?;
//! client.uploader().upload(&[Record::new(7, vec![1.0, 2.0])]).await?;
//!
//! let hits = client.searchers()[0].search(&Query::new(vec![1.0, 0.0])).await?;
//! assert_eq!(hits[0].id, 7);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod backend;
pub mod client;
pub mod error;
pub mod experiment;
pub mod factory;
pub mod logging;
pub mod params;
pub mod topk;

pub use backend::{BackendRegistry, EnginePlugin};
pub use client::BenchClient;
pub use error::{Error, Result};
pub use experiment::{ExperimentCatalog, ExperimentDeclaration};
pub use factory::ClientFactory;
pub use params::Params;
