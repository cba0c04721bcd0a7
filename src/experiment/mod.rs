//! Experiment declarations
//!
//! An experiment names an engine plus the parameter mappings for each
//! collaborator role. Declarations are usually read from JSON documents:
//!
//! ```json
//! [
//!   {
//!     "name": "qdrant-m-16-ef-128",
//!     "engine": "qdrant",
//!     "collection_params": {"hnsw_config": {"m": 16, "ef_construct": 128}},
//!     "upload_params": {"parallel": 16, "batch_size": 1024},
//!     "search_params": [{"parallel": 8, "config": {"hnsw_ef": 64}}]
//!   }
//! ]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use vdb_bench::experiment::ExperimentCatalog;
//!
//! let catalog = ExperimentCatalog::from_json_str(
//!     r#"[{"name": "qdrant-default", "engine": "qdrant"},
//!         {"name": "milvus-default", "engine": "milvus", "search_params": []}]"#,
//! )?;
//! let qdrant = catalog.matching("qdrant-*")?;
//! assert_eq!(qdrant.len(), 1);
//! assert_eq!(qdrant[0].search_params().len(), 1);
//! # Ok::<(), vdb_bench::Error>(())
//! ```

mod catalog;
mod declaration;

pub use catalog::ExperimentCatalog;
pub use declaration::{ExperimentDeclaration, ExperimentDeclarationBuilder};
