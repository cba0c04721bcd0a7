//! A single experiment declaration

use crate::params::Params;
use serde::{Deserialize, Deserializer, Serialize};

/// Declarative description of one benchmark experiment.
///
/// Optional parameter mappings default to empty. `search_params` is never
/// empty: an absent or empty list becomes exactly one empty variant, so every
/// experiment yields at least one searcher. The rule is applied once, when the
/// declaration is parsed or built, and the value is immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDeclaration {
    name: String,
    engine: String,
    #[serde(default, deserialize_with = "nullable_params")]
    collection_params: Params,
    #[serde(default, deserialize_with = "nullable_params")]
    connection_params: Params,
    #[serde(default, deserialize_with = "nullable_params")]
    upload_params: Params,
    #[serde(default = "default_search_params", deserialize_with = "search_variants")]
    search_params: Vec<Params>,
}

fn default_search_params() -> Vec<Params> {
    vec![Params::new()]
}

fn normalize_variants(variants: Vec<Params>) -> Vec<Params> {
    if variants.is_empty() {
        default_search_params()
    } else {
        variants
    }
}

fn nullable_params<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Params, D::Error> {
    Ok(Option::<Params>::deserialize(deserializer)?.unwrap_or_default())
}

fn search_variants<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Params>, D::Error> {
    let variants = Option::<Vec<Option<Params>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(normalize_variants(
        variants.into_iter().map(Option::unwrap_or_default).collect(),
    ))
}

impl ExperimentDeclaration {
    /// Declaration with empty parameters and a single default search variant.
    #[must_use]
    pub fn new(name: impl Into<String>, engine: impl Into<String>) -> Self {
        ExperimentDeclarationBuilder::new(name, engine).build()
    }

    /// Create a builder for a declaration with optional parameters.
    #[must_use]
    pub fn builder(
        name: impl Into<String>,
        engine: impl Into<String>,
    ) -> ExperimentDeclarationBuilder {
        ExperimentDeclarationBuilder::new(name, engine)
    }

    /// Experiment name, used verbatim to label results.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Engine identifier.
    #[must_use]
    pub fn engine(&self) -> &str {
        &self.engine
    }

    /// Collection options.
    #[must_use]
    pub const fn collection_params(&self) -> &Params {
        &self.collection_params
    }

    /// Connection options shared by every collaborator.
    #[must_use]
    pub const fn connection_params(&self) -> &Params {
        &self.connection_params
    }

    /// Upload options.
    #[must_use]
    pub const fn upload_params(&self) -> &Params {
        &self.upload_params
    }

    /// Search variants, in declaration order. Never empty.
    #[must_use]
    pub fn search_params(&self) -> &[Params] {
        &self.search_params
    }
}

/// Builder for [`ExperimentDeclaration`].
#[derive(Debug)]
pub struct ExperimentDeclarationBuilder {
    name: String,
    engine: String,
    collection_params: Params,
    connection_params: Params,
    upload_params: Params,
    search_params: Vec<Params>,
}

impl ExperimentDeclarationBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine: engine.into(),
            collection_params: Params::new(),
            connection_params: Params::new(),
            upload_params: Params::new(),
            search_params: Vec::new(),
        }
    }

    /// Set the collection options.
    #[must_use]
    pub fn collection_params(mut self, params: Params) -> Self {
        self.collection_params = params;
        self
    }

    /// Set the connection options.
    #[must_use]
    pub fn connection_params(mut self, params: Params) -> Self {
        self.connection_params = params;
        self
    }

    /// Set the upload options.
    #[must_use]
    pub fn upload_params(mut self, params: Params) -> Self {
        self.upload_params = params;
        self
    }

    /// Append one search variant.
    #[must_use]
    pub fn search_variant(mut self, params: Params) -> Self {
        self.search_params.push(params);
        self
    }

    /// Replace all search variants.
    #[must_use]
    pub fn search_params(mut self, variants: Vec<Params>) -> Self {
        self.search_params = variants;
        self
    }

    /// Build the declaration; no variants means one empty variant.
    #[must_use]
    pub fn build(self) -> ExperimentDeclaration {
        ExperimentDeclaration {
            name: self.name,
            engine: self.engine,
            collection_params: self.collection_params,
            connection_params: self.connection_params,
            upload_params: self.upload_params,
            search_params: normalize_variants(self.search_params),
        }
    }
}
