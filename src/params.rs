//! Opaque parameter mappings and their translation into typed structs
//!
//! Experiment declarations carry free-form key/value tuning options. They stay
//! opaque only up to the plugin boundary: every engine turns the mapping into
//! its own `#[serde(default)]` struct through [`parse_params`].

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Opaque key/value tuning options.
pub type Params = serde_json::Map<String, Value>;

/// Collaborator role a parameter mapping is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRole {
    /// Collection/schema setup options
    Collection,
    /// Connection options shared by all collaborators
    Connection,
    /// Bulk ingestion options
    Upload,
    /// One query-time variant
    Search,
}

impl ParamRole {
    /// Lower-case role name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Connection => "connection",
            Self::Upload => "upload",
            Self::Search => "search",
        }
    }
}

/// Translate an opaque mapping into a typed parameter struct.
///
/// # Errors
///
/// Returns [`Error::InvalidParams`] naming the engine and role when the
/// mapping does not fit `T`.
pub fn parse_params<T: DeserializeOwned>(
    engine: &str,
    role: ParamRole,
    params: &Params,
) -> Result<T> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| Error::InvalidParams {
        engine: engine.to_string(),
        role: role.as_str(),
        reason: e.to_string(),
    })
}

/// Build a [`Params`] from a JSON object literal.
///
/// Non-object values yield an empty mapping.
#[must_use]
pub fn params_from(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// Merge `overlay` into `base` recursively; objects merge, everything else replaces.
pub(crate) fn merge_into(base: &mut Params, overlay: &Params) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
