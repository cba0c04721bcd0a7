//! Collection schema handed to configurators

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vector similarity function of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity (higher is better)
    #[serde(alias = "angular")]
    Cosine,
    /// Euclidean distance (lower is better)
    #[serde(alias = "l2", alias = "euclidean")]
    Euclid,
    /// Inner product (higher is better)
    #[serde(alias = "ip", alias = "dot_product")]
    Dot,
}

impl Distance {
    /// Whether larger scores rank first.
    #[must_use]
    pub const fn higher_is_better(self) -> bool {
        !matches!(self, Self::Euclid)
    }
}

/// Payload field type used for payload indexes and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Exact-match string
    Keyword,
    /// 64-bit integer
    Int,
    /// Floating point
    Float,
    /// Full-text string
    Text,
}

/// Shape of the collection a configurator provisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSchema {
    /// Vector dimensionality
    pub vector_size: usize,
    /// Similarity function
    pub distance: Distance,
    /// Indexed payload fields
    #[serde(default)]
    pub payload: BTreeMap<String, FieldType>,
}

impl CollectionSchema {
    /// Schema without payload fields.
    #[must_use]
    pub const fn new(vector_size: usize, distance: Distance) -> Self {
        Self {
            vector_size,
            distance,
            payload: BTreeMap::new(),
        }
    }

    /// Add an indexed payload field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.payload.insert(name.into(), field_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_aliases() {
        let d: Distance = serde_json::from_str("\"angular\"").unwrap();
        assert_eq!(d, Distance::Cosine);
        let d: Distance = serde_json::from_str("\"l2\"").unwrap();
        assert_eq!(d, Distance::Euclid);
        assert!(!Distance::Euclid.higher_is_better());
        assert!(Distance::Dot.higher_is_better());
    }

    #[test]
    fn test_schema_builder() {
        let schema =
            CollectionSchema::new(4, Distance::Cosine).with_field("color", FieldType::Keyword);
        assert_eq!(schema.payload.get("color"), Some(&FieldType::Keyword));
    }
}
