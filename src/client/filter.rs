//! Engine-neutral payload filters
//!
//! Benchmark datasets express query conditions as a small JSON language:
//!
//! ```text
//! {"and": [{"color": {"match": {"value": "red"}}},
//!          {"price": {"range": {"gte": 10, "lt": 20}}}]}
//! ```
//!
//! [`Filter::from_conditions`] parses it once; each engine translates the
//! typed tree into its native filter syntax.

use crate::params::Params;
use crate::{Error, Result};
use serde_json::Value;

/// Numeric bounds of a range condition.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Range {
    /// Strictly greater than
    pub gt: Option<f64>,
    /// Greater than or equal
    pub gte: Option<f64>,
    /// Strictly less than
    pub lt: Option<f64>,
    /// Less than or equal
    pub lte: Option<f64>,
}

impl Range {
    /// Whether `value` satisfies every bound.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.gt.map_or(true, |b| value > b)
            && self.gte.map_or(true, |b| value >= b)
            && self.lt.map_or(true, |b| value < b)
            && self.lte.map_or(true, |b| value <= b)
    }

    /// Bounds as `(operator, value)` pairs, in gt/gte/lt/lte order.
    pub fn bounds(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [("gt", self.gt), ("gte", self.gte), ("lt", self.lt), ("lte", self.lte)]
            .into_iter()
            .filter_map(|(op, v)| v.map(|v| (op, v)))
    }
}

/// Payload filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field equals value (string, integer or bool)
    Match {
        /// Payload field
        field: String,
        /// Expected value
        value: Value,
    },
    /// Numeric field within bounds
    Range {
        /// Payload field
        field: String,
        /// Bounds
        range: Range,
    },
    /// All sub-filters hold
    And(Vec<Filter>),
    /// At least one sub-filter holds
    Or(Vec<Filter>),
}

impl Filter {
    /// Exact-match condition.
    #[must_use]
    pub fn matches_value(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Match {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Parse the benchmark condition language.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] for unknown operators, empty
    /// conditions or non-numeric range bounds.
    pub fn from_conditions(conditions: &Value) -> Result<Self> {
        let Value::Object(map) = conditions else {
            return Err(Error::InvalidFilter(format!("expected object, got {conditions}")));
        };
        let mut clauses = Vec::with_capacity(map.len());
        for (key, body) in map {
            clauses.push(Self::parse_clause(key, body)?);
        }
        match clauses.len() {
            0 => Err(Error::InvalidFilter("empty conditions".to_string())),
            1 => Ok(clauses.remove(0)),
            _ => Ok(Self::And(clauses)),
        }
    }

    fn parse_clause(key: &str, body: &Value) -> Result<Self> {
        match (key, body) {
            ("and" | "or", Value::Array(items)) => {
                let parsed = items.iter().map(Self::from_conditions).collect::<Result<Vec<_>>>()?;
                Ok(if key == "and" { Self::And(parsed) } else { Self::Or(parsed) })
            }
            (field, Value::Object(ops)) => Self::parse_field(field, ops),
            _ => Err(Error::InvalidFilter(format!("malformed condition on {key:?}: {body}"))),
        }
    }

    fn parse_field(field: &str, ops: &serde_json::Map<String, Value>) -> Result<Self> {
        if let Some(m) = ops.get("match") {
            let value = m
                .get("value")
                .cloned()
                .ok_or_else(|| Error::InvalidFilter(format!("match on {field:?} without value")))?;
            return Ok(Self::Match {
                field: field.to_string(),
                value,
            });
        }
        if let Some(Value::Object(bounds)) = ops.get("range") {
            let mut range = Range::default();
            for (op, v) in bounds {
                let v = v.as_f64().ok_or_else(|| {
                    Error::InvalidFilter(format!("non-numeric bound {op} on {field:?}"))
                })?;
                match op.as_str() {
                    "gt" => range.gt = Some(v),
                    "gte" => range.gte = Some(v),
                    "lt" => range.lt = Some(v),
                    "lte" => range.lte = Some(v),
                    other => {
                        return Err(Error::InvalidFilter(format!(
                            "unknown range operator {other:?}"
                        )))
                    }
                }
            }
            return Ok(Self::Range {
                field: field.to_string(),
                range,
            });
        }
        Err(Error::InvalidFilter(format!(
            "unsupported condition on {field:?}: {}",
            Value::Object(ops.clone())
        )))
    }

    /// Evaluate against a record payload. Missing fields never match.
    #[must_use]
    pub fn matches(&self, payload: Option<&Params>) -> bool {
        match self {
            Self::Match { field, value } => payload
                .and_then(|p| p.get(field))
                .is_some_and(|actual| match actual {
                    Value::Array(items) => items.contains(value),
                    other => other == value,
                }),
            Self::Range { field, range } => payload
                .and_then(|p| p.get(field))
                .and_then(Value::as_f64)
                .is_some_and(|v| range.contains(v)),
            Self::And(filters) => filters.iter().all(|f| f.matches(payload)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(payload)),
        }
    }
}
