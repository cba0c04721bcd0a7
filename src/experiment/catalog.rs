//! Loading experiment declarations and selecting them by name

use super::ExperimentDeclaration;
use crate::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered set of experiment declarations with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentCatalog {
    experiments: Vec<ExperimentDeclaration>,
}

/// Translate a shell-style pattern (`*`, `?`) into an anchored regex.
fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr)
        .map_err(|e| Error::Config(format!("invalid experiment pattern {pattern:?}: {e}")))
}

impl ExperimentCatalog {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document holding either one declaration or a list.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, invalid declarations or duplicate
    /// names.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut catalog = Self::new();
        catalog.extend_from_value(serde_json::from_reader(reader)?)?;
        Ok(catalog)
    }

    /// Parse a JSON string, see [`Self::from_reader`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_reader`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_reader(json.as_bytes())
    }

    /// Load a declaration file, or every `*.json` file of a directory in
    /// sorted path order.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or if two
    /// declarations share a name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut catalog = Self::new();
        if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            files.sort();
            for file in files {
                catalog.load_file(&file)?;
            }
        } else {
            catalog.load_file(path)?;
        }
        Ok(catalog)
    }

    fn load_file(&mut self, path: &Path) -> Result<()> {
        let value: Value = serde_json::from_slice(&fs::read(path)?)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let before = self.experiments.len();
        self.extend_from_value(value)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            experiments = self.experiments.len() - before,
            "experiments loaded"
        );
        Ok(())
    }

    fn extend_from_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.push(serde_json::from_value(item)?)?;
                }
                Ok(())
            }
            single @ Value::Object(_) => self.push(serde_json::from_value(single)?),
            other => Err(Error::Config(format!(
                "expected an experiment object or a list of them, got {other}"
            ))),
        }
    }

    /// Append a declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the name is already present.
    pub fn push(&mut self, declaration: ExperimentDeclaration) -> Result<()> {
        if self.get(declaration.name()).is_some() {
            return Err(Error::Config(format!(
                "duplicate experiment name {:?}",
                declaration.name()
            )));
        }
        self.experiments.push(declaration);
        Ok(())
    }

    /// Declaration named exactly `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ExperimentDeclaration> {
        self.experiments.iter().find(|e| e.name() == name)
    }

    /// Declarations whose name matches the shell-style `pattern`, in catalog
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern cannot be compiled.
    pub fn matching(&self, pattern: &str) -> Result<Vec<&ExperimentDeclaration>> {
        let regex = glob_to_regex(pattern)?;
        Ok(self.experiments.iter().filter(|e| regex.is_match(e.name())).collect())
    }

    /// All declarations, in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = &ExperimentDeclaration> {
        self.experiments.iter()
    }

    /// Declaration names, in catalog order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.experiments.iter().map(ExperimentDeclaration::name).collect()
    }

    /// Number of declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    /// Consume the catalog, yielding its declarations.
    #[must_use]
    pub fn into_declarations(self) -> Vec<ExperimentDeclaration> {
        self.experiments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_translation() {
        let re = glob_to_regex("qdrant-m-*-ef-?").unwrap();
        assert!(re.is_match("qdrant-m-16-ef-8"));
        assert!(!re.is_match("qdrant-m-16-ef-64"));
        assert!(!re.is_match("xqdrant-m-16-ef-8"));
        assert!(glob_to_regex("a.b").unwrap().is_match("a.b"));
        assert!(!glob_to_regex("a.b").unwrap().is_match("axb"));
    }

    #[test]
    fn test_single_object_document() {
        let catalog =
            ExperimentCatalog::from_json_str(r#"{"name": "one", "engine": "memory"}"#).unwrap();
        assert_eq!(catalog.names(), vec!["one"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = ExperimentCatalog::from_json_str(
            r#"[{"name": "a", "engine": "qdrant"}, {"name": "a", "engine": "milvus"}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_scalar_document_rejected() {
        assert!(matches!(ExperimentCatalog::from_json_str("42"), Err(Error::Config(_))));
    }
}
