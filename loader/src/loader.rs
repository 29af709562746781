//! Reading schema documents and filter definitions from disk.
//!
//! Schema files hold a list of field-set declarations in YAML (`.yml`,
//! `.yaml`) or JSON (`.json`). A directory stands for every such file
//! directly inside it, in name order.
//!
//! ```no_run
//! use field_schema_core::{PipelineOptions, build};
//! use field_schema_loader::InputBuilder;
//!
//! let input = InputBuilder::new()
//!     .schemas("schemas/")
//!     .include("custom/")
//!     .subset("subsets/minimal.yml")
//!     .build()
//!     .unwrap();
//! let output = build(input, &PipelineOptions::default()).unwrap();
//! println!("{} fields", output.flat.len());
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use field_schema_core::{
    BuildInput, ExcludeDefinition, RawFieldSet, SchemaDocument, SourceGroup, SubsetDefinition,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::BuildConfig;
use crate::error::{LoaderError, Result};

const SCHEMA_EXTENSIONS: [&str; 3] = ["yml", "yaml", "json"];

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}

/// Parses a YAML or JSON file, choosing the format by extension.
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let parsed = if is_json(path) {
        serde_json::from_reader(reader).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_reader(reader).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| LoaderError::InvalidDocument {
        path: path.to_path_buf(),
        message,
    })
}

/// Reads one schema file.
///
/// # Errors
///
/// Returns [`LoaderError::Io`] if the file cannot be opened, or
/// [`LoaderError::InvalidDocument`] if it is not a list of field sets.
pub fn read_schema_file(path: impl AsRef<Path>) -> Result<SchemaDocument> {
    let path = path.as_ref();
    let fieldsets: Vec<RawFieldSet> = read_document(path)?;
    debug!(path = %path.display(), fieldsets = fieldsets.len(), "read schema file");
    Ok(SchemaDocument::new(path.display().to_string(), fieldsets))
}

/// Expands `path` to the schema files it names.
///
/// A file is returned as is; a directory yields its `.yml`, `.yaml` and
/// `.json` files sorted by name. Subdirectories are not descended into.
pub fn schema_files(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let file_path = entry?.path();
        let has_schema_extension = file_path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SCHEMA_EXTENSIONS.contains(&ext));
        if file_path.is_file() && has_schema_extension {
            files.push(file_path);
        }
    }
    files.sort();
    Ok(files)
}

/// Reads every schema file named by `paths`, directories expanded.
pub fn read_schema_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SchemaDocument>> {
    let mut documents = Vec::new();
    for path in paths {
        for file in schema_files(path)? {
            documents.push(read_schema_file(&file)?);
        }
    }
    Ok(documents)
}

/// Reads subset definition files.
pub fn read_subset_definitions<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SubsetDefinition>> {
    paths
        .iter()
        .map(|path| read_document(path.as_ref()))
        .collect()
}

/// Reads exclude definition files, in either list or tree form.
pub fn read_exclude_definitions<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ExcludeDefinition>> {
    paths
        .iter()
        .map(|path| read_document(path.as_ref()))
        .collect()
}

/// Collects the files of a build into a [`BuildInput`].
///
/// Schema paths form the base merge group; include paths form a second
/// group merged on top of it.
///
/// # Example
///
/// ```no_run
/// use field_schema_loader::{BuildConfig, InputBuilder};
///
/// let config = BuildConfig::load("schema-build.yml").unwrap();
/// let input = InputBuilder::from_config(&config).build().unwrap();
/// assert!(!input.sources.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InputBuilder {
    schemas: Vec<PathBuf>,
    include: Vec<PathBuf>,
    subsets: Vec<PathBuf>,
    excludes: Vec<PathBuf>,
}

impl InputBuilder {
    /// Creates a builder with no paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from the paths listed in `config`.
    pub fn from_config(config: &BuildConfig) -> Self {
        Self {
            schemas: config.schemas.clone(),
            include: config.include.clone(),
            subsets: config.subset.clone(),
            excludes: config.exclude.clone(),
        }
    }

    /// Adds a base schema file or directory.
    pub fn schemas(mut self, path: impl Into<PathBuf>) -> Self {
        self.schemas.push(path.into());
        self
    }

    /// Adds an extension schema file or directory.
    pub fn include(mut self, path: impl Into<PathBuf>) -> Self {
        self.include.push(path.into());
        self
    }

    /// Adds a subset definition file.
    pub fn subset(mut self, path: impl Into<PathBuf>) -> Self {
        self.subsets.push(path.into());
        self
    }

    /// Adds an exclude definition file.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excludes.push(path.into());
        self
    }

    /// Reads every configured file.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidConfig`] when no schema path was given,
    /// [`LoaderError::NoSchemaFiles`] when the schema paths hold no schema
    /// file, or the first read/parse error encountered.
    pub fn build(self) -> Result<BuildInput> {
        if self.schemas.is_empty() {
            return Err(LoaderError::InvalidConfig(
                "no schema paths given".to_string(),
            ));
        }
        let base = read_schema_paths(&self.schemas)?;
        if base.is_empty() {
            let listed: Vec<String> = self
                .schemas
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            return Err(LoaderError::NoSchemaFiles(listed.join(", ")));
        }

        let mut sources = vec![SourceGroup::new("schemas", base)];
        let extensions = read_schema_paths(&self.include)?;
        if !extensions.is_empty() {
            sources.push(SourceGroup::new("include", extensions));
        }

        let input = BuildInput {
            sources,
            subsets: read_subset_definitions(&self.subsets)?,
            excludes: read_exclude_definitions(&self.excludes)?,
        };
        debug!(
            groups = input.sources.len(),
            subsets = input.subsets.len(),
            excludes = input.excludes.len(),
            "collected build input"
        );
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const AGENT: &str = "- name: agent\n  title: Agent\n  description: Agent fields.\n";

    #[test]
    fn test_directory_expansion_is_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.yml"), AGENT).unwrap();
        std::fs::write(dir.path().join("a.yaml"), AGENT).unwrap();
        std::fs::write(dir.path().join("c.json"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.md"), "# notes").unwrap();
        std::fs::create_dir(dir.path().join("nested.yml")).unwrap();

        let files = schema_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.yaml", "b.yml", "c.json"]);
    }

    #[test]
    fn test_json_schema_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agent.json");
        std::fs::write(&path, r#"[{"name": "agent", "title": "Agent"}]"#).unwrap();

        let document = read_schema_file(&path).unwrap();
        assert_eq!(document.fieldsets.len(), 1);
        assert_eq!(document.fieldsets[0].name.as_deref(), Some("agent"));
    }

    #[test]
    fn test_invalid_document_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yml");
        std::fs::write(&path, "name: not-a-list\n").unwrap();

        let err = read_schema_file(&path).unwrap_err();
        assert!(matches!(err, LoaderError::InvalidDocument { .. }));
        assert!(err.to_string().contains("broken.yml"));
    }

    #[test]
    fn test_builder_without_schema_paths_is_invalid() {
        let err = InputBuilder::new().build().unwrap_err();
        assert!(matches!(err, LoaderError::InvalidConfig(_)));
    }

    #[test]
    fn test_builder_without_schema_files_fails() {
        let dir = TempDir::new().unwrap();
        let err = InputBuilder::new().schemas(dir.path()).build().unwrap_err();
        assert!(matches!(err, LoaderError::NoSchemaFiles(_)));
    }
}
