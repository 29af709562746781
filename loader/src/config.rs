//! Build configuration.
//!
//! Names the schema sources, extension schemas, subset and exclude
//! definitions of a build, plus the options of the resolution stages.
//!
//! # Example YAML
//!
//! ```yaml
//! schemas:
//!   - schemas/
//! include:
//!   - custom/
//! subset:
//!   - subsets/minimal.yml
//! exclude: []
//! strict: false
//! oss: false
//! merge:
//!   validate: false
//!   preserved_attributes: [title, description, short]
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use field_schema_core::{CleanOptions, DEFAULT_PRESERVED_ATTRIBUTES, MergeOptions, PipelineOptions};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Merge stage settings.
///
/// # Examples
///
/// ```
/// # use field_schema_loader::MergeConfig;
/// let merge: MergeConfig = serde_yaml::from_str("validate: true").unwrap();
/// assert!(merge.validate);
/// assert_eq!(merge.preserved_attributes, ["title", "description", "short"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Fail on conflicting values instead of letting extensions win.
    pub validate: bool,
    /// Attributes an extension can never override.
    pub preserved_attributes: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            validate: false,
            preserved_attributes: DEFAULT_PRESERVED_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Top-level build configuration.
///
/// Relative paths are resolved against the directory of the configuration
/// file when it is loaded with [`BuildConfig::load`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Schema files or directories forming the base model.
    pub schemas: Vec<PathBuf>,
    /// Extension schema files or directories merged on top of the base.
    pub include: Vec<PathBuf>,
    /// Subset definition files; several are unioned.
    pub subset: Vec<PathBuf>,
    /// Exclude definition files, applied in order.
    pub exclude: Vec<PathBuf>,
    /// Turn authoring warnings into errors.
    pub strict: bool,
    /// Replace types that are not universally available.
    pub oss: bool,
    pub merge: MergeConfig,
}

impl BuildConfig {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](crate::LoaderError::Io) if the file cannot be read, or
    /// [`Yaml`](crate::LoaderError::Yaml) if parsing fails. A file without
    /// `schemas` is accepted; the schema paths may come from elsewhere, and
    /// [`InputBuilder::build`](crate::InputBuilder::build) rejects a build
    /// that ends up with none.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: BuildConfig = serde_yaml::from_reader(reader)?;
        if let Some(dir) = path.parent() {
            config.rebase(dir);
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Resolves every relative path against `dir`.
    pub fn rebase(&mut self, dir: &Path) {
        for path in self
            .schemas
            .iter_mut()
            .chain(self.include.iter_mut())
            .chain(self.subset.iter_mut())
            .chain(self.exclude.iter_mut())
        {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        }
    }

    /// Stage options described by this configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// # use field_schema_loader::BuildConfig;
    /// let config: BuildConfig = serde_yaml::from_str("schemas: [s]\nstrict: true\n").unwrap();
    /// let options = config.pipeline_options();
    /// assert!(options.clean.strict);
    /// assert!(!options.merge.validate);
    /// ```
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            merge: MergeOptions {
                validate: self.merge.validate,
                preserved_attributes: self.merge.preserved_attributes.clone(),
            },
            clean: CleanOptions {
                strict: self.strict,
            },
            type_fallbacks: self.oss,
        }
    }
}
