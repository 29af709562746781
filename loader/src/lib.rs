//! Reading build inputs for the field-set schema pipeline.
//!
//! This crate is the file-system side of `field-schema-core`: it reads
//! schema documents, subset and exclude definitions from YAML or JSON files
//! and turns a [`BuildConfig`] into a [`BuildInput`](field_schema_core::BuildInput).
//!
//! # Quick start
//!
//! ```no_run
//! use field_schema_core::build;
//! use field_schema_loader::{BuildConfig, InputBuilder};
//!
//! let config = BuildConfig::load("schema-build.yml").unwrap();
//! let input = InputBuilder::from_config(&config).build().unwrap();
//! let output = build(input, &config.pipeline_options()).unwrap();
//! for (name, field) in output.flat.iter() {
//!     println!("{name}: {}", field.field_type.as_deref().unwrap_or("?"));
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::{BuildConfig, MergeConfig};
pub use error::{LoaderError, Result};
pub use loader::{
    InputBuilder, read_exclude_definitions, read_schema_file, read_schema_paths,
    read_subset_definitions, schema_files,
};
