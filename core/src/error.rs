//! Error type shared by every pipeline stage.
//!
//! All failures are fatal: a stage either returns a fully consistent model
//! or one of these errors, and the build is expected to stop there.

use thiserror::Error;

/// Errors raised while loading, merging, resolving or filtering a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// A field-set declaration has no `name`.
    #[error("field set declaration in {document} is missing mandatory attribute 'name'")]
    MissingName { document: String },

    /// Two declarations in one source group share a name.
    #[error("duplicate field set '{name}' declared in {document}")]
    DuplicateFieldSetName { name: String, document: String },

    /// A field set or field lacks required attributes.
    #[error("{subject} is missing mandatory attributes: {}", .missing.join(", "))]
    MissingMandatoryAttribute {
        subject: String,
        missing: Vec<String>,
    },

    /// Two sources disagree on a value that may not be silently resolved.
    #[error("schema conflict at {path}: base has {base}, overlay has {overlay}")]
    SchemaConflict {
        path: String,
        base: String,
        overlay: String,
    },

    /// Two fields resolve to the same flat name.
    #[error("flat name {flat_name} is produced by both {first} and {second}")]
    DuplicateFlatName {
        flat_name: String,
        first: String,
        second: String,
    },

    /// A reuse destination path does not exist.
    #[error("reuse destination {path} not found: no field named '{missing}'")]
    DestinationNotFound { path: String, missing: String },

    /// Two reuse operations target the same mount point.
    #[error("mount collision at {full}: already occupied by {existing}, cannot mount {incoming}")]
    MountCollision {
        full: String,
        existing: String,
        incoming: String,
    },

    /// A reuse destination lies inside a mount of a non top-level reusable field set.
    #[error(
        "field set '{fieldset}' cannot be reused at {destination}: it lies inside a copy of '{mounted}', which is not reusable at the top level"
    )]
    IllegalNestedReuse {
        fieldset: String,
        destination: String,
        mounted: String,
    },

    /// Malformed or forbidden reuse declaration.
    #[error("invalid reuse: {0}")]
    InvalidReuse(String),

    /// A subset or exclude definition names a path absent from the model.
    #[error("unknown field reference: {path}")]
    UnknownFieldReference { path: String },

    /// A field's `level` is not one of `core`, `extended` or `custom`.
    #[error("invalid level '{level}' for field '{field}' (expected core, extended or custom)")]
    InvalidLevel { field: String, level: String },

    /// A `short` description spans more than one line.
    #[error("short description of {subject} must be a single line: {short:?}")]
    MultilineShortDescription { subject: String, short: String },

    /// A cleaning warning raised as an error because strict mode is on.
    #[error("strict check failed: {0}")]
    StrictCheck(String),
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;
