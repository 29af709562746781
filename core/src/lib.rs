//! Field-set schema resolution.
//!
//! This crate turns authored field-set definitions into one consistent
//! field model:
//!
//! - [`load_documents`] checks names and trims the raw declarations of a
//!   merge group.
//! - [`nest_schema`] turns flat dotted field lists into trees of
//!   [`FieldNode`]s.
//! - [`merge_schemas`] layers extension models on top of a base model,
//!   following [`MergeOptions`].
//! - [`clean`] checks mandatory attributes and fills authoring defaults.
//! - [`resolve_reuse`] grafts reusable field sets into their destinations.
//! - [`finalize`] computes flat names and type defaults.
//! - [`subset`] and [`exclude`] prune the model to an allow- or deny-list.
//! - [`FlatView`] and [`NestedView`] are the read-only views consumed by
//!   emitters, and [`Visitor`] walks every field set and field.
//!
//! [`build`] runs all stages in order.
//!
//! # Example
//!
//! ```
//! use field_schema_core::*;
//!
//! let yaml = r#"
//! - name: user
//!   title: User
//!   description: User fields.
//!   reusable:
//!     top_level: true
//!     expected:
//!       - destination
//!       - at: user
//!         as: target
//!   fields:
//!     - name: name
//!       level: core
//!       type: keyword
//!       description: Short name or login of the user.
//! - name: destination
//!   title: Destination
//!   description: Destination fields.
//!   fields:
//!     - name: address
//!       level: extended
//!       type: keyword
//!       description: Destination address.
//! "#;
//! let document = SchemaDocument::new("schemas.yml", serde_yaml::from_str(yaml).unwrap());
//! let input = BuildInput {
//!     sources: vec![SourceGroup::new("core", vec![document])],
//!     ..BuildInput::default()
//! };
//! let output = build(input, &PipelineOptions::default()).unwrap();
//!
//! assert!(output.flat.contains("destination.user.name"));
//! assert_eq!(
//!     output.flat.get("user.target.name").unwrap().original_fieldset.as_deref(),
//!     Some("user")
//! );
//! ```

mod clean;
mod document;
mod error;
mod exclude;
mod finalize;
mod merge;
mod nest;
mod pipeline;
mod reuse;
mod subset;
mod types;
mod view;
mod visitor;

pub use clean::{CleanOptions, SHORT_LIMIT, clean};
pub use document::{
    FieldSetDecl, RawField, RawFieldSet, RawReusable, RawReuseTarget, ReuseSpec, SchemaDocument,
    load_documents,
};
pub use error::{Result, SchemaError};
pub use exclude::{ExcludeDefinition, ExcludeEntry, ExcludeField, exclude, exclude_all};
pub use finalize::{
    KEYWORD_IGNORE_ABOVE, TYPE_FALLBACKS, apply_type_fallbacks, assign_names, dashed_name,
    finalize,
};
pub use merge::{DEFAULT_PRESERVED_ATTRIBUTES, MergeOptions, merge_all, merge_schemas};
pub use nest::{nest_fields, nest_fieldset, nest_schema};
pub use pipeline::{BuildInput, BuildOutput, PipelineOptions, SourceGroup, build, resolve};
pub use reuse::resolve_reuse;
pub use subset::{
    FieldSelection, PROMOTED_INTERMEDIATE_DESCRIPTION, Selection, SelectionNode,
    SubsetDefinition, apply_subsets, combine_subsets, subset,
};
pub use types::*;
pub use view::{FieldSetView, FlatView, NestedView, build_views};
pub use visitor::{
    FieldContext, Visitor, VisitorMut, for_each_field, for_each_field_mut, walk, walk_mut,
};
