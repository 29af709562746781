//! End-to-end resolution: documents in, resolved model and views out.

use tracing::{debug, info};

use crate::clean::{CleanOptions, clean};
use crate::document::{SchemaDocument, load_documents};
use crate::error::Result;
use crate::exclude::{ExcludeDefinition, exclude_all};
use crate::finalize::{apply_type_fallbacks, finalize};
use crate::merge::{MergeOptions, merge_all};
use crate::nest::nest_schema;
use crate::reuse::resolve_reuse;
use crate::subset::{SubsetDefinition, apply_subsets};
use crate::types::Schema;
use crate::view::{FlatView, NestedView, build_views};

/// Options for every stage of [`build`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub merge: MergeOptions,
    pub clean: CleanOptions,
    /// Replace types that are not universally available, see
    /// [`apply_type_fallbacks`].
    pub type_fallbacks: bool,
}

/// Documents that form one merge group.
///
/// Field-set names must be unique within a group; groups are merged on top
/// of each other in order, so later groups act as overlays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceGroup {
    pub label: String,
    pub documents: Vec<SchemaDocument>,
}

impl SourceGroup {
    pub fn new(label: impl Into<String>, documents: Vec<SchemaDocument>) -> Self {
        Self {
            label: label.into(),
            documents,
        }
    }
}

/// Everything a build reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildInput {
    pub sources: Vec<SourceGroup>,
    pub subsets: Vec<SubsetDefinition>,
    pub excludes: Vec<ExcludeDefinition>,
}

/// The resolved model and its two views.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOutput {
    pub schema: Schema,
    pub nested: NestedView,
    pub flat: FlatView,
}

/// Resolves the documents of a single merge group, without filters.
pub fn resolve(group: SourceGroup, options: &PipelineOptions) -> Result<Schema> {
    build(
        BuildInput {
            sources: vec![group],
            ..BuildInput::default()
        },
        options,
    )
    .map(|output| output.schema)
}

/// Runs load, nest, merge, clean, reuse, finalize, subset and exclude, then
/// builds the views of the result.
///
/// # Examples
///
/// ```
/// use field_schema_core::{BuildInput, PipelineOptions, SchemaDocument, SourceGroup, build};
///
/// let yaml = r#"
/// - name: base
///   title: Base
///   root: true
///   description: Top-level fields.
///   fields:
///     - name: message
///       level: core
///       type: match_only_text
///       description: Log message.
/// "#;
/// let document = SchemaDocument::new("base.yml", serde_yaml::from_str(yaml).unwrap());
/// let input = BuildInput {
///     sources: vec![SourceGroup::new("core", vec![document])],
///     ..BuildInput::default()
/// };
///
/// let output = build(input, &PipelineOptions::default()).unwrap();
/// assert_eq!(output.flat.get("message").unwrap().field_type.as_deref(), Some("match_only_text"));
/// ```
pub fn build(input: BuildInput, options: &PipelineOptions) -> Result<BuildOutput> {
    let mut models = Vec::with_capacity(input.sources.len());
    for group in input.sources {
        debug!(group = %group.label, documents = group.documents.len(), "loading source group");
        let decls = load_documents(group.documents)?;
        models.push(nest_schema(decls)?);
    }

    let merged = merge_all(models, &options.merge)?;
    let cleaned = clean(merged, &options.clean)?;
    let resolved = resolve_reuse(cleaned)?;
    let mut schema = finalize(resolved);
    if options.type_fallbacks {
        schema = apply_type_fallbacks(schema);
    }
    let schema = apply_subsets(schema, &input.subsets)?;
    let schema = exclude_all(schema, &input.excludes)?;

    let (nested, flat) = build_views(&schema)?;
    info!(
        fieldsets = schema.len(),
        fields = flat.len(),
        "schema build complete"
    );
    Ok(BuildOutput {
        schema,
        nested,
        flat,
    })
}
