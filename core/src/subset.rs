//! Allow-list filtering of a resolved model.
//!
//! A subset is a sparse tree mirroring the model: top-level keys are field
//! sets, nested `fields` maps name child segments, and `fields: "*"` (or no
//! `fields` key at all) keeps a node with everything beneath it. Several
//! subsets are combined by recursive union before being applied.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::types::{FieldDetails, FieldNode, Schema};

/// Description given to intermediate fields promoted by subset options.
pub const PROMOTED_INTERMEDIATE_DESCRIPTION: &str =
    "Intermediate field included by adding option with subset";

/// Segment name to selection node.
pub type FieldSelection = BTreeMap<String, SelectionNode>;

/// Children selected below a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SelectionRepr", into = "SelectionRepr")]
pub enum Selection {
    /// `"*"`: the node and everything beneath it.
    All,
    /// Only the named children.
    Fields(FieldSelection),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectionRepr {
    Wildcard(String),
    Fields(FieldSelection),
}

impl TryFrom<SelectionRepr> for Selection {
    type Error = String;

    fn try_from(repr: SelectionRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            SelectionRepr::Wildcard(s) if s == "*" => Ok(Selection::All),
            SelectionRepr::Wildcard(s) => Err(format!(
                "unexpected value '{s}' for 'fields', expected '*' or a mapping"
            )),
            SelectionRepr::Fields(fields) => Ok(Selection::Fields(fields)),
        }
    }
}

impl From<Selection> for SelectionRepr {
    fn from(selection: Selection) -> Self {
        match selection {
            Selection::All => SelectionRepr::Wildcard("*".to_string()),
            Selection::Fields(fields) => SelectionRepr::Fields(fields),
        }
    }
}

/// One node of a selection tree, with optional mapping options.
///
/// A bare key (`agent:` with no value) is the same as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<SelectionNodeRepr>", into = "SelectionNodeRepr")]
pub struct SelectionNode {
    pub fields: Option<Selection>,
    /// Copied onto the field as the `enabled` mapping option.
    pub enabled: Option<bool>,
    /// Copied onto the field's `index` attribute.
    pub index: Option<bool>,
}

#[derive(Default, Serialize, Deserialize)]
struct SelectionNodeRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Selection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<bool>,
}

impl From<Option<SelectionNodeRepr>> for SelectionNode {
    fn from(repr: Option<SelectionNodeRepr>) -> Self {
        let repr = repr.unwrap_or_default();
        SelectionNode {
            fields: repr.fields,
            enabled: repr.enabled,
            index: repr.index,
        }
    }
}

impl From<SelectionNode> for SelectionNodeRepr {
    fn from(node: SelectionNode) -> Self {
        SelectionNodeRepr {
            fields: node.fields,
            enabled: node.enabled,
            index: node.index,
        }
    }
}

impl SelectionNode {
    /// Selects the node and all its children.
    pub fn all() -> Self {
        Self {
            fields: Some(Selection::All),
            ..Self::default()
        }
    }

    /// Selects the node and only the given children.
    pub fn with_fields(fields: FieldSelection) -> Self {
        Self {
            fields: Some(Selection::Fields(fields)),
            ..Self::default()
        }
    }

    /// Returns `true` if everything beneath the node is selected.
    pub fn selects_all(&self) -> bool {
        matches!(self.fields, None | Some(Selection::All))
    }

    fn has_options(&self) -> bool {
        self.enabled.is_some() || self.index.is_some()
    }
}

/// A named subset document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubsetDefinition {
    pub name: String,
    #[serde(default)]
    pub fields: FieldSelection,
}

/// Unions several selections: a field kept by any of them survives.
///
/// `enabled`/`index` options survive only when every selection naming the
/// node disables them.
///
/// # Examples
///
/// ```
/// use field_schema_core::{FieldSelection, SelectionNode, SubsetDefinition, combine_subsets};
///
/// let one = SubsetDefinition {
///     name: "one".into(),
///     fields: FieldSelection::from([(
///         "host".to_string(),
///         SelectionNode::with_fields(FieldSelection::from([("name".to_string(), SelectionNode::default())])),
///     )]),
/// };
/// let two = SubsetDefinition {
///     name: "two".into(),
///     fields: FieldSelection::from([(
///         "host".to_string(),
///         SelectionNode::with_fields(FieldSelection::from([("ip".to_string(), SelectionNode::default())])),
///     )]),
/// };
///
/// let combined = combine_subsets(&[one, two]);
/// assert!(!combined["host"].selects_all());
/// ```
pub fn combine_subsets(subsets: &[SubsetDefinition]) -> FieldSelection {
    let mut combined = FieldSelection::new();
    for subset in subsets {
        union_into(&mut combined, &subset.fields);
    }
    combined
}

fn union_into(base: &mut FieldSelection, other: &FieldSelection) {
    for (key, incoming) in other {
        let Some(existing) = base.get_mut(key) else {
            base.insert(key.clone(), incoming.clone());
            continue;
        };
        existing.fields = match (existing.fields.take(), &incoming.fields) {
            (Some(Selection::Fields(mut mine)), Some(Selection::Fields(theirs))) => {
                union_into(&mut mine, theirs);
                Some(Selection::Fields(mine))
            }
            (Some(Selection::All), _) | (_, Some(Selection::All)) => Some(Selection::All),
            // A missing `fields` on either side already selects everything.
            (None, _) | (_, None) => None,
        };
        if !(existing.enabled == Some(false) && incoming.enabled == Some(false)) {
            existing.enabled = None;
        }
        if !(existing.index == Some(false) && incoming.index == Some(false)) {
            existing.index = None;
        }
    }
}

/// Keeps only the selected field sets and fields of `schema`.
///
/// Fails with [`SchemaError::UnknownFieldReference`] when the selection names
/// a path absent from the model.
pub fn subset(schema: &Schema, selection: &FieldSelection) -> Result<Schema> {
    let mut kept = Schema::new();
    for (name, node) in selection {
        let fieldset = schema
            .get(name)
            .ok_or_else(|| SchemaError::UnknownFieldReference { path: name.clone() })?;
        let mut fieldset = fieldset.clone();
        apply_options(&mut fieldset.details, node);
        if let Some(Selection::Fields(children)) = &node.fields {
            fieldset.fields = select_tree(&fieldset.fields, children, name)?;
        }
        kept.insert(fieldset);
    }
    debug!(
        fieldsets = kept.len(),
        dropped = schema.len() - kept.len(),
        "applied subset"
    );
    Ok(kept)
}

fn select_tree(
    fields: &BTreeMap<String, FieldNode>,
    selection: &FieldSelection,
    prefix: &str,
) -> Result<BTreeMap<String, FieldNode>> {
    let mut kept = BTreeMap::new();
    for (key, wanted) in selection {
        let path = format!("{prefix}.{key}");
        let node = fields
            .get(key)
            .ok_or_else(|| SchemaError::UnknownFieldReference { path: path.clone() })?;
        let mut node = node.clone();
        if let Some(details) = node.details_mut() {
            apply_options(details, wanted);
        }
        if let Some(Selection::Fields(children)) = &wanted.fields {
            match node.children_mut() {
                Some(existing) => {
                    *existing = select_tree(existing, children, &path)?;
                }
                None => {
                    if let Some(child) = children.keys().next() {
                        return Err(SchemaError::UnknownFieldReference {
                            path: format!("{path}.{child}"),
                        });
                    }
                }
            }
        }
        kept.insert(key.clone(), node);
    }
    Ok(kept)
}

fn apply_options(details: &mut FieldDetails, node: &SelectionNode) {
    if !node.has_options() {
        return;
    }
    if details.intermediate {
        details.intermediate = false;
        details
            .description
            .get_or_insert_with(|| PROMOTED_INTERMEDIATE_DESCRIPTION.to_string());
        details.level = Some("custom".to_string());
        if details.short.is_none() {
            details.short = details.description.clone();
        }
        details.normalize.get_or_insert_with(Vec::new);
    }
    if let Some(index) = node.index {
        details.index = Some(index);
    }
    if let Some(enabled) = node.enabled {
        details
            .extra
            .insert("enabled".to_string(), serde_yaml::Value::Bool(enabled));
    }
}

/// Combines `subsets` and applies the union; no subsets keeps everything.
pub fn apply_subsets(schema: Schema, subsets: &[SubsetDefinition]) -> Result<Schema> {
    if subsets.is_empty() {
        return Ok(schema);
    }
    let combined = combine_subsets(subsets);
    subset(&schema, &combined)
}
