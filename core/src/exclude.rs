//! Deny-list filtering of a resolved model.
//!
//! Exclusions are written either as the sparse tree used by subsets, where
//! a node without children is removed entirely, or as a list of field sets
//! each naming dotted field paths to drop.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::subset::{FieldSelection, Selection};
use crate::types::{FieldNode, Schema};

/// A dotted field path to drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeField {
    pub name: String,
}

/// The fields to drop from one field set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludeEntry {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<ExcludeField>,
}

/// One exclude document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExcludeDefinition {
    /// `[{name: log, fields: [{name: origin.function}]}]`
    Paths(Vec<ExcludeEntry>),
    /// `{log: {fields: {origin: {fields: {function: {}}}}}}`
    Tree(FieldSelection),
}

impl ExcludeDefinition {
    /// Dotted paths (field-set name first) removed by this definition.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        match self {
            ExcludeDefinition::Paths(entries) => {
                for entry in entries {
                    if entry.fields.is_empty() {
                        paths.push(entry.name.clone());
                    }
                    for field in &entry.fields {
                        paths.push(format!("{}.{}", entry.name, field.name));
                    }
                }
            }
            ExcludeDefinition::Tree(selection) => tree_paths(selection, "", &mut paths),
        }
        paths
    }
}

fn tree_paths(selection: &FieldSelection, prefix: &str, out: &mut Vec<String>) {
    for (key, node) in selection {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match &node.fields {
            Some(Selection::Fields(children)) if !children.is_empty() => {
                tree_paths(children, &path, out)
            }
            _ => out.push(path),
        }
    }
}

/// Removes the nodes named by `definition` from `schema`.
///
/// Groups emptied by a removal are removed too, and so are emptied field
/// sets unless they are `root`. A path that is absent fails with
/// [`SchemaError::UnknownFieldReference`] unless it lies beneath a path that
/// was already removed.
///
/// # Examples
///
/// ```
/// use field_schema_core::{ExcludeDefinition, ExcludeEntry, ExcludeField, FieldDetails, FieldNode, FieldSet, Schema, exclude};
///
/// let mut log = FieldSet::new("log");
/// log.fields.insert("level".into(), FieldNode::Leaf(FieldDetails::default()));
/// log.fields.insert("logger".into(), FieldNode::Leaf(FieldDetails::default()));
///
/// let definition = ExcludeDefinition::Paths(vec![ExcludeEntry {
///     name: "log".into(),
///     fields: vec![ExcludeField { name: "level".into() }],
/// }]);
/// let schema = exclude(Schema::from_iter([log]), &definition).unwrap();
///
/// assert!(schema.node_at("log.level").is_none());
/// assert!(schema.node_at("log.logger").is_some());
/// ```
pub fn exclude(schema: Schema, definition: &ExcludeDefinition) -> Result<Schema> {
    exclude_all(schema, std::slice::from_ref(definition))
}

/// Applies every exclude definition in order.
pub fn exclude_all(mut schema: Schema, definitions: &[ExcludeDefinition]) -> Result<Schema> {
    let mut removed: Vec<String> = Vec::new();
    for definition in definitions {
        for path in definition.paths() {
            remove_path(&mut schema, &path, &mut removed)?;
        }
    }
    if !removed.is_empty() {
        debug!(removed = removed.len(), "applied excludes");
    }
    Ok(schema)
}

fn remove_path(schema: &mut Schema, path: &str, removed: &mut Vec<String>) -> Result<()> {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((fieldset_name, field_path)) = segments.split_first() else {
        return Ok(());
    };

    let found = if field_path.is_empty() {
        schema.remove(fieldset_name).is_some()
    } else if let Some(fieldset) = schema.get_mut(fieldset_name) {
        let found = pop_node(&mut fieldset.fields, field_path);
        let emptied = found && fieldset.fields.is_empty() && !fieldset.is_root();
        if emptied {
            debug!(fieldset = %fieldset_name, "removed emptied field set");
            schema.remove(fieldset_name);
            removed.push((*fieldset_name).to_string());
        }
        found
    } else {
        false
    };

    if found {
        removed.push(path.to_string());
        return Ok(());
    }
    if is_beneath(removed, path) {
        return Ok(());
    }
    Err(SchemaError::UnknownFieldReference {
        path: path.to_string(),
    })
}

/// Removes the node at `segments`, then any group the removal emptied.
fn pop_node(fields: &mut BTreeMap<String, FieldNode>, segments: &[&str]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return fields.remove(*first).is_some();
    }
    let Some(children) = fields.get_mut(*first).and_then(FieldNode::children_mut) else {
        return false;
    };
    if !pop_node(children, rest) {
        return false;
    }
    if children.is_empty() {
        fields.remove(*first);
    }
    true
}

fn is_beneath(removed: &[String], path: &str) -> bool {
    removed.iter().any(|prefix| {
        path.strip_prefix(prefix.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    })
}
