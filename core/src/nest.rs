//! Nesting transformer: flat dotted declarations to field trees.
//!
//! `parent.pid` becomes `fields["parent"] -> fields["pid"]`, with the
//! `parent` node created as an intermediate `object` unless it is declared
//! itself. Both notations may be mixed in one field set: a dotted
//! `os.platform` and a nested `os: {fields: [...]}` block share one `os`
//! node and their children are combined.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use tracing::debug;

use crate::document::{FieldSetDecl, RawField};
use crate::error::{Result, SchemaError};
use crate::types::{FieldDetails, FieldNode, FieldSet, Schema};

/// Builds the field tree of one field set.
///
/// # Examples
///
/// ```
/// use field_schema_core::{RawField, nest_fields};
///
/// let tree = nest_fields(vec![
///     RawField::new("pid", "long"),
///     RawField::new("parent.pid", "long"),
/// ])
/// .unwrap();
///
/// let parent = &tree["parent"];
/// assert_eq!(parent.details().unwrap().field_type(), Some("object"));
/// assert!(parent.children().unwrap().contains_key("pid"));
/// ```
pub fn nest_fields(fields: Vec<RawField>) -> Result<BTreeMap<String, FieldNode>> {
    let mut tree = BTreeMap::new();
    for field in fields {
        insert_declaration(&mut tree, "", field)?;
    }
    Ok(tree)
}

/// Inserts `field` into `tree`. `prefix` is the dotted name of the node
/// owning `tree` (empty at the field-set level); the stored name is always
/// the full dotted name within the field set.
fn insert_declaration(
    tree: &mut BTreeMap<String, FieldNode>,
    prefix: &str,
    field: RawField,
) -> Result<()> {
    let RawField {
        fields: children,
        mut details,
    } = field;

    let relative = std::mem::take(&mut details.name);
    let full = join(prefix, &relative);
    if relative.split('.').any(str::is_empty) {
        return Err(SchemaError::MissingMandatoryAttribute {
            subject: format!("field '{full}'"),
            missing: vec!["name".to_string()],
        });
    }
    details.name = full.clone();

    let node = place(tree, prefix, &relative, details);
    if let Some(children) = children {
        let subtree = node.promote_to_group();
        for child in children {
            insert_declaration(subtree, &full, child)?;
        }
    }
    Ok(())
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Places `details` at the dotted `relative` path below `tree`, creating
/// intermediate parents. Declared details replace whatever sat there before;
/// children of an existing node are kept.
fn place<'a>(
    tree: &'a mut BTreeMap<String, FieldNode>,
    prefix: &str,
    relative: &str,
    details: FieldDetails,
) -> &'a mut FieldNode {
    let mut segments: Vec<&str> = relative.split('.').collect();
    let leaf = segments.pop().unwrap_or(relative);

    let mut cursor = tree;
    let mut path = prefix.to_string();
    for segment in segments {
        path = join(&path, segment);
        let node = cursor
            .entry(segment.to_string())
            .or_insert_with(|| FieldNode::intermediate(path.clone()));
        cursor = node.promote_to_group();
    }

    match cursor.entry(leaf.to_string()) {
        Entry::Occupied(entry) => {
            let node = entry.into_mut();
            match &mut *node {
                FieldNode::Group(group) => group.details = Some(details),
                FieldNode::Leaf(existing) => *existing = details,
            }
            node
        }
        Entry::Vacant(entry) => entry.insert(FieldNode::Leaf(details)),
    }
}

/// Turns a loaded declaration into a field set with a nested tree.
pub fn nest_fieldset(decl: FieldSetDecl) -> Result<FieldSet> {
    let fields = nest_fields(decl.fields).map_err(|err| match err {
        SchemaError::MissingMandatoryAttribute { subject, missing } => {
            SchemaError::MissingMandatoryAttribute {
                subject: format!("{subject} of field set '{}'", decl.name),
                missing,
            }
        }
        other => other,
    })?;
    Ok(FieldSet {
        name: decl.name,
        title: decl.title,
        group: decl.group,
        root: decl.root,
        reusable: decl.reusable,
        details: decl.details,
        fields,
        nestings: Vec::new(),
        reused_here: Vec::new(),
    })
}

/// Nests every loaded declaration of one merge group.
pub fn nest_schema(decls: BTreeMap<String, FieldSetDecl>) -> Result<Schema> {
    let mut schema = Schema::new();
    for decl in decls.into_values() {
        let fieldset = nest_fieldset(decl)?;
        debug!(
            fieldset = %fieldset.name,
            top_level_fields = fieldset.fields.len(),
            "nested field set"
        );
        schema.insert(fieldset);
    }
    Ok(schema)
}
