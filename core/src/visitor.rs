//! Traversal contract shared by every stage and by downstream consumers.
//!
//! Each field set is visited first, then every field within it, depth first
//! in key order. A group node's own details are visited before its children.
//! Group nodes without details are walked through but not reported.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{FieldDetails, FieldNode, FieldSet, Schema};

/// Where a visited field sits.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    /// Name of the owning field set.
    pub fieldset: &'a str,
    /// Whether the owning field set is `root`.
    pub root: bool,
    /// Key segments from the field set down to this node, inclusive.
    pub path: &'a [String],
}

impl FieldContext<'_> {
    /// Dotted path relative to the field set.
    pub fn tree_path(&self) -> String {
        self.path.join(".")
    }

    /// Fully resolved dotted name: the tree path, prefixed by the field-set
    /// name unless the field set is `root`.
    ///
    /// # Examples
    ///
    /// ```
    /// use field_schema_core::FieldContext;
    ///
    /// let path = ["parent".to_string(), "pid".to_string()];
    /// let ctx = FieldContext { fieldset: "process", root: false, path: &path };
    /// assert_eq!(ctx.flat_name(), "process.parent.pid");
    ///
    /// let path = ["message".to_string()];
    /// let ctx = FieldContext { fieldset: "base", root: true, path: &path };
    /// assert_eq!(ctx.flat_name(), "message");
    /// ```
    pub fn flat_name(&self) -> String {
        if self.root {
            self.tree_path()
        } else {
            format!("{}.{}", self.fieldset, self.tree_path())
        }
    }
}

/// Read-only visitor.
pub trait Visitor {
    fn visit_fieldset(&mut self, _fieldset: &FieldSet) {}

    fn visit_field(&mut self, _ctx: &FieldContext<'_>, _details: &FieldDetails) {}
}

/// Mutating visitor; any error aborts the walk.
pub trait VisitorMut {
    fn visit_fieldset(&mut self, _fieldset: &mut FieldSet) -> Result<()> {
        Ok(())
    }

    fn visit_field(&mut self, _ctx: &FieldContext<'_>, _details: &mut FieldDetails) -> Result<()> {
        Ok(())
    }
}

/// Visits every field set of `schema`, then every field within it.
pub fn walk<V: Visitor + ?Sized>(schema: &Schema, visitor: &mut V) {
    for fieldset in schema.iter() {
        visitor.visit_fieldset(fieldset);
        let mut path = Vec::new();
        walk_tree(
            &fieldset.fields,
            &fieldset.name,
            fieldset.is_root(),
            &mut path,
            visitor,
        );
    }
}

fn walk_tree<V: Visitor + ?Sized>(
    fields: &BTreeMap<String, FieldNode>,
    fieldset: &str,
    root: bool,
    path: &mut Vec<String>,
    visitor: &mut V,
) {
    for (key, node) in fields {
        path.push(key.clone());
        if let Some(details) = node.details() {
            let ctx = FieldContext {
                fieldset,
                root,
                path: path.as_slice(),
            };
            visitor.visit_field(&ctx, details);
        }
        if let Some(children) = node.children() {
            walk_tree(children, fieldset, root, path, visitor);
        }
        path.pop();
    }
}

/// Mutating counterpart of [`walk`].
pub fn walk_mut<V: VisitorMut + ?Sized>(schema: &mut Schema, visitor: &mut V) -> Result<()> {
    for fieldset in schema.iter_mut() {
        visitor.visit_fieldset(fieldset)?;
        let name = fieldset.name.clone();
        let root = fieldset.is_root();
        let mut path = Vec::new();
        walk_tree_mut(&mut fieldset.fields, &name, root, &mut path, visitor)?;
    }
    Ok(())
}

fn walk_tree_mut<V: VisitorMut + ?Sized>(
    fields: &mut BTreeMap<String, FieldNode>,
    fieldset: &str,
    root: bool,
    path: &mut Vec<String>,
    visitor: &mut V,
) -> Result<()> {
    for (key, node) in fields.iter_mut() {
        path.push(key.clone());
        if let Some(details) = node.details_mut() {
            let ctx = FieldContext {
                fieldset,
                root,
                path: path.as_slice(),
            };
            visitor.visit_field(&ctx, details)?;
        }
        if let Some(children) = node.children_mut() {
            walk_tree_mut(children, fieldset, root, path, visitor)?;
        }
        path.pop();
    }
    Ok(())
}

/// Calls `f` with every field of every field set, mutably.
pub fn for_each_field_mut(
    schema: &mut Schema,
    mut f: impl FnMut(&FieldContext<'_>, &mut FieldDetails),
) {
    for fieldset in schema.iter_mut() {
        let name = fieldset.name.clone();
        let root = fieldset.is_root();
        let mut path = Vec::new();
        visit_tree_mut(&mut fieldset.fields, &name, root, &mut path, &mut f);
    }
}

fn visit_tree_mut(
    fields: &mut BTreeMap<String, FieldNode>,
    fieldset: &str,
    root: bool,
    path: &mut Vec<String>,
    f: &mut impl FnMut(&FieldContext<'_>, &mut FieldDetails),
) {
    for (key, node) in fields.iter_mut() {
        path.push(key.clone());
        if let Some(details) = node.details_mut() {
            let ctx = FieldContext {
                fieldset,
                root,
                path: path.as_slice(),
            };
            f(&ctx, details);
        }
        if let Some(children) = node.children_mut() {
            visit_tree_mut(children, fieldset, root, path, f);
        }
        path.pop();
    }
}

struct FieldFn<F>(F);

impl<F: FnMut(&FieldContext<'_>, &FieldDetails)> Visitor for FieldFn<F> {
    fn visit_field(&mut self, ctx: &FieldContext<'_>, details: &FieldDetails) {
        (self.0)(ctx, details)
    }
}

/// Calls `f` for every field of every field set.
///
/// # Examples
///
/// ```
/// use field_schema_core::{FieldDetails, FieldNode, FieldSet, Schema, for_each_field};
///
/// let mut base = FieldSet::new("base");
/// base.root = Some(true);
/// base.fields.insert(
///     "message".into(),
///     FieldNode::Leaf(FieldDetails { name: "message".into(), ..Default::default() }),
/// );
///
/// let mut names = Vec::new();
/// for_each_field(&Schema::from_iter([base]), |ctx, _| names.push(ctx.flat_name()));
/// assert_eq!(names, ["message"]);
/// ```
pub fn for_each_field(schema: &Schema, f: impl FnMut(&FieldContext<'_>, &FieldDetails)) {
    walk(schema, &mut FieldFn(f));
}
