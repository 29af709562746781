//! Schema merging with configurable conflict resolution.
//!
//! A build combines a core vocabulary with caller-supplied extensions.
//! [`merge_schemas`] lays an overlay model on top of a base model: new field
//! sets and fields are added, shared ones are merged attribute by attribute,
//! and [`MergeOptions`] decide what happens when both sides set an attribute
//! to different values.
//!
//! # Example
//!
//! ```
//! use field_schema_core::*;
//!
//! let mut base = FieldSet::new("process");
//! base.details.description = Some("Process information.".into());
//! base.fields.insert("pid".into(), FieldNode::Leaf(FieldDetails {
//!     name: "pid".into(),
//!     field_type: Some("long".into()),
//!     ..Default::default()
//! }));
//!
//! let mut overlay = FieldSet::new("process");
//! overlay.details.description = Some("Overridden.".into());
//! overlay.fields.insert("title".into(), FieldNode::Leaf(FieldDetails {
//!     name: "title".into(),
//!     field_type: Some("keyword".into()),
//!     ..Default::default()
//! }));
//!
//! let merged = merge_schemas(
//!     &Schema::from_iter([base]),
//!     &Schema::from_iter([overlay]),
//!     &MergeOptions::default(),
//! )
//! .unwrap();
//!
//! let process = merged.get("process").unwrap();
//! assert_eq!(process.fields.len(), 2);
//! // `description` is preserved: the base's authored value wins.
//! assert_eq!(process.description(), Some("Process information."));
//! ```

use std::collections::BTreeMap;
use std::fmt::Debug;

use tracing::{debug, trace};

use crate::error::{Result, SchemaError};
use crate::types::{FieldDetails, FieldGroup, FieldNode, FieldSet, MultiField, Reusable, Schema};

/// Attributes an overlay never overwrites by default.
pub const DEFAULT_PRESERVED_ATTRIBUTES: [&str; 3] = ["title", "description", "short"];

/// Merge behavior.
///
/// # Examples
///
/// ```
/// use field_schema_core::MergeOptions;
///
/// let options = MergeOptions::default();
/// assert!(!options.validate);
/// assert!(options.preserves("description"));
/// assert!(!options.preserves("type"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Fail with [`SchemaError::SchemaConflict`] instead of letting the
    /// overlay win when both sides disagree.
    pub validate: bool,
    /// Attributes for which the base's authored value always wins.
    pub preserved_attributes: Vec<String>,
}

impl Default for MergeOptions {
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

impl MergeOptions {
    pub fn preserves(&self, attribute: &str) -> bool {
        self.preserved_attributes.iter().any(|a| a == attribute)
    }
}

/// Merges `overlay` on top of `base`, returning a new model.
///
/// Field sets only in the overlay are added as-is. For shared field sets,
/// scalar attributes follow [`MergeOptions`], `reusable.expected` lists are
/// concatenated, `reusable.top_level` is OR'd and field trees are merged
/// recursively. A leaf meeting a group at the same key is a
/// [`SchemaError::SchemaConflict`] unless the leaf is an object-like field,
/// which is then promoted to a group.
pub fn merge_schemas(base: &Schema, overlay: &Schema, options: &MergeOptions) -> Result<Schema> {
    let merger = Merger { options };
    let mut merged = base.clone();
    for incoming in overlay.iter() {
        match merged.get_mut(&incoming.name) {
            Some(existing) => {
                trace!(fieldset = %incoming.name, "merging field set");
                merger.merge_fieldset(existing, incoming)?;
            }
            None => {
                trace!(fieldset = %incoming.name, "adding field set");
                merged.insert(incoming.clone());
            }
        }
    }
    debug!(
        base = base.len(),
        overlay = overlay.len(),
        merged = merged.len(),
        "merged schemas"
    );
    Ok(merged)
}

/// Folds a sequence of models left to right with [`merge_schemas`].
pub fn merge_all(schemas: Vec<Schema>, options: &MergeOptions) -> Result<Schema> {
    let mut iter = schemas.into_iter();
    let Some(mut merged) = iter.next() else {
        return Ok(Schema::new());
    };
    for overlay in iter {
        merged = merge_schemas(&merged, &overlay, options)?;
    }
    Ok(merged)
}

struct Merger<'a> {
    options: &'a MergeOptions,
}

impl Merger<'_> {
    fn attr<T: PartialEq + Clone + Debug>(
        &self,
        subject: &str,
        attribute: &str,
        base: &mut Option<T>,
        overlay: &Option<T>,
    ) -> Result<()> {
        let Some(incoming) = overlay else {
            return Ok(());
        };
        match base {
            None => *base = Some(incoming.clone()),
            Some(current) if current == incoming => {}
            Some(current) => {
                if self.options.preserves(attribute) {
                    trace!(subject, attribute, "keeping preserved base value");
                } else if self.options.validate {
                    return Err(SchemaError::SchemaConflict {
                        path: format!("{subject}.{attribute}"),
                        base: format!("{current:?}"),
                        overlay: format!("{incoming:?}"),
                    });
                } else {
                    *current = incoming.clone();
                }
            }
        }
        Ok(())
    }

    fn list_attr<T: PartialEq + Clone + Debug>(
        &self,
        subject: &str,
        attribute: &str,
        base: &mut Vec<T>,
        overlay: &[T],
    ) -> Result<()> {
        let mut current = (!base.is_empty()).then(|| std::mem::take(base));
        let incoming = (!overlay.is_empty()).then(|| overlay.to_vec());
        self.attr(subject, attribute, &mut current, &incoming)?;
        *base = current.unwrap_or_default();
        Ok(())
    }

    fn merge_fieldset(&self, base: &mut FieldSet, overlay: &FieldSet) -> Result<()> {
        let subject = base.name.clone();
        self.attr(&subject, "title", &mut base.title, &overlay.title)?;
        self.attr(&subject, "group", &mut base.group, &overlay.group)?;
        self.attr(&subject, "root", &mut base.root, &overlay.root)?;
        self.merge_details(&subject, &mut base.details, &overlay.details)?;
        base.reusable = merge_reusable(base.reusable.take(), overlay.reusable.as_ref());
        self.merge_tree(&subject, &mut base.fields, &overlay.fields)?;

        for nesting in &overlay.nestings {
            if !base.nestings.contains(nesting) {
                base.nestings.push(nesting.clone());
            }
        }
        base.nestings.sort();
        base.reused_here.extend(overlay.reused_here.iter().cloned());
        Ok(())
    }

    fn merge_details(
        &self,
        subject: &str,
        base: &mut FieldDetails,
        overlay: &FieldDetails,
    ) -> Result<()> {
        if base.name.is_empty() {
            base.name = overlay.name.clone();
        }
        self.attr(subject, "type", &mut base.field_type, &overlay.field_type)?;
        self.attr(subject, "level", &mut base.level, &overlay.level)?;
        self.attr(subject, "description", &mut base.description, &overlay.description)?;
        self.attr(subject, "short", &mut base.short, &overlay.short)?;
        self.attr(subject, "example", &mut base.example, &overlay.example)?;
        self.attr(subject, "pattern", &mut base.pattern, &overlay.pattern)?;
        self.attr(subject, "ignore_above", &mut base.ignore_above, &overlay.ignore_above)?;
        self.attr(subject, "norms", &mut base.norms, &overlay.norms)?;
        self.attr(subject, "doc_values", &mut base.doc_values, &overlay.doc_values)?;
        self.attr(subject, "index", &mut base.index, &overlay.index)?;
        self.attr(subject, "object_type", &mut base.object_type, &overlay.object_type)?;
        self.attr(
            subject,
            "scaling_factor",
            &mut base.scaling_factor,
            &overlay.scaling_factor,
        )?;
        self.attr(subject, "path", &mut base.path, &overlay.path)?;
        self.attr(subject, "beta", &mut base.beta, &overlay.beta)?;
        self.attr(
            subject,
            "original_fieldset",
            &mut base.original_fieldset,
            &overlay.original_fieldset,
        )?;
        self.list_attr(
            subject,
            "expected_values",
            &mut base.expected_values,
            &overlay.expected_values,
        )?;
        self.list_attr(
            subject,
            "allowed_values",
            &mut base.allowed_values,
            &overlay.allowed_values,
        )?;

        base.normalize = merge_normalize(base.normalize.take(), overlay.normalize.as_deref());
        base.multi_fields = merge_multi_fields(&base.multi_fields, &overlay.multi_fields);
        base.intermediate = base.intermediate && overlay.intermediate;

        for (key, value) in &overlay.extra {
            let mut current = base.extra.remove(key);
            self.attr(subject, key, &mut current, &Some(value.clone()))?;
            if let Some(current) = current {
                base.extra.insert(key.clone(), current);
            }
        }
        Ok(())
    }

    fn merge_tree(
        &self,
        prefix: &str,
        base: &mut BTreeMap<String, FieldNode>,
        overlay: &BTreeMap<String, FieldNode>,
    ) -> Result<()> {
        for (key, incoming) in overlay {
            let path = format!("{prefix}.{key}");
            match base.get_mut(key) {
                Some(existing) => self.merge_node(&path, existing, incoming)?,
                None => {
                    base.insert(key.clone(), incoming.clone());
                }
            }
        }
        Ok(())
    }

    fn merge_node(&self, path: &str, base: &mut FieldNode, overlay: &FieldNode) -> Result<()> {
        match (&mut *base, overlay) {
            (FieldNode::Leaf(current), FieldNode::Leaf(incoming)) => {
                self.merge_details(path, current, incoming)
            }
            (FieldNode::Group(current), FieldNode::Group(incoming)) => {
                self.merge_group(path, current, incoming)
            }
            (FieldNode::Leaf(current), FieldNode::Group(incoming)) => {
                if !current.is_object_like() {
                    return Err(structural_conflict(path, base, overlay));
                }
                base.promote_to_group();
                match base {
                    FieldNode::Group(current) => self.merge_group(path, current, incoming),
                    FieldNode::Leaf(_) => Ok(()),
                }
            }
            (FieldNode::Group(current), FieldNode::Leaf(incoming)) => {
                if !incoming.is_object_like() {
                    return Err(structural_conflict(path, base, overlay));
                }
                match current.details.as_mut() {
                    Some(details) => self.merge_details(path, details, incoming),
                    None => {
                        current.details = Some(incoming.clone());
                        Ok(())
                    }
                }
            }
        }
    }

    fn merge_group(&self, path: &str, base: &mut FieldGroup, overlay: &FieldGroup) -> Result<()> {
        match (base.details.as_mut(), overlay.details.as_ref()) {
            (Some(current), Some(incoming)) => self.merge_details(path, current, incoming)?,
            (None, Some(incoming)) => base.details = Some(incoming.clone()),
            (_, None) => {}
        }
        self.merge_tree(path, &mut base.fields, &overlay.fields)
    }
}

fn describe(node: &FieldNode) -> String {
    let field_type = node
        .details()
        .and_then(FieldDetails::field_type)
        .unwrap_or("untyped");
    match node {
        FieldNode::Leaf(_) => format!("leaf field of type {field_type}"),
        FieldNode::Group(_) => format!("field group of type {field_type}"),
    }
}

fn structural_conflict(path: &str, base: &FieldNode, overlay: &FieldNode) -> SchemaError {
    SchemaError::SchemaConflict {
        path: path.to_string(),
        base: describe(base),
        overlay: describe(overlay),
    }
}

fn merge_reusable(base: Option<Reusable>, overlay: Option<&Reusable>) -> Option<Reusable> {
    let Some(incoming) = overlay else {
        return base;
    };
    let mut merged = base.unwrap_or_default();
    for target in &incoming.expected {
        if !merged.expected.iter().any(|t| t.full == target.full) {
            merged.expected.push(target.clone());
        }
    }
    merged.top_level = match (merged.top_level, incoming.top_level) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(false) || b.unwrap_or(false)),
    };
    merged.order = incoming.order.or(merged.order);
    Some(merged)
}

fn merge_normalize(base: Option<Vec<String>>, overlay: Option<&[String]>) -> Option<Vec<String>> {
    let Some(incoming) = overlay else {
        return base;
    };
    let mut merged = base.unwrap_or_default();
    for hint in incoming {
        if !merged.contains(hint) {
            merged.push(hint.clone());
        }
    }
    Some(merged)
}

fn merge_multi_fields(base: &[MultiField], overlay: &[MultiField]) -> Vec<MultiField> {
    if overlay.is_empty() {
        return base.to_vec();
    }
    let mut by_name: BTreeMap<String, MultiField> = BTreeMap::new();
    for multi in base.iter().chain(overlay) {
        by_name.insert(multi.effective_name().to_string(), multi.clone());
    }
    by_name.into_values().collect()
}
