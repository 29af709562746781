//! Read-only views handed to emitters.
//!
//! [`FlatView`] maps every field's flat name to its details, the form index
//! templates and CSV listings want. [`NestedView`] keeps the field-set
//! structure for documentation: field-set metadata plus the field tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::types::{FieldDetails, FieldNode, FieldSet, Reusable, ReusedHere, Schema};
use crate::visitor::{FieldContext, Visitor, walk};

/// Flat name to field details, in name order.
///
/// Contains every non-intermediate field of every field set that appears at
/// the top level, grafted copies included. Field sets that are reusable but
/// not `top_level` contribute only through their copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatView {
    fields: BTreeMap<String, FieldDetails>,
}

impl FlatView {
    /// Collects the flat view of `schema`.
    ///
    /// Fails with [`SchemaError::DuplicateFlatName`] when two fields resolve
    /// to the same flat name, for instance a root field `user.name` and the
    /// `name` field of field set `user`.
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        let mut collector = FlatCollector::default();
        walk(schema, &mut collector);
        match collector.duplicate {
            Some(err) => Err(err),
            None => Ok(FlatView {
                fields: collector.fields,
            }),
        }
    }

    pub fn get(&self, flat_name: &str) -> Option<&FieldDetails> {
        self.fields.get(flat_name)
    }

    pub fn contains(&self, flat_name: &str) -> bool {
        self.fields.contains_key(flat_name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDetails)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Default)]
struct FlatCollector {
    fields: BTreeMap<String, FieldDetails>,
    /// Where each collected flat name came from.
    origins: BTreeMap<String, String>,
    duplicate: Option<SchemaError>,
    skip: bool,
}

impl Visitor for FlatCollector {
    fn visit_fieldset(&mut self, fieldset: &FieldSet) {
        self.skip = !fieldset.appears_at_top_level();
    }

    fn visit_field(&mut self, ctx: &FieldContext<'_>, details: &FieldDetails) {
        if self.skip || details.intermediate || self.duplicate.is_some() {
            return;
        }
        let flat_name = details.flat_name.clone().unwrap_or_else(|| ctx.flat_name());
        let origin = format!("field '{}' of field set '{}'", ctx.tree_path(), ctx.fieldset);
        if let Some(first) = self.origins.get(&flat_name) {
            self.duplicate = Some(SchemaError::DuplicateFlatName {
                flat_name,
                first: first.clone(),
                second: origin,
            });
            return;
        }
        self.origins.insert(flat_name.clone(), origin);
        self.fields.insert(flat_name, details.clone());
    }
}

/// Documentation-oriented record of one field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSetView {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
    #[serde(default)]
    pub root: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
    /// Reuse declaration without its internal `order`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reusable: Option<Reusable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nestings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reused_here: Vec<ReusedHere>,
    /// Remaining authored field-set attributes such as `footnote`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_yaml::Value>,
    pub fields: BTreeMap<String, FieldNode>,
    /// Non-intermediate fields of this field set, keyed by flat name. Unlike
    /// [`FlatView`] this lists fields of non top-level field sets too.
    pub flat_fields: BTreeMap<String, FieldDetails>,
}

impl FieldSetView {
    fn from_fieldset(fieldset: &FieldSet) -> Self {
        let prefix = if fieldset.is_root() {
            String::new()
        } else {
            fieldset.name.clone()
        };
        let mut flat_fields = BTreeMap::new();
        collect_flat(&fieldset.fields, &prefix, &mut flat_fields);

        FieldSetView {
            name: fieldset.name.clone(),
            title: fieldset.title.clone(),
            description: fieldset.details.description.clone(),
            short: fieldset.details.short.clone(),
            group: fieldset.group,
            root: fieldset.is_root(),
            field_type: fieldset.details.field_type.clone(),
            beta: fieldset.details.beta.clone(),
            reusable: fieldset.reusable.clone().map(|mut reusable| {
                reusable.order = None;
                reusable
            }),
            nestings: fieldset.nestings.clone(),
            reused_here: fieldset.reused_here.clone(),
            attributes: fieldset.details.extra.clone(),
            fields: fieldset.fields.clone(),
            flat_fields,
        }
    }
}

fn collect_flat(
    fields: &BTreeMap<String, FieldNode>,
    prefix: &str,
    out: &mut BTreeMap<String, FieldDetails>,
) {
    for (key, node) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(details) = node.details().filter(|d| !d.intermediate) {
            let flat_name = details.flat_name.clone().unwrap_or_else(|| path.clone());
            out.insert(flat_name, details.clone());
        }
        if let Some(children) = node.children() {
            collect_flat(children, &path, out);
        }
    }
}

/// Field-set name to [`FieldSetView`], for every field set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedView {
    fieldsets: BTreeMap<String, FieldSetView>,
}

impl NestedView {
    pub fn from_schema(schema: &Schema) -> Self {
        NestedView {
            fieldsets: schema
                .iter()
                .map(|fs| (fs.name.clone(), FieldSetView::from_fieldset(fs)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldSetView> {
        self.fieldsets.get(name)
    }

    pub fn len(&self) -> usize {
        self.fieldsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fieldsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldSetView> {
        self.fieldsets.values()
    }
}

/// Builds both views of a finalized model.
pub fn build_views(schema: &Schema) -> Result<(NestedView, FlatView)> {
    let nested = NestedView::from_schema(schema);
    let flat = FlatView::from_schema(schema)?;
    debug!(
        fieldsets = nested.len(),
        fields = flat.len(),
        "built schema views"
    );
    Ok((nested, flat))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finalize::finalize;
    use crate::types::ReuseTarget;

    fn leaf(name: &str) -> FieldNode {
        FieldNode::Leaf(FieldDetails {
            name: name.to_string(),
            field_type: Some("keyword".into()),
            ..FieldDetails::default()
        })
    }

    fn sample() -> Schema {
        let mut geo = FieldSet::new("geo");
        geo.fields.insert("name".into(), leaf("name"));
        geo.reusable = Some(Reusable {
            expected: vec![ReuseTarget::new("host", "geo")],
            top_level: Some(false),
            order: Some(2),
        });

        let mut host = FieldSet::new("host");
        host.fields.insert("name".into(), leaf("name"));
        let mut mount = FieldNode::intermediate("geo");
        mount
            .children_mut()
            .unwrap()
            .insert("name".into(), leaf("name"));
        host.fields.insert("geo".into(), mount);

        let mut base = FieldSet::new("base");
        base.root = Some(true);
        base.fields.insert("message".into(), leaf("message"));

        finalize(Schema::from_iter([geo, host, base]))
    }

    #[test]
    fn test_flat_view_skips_non_top_level_and_intermediates() {
        let flat = FlatView::from_schema(&sample()).unwrap();
        assert_eq!(
            flat.names().collect::<Vec<_>>(),
            ["host.geo.name", "host.name", "message"]
        );
        assert!(!flat.contains("geo.name"));
        assert!(!flat.contains("host.geo"));
    }

    #[test]
    fn test_nested_view_keeps_every_fieldset() {
        let (nested, _) = build_views(&sample()).unwrap();
        assert_eq!(nested.len(), 3);

        let geo = nested.get("geo").unwrap();
        assert_eq!(geo.reusable.as_ref().unwrap().order, None);
        assert!(geo.flat_fields.contains_key("geo.name"));

        let host = nested.get("host").unwrap();
        assert!(host.fields.contains_key("geo"));
        assert_eq!(
            host.flat_fields.keys().collect::<Vec<_>>(),
            ["host.geo.name", "host.name"]
        );
        assert!(nested.get("base").unwrap().root);
    }

    #[test]
    fn test_flat_view_is_deterministic() {
        let schema = sample();
        assert_eq!(FlatView::from_schema(&schema), FlatView::from_schema(&schema));
        let json = serde_json::to_value(FlatView::from_schema(&schema).unwrap()).unwrap();
        assert_eq!(json["message"]["flat_name"], "message");
    }

    #[test]
    fn test_colliding_flat_names_are_rejected() {
        let mut base = FieldSet::new("base");
        base.root = Some(true);
        let mut mount = FieldNode::intermediate("user");
        mount
            .children_mut()
            .unwrap()
            .insert("name".into(), leaf("name"));
        base.fields.insert("user".into(), mount);

        let mut user = FieldSet::new("user");
        user.fields.insert("name".into(), leaf("name"));

        let schema = finalize(Schema::from_iter([base, user]));
        let err = FlatView::from_schema(&schema).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateFlatName {
                flat_name: "user.name".into(),
                first: "field 'user.name' of field set 'base'".into(),
                second: "field 'name' of field set 'user'".into(),
            }
        );
        assert!(build_views(&schema).is_err());
    }
}
