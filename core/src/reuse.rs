//! Reuse resolution: grafting field sets into other field sets.
//!
//! A reusable field set lists destinations in `reusable.expected`. Each
//! destination receives an independent deep copy of the field set's tree
//! under a mount node named after the target's `as`:
//!
//! - **Foreign** targets mount into another field set (`user` at
//!   `destination.user`). They are transitive: a field set already holding
//!   grafts carries them along when it is itself reused.
//! - **Self** targets mount a copy of the field set into itself
//!   (`process.parent`). The copy never contains earlier self copies, so
//!   nothing unrolls recursively, and self copies are never carried along
//!   by foreign grafts.
//!
//! Grafts run in passes by ascending `reusable.order`; within a pass all
//! foreign grafts run before self grafts. Every field of a copy is tagged
//! with `original_fieldset`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use crate::error::{Result, SchemaError};
use crate::finalize::assign_names;
use crate::types::{FieldGroup, FieldNode, FieldSet, Reusable, ReuseTarget, ReusedHere, Schema};

const DEFAULT_ORDER: u32 = 2;

#[derive(Debug, Clone)]
struct ReuseStep {
    source: String,
    target: ReuseTarget,
}

#[derive(Debug, Default)]
struct ReusePass {
    foreign: Vec<ReuseStep>,
    nested_self: Vec<ReuseStep>,
}

/// Resolves every reuse declaration of `schema` and recomputes flat names.
///
/// # Errors
///
/// - [`SchemaError::DestinationNotFound`] when a segment of a target's `at`
///   path does not exist.
/// - [`SchemaError::IllegalNestedReuse`] when a foreign destination lies in
///   a copy of a field set that is not reusable at the top level.
/// - [`SchemaError::MountCollision`] when the mount point is already taken.
/// - [`SchemaError::InvalidReuse`] when a `root` field set takes part in
///   reuse, or the destination is a leaf that cannot hold fields.
///
/// # Examples
///
/// ```
/// use field_schema_core::*;
///
/// let mut user = FieldSet::new("user");
/// user.reusable = Some(Reusable {
///     expected: vec![ReuseTarget::new("destination", "user")],
///     top_level: Some(true),
///     order: None,
/// });
/// user.fields.insert("name".into(), FieldNode::Leaf(FieldDetails {
///     name: "name".into(),
///     field_type: Some("keyword".into()),
///     ..Default::default()
/// }));
///
/// let resolved = resolve_reuse(Schema::from_iter([user, FieldSet::new("destination")])).unwrap();
/// let copy = resolved.node_at("destination.user.name").unwrap().details().unwrap();
/// assert_eq!(copy.flat_name.as_deref(), Some("destination.user.name"));
/// assert_eq!(copy.original_fieldset.as_deref(), Some("user"));
/// ```
pub fn resolve_reuse(mut schema: Schema) -> Result<Schema> {
    let passes = plan(&schema)?;
    let top_level: BTreeSet<String> = schema
        .iter()
        .filter(|fs| fs.reusable.as_ref().is_some_and(Reusable::is_top_level))
        .map(|fs| fs.name.clone())
        .collect();
    let mut mounts = BTreeMap::new();

    for (order, pass) in passes {
        debug!(
            order,
            foreign = pass.foreign.len(),
            self_nestings = pass.nested_self.len(),
            "running reuse pass"
        );
        for step in &pass.foreign {
            graft(&mut schema, step, Some(&top_level), &mut mounts)?;
        }
        for step in &pass.nested_self {
            graft(&mut schema, step, None, &mut mounts)?;
        }
    }

    assign_names(&mut schema);
    Ok(schema)
}

fn plan(schema: &Schema) -> Result<BTreeMap<u32, ReusePass>> {
    let mut passes: BTreeMap<u32, ReusePass> = BTreeMap::new();
    for fieldset in schema.iter() {
        let Some(reusable) = &fieldset.reusable else {
            continue;
        };
        if fieldset.is_root() {
            return Err(SchemaError::InvalidReuse(format!(
                "field set '{}' is root and cannot be reused",
                fieldset.name
            )));
        }
        let pass = passes
            .entry(reusable.order.unwrap_or(DEFAULT_ORDER))
            .or_default();
        for target in &reusable.expected {
            let step = ReuseStep {
                source: fieldset.name.clone(),
                target: target.clone(),
            };
            if target.destination_fieldset() == fieldset.name {
                pass.nested_self.push(step);
            } else {
                pass.foreign.push(step);
            }
        }
    }
    Ok(passes)
}

/// Builds the mount node for `source` at segment `as_name`: the field set's
/// own details renamed and marked intermediate, over a tagged deep copy of
/// its tree without its own self copies.
fn mount_node(source: &FieldSet, as_name: &str) -> FieldNode {
    let mut details = source.details.clone();
    details.name = as_name.to_string();
    details.original_fieldset = Some(source.name.clone());
    details.intermediate = true;

    let mut fields = source.fields.clone();
    strip_copies_of(&mut fields, &source.name);
    for node in fields.values_mut() {
        node.for_each_details_mut(&mut |d| {
            d.original_fieldset
                .get_or_insert_with(|| source.name.clone());
        });
    }

    FieldNode::Group(FieldGroup {
        details: Some(details),
        fields,
    })
}

fn strip_copies_of(fields: &mut BTreeMap<String, FieldNode>, fieldset: &str) {
    fields.retain(|_, node| node.original_fieldset() != Some(fieldset));
    for node in fields.values_mut() {
        if let Some(children) = node.children_mut() {
            strip_copies_of(children, fieldset);
        }
    }
}

/// Mounts one copy. `top_level` is given for foreign grafts only and holds
/// the field sets whose copies may receive further reuse.
fn graft(
    schema: &mut Schema,
    step: &ReuseStep,
    top_level: Option<&BTreeSet<String>>,
    mounts: &mut BTreeMap<String, String>,
) -> Result<()> {
    let ReuseStep { source, target } = step;
    let (mount, source_short) = {
        let fieldset = schema.get(source).ok_or_else(|| {
            SchemaError::InvalidReuse(format!("reused field set '{source}' does not exist"))
        })?;
        (
            mount_node(fieldset, &target.as_name),
            fieldset.details.short.clone(),
        )
    };

    let destination_name = target.destination_fieldset().to_string();
    let destination =
        schema
            .get_mut(&destination_name)
            .ok_or_else(|| SchemaError::DestinationNotFound {
                path: target.at.clone(),
                missing: destination_name.clone(),
            })?;
    if destination.is_root() {
        return Err(SchemaError::InvalidReuse(format!(
            "field set '{destination_name}' is root and cannot receive '{source}' at {}",
            target.full
        )));
    }

    let mut cursor = &mut destination.fields;
    let mut walked = destination_name.clone();
    for segment in target.at.split('.').skip(1) {
        walked = format!("{walked}.{segment}");
        let node = cursor
            .get_mut(segment)
            .ok_or_else(|| SchemaError::DestinationNotFound {
                path: target.at.clone(),
                missing: walked.clone(),
            })?;
        if let (Some(allowed), Some(origin)) = (top_level, node.original_fieldset()) {
            if origin != destination_name && !allowed.contains(origin) {
                return Err(SchemaError::IllegalNestedReuse {
                    fieldset: source.clone(),
                    destination: target.at.clone(),
                    mounted: origin.to_string(),
                });
            }
        }
        if let FieldNode::Leaf(details) = &*node {
            if !details.is_object_like() {
                return Err(SchemaError::InvalidReuse(format!(
                    "cannot mount '{source}' at {}: '{walked}' has type {} and cannot hold fields",
                    target.full,
                    details.field_type().unwrap_or("unknown")
                )));
            }
        }
        cursor = node.promote_to_group();
    }

    if cursor.contains_key(&target.as_name) {
        let existing = mounts
            .get(&target.full)
            .map(|owner| format!("a copy of '{owner}'"))
            .unwrap_or_else(|| "a declared field".to_string());
        return Err(SchemaError::MountCollision {
            full: target.full.clone(),
            existing,
            incoming: format!("a copy of '{source}'"),
        });
    }
    cursor.insert(target.as_name.clone(), mount);
    mounts.insert(target.full.clone(), source.clone());
    trace!(source = %source, at = %target.full, "grafted field set");

    destination.nestings.push(target.full.clone());
    destination.nestings.sort();
    destination.reused_here.push(ReusedHere {
        schema_name: source.clone(),
        full: target.full.clone(),
        short: target.short_override.clone().or(source_short),
        normalize: target.normalize.clone(),
        beta: target.beta.clone(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldDetails;

    fn leaf(name: &str, field_type: &str) -> FieldNode {
        FieldNode::Leaf(FieldDetails {
            name: name.to_string(),
            field_type: Some(field_type.to_string()),
            ..FieldDetails::default()
        })
    }

    fn fieldset(name: &str, fields: &[(&str, &str)]) -> FieldSet {
        let mut fs = FieldSet::new(name);
        fs.details.short = Some(format!("{name} fields"));
        for (key, field_type) in fields {
            fs.fields.insert(key.to_string(), leaf(key, field_type));
        }
        fs
    }

    fn reusable(mut fs: FieldSet, top_level: bool, order: u32, targets: Vec<ReuseTarget>) -> FieldSet {
        fs.reusable = Some(Reusable {
            expected: targets,
            top_level: Some(top_level),
            order: Some(order),
        });
        fs
    }

    fn flat_name(schema: &Schema, path: &str) -> Option<String> {
        schema.node_at(path)?.details()?.flat_name.clone()
    }

    #[test]
    fn test_foreign_and_self_reuse() {
        let user = reusable(
            fieldset("user", &[("name", "keyword")]),
            true,
            2,
            vec![
                ReuseTarget::new("destination", "user"),
                ReuseTarget::new("user", "target"),
            ],
        );
        let schema = Schema::from_iter([user, fieldset("destination", &[("ip", "ip")])]);
        let resolved = resolve_reuse(schema).unwrap();

        assert_eq!(
            flat_name(&resolved, "destination.user.name").as_deref(),
            Some("destination.user.name")
        );
        let target = resolved.node_at("user.target.name").unwrap().details().unwrap();
        assert_eq!(target.flat_name.as_deref(), Some("user.target.name"));
        assert_eq!(target.original_fieldset.as_deref(), Some("user"));

        let mount = resolved.node_at("destination.user").unwrap().details().unwrap();
        assert!(mount.intermediate);
        assert_eq!(mount.name, "user");
        assert_eq!(mount.original_fieldset.as_deref(), Some("user"));

        let destination = resolved.get("destination").unwrap();
        assert_eq!(destination.nestings, ["destination.user"]);
        assert_eq!(destination.reused_here[0].short.as_deref(), Some("user fields"));
    }

    #[test]
    fn test_self_copy_is_not_unrolled() {
        let process = reusable(
            fieldset("process", &[("pid", "long")]),
            true,
            2,
            vec![
                ReuseTarget::new("process", "parent"),
                ReuseTarget::new("process", "previous"),
            ],
        );
        let resolved = resolve_reuse(Schema::from_iter([process])).unwrap();

        assert!(resolved.node_at("process.parent.pid").is_some());
        assert!(resolved.node_at("process.previous.pid").is_some());
        assert!(resolved.node_at("process.parent.parent").is_none());
        assert!(resolved.node_at("process.previous.parent").is_none());
        assert!(resolved.node_at("process.parent.previous").is_none());
    }

    #[test]
    fn test_self_copies_are_not_carried_by_foreign_reuse() {
        let process = reusable(
            fieldset("process", &[("pid", "long")]),
            true,
            1,
            vec![
                ReuseTarget::new("process", "parent"),
                ReuseTarget::new("source", "process"),
            ],
        );
        let schema = Schema::from_iter([process, fieldset("source", &[])]);
        let resolved = resolve_reuse(schema).unwrap();
        assert!(resolved.node_at("source.process.pid").is_some());
        assert!(resolved.node_at("source.process.parent").is_none());
    }

    #[test]
    fn test_lower_order_is_transitive() {
        let group = reusable(
            fieldset("group", &[("id", "keyword")]),
            true,
            1,
            vec![ReuseTarget::new("user", "group")],
        );
        let user = reusable(
            fieldset("user", &[("name", "keyword")]),
            true,
            2,
            vec![ReuseTarget::new("destination", "user")],
        );
        let schema = Schema::from_iter([group, user, fieldset("destination", &[])]);
        let resolved = resolve_reuse(schema).unwrap();

        let id = resolved
            .node_at("destination.user.group.id")
            .unwrap()
            .details()
            .unwrap();
        assert_eq!(id.flat_name.as_deref(), Some("destination.user.group.id"));
        assert_eq!(id.original_fieldset.as_deref(), Some("group"));
    }

    #[test]
    fn test_copies_are_independent() {
        let user = reusable(
            fieldset("user", &[("name", "keyword")]),
            true,
            2,
            vec![
                ReuseTarget::new("source", "user"),
                ReuseTarget::new("destination", "user"),
            ],
        );
        let schema = Schema::from_iter([user, fieldset("source", &[]), fieldset("destination", &[])]);
        let mut resolved = resolve_reuse(schema).unwrap();

        if let Some(FieldNode::Leaf(details)) = resolved
            .get_mut("source")
            .and_then(|fs| fs.fields.get_mut("user"))
            .and_then(|node| node.children_mut())
            .and_then(|children| children.get_mut("name"))
        {
            details.description = Some("changed".into());
        }
        let other = resolved.node_at("destination.user.name").unwrap().details().unwrap();
        assert_eq!(other.description, None);
        let original = resolved.node_at("user.name").unwrap().details().unwrap();
        assert_eq!(original.description, None);
    }

    #[test]
    fn test_missing_destination() {
        let user = reusable(
            fieldset("user", &[("name", "keyword")]),
            true,
            2,
            vec![ReuseTarget::new("host.missing", "user")],
        );
        let err = resolve_reuse(Schema::from_iter([user, fieldset("host", &[])])).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DestinationNotFound {
                path: "host.missing".into(),
                missing: "host.missing".into()
            }
        );

        let user = reusable(
            fieldset("user", &[]),
            true,
            2,
            vec![ReuseTarget::new("nowhere", "user")],
        );
        let err = resolve_reuse(Schema::from_iter([user])).unwrap_err();
        assert!(matches!(err, SchemaError::DestinationNotFound { .. }));
    }

    #[test]
    fn test_mount_collision() {
        let a = reusable(
            fieldset("a", &[]),
            true,
            2,
            vec![ReuseTarget::new("host", "shared")],
        );
        let b = reusable(
            fieldset("b", &[]),
            true,
            2,
            vec![ReuseTarget::new("host", "shared")],
        );
        let err = resolve_reuse(Schema::from_iter([a, b, fieldset("host", &[])])).unwrap_err();
        match err {
            SchemaError::MountCollision { full, existing, incoming } => {
                assert_eq!(full, "host.shared");
                assert_eq!(existing, "a copy of 'a'");
                assert_eq!(incoming, "a copy of 'b'");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_mount_over_declared_field_collides() {
        let user = reusable(
            fieldset("user", &[]),
            true,
            2,
            vec![ReuseTarget::new("host", "user")],
        );
        let err = resolve_reuse(Schema::from_iter([user, fieldset("host", &[("user", "keyword")])]))
            .unwrap_err();
        assert!(
            matches!(err, SchemaError::MountCollision { ref existing, .. } if existing == "a declared field")
        );
    }

    #[test]
    fn test_reuse_inside_non_top_level_copy_is_illegal() {
        let geo = reusable(
            fieldset("geo", &[("name", "keyword")]),
            false,
            1,
            vec![ReuseTarget::new("client", "geo")],
        );
        let extra = reusable(
            fieldset("extra", &[("x", "keyword")]),
            true,
            2,
            vec![ReuseTarget::new("client.geo", "extra")],
        );
        let err = resolve_reuse(Schema::from_iter([geo, extra, fieldset("client", &[])])).unwrap_err();
        assert_eq!(
            err,
            SchemaError::IllegalNestedReuse {
                fieldset: "extra".into(),
                destination: "client.geo".into(),
                mounted: "geo".into()
            }
        );
    }

    #[test]
    fn test_reuse_into_self_copy_is_allowed() {
        let process = reusable(
            fieldset("process", &[("pid", "long")]),
            false,
            1,
            vec![ReuseTarget::new("process", "parent")],
        );
        let hash = reusable(
            fieldset("hash", &[("md5", "keyword")]),
            false,
            2,
            vec![ReuseTarget::new("process.parent", "hash")],
        );
        let resolved = resolve_reuse(Schema::from_iter([process, hash])).unwrap();
        assert_eq!(
            flat_name(&resolved, "process.parent.hash.md5").as_deref(),
            Some("process.parent.hash.md5")
        );
    }

    #[test]
    fn test_root_fieldsets_cannot_take_part() {
        let mut base = reusable(
            fieldset("base", &[]),
            true,
            2,
            vec![ReuseTarget::new("host", "base")],
        );
        base.root = Some(true);
        let err = resolve_reuse(Schema::from_iter([base, fieldset("host", &[])])).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidReuse(_)));

        let mut base = fieldset("base", &[]);
        base.root = Some(true);
        let user = reusable(
            fieldset("user", &[]),
            true,
            2,
            vec![ReuseTarget::new("base", "user")],
        );
        let err = resolve_reuse(Schema::from_iter([base, user])).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidReuse(_)));
    }

    #[test]
    fn test_object_leaf_destination_is_promoted() {
        let geo = reusable(
            fieldset("geo", &[("name", "keyword")]),
            false,
            2,
            vec![ReuseTarget::new("threat.enrichments", "geo")],
        );
        let threat = fieldset("threat", &[("enrichments", "nested"), ("feed", "keyword")]);
        let resolved = resolve_reuse(Schema::from_iter([geo, threat.clone()])).unwrap();
        assert!(resolved.node_at("threat.enrichments.geo.name").is_some());

        let geo = reusable(
            fieldset("geo", &[]),
            false,
            2,
            vec![ReuseTarget::new("threat.feed", "geo")],
        );
        let err = resolve_reuse(Schema::from_iter([geo, threat])).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidReuse(_)));
    }

    #[test]
    fn test_short_override_lands_in_reused_here() {
        let mut target = ReuseTarget::new("destination", "user");
        target.short_override = Some("User at the destination.".into());
        target.normalize = vec!["array".into()];
        let user = reusable(fieldset("user", &[]), true, 2, vec![target]);
        let resolved = resolve_reuse(Schema::from_iter([user, fieldset("destination", &[])])).unwrap();
        let entry = &resolved.get("destination").unwrap().reused_here[0];
        assert_eq!(entry.short.as_deref(), Some("User at the destination."));
        assert_eq!(entry.normalize, ["array"]);
    }
}
