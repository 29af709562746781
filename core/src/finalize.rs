//! Final names and type-dependent defaults.
//!
//! Names depend on where a field ends up after reuse, so they are computed
//! last: `flat_name` is the full dotted path (without the field-set prefix
//! for `root` field sets) and `dashed_name` is its identifier form.

use tracing::debug;

use crate::types::{FieldDetails, MultiField, Schema};
use crate::visitor::{FieldContext, for_each_field_mut};

/// Default `ignore_above` of keyword fields.
pub const KEYWORD_IGNORE_ABOVE: u32 = 1024;

/// Legacy types and the widely supported type each falls back to.
pub const TYPE_FALLBACKS: [(&str, &str); 5] = [
    ("constant_keyword", "keyword"),
    ("wildcard", "keyword"),
    ("version", "keyword"),
    ("match_only_text", "text"),
    ("flattened", "object"),
];

/// Identifier form of a flat name: `.` and `_` become `-`, `@` is dropped.
///
/// # Examples
///
/// ```
/// use field_schema_core::dashed_name;
///
/// assert_eq!(dashed_name("destination.user.full_name"), "destination-user-full-name");
/// assert_eq!(dashed_name("@timestamp"), "timestamp");
/// ```
pub fn dashed_name(flat_name: &str) -> String {
    flat_name
        .chars()
        .filter(|c| *c != '@')
        .map(|c| if c == '.' || c == '_' { '-' } else { c })
        .collect()
}

fn assign_field_names(ctx: &FieldContext<'_>, details: &mut FieldDetails) {
    let flat_name = ctx.flat_name();
    details.dashed_name = Some(dashed_name(&flat_name));
    for multi in &mut details.multi_fields {
        let name = multi.effective_name().to_string();
        multi.flat_name = Some(format!("{flat_name}.{name}"));
        multi.name = Some(name);
    }
    details.flat_name = Some(flat_name);
}

/// Recomputes `flat_name`/`dashed_name` of every field from its position.
pub fn assign_names(schema: &mut Schema) {
    for_each_field_mut(schema, assign_field_names);
}

fn apply_field_defaults(details: &mut FieldDetails) {
    let field_type = details.field_type.clone();
    match field_type.as_deref() {
        Some("keyword") => {
            details.ignore_above.get_or_insert(KEYWORD_IGNORE_ABOVE);
        }
        Some("text") => {
            details.norms.get_or_insert(false);
        }
        Some("wildcard") => details.index = None,
        Some("object") => {
            details
                .object_type
                .get_or_insert_with(|| "keyword".to_string());
        }
        _ => {}
    }
    if details.index == Some(false) {
        details.doc_values.get_or_insert(false);
        details.ignore_above = None;
    }
}

fn apply_multi_field_defaults(multi: &mut MultiField) {
    match multi.field_type.as_str() {
        "keyword" => {
            multi.ignore_above.get_or_insert(KEYWORD_IGNORE_ABOVE);
        }
        "text" => {
            multi.norms.get_or_insert(false);
        }
        "wildcard" => multi.index = None,
        _ => {}
    }
    if multi.index == Some(false) {
        multi.doc_values.get_or_insert(false);
        multi.ignore_above = None;
    }
}

/// Computes final names and injects type defaults into every field.
///
/// Defaults never override authored values, so finalizing twice yields the
/// same model.
pub fn finalize(mut schema: Schema) -> Schema {
    let mut fields = 0usize;
    for_each_field_mut(&mut schema, |ctx, details| {
        assign_field_names(ctx, details);
        if details.intermediate {
            return;
        }
        fields += 1;
        apply_field_defaults(details);
        for multi in &mut details.multi_fields {
            apply_multi_field_defaults(multi);
        }
    });
    debug!(fields, "finalized schema");
    schema
}

/// Replaces types that are not universally available with their fallbacks.
pub fn apply_type_fallbacks(mut schema: Schema) -> Schema {
    let mut replaced = 0usize;
    for_each_field_mut(&mut schema, |_, details| {
        let fallback = details.field_type().and_then(|current| {
            TYPE_FALLBACKS
                .iter()
                .find(|(from, _)| *from == current)
                .map(|(_, to)| *to)
        });
        if let Some(fallback) = fallback {
            details.field_type = Some(fallback.to_string());
            replaced += 1;
        }
    });
    debug!(replaced, "applied type fallbacks");
    schema
}
