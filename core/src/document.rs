//! Raw schema documents and the first pipeline stage.
//!
//! A [`SchemaDocument`] is one parsed source file: a label plus the list of
//! field-set declarations it contains. [`load_documents`] checks names,
//! trims every authored string and normalizes reuse shorthand, producing one
//! [`FieldSetDecl`] per field set with its fields still in flat, dotted form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::types::{FieldDetails, Reusable, ReuseTarget, trim_in_place};

/// A parsed source document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Label used in error messages, usually the file path.
    pub source: String,
    pub fieldsets: Vec<RawFieldSet>,
}

impl SchemaDocument {
    pub fn new(source: impl Into<String>, fieldsets: Vec<RawFieldSet>) -> Self {
        Self {
            source: source.into(),
            fieldsets,
        }
    }
}

/// A field-set declaration exactly as authored.
///
/// Attributes not named here (`description`, `short`, `type`, `beta`,
/// `footnote`, ...) land in [`details`](RawFieldSet::details).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFieldSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reusable: Option<RawReusable>,
    #[serde(default)]
    pub fields: Vec<RawField>,
    #[serde(flatten)]
    pub details: FieldDetails,
}

/// A field declaration: a dotted name plus details, optionally with a
/// nested `fields` block whose names are relative to this one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<RawField>>,
    #[serde(flatten)]
    pub details: FieldDetails,
}

impl RawField {
    /// Creates a declaration with only a name and type.
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            fields: None,
            details: FieldDetails {
                name: name.into(),
                field_type: Some(field_type.into()),
                ..FieldDetails::default()
            },
        }
    }

    fn trim_strings(&mut self) {
        self.details.trim_strings();
        for child in self.fields.iter_mut().flatten() {
            child.trim_strings();
        }
    }
}

/// Reuse declaration as authored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReusable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Vec<ReuseSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

/// One `expected` entry: either `"destination"` or `{at, as, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReuseSpec {
    Shorthand(String),
    Explicit(RawReuseTarget),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReuseTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<String>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
}

impl ReuseSpec {
    /// Expands the entry into canonical form for the field set `owner`.
    pub fn normalize(self, owner: &str) -> Result<ReuseTarget> {
        match self {
            ReuseSpec::Shorthand(at) => Ok(ReuseTarget::new(at.trim(), owner)),
            ReuseSpec::Explicit(raw) => {
                let (Some(at), Some(as_name)) = (raw.at, raw.as_name) else {
                    return Err(SchemaError::InvalidReuse(format!(
                        "reuse entry of field set '{owner}' needs both 'at' and 'as'"
                    )));
                };
                let mut target = ReuseTarget::new(at.trim(), as_name.trim());
                target.short_override = raw.short_override.map(|s| s.trim().to_string());
                target.normalize = raw.normalize.unwrap_or_default();
                target.beta = raw.beta.map(|s| s.trim().to_string());
                Ok(target)
            }
        }
    }
}

/// A loaded field-set declaration: trimmed, named, with canonical reuse
/// targets, and fields still in flat declaration form.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSetDecl {
    pub name: String,
    pub title: Option<String>,
    pub group: Option<u32>,
    pub root: Option<bool>,
    pub reusable: Option<Reusable>,
    pub details: FieldDetails,
    pub fields: Vec<RawField>,
    /// Label of the document that declared this field set.
    pub source: String,
}

fn load_fieldset(mut raw: RawFieldSet, source: &str) -> Result<FieldSetDecl> {
    let name = raw
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SchemaError::MissingName {
            document: source.to_string(),
        })?
        .to_string();

    raw.details.trim_strings();
    raw.details.name = name.clone();
    if let Some(title) = raw.title.as_mut() {
        trim_in_place(title);
    }
    for field in &mut raw.fields {
        field.trim_strings();
    }

    let reusable = match raw.reusable {
        Some(reusable) => Some(Reusable {
            expected: reusable
                .expected
                .unwrap_or_default()
                .into_iter()
                .map(|spec| spec.normalize(&name))
                .collect::<Result<Vec<_>>>()?,
            top_level: reusable.top_level,
            order: reusable.order,
        }),
        None => None,
    };

    Ok(FieldSetDecl {
        name,
        title: raw.title,
        group: raw.group,
        root: raw.root,
        reusable,
        details: raw.details,
        fields: raw.fields,
        source: source.to_string(),
    })
}

/// Loads one merge group of documents into field-set declarations.
///
/// Fails with [`SchemaError::MissingName`] when a declaration has no name and
/// with [`SchemaError::DuplicateFieldSetName`] when two declarations in the
/// group share one. Overlapping declarations across groups are combined by
/// the merge stage instead.
///
/// # Examples
///
/// ```
/// use field_schema_core::{SchemaDocument, load_documents};
///
/// let doc = SchemaDocument::new(
///     "user.yml",
///     vec![serde_yaml::from_str("name: ' user '\ntitle: User\n").unwrap()],
/// );
/// let loaded = load_documents(vec![doc]).unwrap();
/// assert!(loaded.contains_key("user"));
/// ```
pub fn load_documents(documents: Vec<SchemaDocument>) -> Result<BTreeMap<String, FieldSetDecl>> {
    let mut loaded: BTreeMap<String, FieldSetDecl> = BTreeMap::new();
    for document in documents {
        debug!(
            source = %document.source,
            fieldsets = document.fieldsets.len(),
            "loading schema document"
        );
        for raw in document.fieldsets {
            let decl = load_fieldset(raw, &document.source)?;
            if let Some(existing) = loaded.get(&decl.name) {
                return Err(SchemaError::DuplicateFieldSetName {
                    name: decl.name,
                    document: format!("{} and {}", existing.source, document.source),
                });
            }
            loaded.insert(decl.name.clone(), decl);
        }
    }
    Ok(loaded)
}
