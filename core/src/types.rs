//! Field-set data model.
//!
//! A [`Schema`] maps field-set names to [`FieldSet`]s. Each field set owns a
//! tree of [`FieldNode`]s keyed by name segment: a dotted field such as
//! `parent.pid` lives at `fields["parent"] -> fields["pid"]`. Every pipeline
//! stage takes a schema by value (or clones it) and hands back a new,
//! independently owned schema, so grafted copies never alias each other.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Extra, pass-through attributes of a field or field set.
pub type Attributes = BTreeMap<String, serde_yaml::Value>;

/// Field types that may receive nested fields (and reuse mounts).
pub const OBJECT_TYPES: [&str; 3] = ["object", "group", "nested"];

/// Field level within the vocabulary.
///
/// # Examples
///
/// ```
/// use field_schema_core::Level;
///
/// assert_eq!("extended".parse::<Level>(), Ok(Level::Extended));
/// assert!("experimental".parse::<Level>().is_err());
/// assert_eq!(Level::Custom.as_str(), "custom");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Fields most commonly used across sources.
    Core,
    /// Remaining vocabulary fields.
    Extended,
    /// Reserved for caller extensions.
    Custom,
}

impl Level {
    /// Returns the lowercase name used in schema documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Core => "core",
            Level::Extended => "extended",
            Level::Custom => "custom",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "core" => Ok(Level::Core),
            "extended" => Ok(Level::Extended),
            "custom" => Ok(Level::Custom),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Definition record of a single field.
///
/// Authored attributes come straight from the schema documents; `flat_name`
/// and `dashed_name` are computed by the finalizer, and `original_fieldset`
/// is set only on fields that arrived through reuse. Unknown attributes are
/// kept in [`extra`](FieldDetails::extra) and carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDetails {
    /// Dotted name as authored (relative to the field set).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashed_name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Single-line summary; defaults to the description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_values: Vec<String>,
    /// Post-processing hints such as `array`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_above: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norms: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_values: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_factor: Option<f64>,
    /// Target of an `alias` field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_fields: Vec<MultiField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<AllowedValue>,
    /// Field set this field was reused from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_fieldset: Option<String>,
    /// Set on group nodes created implicitly by nesting or by reuse mounts.
    #[serde(default, skip_serializing_if = "is_false")]
    pub intermediate: bool,
    #[serde(flatten)]
    pub extra: Attributes,
}

impl FieldDetails {
    /// Creates details for an implicitly created parent node.
    pub fn intermediate(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: Some("object".to_string()),
            intermediate: true,
            ..Self::default()
        }
    }

    /// Returns the field type, if any.
    pub fn field_type(&self) -> Option<&str> {
        self.field_type.as_deref()
    }

    /// Returns `true` if the type accepts nested fields.
    pub fn is_object_like(&self) -> bool {
        self.field_type()
            .is_some_and(|t| OBJECT_TYPES.contains(&t))
    }

    /// Parses the authored level.
    pub fn parsed_level(&self) -> Option<Result<Level, String>> {
        self.level.as_deref().map(str::parse)
    }

    /// Strips leading and trailing whitespace from every authored string.
    pub fn trim_strings(&mut self) {
        trim_in_place(&mut self.name);
        for value in [
            &mut self.field_type,
            &mut self.level,
            &mut self.description,
            &mut self.short,
            &mut self.pattern,
            &mut self.object_type,
            &mut self.path,
            &mut self.beta,
        ]
        .into_iter()
        .flatten()
        {
            trim_in_place(value);
        }
        if let Some(serde_yaml::Value::String(example)) = self.example.as_mut() {
            trim_in_place(example);
        }
        for allowed in &mut self.allowed_values {
            trim_in_place(&mut allowed.name);
            trim_in_place(&mut allowed.description);
            if let Some(beta) = allowed.beta.as_mut() {
                trim_in_place(beta);
            }
            trim_attributes(&mut allowed.extra);
        }
        trim_attributes(&mut self.extra);
    }
}

pub(crate) fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

pub(crate) fn trim_attributes(attributes: &mut Attributes) {
    for value in attributes.values_mut() {
        if let serde_yaml::Value::String(s) = value {
            trim_in_place(s);
        }
    }
}

/// Secondary, differently analyzed representation of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiField {
    /// Defaults to the multi-field's type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flat_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_above: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norms: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_values: Option<bool>,
    #[serde(flatten)]
    pub extra: Attributes,
}

impl MultiField {
    /// Creates a multi-field of the given type with no explicit name.
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            name: None,
            field_type: field_type.into(),
            flat_name: None,
            ignore_above: None,
            norms: None,
            index: None,
            doc_values: None,
            extra: Attributes::new(),
        }
    }

    /// Returns the explicit name, falling back to the type.
    pub fn effective_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.field_type)
    }
}

/// One permitted value of an enumerated field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedValue {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_event_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
    #[serde(flatten)]
    pub extra: Attributes,
}

/// A node in a field set's tree.
///
/// A node is either a leaf carrying [`FieldDetails`], or a group with named
/// children and optional details of its own. A group with details is both a
/// field and a parent (e.g. `dns.answers`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeRepr", into = "NodeRepr")]
pub enum FieldNode {
    Leaf(FieldDetails),
    Group(FieldGroup),
}

/// Children of a group node plus its optional details.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldGroup {
    pub details: Option<FieldDetails>,
    pub fields: BTreeMap<String, FieldNode>,
}

#[derive(Serialize, Deserialize)]
struct NodeRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field_details: Option<FieldDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, FieldNode>>,
}

impl TryFrom<NodeRepr> for FieldNode {
    type Error = String;

    fn try_from(repr: NodeRepr) -> Result<Self, Self::Error> {
        match (repr.field_details, repr.fields) {
            (details, Some(fields)) => Ok(FieldNode::Group(FieldGroup { details, fields })),
            (Some(details), None) => Ok(FieldNode::Leaf(details)),
            (None, None) => Err("field node needs field_details or fields".to_string()),
        }
    }
}

impl From<FieldNode> for NodeRepr {
    fn from(node: FieldNode) -> Self {
        match node {
            FieldNode::Leaf(details) => NodeRepr {
                field_details: Some(details),
                fields: None,
            },
            FieldNode::Group(group) => NodeRepr {
                field_details: group.details,
                fields: Some(group.fields),
            },
        }
    }
}

impl FieldNode {
    /// Creates an implicit parent node named by its dotted path.
    pub fn intermediate(name: impl Into<String>) -> Self {
        FieldNode::Group(FieldGroup {
            details: Some(FieldDetails::intermediate(name)),
            fields: BTreeMap::new(),
        })
    }

    /// Returns the node's own details.
    pub fn details(&self) -> Option<&FieldDetails> {
        match self {
            FieldNode::Leaf(details) => Some(details),
            FieldNode::Group(group) => group.details.as_ref(),
        }
    }

    /// Returns the node's own details mutably.
    pub fn details_mut(&mut self) -> Option<&mut FieldDetails> {
        match self {
            FieldNode::Leaf(details) => Some(details),
            FieldNode::Group(group) => group.details.as_mut(),
        }
    }

    /// Returns the children of a group node.
    pub fn children(&self) -> Option<&BTreeMap<String, FieldNode>> {
        match self {
            FieldNode::Leaf(_) => None,
            FieldNode::Group(group) => Some(&group.fields),
        }
    }

    /// Returns the children of a group node mutably.
    pub fn children_mut(&mut self) -> Option<&mut BTreeMap<String, FieldNode>> {
        match self {
            FieldNode::Leaf(_) => None,
            FieldNode::Group(group) => Some(&mut group.fields),
        }
    }

    /// Turns a leaf into a group keeping its details, and returns the children.
    pub fn promote_to_group(&mut self) -> &mut BTreeMap<String, FieldNode> {
        if let FieldNode::Leaf(details) = self {
            let details = std::mem::take(details);
            *self = FieldNode::Group(FieldGroup {
                details: Some(details),
                fields: BTreeMap::new(),
            });
        }
        match self {
            FieldNode::Group(group) => &mut group.fields,
            FieldNode::Leaf(_) => unreachable!("leaf promoted above"),
        }
    }

    /// Returns `true` for nodes without details or with implicit details.
    pub fn is_intermediate(&self) -> bool {
        self.details().is_none_or(|d| d.intermediate)
    }

    /// Returns the field set this node was reused from, if any.
    pub fn original_fieldset(&self) -> Option<&str> {
        self.details().and_then(|d| d.original_fieldset.as_deref())
    }

    /// Applies `f` to the details of this node and every descendant.
    pub fn for_each_details_mut(&mut self, f: &mut impl FnMut(&mut FieldDetails)) {
        match self {
            FieldNode::Leaf(details) => f(details),
            FieldNode::Group(group) => {
                if let Some(details) = group.details.as_mut() {
                    f(details);
                }
                for child in group.fields.values_mut() {
                    child.for_each_details_mut(f);
                }
            }
        }
    }
}

/// A reuse destination in canonical form.
///
/// Shorthand entries (`"destination"`) are expanded at load time to
/// `{at: "destination", as: <field set name>}`; nothing downstream sees the
/// shorthand.
///
/// # Examples
///
/// ```
/// use field_schema_core::ReuseTarget;
///
/// let target = ReuseTarget::new("process", "parent");
/// assert_eq!(target.full, "process.parent");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReuseTarget {
    /// Dotted destination path; its first segment is a field set.
    pub at: String,
    /// Name of the mount segment.
    #[serde(rename = "as")]
    pub as_name: String,
    /// `at.as`, the identity of this mount.
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_override: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub normalize: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
}

impl ReuseTarget {
    pub fn new(at: impl Into<String>, as_name: impl Into<String>) -> Self {
        let at = at.into();
        let as_name = as_name.into();
        Self {
            full: format!("{at}.{as_name}"),
            at,
            as_name,
            short_override: None,
            normalize: Vec::new(),
            beta: None,
        }
    }

    /// Name of the field set the destination belongs to.
    pub fn destination_fieldset(&self) -> &str {
        self.at.split('.').next().unwrap_or(&self.at)
    }
}

/// Reuse declaration of a field set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reusable {
    #[serde(default)]
    pub expected: Vec<ReuseTarget>,
    /// Whether the field set also appears unnested at the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_level: Option<bool>,
    /// Reuse pass in which the grafts run; lower first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl Reusable {
    pub fn is_top_level(&self) -> bool {
        self.top_level.unwrap_or(false)
    }
}

/// Record of a field set mounted inside another one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReusedHere {
    pub schema_name: String,
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub normalize: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<String>,
}

/// A named, reusable unit of schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Display priority; defaults to 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u32>,
    /// Root field sets do not prefix their fields with their name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reusable: Option<Reusable>,
    /// The field set's own details (description, short, type, ...).
    #[serde(default)]
    pub details: FieldDetails,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldNode>,
    /// Sorted `full` paths of mounts grafted into this field set.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nestings: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reused_here: Vec<ReusedHere>,
}

impl FieldSet {
    /// Creates an empty field set.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            details: FieldDetails {
                name: name.clone(),
                ..FieldDetails::default()
            },
            name,
            title: None,
            group: None,
            root: None,
            reusable: None,
            fields: BTreeMap::new(),
            nestings: Vec::new(),
            reused_here: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.root.unwrap_or(false)
    }

    pub fn description(&self) -> Option<&str> {
        self.details.description.as_deref()
    }

    /// Returns `true` if the field set may appear unnested at the root.
    ///
    /// Field sets that are not reusable always do; reusable ones only when
    /// declared `top_level`.
    pub fn appears_at_top_level(&self) -> bool {
        self.reusable.as_ref().is_none_or(Reusable::is_top_level)
    }

    /// Looks up a node by its dotted path relative to this field set.
    pub fn node_at(&self, dotted: &str) -> Option<&FieldNode> {
        let mut segments = dotted.split('.');
        let mut node = self.fields.get(segments.next()?)?;
        for segment in segments {
            node = node.children()?.get(segment)?;
        }
        Some(node)
    }
}

/// A complete model: field-set name to field set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    fieldsets: BTreeMap<String, FieldSet>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FieldSet> {
        self.fieldsets.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldSet> {
        self.fieldsets.get_mut(name)
    }

    /// Inserts a field set keyed by its name, returning any replaced entry.
    pub fn insert(&mut self, fieldset: FieldSet) -> Option<FieldSet> {
        self.fieldsets.insert(fieldset.name.clone(), fieldset)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldSet> {
        self.fieldsets.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fieldsets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fieldsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fieldsets.is_empty()
    }

    /// Iterates field sets in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldSet> {
        self.fieldsets.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FieldSet> {
        self.fieldsets.values_mut()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fieldsets.keys().map(String::as_str)
    }

    /// Looks up a node by `fieldset.dotted.path`.
    ///
    /// # Examples
    ///
    /// ```
    /// use field_schema_core::{FieldDetails, FieldNode, FieldSet, Schema};
    ///
    /// let mut process = FieldSet::new("process");
    /// process.fields.insert(
    ///     "pid".to_string(),
    ///     FieldNode::Leaf(FieldDetails { name: "pid".into(), ..Default::default() }),
    /// );
    /// let mut schema = Schema::new();
    /// schema.insert(process);
    ///
    /// assert!(schema.node_at("process.pid").is_some());
    /// assert!(schema.node_at("process.ppid").is_none());
    /// ```
    pub fn node_at(&self, path: &str) -> Option<&FieldNode> {
        let (fieldset, rest) = path.split_once('.')?;
        self.get(fieldset)?.node_at(rest)
    }
}

impl FromIterator<FieldSet> for Schema {
    fn from_iter<T: IntoIterator<Item = FieldSet>>(iter: T) -> Self {
        let mut schema = Schema::new();
        for fieldset in iter {
            schema.insert(fieldset);
        }
        schema
    }
}

impl IntoIterator for Schema {
    type Item = FieldSet;
    type IntoIter = std::collections::btree_map::IntoValues<String, FieldSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.fieldsets.into_values()
    }
}
