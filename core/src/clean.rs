//! Cleaning stage: mandatory attributes, defaults and authoring checks.
//!
//! Runs on the merged model, before reuse, so every copy grafted later
//! inherits already-validated, already-defaulted details.
//!
//! Hard errors (missing attributes, invalid levels, multi-line short
//! descriptions) always abort. Softer authoring issues are logged with
//! `warn!` and only abort in strict mode, as [`SchemaError::StrictCheck`].

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Result, SchemaError};
use crate::types::{FieldDetails, FieldSet, Schema};
use crate::visitor::{FieldContext, VisitorMut, walk_mut};

/// Maximum length of a short description.
pub const SHORT_LIMIT: usize = 120;

const FIELDSET_DEFAULT_GROUP: u32 = 2;
const REUSE_DEFAULT_ORDER: u32 = 2;

/// Cleaning behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanOptions {
    /// Turn authoring warnings into errors.
    pub strict: bool,
}

/// Validates and defaults every field set and field of `schema`.
pub fn clean(mut schema: Schema, options: &CleanOptions) -> Result<Schema> {
    let mut cleaner = Cleaner {
        strict: options.strict,
        warnings: 0,
    };
    walk_mut(&mut schema, &mut cleaner)?;
    debug!(
        fieldsets = schema.len(),
        warnings = cleaner.warnings,
        strict = options.strict,
        "cleaned schema"
    );
    Ok(schema)
}

struct Cleaner {
    strict: bool,
    warnings: usize,
}

impl Cleaner {
    fn strict_warning(&mut self, message: String) -> Result<()> {
        if self.strict {
            return Err(SchemaError::StrictCheck(message));
        }
        self.warnings += 1;
        warn!("{message}");
        Ok(())
    }

    fn check_short(&mut self, subject: &str, short: &str) -> Result<()> {
        if short.contains('\n') {
            return Err(SchemaError::MultilineShortDescription {
                subject: subject.to_string(),
                short: short.to_string(),
            });
        }
        let length = short.chars().count();
        if length > SHORT_LIMIT {
            self.strict_warning(format!(
                "short description of {subject} is {length} characters long, limit is {SHORT_LIMIT}"
            ))?;
        }
        Ok(())
    }

    fn check_beta(&mut self, subject: &str, beta: Option<&str>) -> Result<()> {
        if beta.is_some_and(|b| b.contains('\n')) {
            self.strict_warning(format!("beta description of {subject} must be single line"))?;
        }
        Ok(())
    }

    fn check_pattern(&mut self, subject: &str, pattern: &str) -> Result<Option<Regex>> {
        match Regex::new(pattern) {
            Ok(regex) => Ok(Some(regex)),
            Err(err) => {
                self.strict_warning(format!(
                    "pattern of {subject} is not a valid regular expression: {err}"
                ))?;
                Ok(None)
            }
        }
    }

    fn check_example(
        &mut self,
        subject: &str,
        details: &FieldDetails,
        pattern: Option<&Regex>,
    ) -> Result<()> {
        let Some(example) = details.example.as_ref() else {
            return Ok(());
        };
        let Some(rendered) = scalar_text(example) else {
            return self.strict_warning(format!(
                "example of {subject} contains an object or array and must be quoted"
            ));
        };

        let is_array = details
            .normalize
            .as_ref()
            .is_some_and(|n| n.iter().any(|hint| hint == "array"));
        let values = if is_array {
            split_array_example(&rendered)
        } else {
            vec![rendered]
        };

        for value in &values {
            if let Some(regex) = pattern {
                if !matches_at_start(regex, value) {
                    self.strict_warning(format!(
                        "example value `{value}` of {subject} does not match pattern `{}`",
                        regex.as_str()
                    ))?;
                }
            }
            if !details.expected_values.is_empty() && !details.expected_values.contains(value) {
                self.strict_warning(format!(
                    "example value `{value}` of {subject} is not one of the expected values {:?}",
                    details.expected_values
                ))?;
            }
        }
        Ok(())
    }
}

impl VisitorMut for Cleaner {
    fn visit_fieldset(&mut self, fieldset: &mut FieldSet) -> Result<()> {
        let subject = format!("field set '{}'", fieldset.name);

        let mut missing = Vec::new();
        if fieldset.name.is_empty() {
            missing.push("name");
        }
        if fieldset.title.as_deref().is_none_or(str::is_empty) {
            missing.push("title");
        }
        if fieldset.details.description.as_deref().is_none_or(str::is_empty) {
            missing.push("description");
        }
        if let Some(reusable) = &fieldset.reusable {
            if reusable.expected.is_empty() {
                missing.push("reusable.expected");
            }
            if reusable.top_level.is_none() {
                missing.push("reusable.top_level");
            }
        }
        if !missing.is_empty() {
            return Err(SchemaError::MissingMandatoryAttribute {
                subject,
                missing: missing.into_iter().map(String::from).collect(),
            });
        }

        fieldset.group.get_or_insert(FIELDSET_DEFAULT_GROUP);
        fieldset.root.get_or_insert(false);
        let details = &mut fieldset.details;
        details.name = fieldset.name.clone();
        details.field_type.get_or_insert_with(|| "group".to_string());
        if details.short.is_none() {
            details.short = details.description.as_deref().map(first_line);
        }
        if let Some(reusable) = fieldset.reusable.as_mut() {
            reusable.order.get_or_insert(REUSE_DEFAULT_ORDER);
        }

        if let Some(short) = fieldset.details.short.clone() {
            self.check_short(&subject, &short)?;
        }
        let beta = fieldset.details.beta.clone();
        self.check_beta(&subject, beta.as_deref())?;
        if let Some(reusable) = fieldset.reusable.clone() {
            for target in &reusable.expected {
                if let Some(short) = &target.short_override {
                    self.check_short(&format!("reuse of '{}' at '{}'", fieldset.name, target.full), short)?;
                }
            }
        }
        Ok(())
    }

    fn visit_field(&mut self, ctx: &FieldContext<'_>, details: &mut FieldDetails) -> Result<()> {
        if details.intermediate {
            return Ok(());
        }
        let subject = format!("field '{}'", ctx.flat_name());

        let mut missing = Vec::new();
        if details.name.is_empty() {
            missing.push("name");
        }
        if details.description.as_deref().is_none_or(str::is_empty) {
            missing.push("description");
        }
        match details.field_type() {
            None => missing.push("type"),
            Some("alias") if details.path.is_none() => missing.push("path"),
            Some("scaled_float") if details.scaling_factor.is_none() => {
                missing.push("scaling_factor")
            }
            Some(_) => {}
        }
        if details.level.is_none() {
            missing.push("level");
        }
        if !missing.is_empty() {
            return Err(SchemaError::MissingMandatoryAttribute {
                subject,
                missing: missing.into_iter().map(String::from).collect(),
            });
        }

        if details.short.is_none() {
            details.short = details.description.as_deref().map(first_line);
        }
        details.normalize.get_or_insert_with(Vec::new);
        for multi in &mut details.multi_fields {
            if multi.name.is_none() {
                multi.name = Some(multi.field_type.clone());
            }
        }

        if let Some(short) = details.short.as_deref() {
            self.check_short(&subject, short)?;
        }
        self.check_beta(&subject, details.beta.as_deref())?;
        let pattern = match details.pattern.as_deref() {
            Some(pattern) => self.check_pattern(&subject, pattern)?,
            None => None,
        };
        self.check_example(&subject, details, pattern.as_ref())?;

        if let Some(Err(level)) = details.parsed_level() {
            return Err(SchemaError::InvalidLevel {
                field: ctx.flat_name(),
                level,
            });
        }
        Ok(())
    }
}

/// Default `short`: the first line of the description.
fn first_line(description: &str) -> String {
    description.lines().next().unwrap_or_default().trim().to_string()
}

/// Text of a scalar example; `None` for mappings and sequences.
fn scalar_text(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        serde_yaml::Value::Null => Some(String::new()),
        serde_yaml::Value::Tagged(tagged) => scalar_text(&tagged.value),
        serde_yaml::Value::Sequence(_) | serde_yaml::Value::Mapping(_) => None,
    }
}

/// Splits a quoted array example such as `["a", "b"]` into its values.
fn split_array_example(example: &str) -> Vec<String> {
    let stripped: String = example
        .chars()
        .filter(|c| !matches!(c, '"' | '[' | ']' | ' '))
        .collect();
    stripped.split(',').map(str::to_string).collect()
}

/// Patterns are anchored at the start of the value only.
fn matches_at_start(regex: &Regex, value: &str) -> bool {
    regex.find(value).is_some_and(|m| m.start() == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FieldNode, MultiField, Reusable, ReuseTarget};

    fn valid_field(name: &str) -> FieldDetails {
        FieldDetails {
            name: name.to_string(),
            field_type: Some("keyword".into()),
            level: Some("extended".into()),
            description: Some(format!("The {name}.")),
            ..FieldDetails::default()
        }
    }

    fn fieldset_with(details: FieldDetails) -> Schema {
        let mut fs = FieldSet::new("host");
        fs.title = Some("Host".into());
        fs.details.description = Some("Host fields.".into());
        fs.fields
            .insert(details.name.clone(), FieldNode::Leaf(details));
        Schema::from_iter([fs])
    }

    fn strict() -> CleanOptions {
        CleanOptions { strict: true }
    }

    #[test]
    fn test_defaults_are_applied() {
        let mut details = valid_field("hostname");
        details.multi_fields = vec![MultiField::new("text")];
        let cleaned = clean(fieldset_with(details), &CleanOptions::default()).unwrap();

        let host = cleaned.get("host").unwrap();
        assert_eq!(host.group, Some(2));
        assert_eq!(host.root, Some(false));
        assert_eq!(host.details.field_type(), Some("group"));
        assert_eq!(host.details.short.as_deref(), Some("Host fields."));

        let field = host.fields["hostname"].details().unwrap();
        assert_eq!(field.short.as_deref(), Some("The hostname."));
        assert_eq!(field.normalize.as_deref(), Some(&[][..]));
        assert_eq!(field.multi_fields[0].name.as_deref(), Some("text"));
    }

    #[test]
    fn test_missing_field_attributes_are_listed() {
        let details = FieldDetails {
            name: "ip".into(),
            field_type: Some("alias".into()),
            ..FieldDetails::default()
        };
        let err = clean(fieldset_with(details), &CleanOptions::default()).unwrap_err();
        match err {
            SchemaError::MissingMandatoryAttribute { missing, .. } => {
                assert_eq!(missing, ["description", "path", "level"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_fieldset_title_is_rejected() {
        let mut schema = fieldset_with(valid_field("name"));
        schema.get_mut("host").unwrap().title = None;
        let err = clean(schema, &CleanOptions::default()).unwrap_err();
        assert!(
            matches!(err, SchemaError::MissingMandatoryAttribute { ref missing, .. } if missing == &["title"])
        );
    }

    #[test]
    fn test_reusable_needs_top_level() {
        let mut schema = fieldset_with(valid_field("name"));
        schema.get_mut("host").unwrap().reusable = Some(Reusable {
            expected: vec![ReuseTarget::new("observer", "host")],
            top_level: None,
            order: None,
        });
        let err = clean(schema, &CleanOptions::default()).unwrap_err();
        assert!(err.to_string().contains("reusable.top_level"));
    }

    #[test]
    fn test_reuse_order_defaults_to_two() {
        let mut schema = fieldset_with(valid_field("name"));
        schema.get_mut("host").unwrap().reusable = Some(Reusable {
            expected: vec![ReuseTarget::new("observer", "host")],
            top_level: Some(true),
            order: None,
        });
        let cleaned = clean(schema, &CleanOptions::default()).unwrap();
        let reusable = cleaned.get("host").unwrap().reusable.clone().unwrap();
        assert_eq!(reusable.order, Some(2));
    }

    #[test]
    fn test_intermediate_fields_are_exempt() {
        let mut schema = fieldset_with(valid_field("name"));
        schema
            .get_mut("host")
            .unwrap()
            .fields
            .insert("os".into(), FieldNode::intermediate("os"));
        assert!(clean(schema, &CleanOptions::default()).is_ok());
    }

    #[test]
    fn test_invalid_level() {
        let mut details = valid_field("name");
        details.level = Some("experimental".into());
        let err = clean(fieldset_with(details), &CleanOptions::default()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::InvalidLevel {
                field: "host.name".into(),
                level: "experimental".into()
            }
        );
    }

    #[test]
    fn test_multiline_short_is_always_fatal() {
        let mut details = valid_field("name");
        details.short = Some("first line\nsecond line".into());
        let err = clean(fieldset_with(details), &CleanOptions::default()).unwrap_err();
        assert!(matches!(err, SchemaError::MultilineShortDescription { .. }));
    }

    #[test]
    fn test_short_defaults_to_first_line_of_description() {
        let mut details = valid_field("name");
        details.description =
            Some("Name of the host.\nIt can contain what hostname returns on Unix systems.".into());
        let mut schema = fieldset_with(details);
        schema.get_mut("host").unwrap().details.description =
            Some("Host fields.\n\nDescribes the host running the agent.".into());

        let cleaned = clean(schema, &CleanOptions::default()).unwrap();
        let host = cleaned.get("host").unwrap();
        assert_eq!(host.details.short.as_deref(), Some("Host fields."));
        let field = host.fields["name"].details().unwrap();
        assert_eq!(field.short.as_deref(), Some("Name of the host."));
        assert!(field.description.as_deref().unwrap().contains('\n'));
    }

    #[test]
    fn test_empty_description_is_missing() {
        let mut details = valid_field("name");
        details.description = Some(String::new());
        let err = clean(fieldset_with(details), &CleanOptions::default()).unwrap_err();
        assert!(
            matches!(err, SchemaError::MissingMandatoryAttribute { ref missing, .. } if missing == &["description"])
        );

        let mut schema = fieldset_with(valid_field("name"));
        schema.get_mut("host").unwrap().details.description = Some(String::new());
        let err = clean(schema, &CleanOptions::default()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::MissingMandatoryAttribute {
                subject: "field set 'host'".into(),
                missing: vec!["description".into()],
            }
        );
    }

    #[test]
    fn test_multiline_short_override_is_fatal() {
        let mut schema = fieldset_with(valid_field("name"));
        let mut target = ReuseTarget::new("observer", "host");
        target.short_override = Some("a\nb".into());
        schema.get_mut("host").unwrap().reusable = Some(Reusable {
            expected: vec![target],
            top_level: Some(true),
            order: None,
        });
        let err = clean(schema, &CleanOptions::default()).unwrap_err();
        assert!(matches!(err, SchemaError::MultilineShortDescription { .. }));
    }

    #[test]
    fn test_long_short_warns_unless_strict() {
        let mut details = valid_field("name");
        details.short = Some("x".repeat(SHORT_LIMIT + 1));
        assert!(clean(fieldset_with(details.clone()), &CleanOptions::default()).is_ok());
        let err = clean(fieldset_with(details), &strict()).unwrap_err();
        assert!(matches!(err, SchemaError::StrictCheck(_)));
    }

    #[test]
    fn test_example_must_match_pattern_in_strict_mode() {
        let mut details = valid_field("mac");
        details.pattern = Some("^[A-F0-9]{2}(-[A-F0-9]{2}){5}$".into());
        details.example = Some(serde_yaml::Value::String("00-00-5E-00-53-23".into()));
        assert!(clean(fieldset_with(details.clone()), &strict()).is_ok());

        details.example = Some(serde_yaml::Value::String("00:00:5e:00:53:23".into()));
        let err = clean(fieldset_with(details), &strict()).unwrap_err();
        assert!(matches!(err, SchemaError::StrictCheck(_)));
    }

    #[test]
    fn test_array_example_is_split() {
        let mut details = valid_field("type");
        details.normalize = Some(vec!["array".into()]);
        details.expected_values = vec!["info".into(), "start".into()];
        details.example = Some(serde_yaml::Value::String("[\"info\", \"start\"]".into()));
        assert!(clean(fieldset_with(details.clone()), &strict()).is_ok());

        details.example = Some(serde_yaml::Value::String("[\"info\", \"stop\"]".into()));
        assert!(clean(fieldset_with(details), &strict()).is_err());
    }

    #[test]
    fn test_invalid_pattern_and_unquoted_example() {
        let mut details = valid_field("name");
        details.pattern = Some("([a-z".into());
        assert!(clean(fieldset_with(details.clone()), &CleanOptions::default()).is_ok());
        assert!(clean(fieldset_with(details), &strict()).is_err());

        let mut details = valid_field("labels");
        details.example = Some(serde_yaml::from_str("{env: production}").unwrap());
        assert!(clean(fieldset_with(details), &strict()).is_err());
    }

    #[test]
    fn test_split_array_example() {
        assert_eq!(split_array_example("[\"a\", \"b\"]"), ["a", "b"]);
        assert_eq!(split_array_example("single"), ["single"]);
    }
}
