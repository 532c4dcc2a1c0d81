//! Extra-field descriptors attached to an auth event.

use serde::{Deserialize, Serialize};

/// Maximum number of extra fields an auth event may declare.
pub const MAX_EXTRA_FIELDS: usize = 15;

/// Field names claimed by the engine itself; events may not redeclare them.
pub const RESERVED_FIELD_NAMES: &[&str] = &[
    "email",
    "tlf",
    "code",
    "captcha",
    "captcha_id",
    "username",
    "password",
    "status",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Int,
    Bool,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Int => "int",
            FieldType::Bool => "bool",
        }
    }
}

/// Declaration of one extra registration field.
///
/// `min`/`max` bound the character length for text fields and the value for
/// int fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub required_on_authentication: bool,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
    #[serde(default)]
    pub unique: bool,
}

impl FieldDescriptor {
    /// Validate a whole descriptor set; returns every violation found, not
    /// just the first.
    pub fn validate_set(fields: &[FieldDescriptor]) -> Vec<String> {
        let mut errors = Vec::new();

        if fields.len() > MAX_EXTRA_FIELDS {
            errors.push("maximum number of fields reached".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for field in fields {
            if field.name.is_empty() || field.name.len() > 255 {
                errors.push(format!("invalid extra field name: {:?}", field.name));
            }
            if RESERVED_FIELD_NAMES.contains(&field.name.as_str()) {
                errors.push(format!("field name {} is reserved", field.name));
            }
            if !seen.insert(field.name.as_str()) {
                errors.push(format!("two fields with the same name: {}", field.name));
            }
            if let (Some(min), Some(max)) = (field.min, field.max) {
                if min > max {
                    errors.push(format!("field {}: min is greater than max", field.name));
                }
            }
            if field.field_type == FieldType::Bool && (field.min.is_some() || field.max.is_some())
            {
                errors.push(format!("field {}: bool fields take no bounds", field.name));
            }
        }

        errors
    }

    /// Parse a raw descriptor list, collecting both parse and set-level
    /// violations.
    pub fn parse_list(raw: &[serde_json::Value]) -> Result<Vec<FieldDescriptor>, Vec<String>> {
        let mut errors = Vec::new();
        let mut fields = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<FieldDescriptor>(value.clone()) {
                Ok(field) => fields.push(field),
                Err(e) => errors.push(format!("invalid extra field: {}", e)),
            }
        }
        errors.extend(Self::validate_set(&fields));
        if errors.is_empty() {
            Ok(fields)
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_field(name: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            field_type: FieldType::Text,
            required: false,
            required_on_authentication: false,
            min: None,
            max: None,
            unique: false,
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let fields = vec![text_field("surname"), text_field("surname")];
        let errors = FieldDescriptor::validate_set(&fields);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("surname"));
    }

    #[test]
    fn test_reserved_name_rejected() {
        let fields = vec![text_field("email")];
        let errors = FieldDescriptor::validate_set(&fields);
        assert!(errors.iter().any(|e| e.contains("reserved")));
    }

    #[test]
    fn test_max_field_count() {
        let fields: Vec<_> = (0..MAX_EXTRA_FIELDS + 1)
            .map(|i| text_field(&format!("f{}", i)))
            .collect();
        let errors = FieldDescriptor::validate_set(&fields);
        assert!(errors.iter().any(|e| e.contains("maximum number")));
    }

    #[test]
    fn test_all_violations_collected() {
        let mut bad = text_field("name");
        bad.min = Some(10);
        bad.max = Some(2);
        let fields = vec![bad, text_field("email")];
        let errors = FieldDescriptor::validate_set(&fields);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_parse_rejects_unknown_keys() {
        let raw = vec![json!({"name": "age", "type": "int", "boo": true})];
        let errors = FieldDescriptor::parse_list(&raw).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("invalid extra field"));
    }

    #[test]
    fn test_parse_ok() {
        let raw = vec![
            json!({"name": "age", "type": "int", "min": 18, "max": 120, "required": true}),
            json!({"name": "surname", "type": "text", "max": 50}),
        ];
        let fields = FieldDescriptor::parse_list(&raw).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field_type, FieldType::Int);
        assert!(fields[0].required);
    }
}
