use chrono::DateTime;
use serde_json::Value;

use crate::content::{AttributeKind, ContentType, Entry};
use crate::error::{CadenceError, Result};

/// Oracle deciding whether an entry satisfies its content type's schema.
pub trait EntityValidator: Send + Sync {
    fn validate(&self, content_type: &ContentType, entry: &Entry) -> Result<()>;

    fn is_valid(&self, content_type: &ContentType, entry: &Entry) -> bool {
        self.validate(content_type, entry).is_ok()
    }
}

/// Checks required fields, value types and string lengths declared on the
/// content type's attributes. Fields without a declared attribute are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl EntityValidator for SchemaValidator {
    fn validate(&self, content_type: &ContentType, entry: &Entry) -> Result<()> {
        for attr in &content_type.attributes {
            let value = entry.data.get(&attr.name).filter(|v| !v.is_null());
            let Some(value) = value else {
                if attr.required {
                    return Err(invalid(&attr.name, "must be defined"));
                }
                continue;
            };

            if attr.required && value.as_str().is_some_and(str::is_empty) {
                return Err(invalid(&attr.name, "must be defined"));
            }

            let type_ok = match attr.kind {
                AttributeKind::String | AttributeKind::Text => value.is_string(),
                AttributeKind::Integer => value.is_i64() || value.is_u64(),
                AttributeKind::Float => value.is_number(),
                AttributeKind::Boolean => value.is_boolean(),
                AttributeKind::Datetime => value
                    .as_str()
                    .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
                AttributeKind::Json => true,
            };
            if !type_ok {
                return Err(invalid(
                    &attr.name,
                    &format!("must be a `{}`", kind_name(attr.kind)),
                ));
            }

            if let (Some(max), Value::String(s)) = (attr.max_length, value) {
                if s.chars().count() > max {
                    return Err(invalid(
                        &attr.name,
                        &format!("must be at most {max} characters"),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> CadenceError {
    CadenceError::Validation(format!("{field} {reason}"))
}

fn kind_name(kind: AttributeKind) -> &'static str {
    match kind {
        AttributeKind::String => "string",
        AttributeKind::Text => "text",
        AttributeKind::Integer => "integer",
        AttributeKind::Float => "float",
        AttributeKind::Boolean => "boolean",
        AttributeKind::Datetime => "datetime",
        AttributeKind::Json => "json",
    }
}
