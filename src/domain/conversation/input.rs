//! Canonical user input and the one adapter that builds it from raw payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::ValidationError;

/// Maximum accepted length of a single user message.
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

/// What the user sent in one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserInput {
    /// Free text, run through extraction (or read as a reply to a pending question).
    Message { text: String },
    /// A literal value for a named field.
    Statement { field: String, value: String },
    /// A reply to the clarifying question about `field`.
    Answer { field: String, value: String },
    /// Request to hand the collected fields to report rendering.
    Export,
}

impl UserInput {
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message { text: text.into() }
    }

    pub fn statement(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Statement {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn answer(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Answer {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Builds input from a JSON payload: a bare string, a tagged object,
    /// or an object with a `message` key.
    pub fn from_payload(payload: &Value) -> Result<Self, ValidationError> {
        let input = match payload {
            Value::String(text) => Self::message(text.clone()),
            Value::Object(map) if map.contains_key("type") => {
                serde_json::from_value(payload.clone())
                    .map_err(|e| ValidationError::invalid_format("input", e.to_string()))?
            }
            Value::Object(map) => match map.get("message") {
                Some(Value::String(text)) => Self::message(text.clone()),
                _ => {
                    return Err(ValidationError::invalid_format(
                        "input",
                        "expected a string, a tagged object, or an object with 'message'",
                    ))
                }
            },
            _ => {
                return Err(ValidationError::invalid_format(
                    "input",
                    "expected a string or an object",
                ))
            }
        };
        input.validate()?;
        Ok(input)
    }

    /// Builds input from raw text; JSON objects are decoded, anything else is a message.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value @ Value::Object(_)) => Self::from_payload(&value),
            _ => {
                let input = Self::message(raw);
                input.validate()?;
                Ok(input)
            }
        }
    }

    /// Rejects empty text, empty field names and oversized messages.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Message { text } => check_text("text", text),
            Self::Statement { field, value } | Self::Answer { field, value } => {
                if field.trim().is_empty() {
                    return Err(ValidationError::empty_field("field"));
                }
                check_text("value", value)
            }
            Self::Export => Ok(()),
        }
    }
}

fn check_text(name: &str, text: &str) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::empty_field(name));
    }
    if text.len() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::invalid_format(
            name,
            format!("must be at most {} characters", MAX_MESSAGE_LENGTH),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_string_is_a_message() {
        let input = UserInput::from_payload(&json!("I'm flying to Austin")).unwrap();
        assert_eq!(input, UserInput::message("I'm flying to Austin"));
    }

    #[test]
    fn tagged_object_decodes() {
        let input = UserInput::from_payload(&json!({
            "type": "statement",
            "field": "origin_city",
            "value": "Denver"
        }))
        .unwrap();
        assert_eq!(input, UserInput::statement("origin_city", "Denver"));

        let export = UserInput::from_payload(&json!({ "type": "export" })).unwrap();
        assert_eq!(export, UserInput::Export);
    }

    #[test]
    fn message_object_is_a_message() {
        let input = UserInput::from_payload(&json!({ "message": "hello" })).unwrap();
        assert_eq!(input, UserInput::message("hello"));
    }

    #[test]
    fn unknown_shapes_are_rejected() {
        assert!(UserInput::from_payload(&json!(42)).is_err());
        assert!(UserInput::from_payload(&json!({ "text": "hi" })).is_err());
        assert!(UserInput::from_payload(&json!({ "type": "dance" })).is_err());
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(UserInput::from_payload(&json!("   ")).is_err());
        assert!(UserInput::statement("", "Denver").validate().is_err());
    }

    #[test]
    fn parse_treats_plain_text_as_message() {
        assert_eq!(
            UserInput::parse("Leaving from Denver").unwrap(),
            UserInput::message("Leaving from Denver")
        );
        assert_eq!(
            UserInput::parse(r#"{"type":"answer","field":"origin_city","value":"yes"}"#).unwrap(),
            UserInput::answer("origin_city", "yes")
        );
    }
}
