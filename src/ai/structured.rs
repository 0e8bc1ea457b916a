use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(?:json|JSON)?").expect("valid regex"));

/// Shape every generated card list must have before it is cleaned up.
/// Fields stay optional: a card missing one is kept with a placeholder.
pub static FLASHCARD_LIST_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "question": { "type": ["string", "null"] },
                "answer": { "type": ["string", "null"] }
            }
        }
    })
});

#[derive(Debug, Clone)]
pub struct StructuredOutputValidationResult {
    pub value: Option<Value>,
    pub error: Option<String>,
    pub errors: Vec<String>,
}

impl StructuredOutputValidationResult {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Model output with any markdown code fences removed.
pub fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").trim().to_string()
}

pub fn resolve_structured_output(raw: &str) -> Option<Value> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return None;
    }
    serde_json::from_str(&cleaned).ok()
}

/// A bare array, or the array under a `flashcards` key. Anything else reads
/// as no cards at all.
pub fn card_list(value: Value) -> Value {
    match value {
        Value::Array(_) => value,
        Value::Object(mut map) => map.remove("flashcards").unwrap_or_else(|| Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    }
}

pub fn validate_structured_output(value: Option<Value>, schema: &Value) -> StructuredOutputValidationResult {
    let Some(value) = value else {
        return StructuredOutputValidationResult {
            value: None,
            error: Some("Structured output is missing or invalid JSON.".to_string()),
            errors: vec![],
        };
    };

    let compiled = match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled,
        Err(error) => {
            return StructuredOutputValidationResult {
                value: Some(value),
                error: Some(format!("Failed to compile structured output schema: {}", error)),
                errors: vec![],
            }
        }
    };

    let errors: Vec<String> = compiled
        .validate(&value)
        .err()
        .map(|errors| {
            errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{}: {}", path, error)
                    }
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let error = (!errors.is_empty()).then(|| "Structured output did not match schema.".to_string());
    StructuredOutputValidationResult {
        value: Some(value),
        error,
        errors,
    }
}
