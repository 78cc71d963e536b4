//! JSON Schema sanitization for tool declarations sent to the Google API.
//!
//! Ported near-verbatim from `providers/gemini/convert/schema.rs`: Google's
//! function-declaration schemas accept a narrow subset of JSON Schema
//! (uppercase `type`, no `$ref`/composition/numeric-range keywords), and
//! object schemas with no usable properties need a placeholder so the
//! model has something to call the tool with.

use serde_json::{Map, Value};

const ALLOWED_KEYWORDS: &[&str] = &["type", "description", "properties", "required", "items", "enum"];

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "default",
    "$schema",
    "$defs",
    "definitions",
    "$ref",
    "$id",
    "$comment",
    "title",
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minItems",
    "maxItems",
    "uniqueItems",
    "examples",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "dependentSchemas",
    "dependentRequired",
    "propertyNames",
    "unevaluatedItems",
    "unevaluatedProperties",
    "contentMediaType",
    "contentEncoding",
    "deprecated",
    "readOnly",
    "writeOnly",
];

/// Sanitize a JSON Schema for Google API compatibility. Null or non-object
/// input yields a placeholder single-`reason`-field schema.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(obj) => sanitize_object(obj),
        _ => create_placeholder_schema(),
    }
}

fn sanitize_object(obj: &Map<String, Value>) -> Value {
    if obj.is_empty() {
        return create_placeholder_schema();
    }

    let mut result = Map::new();

    for (key, value) in obj {
        if key == "const" {
            result.insert("enum".to_string(), Value::Array(vec![value.clone()]));
            continue;
        }

        if UNSUPPORTED_KEYWORDS.contains(&key.as_str()) || !ALLOWED_KEYWORDS.contains(&key.as_str()) {
            continue;
        }

        match key.as_str() {
            "type" => {
                result.insert("type".to_string(), Value::String(convert_type_to_google(value)));
            }
            "properties" => {
                if let Value::Object(props) = value {
                    result.insert("properties".to_string(), Value::Object(sanitize_properties(props)));
                }
            }
            "items" => {
                result.insert("items".to_string(), sanitize_items(value));
            }
            "required" => {
                result.insert("required".to_string(), value.clone());
            }
            "enum" | "description" => {
                result.insert(key.clone(), value.clone());
            }
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    if !result.contains_key("type") {
        result.insert("type".to_string(), Value::String("OBJECT".to_string()));
    }

    let is_object = result
        .get("type")
        .and_then(|v| v.as_str())
        .map(|s| s.eq_ignore_ascii_case("object"))
        .unwrap_or(false);

    if is_object {
        let has_properties = result
            .get("properties")
            .and_then(|v| v.as_object())
            .map(|p| !p.is_empty())
            .unwrap_or(false);

        if !has_properties {
            result.insert("properties".to_string(), create_reason_property());
            result.insert("required".to_string(), Value::Array(vec![Value::String("reason".to_string())]));
        }
    }

    if let (Some(Value::Array(required)), Some(Value::Object(props))) =
        (result.get("required"), result.get("properties"))
    {
        let valid_required: Vec<Value> = required
            .iter()
            .filter(|r| r.as_str().map(|name| props.contains_key(name)).unwrap_or(false))
            .cloned()
            .collect();

        if valid_required.is_empty() {
            result.remove("required");
        } else if valid_required.len() != required.len() {
            result.insert("required".to_string(), Value::Array(valid_required));
        }
    }

    Value::Object(result)
}

fn sanitize_properties(props: &Map<String, Value>) -> Map<String, Value> {
    props.iter().map(|(k, v)| (k.clone(), sanitize_schema(v))).collect()
}

fn sanitize_items(items: &Value) -> Value {
    match items {
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_schema).collect()),
        _ => sanitize_schema(items),
    }
}

fn convert_type_to_google(type_value: &Value) -> String {
    match type_value {
        Value::String(s) => type_string_to_google(s),
        Value::Array(arr) => arr
            .iter()
            .find_map(|item| match item {
                Value::String(s) if s != "null" => Some(type_string_to_google(s)),
                _ => None,
            })
            .unwrap_or_else(|| "STRING".to_string()),
        _ => "OBJECT".to_string(),
    }
}

fn type_string_to_google(type_str: &str) -> String {
    match type_str.to_lowercase().as_str() {
        "string" => "STRING".to_string(),
        "number" => "NUMBER".to_string(),
        "integer" => "INTEGER".to_string(),
        "boolean" => "BOOLEAN".to_string(),
        "array" => "ARRAY".to_string(),
        "object" => "OBJECT".to_string(),
        "null" => "STRING".to_string(),
        _ => type_str.to_uppercase(),
    }
}

fn create_placeholder_schema() -> Value {
    let mut schema = Map::new();
    schema.insert("type".to_string(), Value::String("OBJECT".to_string()));
    schema.insert("properties".to_string(), create_reason_property());
    schema.insert("required".to_string(), Value::Array(vec![Value::String("reason".to_string())]));
    Value::Object(schema)
}

fn create_reason_property() -> Value {
    let mut reason = Map::new();
    reason.insert("type".to_string(), Value::String("STRING".to_string()));
    reason.insert("description".to_string(), Value::String("Reason for calling this tool".to_string()));
    let mut props = Map::new();
    props.insert("reason".to_string(), Value::Object(reason));
    Value::Object(props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_schema_sanitization() {
        let schema = json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]});
        let result = sanitize_schema(&schema);
        assert_eq!(result["type"], "OBJECT");
        assert_eq!(result["properties"]["name"]["type"], "STRING");
    }

    #[test]
    fn test_removes_refs_and_composition() {
        let schema = json!({"$ref": "#/$defs/Name", "allOf": [{"type": "object"}]});
        let result = sanitize_schema(&schema);
        assert!(result.get("$ref").is_none());
        assert!(result.get("allOf").is_none());
    }

    #[test]
    fn test_converts_const_to_enum() {
        let schema = json!({"type": "string", "const": "fixed"});
        let result = sanitize_schema(&schema);
        assert_eq!(result["enum"], json!(["fixed"]));
    }

    #[test]
    fn test_empty_and_null_schema_get_placeholder() {
        assert_eq!(sanitize_schema(&json!({}))["properties"]["reason"]["type"], "STRING");
        assert_eq!(sanitize_schema(&Value::Null)["type"], "OBJECT");
    }

    #[test]
    fn test_object_without_properties_gets_placeholder() {
        let result = sanitize_schema(&json!({"type": "object"}));
        assert!(result["properties"]["reason"].is_object());
    }

    #[test]
    fn test_validates_required_against_properties() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name", "nonexistent"]
        });
        let result = sanitize_schema(&schema);
        assert_eq!(result["required"], json!(["name"]));
    }

    #[test]
    fn test_type_array_with_null_uses_first_non_null() {
        let result = sanitize_schema(&json!({"type": ["string", "null"]}));
        assert_eq!(result["type"], "STRING");
    }

    #[test]
    fn test_nested_properties_and_array_items_sanitized() {
        let schema = json!({
            "type": "array",
            "items": {"type": "object", "additionalProperties": false, "properties": {"id": {"type": "integer"}}}
        });
        let result = sanitize_schema(&schema);
        assert_eq!(result["items"]["properties"]["id"]["type"], "INTEGER");
        assert!(result["items"].get("additionalProperties").is_none());
    }

    #[test]
    fn test_real_world_anthropic_tool_schema() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "command": {"type": "string", "description": "shell command"},
                "timeout": {"type": ["integer", "null"], "minimum": 1, "maximum": 300, "default": 30}
            },
            "required": ["command"]
        });
        let result = sanitize_schema(&schema);
        assert_eq!(result["properties"]["command"]["type"], "STRING");
        assert_eq!(result["properties"]["timeout"]["type"], "INTEGER");
        assert!(result["properties"]["timeout"].get("minimum").is_none());
        assert_eq!(result["required"], json!(["command"]));
    }
}
