use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::warn;

const CLAUSE_SCHEMA: &str = "#/$defs/clause";

pub static MANIFEST_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["examples"],
        "properties": {
            "harness-version": { "type": ["string", "number"] },
            "name": { "type": "string", "minLength": 1 },
            "examples": {
                "type": "array",
                "items": { "$ref": "#/$defs/example" }
            }
        },
        "$defs": {
            "example": {
                "type": "object",
                "required": ["id", "cwe", "intent", "source", "build", "oracle"],
                "properties": {
                    "id": { "type": "string", "minLength": 1 },
                    "cwe": { "type": "string", "minLength": 1 },
                    "intent": {
                        "type": "string",
                        "enum": ["intended-vulnerable", "intended-mitigated", "illustrative"]
                    },
                    "source": { "type": "string" },
                    "tags": { "type": "array", "items": { "type": "string", "minLength": 1 } },
                    "build": {
                        "oneOf": [
                            { "type": "string" },
                            {
                                "type": "object",
                                "required": ["command"],
                                "properties": {
                                    "command": { "type": "string" },
                                    "inputs": { "type": "array", "items": { "type": "string" } },
                                    "artifact": { "type": "string" }
                                }
                            }
                        ]
                    },
                    "run": {
                        "oneOf": [
                            { "type": "string" },
                            { "type": "array", "items": { "type": "string" }, "minItems": 1 }
                        ]
                    },
                    "stdin": { "type": "string" },
                    "env": { "type": "object", "additionalProperties": { "type": "string" } },
                    "timeout": { "type": "integer", "minimum": 1 },
                    "oracle": {
                        "anyOf": [
                            { "$ref": CLAUSE_SCHEMA },
                            {
                                "type": "object",
                                "minProperties": 1,
                                "maxProperties": 1,
                                "properties": {
                                    "any-of": { "type": "array", "minItems": 1, "items": { "$ref": CLAUSE_SCHEMA } },
                                    "all-of": { "type": "array", "minItems": 1, "items": { "$ref": CLAUSE_SCHEMA } }
                                }
                            }
                        ]
                    }
                }
            },
            "clause": {
                "oneOf": [
                    { "type": "string", "minLength": 1 },
                    { "type": "object", "minProperties": 1, "maxProperties": 1 }
                ]
            }
        }
    })
});

/// Check the raw document against the manifest schema.
///
/// Advisory only: violations are logged and returned, the typed validation
/// pass decides what is an error.
pub fn schema_warnings(yaml: &serde_yaml::Value) -> Vec<String> {
    let json_value = match serde_json::to_value(yaml) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Manifest is not representable as JSON, skipping schema check");
            return Vec::new();
        }
    };

    let compiled = match jsonschema::JSONSchema::compile(&MANIFEST_SCHEMA) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Manifest schema failed to compile");
            return Vec::new();
        }
    };

    let messages: Vec<String> = match compiled.validate(&json_value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect(),
    };
    for msg in &messages {
        warn!(validation_error = %msg, "Manifest schema warning");
    }
    messages
}
