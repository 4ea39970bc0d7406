//! Stable content hashing over tool definitions
//!
//! The hash is computed over a canonical serialization (recursively
//! key-sorted, compact JSON) so that key order in the upstream payload never
//! affects the digest.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Render a value as compact JSON with object keys in sorted order at every
/// nesting level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Keys serialize through serde_json for correct escaping
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

/// Content hash over a tool's identity-relevant fields
pub fn content_hash(name: &str, description: Option<&str>, schema: &Value) -> String {
    let identity = serde_json::json!({
        "name": name,
        "description": description,
        "schema": schema,
    });

    let mut hasher = Sha256::new();
    hasher.update(canonical_json(&identity).as_bytes());
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_affect_hash() {
        let a = json!({"type": "object", "properties": {"b": 1, "a": 2}});
        let b: Value =
            serde_json::from_str(r#"{"properties": {"a": 2, "b": 1}, "type": "object"}"#).unwrap();

        assert_eq!(
            content_hash("status", Some("Show status"), &a),
            content_hash("status", Some("Show status"), &b)
        );
    }

    #[test]
    fn test_content_changes_change_hash() {
        let schema = json!({"type": "object"});
        let base = content_hash("status", Some("Show status"), &schema);

        assert_ne!(base, content_hash("status", Some("Other text"), &schema));
        assert_ne!(base, content_hash("log", Some("Show status"), &schema));
        assert_ne!(
            base,
            content_hash("status", Some("Show status"), &json!({"type": "string"}))
        );
        // Missing and empty description are distinct identities
        assert_ne!(base, content_hash("status", None, &schema));
    }

    #[test]
    fn test_canonical_json_sorts_nested_objects() {
        let value = json!({"z": {"b": 1, "a": [{"y": 1, "x": 2}]}, "a": null});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":null,"z":{"a":[{"x":2,"y":1}],"b":1}}"#
        );
    }
}
