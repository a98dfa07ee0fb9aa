//! JSON-Schema value generation for tool arguments.
//!
//! Two modes: [`generate_args`] is fully deterministic (same schema,
//! same object, every time); [`generate_random_args`] draws every leaf
//! through the seeded PRNG so runs reproduce under a fixed seed.

use serde_json::{Map, Value};

use crate::rng::Mulberry32;

/// Word pool for random strings.
const NOUNS: &[&str] = &["report", "query", "widget", "session", "record"];
const VERBS: &[&str] = &["fetch", "build", "merge", "inspect", "update"];
const ADJECTIVES: &[&str] = &["quick", "stale", "primary", "hidden", "final"];
const PHRASES: &[&str] = &["status check", "load test", "smoke pass", "dry run"];

const ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deterministic mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate arguments for a tool-input schema, deterministically.
///
/// Only required properties are populated; calling twice yields the
/// identical object.
pub fn generate_args(schema: &Value) -> Value {
    let mut out = Map::new();
    let Some(obj) = schema.as_object() else {
        return Value::Object(out);
    };
    let properties = obj.get("properties").and_then(Value::as_object);
    let required: Vec<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if let Some(props) = properties {
        for name in required {
            if let Some(prop) = props.get(name) {
                out.insert(name.to_string(), deterministic_value(prop));
            }
        }
    }
    Value::Object(out)
}

fn deterministic_value(prop: &Value) -> Value {
    if let Some(first) = prop.get("enum").and_then(Value::as_array).and_then(|a| a.first()) {
        return first.clone();
    }
    match prop.get("type").and_then(Value::as_str).unwrap_or("string") {
        "string" => Value::String(deterministic_string(prop)),
        "integer" => Value::from(deterministic_number(prop) as i64),
        "number" => Value::from(deterministic_number(prop)),
        "boolean" => Value::Bool(true),
        "array" => {
            let item = prop
                .get("items")
                .map(deterministic_value)
                .unwrap_or_else(|| Value::String("test".into()));
            Value::Array(vec![item])
        }
        "object" => generate_args(prop),
        _ => Value::String("test".into()),
    }
}

fn deterministic_string(prop: &Value) -> String {
    let format = prop.get("format").and_then(Value::as_str).unwrap_or("");
    let base = match format {
        "uri" | "url" => "https://example.com",
        "email" => "test@example.com",
        "date" => "2025-01-01",
        "date-time" => "2025-01-01T00:00:00Z",
        _ => "test",
    };
    pad_to_min_length(base.to_string(), prop)
}

/// Midpoint of `(minimum, minimum + 100)` rounded down, capped by
/// `maximum` when present.
fn deterministic_number(prop: &Value) -> f64 {
    let min = prop.get("minimum").and_then(Value::as_f64).unwrap_or(0.0);
    let max = prop
        .get("maximum")
        .and_then(Value::as_f64)
        .unwrap_or(min + 100.0);
    ((min + (min + 100.0)) / 2.0).floor().min(max)
}

fn pad_to_min_length(mut s: String, prop: &Value) -> String {
    if let Some(min_len) = prop.get("minLength").and_then(Value::as_u64) {
        while (s.len() as u64) < min_len {
            s.push('x');
        }
    }
    s
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Random mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate arguments with every leaf drawn through the PRNG.
///
/// Same shape rules as [`generate_args`]: required properties only.
pub fn generate_random_args(schema: &Value, rng: &mut Mulberry32) -> Value {
    let mut out = Map::new();
    let Some(obj) = schema.as_object() else {
        return Value::Object(out);
    };
    let properties = obj.get("properties").and_then(Value::as_object);
    let required: Vec<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if let Some(props) = properties {
        for name in required {
            if let Some(prop) = props.get(name) {
                out.insert(name.to_string(), random_value(name, prop, rng));
            }
        }
    }
    Value::Object(out)
}

fn random_value(name: &str, prop: &Value, rng: &mut Mulberry32) -> Value {
    if let Some(options) = prop.get("enum").and_then(Value::as_array) {
        if !options.is_empty() {
            return rng.pick(options).clone();
        }
    }
    match prop.get("type").and_then(Value::as_str).unwrap_or("string") {
        "string" => Value::String(random_string(name, prop, rng)),
        "integer" => {
            let min = prop.get("minimum").and_then(Value::as_i64).unwrap_or(0);
            let max = prop.get("maximum").and_then(Value::as_i64).unwrap_or(100);
            Value::from(rng.next_range(min, max))
        }
        "number" => {
            let min = prop.get("minimum").and_then(Value::as_f64).unwrap_or(0.0);
            let max = prop.get("maximum").and_then(Value::as_f64).unwrap_or(100.0);
            Value::from(min + rng.next_f01() * (max - min))
        }
        "boolean" => Value::Bool(rng.coin()),
        "array" => {
            let len = rng.next_range(1, 3) as usize;
            let items: Vec<Value> = (0..len)
                .map(|_| {
                    prop.get("items")
                        .map(|item| random_value(name, item, rng))
                        .unwrap_or_else(|| Value::String("test".into()))
                })
                .collect();
            Value::Array(items)
        }
        "object" => generate_random_args(prop, rng),
        _ => Value::String("test".into()),
    }
}

fn random_string(name: &str, prop: &Value, rng: &mut Mulberry32) -> String {
    let format = prop.get("format").and_then(Value::as_str).unwrap_or("");
    if !format.is_empty() {
        // Format-constrained strings keep their deterministic defaults;
        // random noise would just be rejected by the server.
        return deterministic_string(prop);
    }
    // Field names that look like identifiers get id-shaped values.
    let lowered = name.to_ascii_lowercase();
    if lowered == "id" || lowered.ends_with("_id") || lowered.ends_with("id") {
        return random_id(rng);
    }

    let words = rng.next_range(1, 4) as usize;
    let mut parts: Vec<&str> = Vec::with_capacity(words);
    for _ in 0..words {
        let pool = match rng.next_range(0, 3) {
            0 => NOUNS,
            1 => VERBS,
            2 => ADJECTIVES,
            _ => PHRASES,
        };
        parts.push(*rng.pick(pool));
    }
    pad_to_min_length(parts.join(" "), prop)
}

/// 8 to 23 lowercase-alphanumeric characters.
fn random_id(rng: &mut Mulberry32) -> String {
    let len = rng.next_range(8, 23) as usize;
    (0..len)
        .map(|_| *rng.pick(ID_CHARS) as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(props: Value, required: &[&str]) -> Value {
        json!({ "type": "object", "properties": props, "required": required })
    }

    #[test]
    fn deterministic_is_idempotent() {
        let s = schema(
            json!({
                "name": { "type": "string" },
                "count": { "type": "integer", "minimum": 10 },
                "deep": {
                    "type": "object",
                    "properties": { "flag": { "type": "boolean" } },
                    "required": ["flag"]
                }
            }),
            &["name", "count", "deep"],
        );
        let a = generate_args(&s);
        let b = generate_args(&s);
        assert_eq!(a, b);
        assert_eq!(a["name"], "test");
        assert_eq!(a["deep"]["flag"], true);
    }

    #[test]
    fn integer_midpoint_rule() {
        let s = schema(json!({ "n": { "type": "integer", "minimum": 10 } }), &["n"]);
        // midpoint of (10, 110) floored = 60
        assert_eq!(generate_args(&s)["n"], 60);
        let s0 = schema(json!({ "n": { "type": "integer" } }), &["n"]);
        assert_eq!(generate_args(&s0)["n"], 50);
    }

    #[test]
    fn format_aware_strings() {
        let s = schema(
            json!({
                "site": { "type": "string", "format": "uri" },
                "mail": { "type": "string", "format": "email" },
                "day": { "type": "string", "format": "date" },
                "at": { "type": "string", "format": "date-time" }
            }),
            &["site", "mail", "day", "at"],
        );
        let args = generate_args(&s);
        assert_eq!(args["site"], "https://example.com");
        assert_eq!(args["mail"], "test@example.com");
        assert_eq!(args["day"], "2025-01-01");
        assert_eq!(args["at"], "2025-01-01T00:00:00Z");
    }

    #[test]
    fn min_length_pads_with_x() {
        let s = schema(
            json!({ "s": { "type": "string", "minLength": 8 } }),
            &["s"],
        );
        assert_eq!(generate_args(&s)["s"], "testxxxx");
    }

    #[test]
    fn enum_takes_first_element() {
        let s = schema(json!({ "lang": { "enum": ["fr", "en", "de"] } }), &["lang"]);
        assert_eq!(generate_args(&s)["lang"], "fr");
    }

    #[test]
    fn arrays_are_singletons() {
        let s = schema(
            json!({ "xs": { "type": "array", "items": { "type": "integer" } } }),
            &["xs"],
        );
        assert_eq!(generate_args(&s)["xs"], json!([50]));
    }

    #[test]
    fn non_required_properties_are_omitted() {
        let s = schema(
            json!({ "a": { "type": "string" }, "b": { "type": "string" } }),
            &["a"],
        );
        let args = generate_args(&s);
        assert!(args.get("b").is_none());
    }

    #[test]
    fn random_enum_varies_but_reproduces_under_seed() {
        let s = schema(
            json!({ "lang": { "type": "string", "enum": ["a", "b", "c", "d", "e", "f"] } }),
            &["lang"],
        );
        let mut rng = Mulberry32::new(42);
        let first: Vec<Value> = (0..20)
            .map(|_| generate_random_args(&s, &mut rng)["lang"].clone())
            .collect();
        let distinct: std::collections::HashSet<String> = first
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        assert!(distinct.len() >= 2, "20 draws over 6 options hit one value");

        let mut rng = Mulberry32::new(42);
        let second: Vec<Value> = (0..20)
            .map(|_| generate_random_args(&s, &mut rng)["lang"].clone())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn random_numbers_respect_bounds() {
        let s = schema(
            json!({ "n": { "type": "integer", "minimum": 5, "maximum": 9 } }),
            &["n"],
        );
        let mut rng = Mulberry32::new(11);
        for _ in 0..200 {
            let n = generate_random_args(&s, &mut rng)["n"].as_i64().unwrap();
            assert!((5..=9).contains(&n));
        }
    }

    #[test]
    fn random_ids_are_lowercase_alnum() {
        let s = schema(json!({ "user_id": { "type": "string" } }), &["user_id"]);
        let mut rng = Mulberry32::new(5);
        for _ in 0..50 {
            let id = generate_random_args(&s, &mut rng)["user_id"]
                .as_str()
                .unwrap()
                .to_string();
            assert!((8..=23).contains(&id.len()), "bad id length {}", id.len());
            assert!(id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn random_arrays_have_one_to_three_items() {
        let s = schema(
            json!({ "xs": { "type": "array", "items": { "type": "boolean" } } }),
            &["xs"],
        );
        let mut rng = Mulberry32::new(9);
        for _ in 0..100 {
            let len = generate_random_args(&s, &mut rng)["xs"]
                .as_array()
                .unwrap()
                .len();
            assert!((1..=3).contains(&len));
        }
    }
}
