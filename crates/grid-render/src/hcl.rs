//! A small, deliberately incomplete pretty-printer: just enough HCL
//! expression syntax to inline a mock value into a `locals` block.

use serde_json::Value;

pub fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Render a JSON value as an HCL expression. Object keys are sorted so
/// the output is stable across runs regardless of map iteration order.
pub fn value_to_expr(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(value_to_expr).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let rendered: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{} = {}", k, value_to_expr(&map[k])))
                .collect();
            format!("{{ {} }}", rendered.join(", "))
        }
    }
}

/// A mock value is stored as an opaque blob. If it parses as JSON,
/// render it structurally; otherwise fall back to a quoted string of
/// its lossy UTF-8 decoding, so non-JSON mocks still render to
/// something rather than failing the whole block.
pub fn mock_expr(bytes: &[u8]) -> String {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => value_to_expr(&value),
        Err(_) => quote(&String::from_utf8_lossy(bytes)),
    }
}
