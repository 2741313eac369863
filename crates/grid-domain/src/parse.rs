use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::error::DomainError;
use crate::types::{ParsedOutput, ParsedState, Value};

/// On-wire shape of a Terraform-style state file: only the fields the
/// engine needs to read are modeled. Everything else in the blob (resources,
/// modules, ...) passes through unexamined as far as parsing is concerned —
/// the raw bytes are what gets stored, this struct is only used to extract
/// `serial` and `outputs`.
#[derive(Debug, Deserialize)]
struct RawState {
    serial: i64,
    #[serde(default)]
    outputs: HashMap<String, RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    value: serde_json::Value,
    #[serde(default)]
    sensitive: bool,
}

/// Parse a state blob (C1). Fails with `MalformedState` when the blob isn't
/// valid JSON or is missing the numeric `serial` field.
pub fn parse_state(blob: &[u8]) -> Result<ParsedState, DomainError> {
    let raw: RawState = serde_json::from_slice(blob)
        .map_err(|e| DomainError::MalformedState(e.to_string()))?;

    let outputs = raw
        .outputs
        .into_iter()
        .map(|(key, out)| {
            let value = json_to_value(out.value);
            (
                key,
                ParsedOutput {
                    value,
                    sensitive: out.sensitive,
                },
            )
        })
        .collect();

    Ok(ParsedState {
        serial: raw.serial,
        outputs,
    })
}

fn json_to_value(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n),
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(arr) => Value::List(arr.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(obj) => {
            let map: BTreeMap<String, Value> = obj
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect();
            Value::Map(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serial_and_outputs() {
        let blob = br#"{"serial": 3, "outputs": {"vpc_id": {"value": "vpc-1", "sensitive": false}}}"#;
        let parsed = parse_state(blob).unwrap();
        assert_eq!(parsed.serial, 3);
        assert_eq!(parsed.outputs.len(), 1);
        assert_eq!(parsed.outputs["vpc_id"].value, Value::String("vpc-1".into()));
        assert!(!parsed.outputs["vpc_id"].sensitive);
    }

    #[test]
    fn empty_outputs_map_parses_to_empty_map() {
        let blob = br#"{"serial": 1, "outputs": {}}"#;
        let parsed = parse_state(blob).unwrap();
        assert!(parsed.outputs.is_empty());
    }

    #[test]
    fn missing_outputs_field_defaults_empty() {
        let blob = br#"{"serial": 1}"#;
        let parsed = parse_state(blob).unwrap();
        assert!(parsed.outputs.is_empty());
    }

    #[test]
    fn missing_serial_is_malformed() {
        let blob = br#"{"outputs": {}}"#;
        assert!(matches!(parse_state(blob), Err(DomainError::MalformedState(_))));
    }

    #[test]
    fn non_json_blob_is_malformed() {
        let blob = b"not json at all";
        assert!(matches!(parse_state(blob), Err(DomainError::MalformedState(_))));
    }

    #[test]
    fn sensitive_flag_preserved() {
        let blob = br#"{"serial": 1, "outputs": {"secret": {"value": "x", "sensitive": true}}}"#;
        let parsed = parse_state(blob).unwrap();
        assert!(parsed.outputs["secret"].sensitive);
    }
}
