use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Immutable, client-supplied primary identity of a state. Must be a UUIDv7
/// so that lexical and creation order agree, but the store never validates
/// the version byte — callers are trusted to generate it correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateGuid(pub Uuid);

impl StateGuid {
    pub fn new(id: Uuid) -> Self {
        StateGuid(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for StateGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic edge identifier, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub i64);

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Either a logic id or a guid — the shape every `*_ref` parameter in the
/// dependency service contract accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateRef {
    Guid(StateGuid),
    LogicId(String),
}

impl std::fmt::Display for StateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateRef::Guid(g) => write!(f, "{}", g),
            StateRef::LogicId(s) => write!(f, "{}", s),
        }
    }
}

// ── Labels ────────────────────────────────────────────────────────────────────

/// Scalar label value. Strings, numbers, and booleans only — no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    String(String),
    Number(f64),
    Bool(bool),
}

pub type Labels = HashMap<String, LabelValue>;

// ── Lock info ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Operation")]
    pub operation: String,
    #[serde(rename = "Who")]
    pub who: String,
    #[serde(rename = "Created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "Path")]
    pub path: String,
}

// ── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub guid: StateGuid,
    pub logic_id: String,
    pub state_content: Vec<u8>,
    pub locked: bool,
    pub lock_info: Option<LockInfo>,
    pub labels: Labels,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl State {
    pub fn new(guid: StateGuid, logic_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        State {
            guid,
            logic_id: logic_id.into(),
            state_content: Vec::new(),
            locked: false,
            lock_info: None,
            labels: Labels::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Edge ─────────────────────────────────────────────────────────────────────

/// Health of a producer->consumer wire. Ordered roughly worst-to-best for
/// display purposes; the precedence rule used by the worker (§9 of the spec)
/// is implemented separately, not by this derive order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Pending,
    Clean,
    Dirty,
    Mock,
    MissingOutput,
    SchemaInvalid,
}

impl std::fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EdgeStatus::Pending => "pending",
            EdgeStatus::Clean => "clean",
            EdgeStatus::Dirty => "dirty",
            EdgeStatus::Mock => "mock",
            EdgeStatus::MissingOutput => "missing-output",
            EdgeStatus::SchemaInvalid => "schema-invalid",
        };
        write!(f, "{}", s)
    }
}

impl EdgeStatus {
    /// Edges in any of these states make their consumer "stale" (red).
    pub fn is_red(&self) -> bool {
        matches!(
            self,
            EdgeStatus::Dirty
                | EdgeStatus::Pending
                | EdgeStatus::Mock
                | EdgeStatus::MissingOutput
                | EdgeStatus::SchemaInvalid
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from_state: StateGuid,
    pub from_output: String,
    pub to_state: StateGuid,
    pub to_input_name: String,
    pub status: EdgeStatus,
    pub in_digest: String,
    pub out_digest: String,
    pub mock_value: Option<Vec<u8>>,
    pub last_in_at: Option<DateTime<Utc>>,
    pub last_out_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Output cache ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    Manual,
    Inferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Valid,
    Invalid,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCacheEntry {
    pub state_guid: StateGuid,
    pub output_key: String,
    pub sensitive: bool,
    pub state_serial: i64,
    pub schema_json: Option<serde_json::Value>,
    pub schema_source: Option<SchemaSource>,
    pub validation_status: Option<ValidationStatus>,
    pub validation_error: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutputCacheEntry {
    /// A schema survives a write that no longer produces this output only
    /// when it was attached manually (§3 "orphan" rule).
    pub fn is_manual_orphan_candidate(&self) -> bool {
        matches!(self.schema_source, Some(SchemaSource::Manual))
    }
}

// ── Parsed output value ───────────────────────────────────────────────────────

/// Recursive JSON-ish union produced by parsing a state blob (C1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<Value>),
    Map(std::collections::BTreeMap<String, Value>),
}

/// One named output as parsed out of a producer state blob.
#[derive(Debug, Clone)]
pub struct ParsedOutput {
    pub value: Value,
    pub sensitive: bool,
}

/// Result of parsing a state blob (C1).
#[derive(Debug, Clone)]
pub struct ParsedState {
    pub serial: i64,
    pub outputs: HashMap<String, ParsedOutput>,
}

// ── Slug helper ────────────────────────────────────────────────────────────────

/// Lowercase, replace any run of non `[a-z0-9_]` characters with a single
/// underscore, and trim leading/trailing underscores. Used to default
/// `to_input_name` and to validate caller-supplied aliases.
pub fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_sep = false;
    for c in s.chars() {
        let lower = c.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '_' {
            out.push(lower);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_collapses_separators() {
        assert_eq!(slug("My Producer-Name!!"), "my_producer_name");
    }

    #[test]
    fn slug_trims_edges() {
        assert_eq!(slug("--vpc--"), "vpc");
    }

    #[test]
    fn is_valid_slug_rejects_uppercase_and_punctuation() {
        assert!(is_valid_slug("producer_vpc_id"));
        assert!(!is_valid_slug("Producer-Vpc"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn edge_status_red_set_matches_spec() {
        assert!(EdgeStatus::Dirty.is_red());
        assert!(EdgeStatus::Pending.is_red());
        assert!(EdgeStatus::Mock.is_red());
        assert!(EdgeStatus::MissingOutput.is_red());
        assert!(EdgeStatus::SchemaInvalid.is_red());
        assert!(!EdgeStatus::Clean.is_red());
    }
}
