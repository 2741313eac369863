use serde::Deserialize;

/// Raw YAML representation of the server config file. Every field is
/// optional here — `load` fills in defaults and validates the fields
/// that have none.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub bind_addr: Option<String>,
    pub database_url: Option<String>,
    pub auth_token: Option<String>,
    pub public_base_url: Option<String>,
    pub render_root: Option<String>,
    pub max_blob_bytes: Option<usize>,
}
