use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawConfig;
use crate::ServerConfig;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_BLOB_BYTES: usize = 5 * 1024 * 1024;

/// Load the server config from an optional YAML file, then apply
/// environment overrides (`GRID_BIND_ADDR`, `GRID_DATABASE_URL`,
/// `GRID_AUTH_TOKEN`, `GRID_PUBLIC_BASE_URL`, `GRID_RENDER_ROOT`,
/// `GRID_MAX_BLOB_BYTES`).
///
/// `database_url` and `auth_token` are the only fields without a
/// default — missing either after the file and env are merged is an
/// error.
pub fn load(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut raw = match path {
        Some(p) => {
            debug!(path = %p.display(), "loading server config");
            let content = std::fs::read_to_string(p).map_err(|e| ConfigError::Io {
                path: p.display().to_string(),
                source: e,
            })?;
            serde_yaml::from_str::<RawConfig>(&content).map_err(|e| ConfigError::YamlParse {
                path: p.display().to_string(),
                source: e,
            })?
        }
        None => RawConfig::default(),
    };

    apply_env_overrides(&mut raw)?;

    let database_url = raw
        .database_url
        .ok_or(ConfigError::MissingField("database_url"))?;
    let auth_token = raw.auth_token.ok_or(ConfigError::MissingField("auth_token"))?;

    let bind_addr = raw.bind_addr.unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let public_base_url = raw
        .public_base_url
        .unwrap_or_else(|| format!("http://{bind_addr}"));

    Ok(ServerConfig {
        bind_addr,
        database_url,
        auth_token,
        public_base_url,
        render_root: raw.render_root.map(PathBuf::from),
        max_blob_bytes: raw.max_blob_bytes.unwrap_or(DEFAULT_MAX_BLOB_BYTES),
    })
}

fn apply_env_overrides(raw: &mut RawConfig) -> Result<(), ConfigError> {
    if let Ok(v) = std::env::var("GRID_BIND_ADDR") {
        raw.bind_addr = Some(v);
    }
    if let Ok(v) = std::env::var("GRID_DATABASE_URL") {
        raw.database_url = Some(v);
    }
    if let Ok(v) = std::env::var("GRID_AUTH_TOKEN") {
        raw.auth_token = Some(v);
    }
    if let Ok(v) = std::env::var("GRID_PUBLIC_BASE_URL") {
        raw.public_base_url = Some(v);
    }
    if let Ok(v) = std::env::var("GRID_RENDER_ROOT") {
        raw.render_root = Some(v);
    }
    if let Ok(v) = std::env::var("GRID_MAX_BLOB_BYTES") {
        let parsed: usize = v.parse().map_err(|_| ConfigError::Conversion {
            path: "GRID_MAX_BLOB_BYTES".to_string(),
            message: format!("not a valid integer: {v}"),
        })?;
        raw.max_blob_bytes = Some(parsed);
    }
    Ok(())
}
