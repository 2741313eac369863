mod loader;
mod raw;
pub mod error;

use std::path::PathBuf;

pub use error::ConfigError;
pub use loader::load;

/// Fully resolved server configuration: bind address, datastore,
/// transport auth, and the optional C9 render root.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub auth_token: String,
    /// Externally-reachable base URL (e.g. `https://grid.example.com`) used
    /// to build the `tfstate` backend addresses the renderer writes into
    /// `terraform { backend "http" {} }` blocks. Defaults to
    /// `http://{bind_addr}`, which is only correct for local/loopback use.
    pub public_base_url: String,
    /// Directory the render endpoint is allowed to write into. `None`
    /// disables `POST /states/:guid/render` entirely (§4.9's guard
    /// against becoming an arbitrary-file-write primitive).
    pub render_root: Option<PathBuf>,
    pub max_blob_bytes: usize,
}
