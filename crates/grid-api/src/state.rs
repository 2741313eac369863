use std::path::PathBuf;
use std::sync::Arc;

use grid_render::RenderConfig;
use grid_service::DependencyService;
use grid_store::{EdgeStore, StateStore};
use grid_worker::EdgeWorker;

/// Shared handler state: the two store traits, the dependency service and
/// worker built on top of them, and the transport-level concerns (auth,
/// the render guard, the blob size ceiling) that only `grid-api` cares
/// about.
#[derive(Clone)]
pub struct AppState {
    pub states: Arc<dyn StateStore>,
    pub edges: Arc<dyn EdgeStore>,
    pub service: Arc<DependencyService>,
    pub worker: Arc<EdgeWorker>,
    pub auth_token: Arc<String>,
    /// Directory the render endpoint may write into. `None` disables
    /// `POST /states/:ref/render` (§4.9's guard against the render
    /// endpoint becoming an arbitrary-file-write primitive).
    pub render_root: Option<Arc<PathBuf>>,
    pub render_config: RenderConfig,
    pub max_blob_bytes: usize,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        states: Arc<dyn StateStore>,
        edges: Arc<dyn EdgeStore>,
        service: Arc<DependencyService>,
        worker: Arc<EdgeWorker>,
        auth_token: impl Into<String>,
        render_root: Option<PathBuf>,
        render_config: RenderConfig,
        max_blob_bytes: usize,
    ) -> Self {
        Self {
            states,
            edges,
            service,
            worker,
            auth_token: Arc::new(auth_token.into()),
            render_root: render_root.map(Arc::new),
            render_config,
            max_blob_bytes,
        }
    }
}
