use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("state not found: {0}")]
    StateNotFound(String),
    #[error(transparent)]
    Store(#[from] grid_store::StoreError),
    #[error(transparent)]
    Graph(#[from] grid_graph::GraphError),
    #[error(transparent)]
    Worker(#[from] grid_worker::WorkerError),
}
