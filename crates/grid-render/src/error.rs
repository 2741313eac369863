use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
