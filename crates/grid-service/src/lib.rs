pub mod error;
pub mod service;
pub mod types;

pub use error::ServiceError;
pub use service::DependencyService;
pub use types::{AddDependencyOutcome, DependencyGraph, ProducerRef};
