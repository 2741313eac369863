pub mod error;
pub mod registry;
pub mod worker;

pub use error::WorkerError;
pub use registry::ProducerLockRegistry;
pub use worker::EdgeWorker;
