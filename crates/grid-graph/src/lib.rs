pub mod engine;
pub mod error;
pub mod rollup;

pub use engine::{DepGraph, Direction, Layer};
pub use error::GraphError;
pub use rollup::{state_status, BucketCounts, StateStatus, Verdict};
