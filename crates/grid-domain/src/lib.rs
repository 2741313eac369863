pub mod error;
pub mod fingerprint;
pub mod parse;
pub mod types;

pub use error::DomainError;
pub use fingerprint::{fingerprint, EMPTY_FINGERPRINT};
pub use parse::parse_state;
pub use types::*;
