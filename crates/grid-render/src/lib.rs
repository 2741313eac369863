pub mod block;
pub mod error;
pub mod hcl;
pub mod render;

pub use error::RenderError;
pub use render::{render_block_body, render_to_file, RenderConfig};
