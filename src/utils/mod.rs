//! Utility modules.

pub mod text;
pub mod vector;

pub use text::{has_content, truncate_preview};
pub use vector::{dot, l2_normalize, pad_to};
