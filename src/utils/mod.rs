//! Utility modules.

pub mod logging;
pub mod text;

pub use logging::{init_logging, parse_log_level};
pub use text::normalize_for_embedding;
