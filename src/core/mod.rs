/*!
 * Core Module
 * Fundamental scheduler types, time sources, and error handling
 */

pub mod errors;
pub mod time;
pub mod types;

// Re-export for convenience
pub use errors::*;
pub use time::{Clock, SystemClock};
pub use types::*;
