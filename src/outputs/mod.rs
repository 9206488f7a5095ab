//! Output generation.
//!
//! # Submodules
//!
//! - [`json`]: Writes the [`NewsPayload`](crate::models::NewsPayload) read by
//!   the panel's presentation layer
//!
//! # Output Structure
//!
//! ```text
//! data/
//! └── news.json   # {generatedAt, items, stats}
//! ```

pub mod json;
