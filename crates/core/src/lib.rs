//! Pure domain logic for the generation orchestration core.
//!
//! Everything in this crate is I/O-free: template rendering, cost
//! calculation, payload sanitization, input coercion, and JSON dot-path
//! lookup. Persistence, HTTP, and storage live in the sibling crates.

pub mod cost;
pub mod error;
pub mod fields;
pub mod json_path;
pub mod sanitize;
pub mod template;
pub mod types;

pub use error::CoreError;
