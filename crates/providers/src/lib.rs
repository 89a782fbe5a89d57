//! Upstream generation provider adapters.
//!
//! Every provider is one variant of the closed [`ProviderAdapter`] set:
//! a schema-driven templated HTTP provider, a bespoke synchronous image
//! vendor, and a long-running video vendor polled via operation names.
//! Dispatch is a pattern match on the variant, never a string switch at the
//! call site.

pub mod adapter;
pub mod error;

mod gemini;
mod http;
mod results;
mod templated;
mod vertex;

pub use adapter::{
    GenerationContext, OperationStatus, ProviderAdapter, ProviderConfig, ProviderKind,
    ProviderOutcome, ProviderResponse,
};
pub use error::ProviderError;
