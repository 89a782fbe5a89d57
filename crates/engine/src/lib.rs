//! The orchestration engines.
//!
//! Three cooperating pieces drive a generation from request to durable
//! result:
//!
//! - [`GenerationEngine`]: one provider invocation, covering input
//!   normalization, the adapter call, billing, and persistence.
//! - [`WorkflowEngine`]: multi-step app executions with approval gates,
//!   field resolution, and step chaining.
//! - [`CompletionPoller`]: drives long-running generations to a terminal
//!   state via status polling, with refunds on failure.
//!
//! Every engine receives its collaborators as `Arc<dyn Trait>`; nothing in
//! this crate touches a database pool or the network directly.

pub mod error;
pub mod gateway;
pub mod generation;
pub mod poller;
pub mod tasks;
pub mod workflow;

pub use error::EngineError;
pub use gateway::{AdapterGateway, ProviderGateway};
pub use generation::{GenerateRequest, GenerationEngine};
pub use poller::CompletionPoller;
pub use tasks::TaskRunner;
pub use workflow::WorkflowEngine;
