//! The worker process: claims queued tasks and drives the engines.

pub mod config;
pub mod runner;

pub use config::WorkerConfig;
pub use runner::ClaimLoop;
