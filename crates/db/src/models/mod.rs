//! Entity models: `FromRow` row structs plus `Create*` DTOs.

pub mod app;
pub mod credit;
pub mod generation;
pub mod model;
pub mod status;
pub mod task;
pub mod user;
