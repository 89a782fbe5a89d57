//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod app_repo;
pub mod credit_repo;
pub mod execution_repo;
pub mod generation_repo;
pub mod model_repo;
pub mod task_repo;

pub use app_repo::AppRepo;
pub use credit_repo::CreditRepo;
pub use execution_repo::ExecutionRepo;
pub use generation_repo::GenerationRepo;
pub use model_repo::ModelRepo;
pub use task_repo::TaskRepo;
