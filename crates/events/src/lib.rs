//! Completion notifications for generations and app executions.
//!
//! The orchestration core publishes a [`PlatformEvent`] on every
//! terminal-state transition (and on pause-for-approval). Delivery is
//! fire-and-forget; subscribers that lag simply miss events.

pub mod bus;

pub use bus::{EventBus, PlatformEvent};

/// Notification collaborator injected into the engines.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Publish `event`, addressed to `target_user_id`. Must not fail the
    /// caller; delivery is best-effort.
    async fn publish(&self, event: PlatformEvent, target_user_id: pixelforge_core::types::DbId);
}

#[async_trait::async_trait]
impl Notifier for EventBus {
    async fn publish(&self, event: PlatformEvent, target_user_id: pixelforge_core::types::DbId) {
        self.broadcast(event.with_target(target_user_id));
    }
}
