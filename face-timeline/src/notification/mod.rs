//! Notification emitter.
//!
//! Pipeline components report human-readable status through the [`Notifier`]
//! trait. Delivery is fire-and-forget: a failing sink is logged and never
//! aborts the work that produced the event.
//!
//! [`NotificationService`] is the default sink. It fans events out to
//! in-process subscribers over a broadcast channel and persists them to the
//! `notifications` table when a repository is attached.

pub mod events;
pub mod service;

pub use events::{NotificationEvent, NotificationLevel};
pub use service::{NotificationService, NotificationServiceConfig, NotificationStats};

/// A sink for notification events.
///
/// Implementations must not block and must swallow their own failures.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: NotificationEvent);
}
