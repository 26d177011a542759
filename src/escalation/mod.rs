//! Escalation and timeout rules

pub mod engine;
pub mod notifier;
pub mod timers;

pub use engine::{EscalationEngine, SessionControl};
pub use notifier::{build_payload, Notifier, RecordingNotifier, WebhookNotifier};
pub use timers::ActiveTimer;
