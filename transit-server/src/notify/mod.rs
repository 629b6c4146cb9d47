//! Notification dispatch and delivery dedup.

mod dedup;
mod dispatch;

pub use dedup::DeliveryCache;
pub use dispatch::{
    BroadcastPublisher, DispatchReport, EventPublisher, GateDecision, IncidentEvent, LogNotifier,
    Notification, NotificationConfig, NotificationDispatcher, Notifier, NotifyError, Provenance,
};
