pub mod audit;
pub mod notifications;

pub use audit::{ActivityEntry, ActivitySink, PgActivityLog, record_best_effort};
pub use notifications::{NotificationRequest, NotificationSink, PgNotificationService, notify_best_effort};
