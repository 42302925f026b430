pub mod prefs;
pub mod sender;

pub use prefs::NotificationPrefs;
pub use sender::{Notification, NotificationKind, NotificationSender, NotificationSink, RelayConfig};
