use chrono::{Local, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::sender::NotificationKind;

/// Per-user notification preferences stored on the backend profile.
///
/// Missing fields read as enabled, so a user who never touched the
/// settings screen still receives pushes. Quiet hours are minutes since
/// midnight and may wrap past midnight (e.g. 22:00 -> 07:00).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPrefs {
    pub push: bool,
    pub messages: bool,
    pub new_products: bool,
    pub shop_promotions: bool,
    pub quiet_start: Option<u32>,
    pub quiet_end: Option<u32>,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            push: true,
            messages: true,
            new_products: true,
            shop_promotions: true,
            quiet_start: None,
            quiet_end: None,
        }
    }
}

impl NotificationPrefs {
    pub fn allows(&self, kind: NotificationKind, now: NaiveTime) -> bool {
        if !self.push {
            return false;
        }

        let kind_enabled = match kind {
            NotificationKind::Message => self.messages,
            NotificationKind::NewProduct => self.new_products,
            NotificationKind::Promotion => self.shop_promotions,
        };
        if !kind_enabled {
            return false;
        }

        !self.in_quiet_hours(now)
    }

    pub fn allows_now(&self, kind: NotificationKind) -> bool {
        self.allows(kind, Local::now().time())
    }

    fn in_quiet_hours(&self, now: NaiveTime) -> bool {
        let Some(start) = self.quiet_start else {
            return false;
        };
        let end = self.quiet_end.unwrap_or(0);
        let current = now.hour() * 60 + now.minute();

        if start <= end {
            current >= start && current < end
        } else {
            // Window wraps past midnight
            current >= start || current < end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn defaults_allow_everything() {
        let prefs = NotificationPrefs::default();
        assert!(prefs.allows(NotificationKind::Message, at(12, 0)));
        assert!(prefs.allows(NotificationKind::NewProduct, at(3, 0)));
        assert!(prefs.allows(NotificationKind::Promotion, at(23, 59)));
    }

    #[test]
    fn push_master_switch_overrides_kinds() {
        let prefs = NotificationPrefs {
            push: false,
            ..Default::default()
        };
        assert!(!prefs.allows(NotificationKind::Message, at(12, 0)));
    }

    #[test]
    fn per_kind_switches() {
        let prefs = NotificationPrefs {
            shop_promotions: false,
            ..Default::default()
        };
        assert!(!prefs.allows(NotificationKind::Promotion, at(12, 0)));
        assert!(prefs.allows(NotificationKind::Message, at(12, 0)));
    }

    #[test]
    fn quiet_hours_same_day() {
        let prefs = NotificationPrefs {
            quiet_start: Some(13 * 60),
            quiet_end: Some(14 * 60),
            ..Default::default()
        };
        assert!(!prefs.allows(NotificationKind::Message, at(13, 30)));
        assert!(prefs.allows(NotificationKind::Message, at(14, 0)));
        assert!(prefs.allows(NotificationKind::Message, at(12, 59)));
    }

    #[test]
    fn quiet_hours_wrap_past_midnight() {
        let prefs = NotificationPrefs {
            quiet_start: Some(22 * 60),
            quiet_end: Some(7 * 60),
            ..Default::default()
        };
        assert!(!prefs.allows(NotificationKind::Message, at(23, 0)));
        assert!(!prefs.allows(NotificationKind::Message, at(2, 30)));
        assert!(prefs.allows(NotificationKind::Message, at(7, 0)));
        assert!(prefs.allows(NotificationKind::Message, at(12, 0)));
    }
}
