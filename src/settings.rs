//! Display settings shared with everything that renders time.
//!
//! Consumers read the current value or subscribe to changes explicitly.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Largest offset chrono accepts, exclusive, in minutes.
const MAX_OFFSET_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Offset from UTC used for chart labels.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl DisplaySettings {
    /// The offset as a chrono zone. Out-of-range values fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn is_valid(&self) -> bool {
        self.utc_offset_minutes.unsigned_abs() < MAX_OFFSET_MINUTES
    }
}

/// Observable settings cell. Cloning shares the cell.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<DisplaySettings>,
}

impl SettingsHandle {
    pub fn new(initial: DisplaySettings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> DisplaySettings {
        *self.tx.borrow()
    }

    /// Replace the settings. Returns false, leaving them untouched, when the
    /// new value is out of range.
    pub fn update(&self, settings: DisplaySettings) -> bool {
        if !settings.is_valid() {
            return false;
        }
        let changed = self.tx.send_if_modified(|current| {
            if *current == settings {
                false
            } else {
                *current = settings;
                true
            }
        });
        if changed {
            tracing::info!("Display offset set to {} minutes", settings.utc_offset_minutes);
        }
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplaySettings> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset() {
        let settings = DisplaySettings {
            utc_offset_minutes: -330,
        };
        assert_eq!(settings.offset().local_minus_utc(), -330 * 60);
        assert_eq!(DisplaySettings::default().offset().local_minus_utc(), 0);

        let broken = DisplaySettings {
            utc_offset_minutes: 5000,
        };
        assert!(!broken.is_valid());
        assert_eq!(broken.offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_update_rejects_out_of_range() {
        let handle = SettingsHandle::new(DisplaySettings::default());
        assert!(!handle.update(DisplaySettings {
            utc_offset_minutes: 24 * 60,
        }));
        assert_eq!(handle.get(), DisplaySettings::default());
    }

    #[tokio::test]
    async fn test_subscribers_are_notified() {
        let handle = SettingsHandle::new(DisplaySettings::default());
        let mut rx = handle.subscribe();

        assert!(handle.update(DisplaySettings {
            utc_offset_minutes: 120,
        }));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().utc_offset_minutes, 120);

        // Same value again does not wake anyone.
        handle.update(DisplaySettings {
            utc_offset_minutes: 120,
        });
        assert!(!rx.has_changed().unwrap());
        assert_eq!(handle.clone().get().utc_offset_minutes, 120);
    }
}
