//! The live configuration and its change notification window.
//!
//! Every rebuild after the first replaces the live configuration and opens a 60 second
//! window. While it is open, every data frame sets ConfigurationChanged on every cell so
//! clients know to request the new configuration frame.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::ieee_c37_118::common::{FrameType, ParseError};
use crate::ieee_c37_118::config::ConfigurationFrame;

pub const CHANGE_NOTIFICATION_WINDOW_SECONDS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    Stable,
    Notifying,
}

/// A published configuration frame with its cached wire images.
///
/// `changed_at` is `None` for the first configuration a concentrator ever publishes.
#[derive(Debug, Clone)]
pub struct LiveConfiguration {
    pub frame: Arc<ConfigurationFrame>,
    pub changed_at: Option<DateTime<Utc>>,
    config1_image: Vec<u8>,
    config2_image: Vec<u8>,
}

impl LiveConfiguration {
    /// Encodes both CFG-1 and CFG-2 images of `frame`.
    pub fn new(
        frame: ConfigurationFrame,
        changed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ParseError> {
        let config1_image = frame.with_frame_type(FrameType::Config1).to_hex()?;
        let config2_image = frame.with_frame_type(FrameType::Config2).to_hex()?;
        Ok(LiveConfiguration {
            frame: Arc::new(frame),
            changed_at,
            config1_image,
            config2_image,
        })
    }

    /// The cached image for `frame_type`, if one is kept for it.
    pub fn image(&self, frame_type: FrameType) -> Option<&[u8]> {
        match frame_type {
            FrameType::Config1 => Some(&self.config1_image),
            FrameType::Config2 => Some(&self.config2_image),
            _ => None,
        }
    }

    /// Notification state at `now`. The window includes its last instant.
    pub fn notification_state(&self, now: DateTime<Utc>) -> NotificationState {
        match self.changed_at {
            Some(changed_at)
                if now - changed_at <= Duration::seconds(CHANGE_NOTIFICATION_WINDOW_SECONDS) =>
            {
                NotificationState::Notifying
            }
            _ => NotificationState::Stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::common::Version;
    use chrono::TimeZone;

    fn empty_frame() -> ConfigurationFrame {
        ConfigurationFrame {
            frame_type: FrameType::Config2,
            version: Version::V2005,
            id_code: 1,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).single().unwrap(),
            time_base: 1_000_000,
            frame_rate: 30,
            cells: Vec::new(),
        }
    }

    #[test]
    fn test_window_bounds() {
        let changed = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let live = LiveConfiguration::new(empty_frame(), Some(changed)).unwrap();
        assert_eq!(live.notification_state(changed), NotificationState::Notifying);
        assert_eq!(
            live.notification_state(changed + Duration::seconds(60)),
            NotificationState::Notifying
        );
        assert_eq!(
            live.notification_state(changed + Duration::milliseconds(60_001)),
            NotificationState::Stable
        );

        let first = LiveConfiguration::new(empty_frame(), None).unwrap();
        assert_eq!(first.notification_state(changed), NotificationState::Stable);
    }

    #[test]
    fn test_cached_images() {
        let live = LiveConfiguration::new(empty_frame(), None).unwrap();
        assert_eq!(live.image(FrameType::Config1).map(|image| image[1]), Some(0x21));
        assert_eq!(live.image(FrameType::Config2).map(|image| image[1]), Some(0x31));
        assert!(live.image(FrameType::Config3).is_none());
    }
}
