//! Notification routing and display types shared between the engine
//! and front ends.

use serde::{Deserialize, Serialize};

/// Which output device(s) a notification is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeDevice {
    /// Text overlay and audio playback
    #[default]
    Both,
    /// Text overlay only
    Text,
    /// Audio playback only
    Audio,
}

impl NoticeDevice {
    pub fn wants_text(&self) -> bool {
        matches!(self, Self::Both | Self::Text)
    }

    pub fn wants_audio(&self) -> bool {
        matches!(self, Self::Both | Self::Audio)
    }
}

/// Relative emphasis of a visible upcoming activity.
///
/// The nearest visible activity is rendered `Primary` (full scale/opacity),
/// the rest of the lookahead window `Secondary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityEmphasis {
    Primary,
    Secondary,
}

/// RGBA color value used by visual notices.
pub type Color = [u8; 4];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_routing() {
        assert!(NoticeDevice::Both.wants_text());
        assert!(NoticeDevice::Both.wants_audio());
        assert!(NoticeDevice::Text.wants_text());
        assert!(!NoticeDevice::Text.wants_audio());
        assert!(!NoticeDevice::Audio.wants_text());
    }

    #[test]
    fn test_device_parses_from_toml() {
        #[derive(serde::Deserialize)]
        struct Holder {
            device: NoticeDevice,
        }
        let h: Holder = toml::from_str(r#"device = "audio""#).unwrap();
        assert_eq!(h.device, NoticeDevice::Audio);
    }
}
