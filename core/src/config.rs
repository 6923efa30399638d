//! Application configuration, persisted as TOML through confy.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actorsync::ActorSyncSettings;
use crate::notify::NotifySettings;
use crate::timeline::ControllerSettings;

const APP_NAME: &str = "raidline";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of timeline TOML files.
    pub timeline_directory: String,

    // ─── Engine cadence ─────────────────────────────────────────────────────
    pub tick_interval_ms: u64,
    pub notify_idle_ms: u64,
    pub notify_fast_ms: u64,
    pub notify_debounce_ms: u64,
    pub actor_poll_ms: u64,

    // ─── Timeline windowing ─────────────────────────────────────────────────
    pub hide_grace_secs: f64,
    pub lookahead_secs: f64,
    pub visible_count: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timeline_directory: default_timeline_dir()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            tick_interval_ms: 50,
            notify_idle_ms: 250,
            notify_fast_ms: 5,
            notify_debounce_ms: 100,
            actor_poll_ms: 1000,
            hide_grace_secs: 1.0,
            lookahead_secs: 90.0,
            visible_count: 5,
        }
    }
}

impl AppConfig {
    /// Load from the platform config directory; fall back to defaults on a
    /// missing or unreadable file.
    pub fn load() -> Self {
        match confy::load(APP_NAME, None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        if let Err(e) = confy::store(APP_NAME, None, self) {
            tracing::error!(error = %e, "failed to save config");
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            hide_grace: self.hide_grace_secs,
            lookahead_secs: self.lookahead_secs,
            visible_count: self.visible_count,
            ..ControllerSettings::default()
        }
    }

    pub fn notify_settings(&self) -> NotifySettings {
        NotifySettings {
            idle: Duration::from_millis(self.notify_idle_ms),
            fast: Duration::from_millis(self.notify_fast_ms),
            debounce: Duration::from_millis(self.notify_debounce_ms),
        }
    }

    pub fn actor_settings(&self) -> ActorSyncSettings {
        ActorSyncSettings {
            poll_interval: Duration::from_millis(self.actor_poll_ms),
        }
    }
}

/// Default timeline directory under the platform config dir.
pub fn default_timeline_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_NAME).join("timelines"))
}
