//! # Player Configuration Module
//!
//! Configuration for one player instance.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `PlayerConfig` holding the initial media settings and the host bridges the
//! player depends on. `build()` fails fast when a value is out of range or a
//! feature is enabled without the bridge it needs.
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `PreferenceStore` - Persisted volume/mute/quality/caption choices
//!   (required when `persist_preferences` is enabled)
//! - `Clock` - Time source for QoE timers (default: `SystemClock`)
//! - `PlatformInfo` - Host environment (default: desktop Chrome, no flash)
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::PlayerConfig;
//!
//! let config = PlayerConfig::builder()
//!     .id("player-1")
//!     .volume(80)
//!     .autostart(true)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.volume, 80);
//! assert!(!config.autostart_muted); // desktop never autostarts muted
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::PlayerConfig;
//!
//! // Preferences cannot be persisted without a store
//! let config = PlayerConfig::builder()
//!     .id("player-1")
//!     .persist_preferences(true)
//!     .build()
//!     .expect("Should fail - missing PreferenceStore");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, PlatformInfo, PreferenceStore, ProviderKind, SystemClock};
use std::sync::Arc;

/// Lowest playback rate a session accepts.
pub const MIN_PLAYBACK_RATE: f64 = 0.25;
/// Highest playback rate a session accepts.
pub const MAX_PLAYBACK_RATE: f64 = 4.0;
/// Volume applied when no preference or explicit value exists.
pub const DEFAULT_VOLUME: u8 = 90;

/// Configuration for one player instance.
///
/// Use [`PlayerConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct PlayerConfig {
    /// Player identifier handed to provider instances
    pub id: String,

    /// Initial volume in `0..=100`
    pub volume: u8,

    /// Initial mute flag
    pub mute: bool,

    /// Start playback as soon as the first item is ready
    pub autostart: bool,

    /// Autostart on a mobile platform that only permits muted autoplay.
    /// Derived at build time; a transient override, never persisted.
    pub autostart_muted: bool,

    /// Provider moved to the front of the preference order
    pub primary_provider: Option<ProviderKind>,

    /// Playback rate applied to every new provider
    pub default_playback_rate: f64,

    /// Wrap to the first item after the last completes
    pub repeat: bool,

    /// Whether player controls are shown
    pub controls: bool,

    /// Buffer size of every event channel the player creates
    pub event_buffer_size: usize,

    /// Persisted preference storage (optional)
    pub preference_store: Option<Arc<dyn PreferenceStore>>,

    /// Time source for QoE timers
    pub clock: Arc<dyn Clock>,

    /// Host environment used by capability checks
    pub platform: PlatformInfo,

    /// Feature flags
    pub features: FeatureFlags,
}

impl std::fmt::Debug for PlayerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerConfig")
            .field("id", &self.id)
            .field("volume", &self.volume)
            .field("mute", &self.mute)
            .field("autostart", &self.autostart)
            .field("autostart_muted", &self.autostart_muted)
            .field("primary_provider", &self.primary_provider)
            .field("default_playback_rate", &self.default_playback_rate)
            .field("repeat", &self.repeat)
            .field("controls", &self.controls)
            .field("event_buffer_size", &self.event_buffer_size)
            .field(
                "preference_store",
                &self
                    .preference_store
                    .as_ref()
                    .map(|_| "PreferenceStore { ... }"),
            )
            .field("platform", &self.platform)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Persist volume, mute, quality and caption choices (requires PreferenceStore)
    pub persist_preferences: bool,

    /// Record loading/stalled/first-frame timings
    pub collect_qoe: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            persist_preferences: false,
            collect_qoe: true,
        }
    }
}

impl PlayerConfig {
    /// Creates a new builder for constructing a `PlayerConfig`.
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Player id is not empty
    /// - Volume is within `0..=100`
    /// - Default playback rate is within `[0.25, 4]`
    /// - Event buffer size is non-zero
    /// - Feature flags are consistent with available bridges
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("Player id cannot be empty".to_string()));
        }

        if self.volume > 100 {
            return Err(Error::Config(format!(
                "Volume {} is out of range (0-100)",
                self.volume
            )));
        }

        if !(MIN_PLAYBACK_RATE..=MAX_PLAYBACK_RATE).contains(&self.default_playback_rate) {
            return Err(Error::Config(format!(
                "Default playback rate {} is out of range ({}-{})",
                self.default_playback_rate, MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.features.persist_preferences && self.preference_store.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "PreferenceStore".to_string(),
                message: "Preference persistence enabled but no PreferenceStore provided. \
                          Disable persist_preferences or inject a PreferenceStore \
                          (localStorage on web, UserDefaults/DataStore on mobile)."
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Preference store to persist into, when persistence is enabled.
    pub fn active_preference_store(&self) -> Option<Arc<dyn PreferenceStore>> {
        if self.features.persist_preferences {
            self.preference_store.clone()
        } else {
            None
        }
    }
}

/// Builder for [`PlayerConfig`].
#[derive(Default)]
pub struct PlayerConfigBuilder {
    id: Option<String>,
    volume: Option<u8>,
    mute: bool,
    autostart: bool,
    primary_provider: Option<ProviderKind>,
    default_playback_rate: Option<f64>,
    repeat: bool,
    controls: Option<bool>,
    event_buffer_size: Option<usize>,
    preference_store: Option<Arc<dyn PreferenceStore>>,
    clock: Option<Arc<dyn Clock>>,
    platform: Option<PlatformInfo>,
    features: FeatureFlags,
}

impl PlayerConfigBuilder {
    /// Sets the player identifier (required).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    pub fn autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Moves `kind` to the front of the provider preference order.
    pub fn primary_provider(mut self, kind: impl Into<ProviderKind>) -> Self {
        self.primary_provider = Some(kind.into());
        self
    }

    pub fn default_playback_rate(mut self, rate: f64) -> Self {
        self.default_playback_rate = Some(rate);
        self
    }

    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn controls(mut self, controls: bool) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the preference store implementation (optional).
    pub fn preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preference_store = Some(store);
        self
    }

    /// Sets the time source (default: [`SystemClock`]).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Enables or disables preference persistence.
    pub fn persist_preferences(mut self, enabled: bool) -> Self {
        self.features.persist_preferences = enabled;
        self
    }

    /// Enables or disables QoE timing collection.
    pub fn collect_qoe(mut self, enabled: bool) -> Self {
        self.features.collect_qoe = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `PlayerConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The player id is missing
    /// - Values are out of range
    /// - Feature flags are inconsistent with available bridges
    pub fn build(self) -> Result<PlayerConfig> {
        let id = self
            .id
            .ok_or_else(|| Error::Config("Player id is required. Use .id() to set it.".to_string()))?;

        let platform = self.platform.unwrap_or_default();
        let autostart_muted = self.autostart && platform.can_autostart_muted();

        let config = PlayerConfig {
            id,
            volume: self.volume.unwrap_or(DEFAULT_VOLUME),
            mute: self.mute,
            autostart: self.autostart,
            autostart_muted,
            primary_provider: self.primary_provider,
            default_playback_rate: self.default_playback_rate.unwrap_or(1.0),
            repeat: self.repeat,
            controls: self.controls.unwrap_or(true),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            preference_store: self.preference_store,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            platform,
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{Browser, MemoryPreferenceStore, OsFamily};

    #[test]
    fn test_builder_requires_id() {
        let result = PlayerConfig::builder().build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_defaults() {
        let config = PlayerConfig::builder().id("p").build().unwrap();
        assert_eq!(config.volume, DEFAULT_VOLUME);
        assert!(!config.mute);
        assert_eq!(config.default_playback_rate, 1.0);
        assert!(config.controls);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.features.collect_qoe);
        assert!(config.active_preference_store().is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        assert!(PlayerConfig::builder().id("p").volume(101).build().is_err());
        assert!(PlayerConfig::builder()
            .id("p")
            .default_playback_rate(8.0)
            .build()
            .is_err());
        assert!(PlayerConfig::builder()
            .id("p")
            .event_buffer_size(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_persist_preferences_requires_store() {
        let err = PlayerConfig::builder()
            .id("p")
            .persist_preferences(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::CapabilityMissing { ref capability, .. } if capability == "PreferenceStore"));

        let config = PlayerConfig::builder()
            .id("p")
            .persist_preferences(true)
            .preference_store(Arc::new(MemoryPreferenceStore::new()))
            .build()
            .unwrap();
        assert!(config.active_preference_store().is_some());
    }

    #[test]
    fn test_autostart_muted_derived_from_platform() {
        let ios = PlatformInfo::new(OsFamily::Ios { major: 12 }, Browser::Safari);
        let config = PlayerConfig::builder()
            .id("p")
            .autostart(true)
            .platform(ios.clone())
            .build()
            .unwrap();
        assert!(config.autostart_muted);

        let config = PlayerConfig::builder()
            .id("p")
            .platform(ios)
            .build()
            .unwrap();
        assert!(!config.autostart_muted);
    }
}
