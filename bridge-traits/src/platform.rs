//! Platform-specific helper abstractions.
//!
//! Two concerns live here:
//!
//! - Marker traits that keep trait bounds aligned with the threading
//!   guarantees of each target. Native targets require `Send + Sync` so
//!   provider factories can be shared; WebAssembly builds run on a single
//!   thread and cannot satisfy those bounds.
//! - [`PlatformInfo`], the host's description of the environment the player
//!   runs in. Capability predicates (flash availability) and the instream
//!   platform denylist are evaluated against it.

use serde::{Deserialize, Serialize};

/// Marker trait that applies `Send + Sync` on native targets while becoming a
/// no-op on `wasm32`.
#[cfg(not(target_arch = "wasm32"))]
pub trait PlatformSendSync: Send + Sync {}

#[cfg(not(target_arch = "wasm32"))]
impl<T> PlatformSendSync for T where T: Send + Sync {}

#[cfg(target_arch = "wasm32")]
pub trait PlatformSendSync {}

#[cfg(target_arch = "wasm32")]
impl<T> PlatformSendSync for T {}

/// Marker trait equivalent to `Send` on native targets.
#[cfg(not(target_arch = "wasm32"))]
pub trait PlatformSend: Send {}

#[cfg(not(target_arch = "wasm32"))]
impl<T> PlatformSend for T where T: Send {}

#[cfg(target_arch = "wasm32")]
pub trait PlatformSend {}

#[cfg(target_arch = "wasm32")]
impl<T> PlatformSend for T {}

/// Operating system family reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum OsFamily {
    Desktop,
    Ios { major: u32 },
    Android { major: u32, minor: u32 },
}

/// Browser or embedding shell reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Safari,
    Firefox,
    Edge,
    Facebook,
    Other,
}

/// Minimum flash plugin version the flash backend accepts.
pub const MIN_FLASH_VERSION: f32 = 11.2;

/// Environment description consumed by capability predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: OsFamily,
    pub browser: Browser,
    /// Installed flash plugin version, `None` when absent.
    pub flash_version: Option<f32>,
    /// Player embedded in a native SDK rather than a browser page.
    pub sdk_embedded: bool,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self {
            os: OsFamily::Desktop,
            browser: Browser::Chrome,
            flash_version: None,
            sdk_embedded: false,
        }
    }
}

impl PlatformInfo {
    pub fn new(os: OsFamily, browser: Browser) -> Self {
        Self {
            os,
            browser,
            ..Self::default()
        }
    }

    pub fn with_flash_version(mut self, version: f32) -> Self {
        self.flash_version = Some(version);
        self
    }

    pub fn with_sdk_embedded(mut self, embedded: bool) -> Self {
        self.sdk_embedded = embedded;
        self
    }

    pub fn is_mobile(&self) -> bool {
        !matches!(self.os, OsFamily::Desktop)
    }

    /// Flash plugin present at a version the flash backend can drive.
    pub fn flash_available(&self) -> bool {
        self.flash_version
            .map(|v| v >= MIN_FLASH_VERSION)
            .unwrap_or(false)
    }

    /// Instream playback is denied on Android 2.3.
    pub fn instream_supported(&self) -> bool {
        !matches!(self.os, OsFamily::Android { major: 2, minor: 3 })
    }

    /// Whether a mobile browser will honour a muted autostart.
    ///
    /// iOS gained muted autoplay in version 10; Android only in Chrome. SDK
    /// embeds on Android always allow it.
    pub fn can_autostart_muted(&self) -> bool {
        match self.os {
            OsFamily::Desktop => false,
            OsFamily::Ios { major } => {
                major >= 10
                    && matches!(
                        self.browser,
                        Browser::Safari | Browser::Chrome | Browser::Facebook
                    )
            }
            OsFamily::Android { .. } => self.sdk_embedded || self.browser == Browser::Chrome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn android_two_three_denies_instream() {
        let legacy = PlatformInfo::new(OsFamily::Android { major: 2, minor: 3 }, Browser::Other);
        assert!(!legacy.instream_supported());

        let modern = PlatformInfo::new(OsFamily::Android { major: 4, minor: 4 }, Browser::Chrome);
        assert!(modern.instream_supported());
        assert!(PlatformInfo::default().instream_supported());
    }

    #[test]
    fn flash_requires_minimum_version() {
        assert!(!PlatformInfo::default().flash_available());
        assert!(!PlatformInfo::default().with_flash_version(10.3).flash_available());
        assert!(PlatformInfo::default().with_flash_version(11.2).flash_available());
    }

    #[test]
    fn muted_autostart_support_by_platform() {
        assert!(!PlatformInfo::default().can_autostart_muted());
        assert!(PlatformInfo::new(OsFamily::Ios { major: 11 }, Browser::Safari).can_autostart_muted());
        assert!(!PlatformInfo::new(OsFamily::Ios { major: 9 }, Browser::Safari).can_autostart_muted());
        assert!(!PlatformInfo::new(OsFamily::Android { major: 8, minor: 0 }, Browser::Firefox)
            .can_autostart_muted());
        assert!(PlatformInfo::new(OsFamily::Android { major: 8, minor: 0 }, Browser::Firefox)
            .with_sdk_embedded(true)
            .can_autostart_muted());
    }
}
