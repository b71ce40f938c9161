//! Built-in provider descriptors.
//!
//! Capability predicates for the three stock backends, in default
//! preference order: html5, flash, youtube. Predicates only inspect the
//! source and the host [`PlatformInfo`]; the backends themselves are
//! supplied by the host as [`ProviderFactory`](bridge_traits::playback::ProviderFactory)
//! implementations.

use bridge_traits::platform::{Browser, OsFamily, PlatformInfo};
use bridge_traits::playback::{ProviderKind, Source};

use crate::registry::{ProviderDescriptor, ProviderRegistry};

/// Types the html5 backend plays everywhere.
const HTML5_TYPES: &[&str] = &[
    "mp4", "m4v", "f4v", "mov", "webm", "ogv", "ogg", "oga", "mp3", "mpeg", "aac", "m4a",
    "f4a", "wav", "vorbis", "opus",
];

/// Types the flash backend plays when the plugin is present.
const FLASH_TYPES: &[&str] = &[
    "flv", "f4v", "mov", "m4a", "m4v", "mp4", "aac", "f4a", "mp3", "smil", "m3u8", "hls",
];

pub fn is_youtube(source: &Source) -> bool {
    if source.media_type.as_deref() == Some("youtube") {
        return true;
    }
    let file = source.file.to_ascii_lowercase();
    file.contains("youtube.com/") || file.contains("youtu.be/")
}

pub fn is_rtmp(source: &Source) -> bool {
    source.media_type.as_deref() == Some("rtmp") || source.file.starts_with("rtmp")
}

fn is_hls(media_type: &str) -> bool {
    matches!(media_type, "hls" | "m3u8")
}

/// HLS is played natively only by Safari and mobile browsers.
fn native_hls(platform: &PlatformInfo) -> bool {
    match platform.os {
        OsFamily::Ios { .. } | OsFamily::Android { .. } => true,
        OsFamily::Desktop => platform.browser == Browser::Safari,
    }
}

pub fn html5(platform: &PlatformInfo) -> ProviderDescriptor {
    let native_hls = native_hls(platform);
    ProviderDescriptor::new(ProviderKind::html5(), move |source: &Source| {
        if is_youtube(source) || is_rtmp(source) {
            return false;
        }
        match source.resolved_type() {
            Some(t) if is_hls(&t) => native_hls,
            Some(t) => HTML5_TYPES.contains(&t.as_str()),
            None => false,
        }
    })
}

pub fn flash(platform: &PlatformInfo) -> ProviderDescriptor {
    let available = platform.flash_available();
    ProviderDescriptor::new(ProviderKind::flash(), move |source: &Source| {
        if !available {
            return false;
        }
        if is_rtmp(source) || is_youtube(source) {
            return true;
        }
        source
            .resolved_type()
            .map(|t| FLASH_TYPES.contains(&t.as_str()))
            .unwrap_or(false)
    })
}

pub fn youtube() -> ProviderDescriptor {
    ProviderDescriptor::new(ProviderKind::youtube(), is_youtube)
}

pub fn builtin_descriptors(platform: &PlatformInfo) -> Vec<ProviderDescriptor> {
    vec![html5(platform), flash(platform), youtube()]
}

/// Registry over the built-in descriptors, with `primary` promoted when set.
pub fn builtin_registry(platform: &PlatformInfo, primary: Option<&ProviderKind>) -> ProviderRegistry {
    let registry = ProviderRegistry::new(builtin_descriptors(platform));
    match primary {
        Some(kind) => registry.with_primary(kind),
        None => registry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_detected_by_type_or_host() {
        assert!(is_youtube(&Source::new("https://www.youtube.com/watch?v=abc")));
        assert!(is_youtube(&Source::new("https://youtu.be/abc")));
        assert!(is_youtube(&Source::new("abc").with_type("youtube")));
        assert!(!is_youtube(&Source::new("https://cdn.example.com/a.mp4")));
    }

    #[test]
    fn html5_rejects_rtmp_and_youtube() {
        let html5 = html5(&PlatformInfo::default());
        assert!(html5.supports(&Source::new("a.mp4")));
        assert!(!html5.supports(&Source::new("rtmp://live/stream.mp4")));
        assert!(!html5.supports(&Source::new("https://youtu.be/abc")));
    }

    #[test]
    fn html5_hls_needs_native_support() {
        let desktop_chrome = html5(&PlatformInfo::default());
        let desktop_safari = html5(&PlatformInfo::new(OsFamily::Desktop, Browser::Safari));
        let source = Source::new("master.m3u8");

        assert!(!desktop_chrome.supports(&source));
        assert!(desktop_safari.supports(&source));
    }

    #[test]
    fn flash_requires_plugin_version() {
        let source = Source::new("clip.flv");
        assert!(!flash(&PlatformInfo::default()).supports(&source));
        assert!(!flash(&PlatformInfo::default().with_flash_version(11.1)).supports(&source));
        assert!(flash(&PlatformInfo::default().with_flash_version(11.2)).supports(&source));
    }

    #[test]
    fn flash_primary_promoted_over_html5() {
        let platform = PlatformInfo::default().with_flash_version(24.0);
        let registry = builtin_registry(&platform, Some(&ProviderKind::flash()));
        let chosen = registry.choose(&Source::new("a.mp4")).unwrap();
        assert_eq!(chosen.kind(), &ProviderKind::flash());
    }
}
