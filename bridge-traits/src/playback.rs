//! Playback provider contract and supporting media types.
//!
//! A provider is a pluggable playback backend (native media element, plugin,
//! hosted third-party player). The core never talks to a backend directly;
//! it drives instances through [`MediaProvider`] and observes them through
//! the [`ProviderEvent`] stream each instance publishes.
//!
//! Backend implementations are obtained lazily: a [`ProviderLoader`] resolves
//! a [`ProviderKind`] to a [`ProviderFactory`], which then creates instances
//! synchronously whenever a session needs one.

use crate::{
    error::Result,
    platform::{PlatformSend, PlatformSendSync},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Unique identifier for a playback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlaybackSessionId(Uuid);

impl PlaybackSessionId {
    /// Generate a new session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct an identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlaybackSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlaybackSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable tag identifying a provider backend.
///
/// Sessions compare kinds to decide whether a live instance can be reused for
/// the next item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderKind(String);

impl ProviderKind {
    pub const HTML5: &'static str = "html5";
    pub const FLASH: &'static str = "flash";
    pub const YOUTUBE: &'static str = "youtube";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn html5() -> Self {
        Self::new(Self::HTML5)
    }

    pub fn flash() -> Self {
        Self::new(Self::FLASH)
    }

    pub fn youtube() -> Self {
        Self::new(Self::YOUTUBE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A single playable URI plus an optional explicit media type hint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub file: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub default: bool,
}

impl Source {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            media_type: None,
            label: None,
            default: false,
        }
    }

    pub fn with_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Lowercased file extension, ignoring query string and fragment.
    pub fn extension(&self) -> Option<String> {
        let path = self
            .file
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let name = path.rsplit('/').next().unwrap_or_default();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Explicit type when given, otherwise the extension.
    pub fn resolved_type(&self) -> Option<String> {
        self.media_type
            .as_ref()
            .map(|t| t.to_ascii_lowercase())
            .or_else(|| self.extension())
    }
}

/// Side-loaded caption track attached to a playlist item or reported by a
/// provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl CaptionTrack {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            language: None,
            file: None,
        }
    }
}

/// Playable entry: ordered sources plus display metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistItem {
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Position in seconds playback begins from.
    #[serde(default)]
    pub starttime: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Smallest negative duration treated as a DVR window, in seconds.
    #[serde(default, rename = "minDvrWindow", skip_serializing_if = "Option::is_none")]
    pub min_dvr_window: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tracks: Vec<CaptionTrack>,
}

impl PlaylistItem {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    /// Single-source item.
    pub fn from_file(file: impl Into<String>) -> Self {
        Self::new(vec![Source::new(file)])
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_starttime(mut self, starttime: f64) -> Self {
        self.starttime = starttime;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn first_source(&self) -> Option<&Source> {
        self.sources.first()
    }
}

/// Rendition reported by adaptive providers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl QualityLevel {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            bitrate: None,
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl AudioTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Stream classification derived from the reported duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    #[default]
    Vod,
    Live,
    Dvr,
}

impl StreamType {
    /// Default DVR window threshold in seconds.
    pub const MIN_DVR_WINDOW: f64 = 120.0;

    /// Infinite durations are live; negative durations are live unless their
    /// magnitude reaches the DVR window.
    pub fn from_duration(duration: f64, min_dvr_window: Option<f64>) -> Self {
        let window = min_dvr_window.unwrap_or(Self::MIN_DVR_WINDOW);
        if duration.is_infinite() {
            StreamType::Live
        } else if duration < 0.0 {
            if duration.abs() >= window {
                StreamType::Dvr
            } else {
                StreamType::Live
            }
        } else {
            StreamType::Vod
        }
    }
}

/// Opaque handle to the host element visual media renders into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaContainer {
    pub id: String,
}

impl MediaContainer {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Raw backend state, including the internal `Loading` and `Stalled`
/// substates that never leave the session boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderState {
    Idle,
    Loading,
    Stalled,
    Buffering,
    Playing,
    Paused,
    Complete,
    Error,
}

impl ProviderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderState::Idle => "idle",
            ProviderState::Loading => "loading",
            ProviderState::Stalled => "stalled",
            ProviderState::Buffering => "buffering",
            ProviderState::Playing => "playing",
            ProviderState::Paused => "paused",
            ProviderState::Complete => "complete",
            ProviderState::Error => "error",
        }
    }
}

/// Event vocabulary every provider instance publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProviderEvent {
    StateChanged {
        old_state: ProviderState,
        new_state: ProviderState,
    },
    Time {
        position: f64,
        duration: Option<f64>,
    },
    Buffer {
        buffer_percent: f64,
        duration: Option<f64>,
    },
    BufferFull,
    Meta {
        duration: Option<f64>,
        width: Option<u32>,
        height: Option<u32>,
    },
    Seek {
        position: f64,
        offset: f64,
    },
    Seeked,
    Levels {
        levels: Vec<QualityLevel>,
        current_quality: i32,
    },
    LevelChanged {
        levels: Vec<QualityLevel>,
        current_quality: i32,
    },
    AudioTracks {
        tracks: Vec<AudioTrack>,
        current_track: i32,
    },
    AudioTrackChanged {
        tracks: Vec<AudioTrack>,
        current_track: i32,
    },
    /// `current_track` is 1-based; 0 means captions off.
    SubtitlesTrackChanged {
        tracks: Vec<CaptionTrack>,
        current_track: usize,
    },
    Volume {
        volume: u8,
    },
    Mute {
        mute: bool,
    },
    RateChange {
        playback_rate: f64,
    },
    MediaType {
        media_type: MediaKind,
    },
    Complete,
    Error {
        message: String,
    },
    Click,
    FullscreenChange {
        fullscreen: bool,
    },
    AutoplayFailed,
}

impl ProviderEvent {
    /// Short event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::StateChanged { .. } => "state",
            ProviderEvent::Time { .. } => "time",
            ProviderEvent::Buffer { .. } => "buffer",
            ProviderEvent::BufferFull => "bufferFull",
            ProviderEvent::Meta { .. } => "meta",
            ProviderEvent::Seek { .. } => "seek",
            ProviderEvent::Seeked => "seeked",
            ProviderEvent::Levels { .. } => "levels",
            ProviderEvent::LevelChanged { .. } => "levelsChanged",
            ProviderEvent::AudioTracks { .. } => "audioTracks",
            ProviderEvent::AudioTrackChanged { .. } => "audioTrackChanged",
            ProviderEvent::SubtitlesTrackChanged { .. } => "subtitlesTrackChanged",
            ProviderEvent::Volume { .. } => "volume",
            ProviderEvent::Mute { .. } => "mute",
            ProviderEvent::RateChange { .. } => "ratechange",
            ProviderEvent::MediaType { .. } => "mediaType",
            ProviderEvent::Complete => "complete",
            ProviderEvent::Error { .. } => "error",
            ProviderEvent::Click => "click",
            ProviderEvent::FullscreenChange { .. } => "fullscreenchange",
            ProviderEvent::AutoplayFailed => "autoplayFailed",
        }
    }
}

/// Receiver half of a provider's event stream.
pub type ProviderEventReceiver = broadcast::Receiver<ProviderEvent>;

/// Options a session hands to a factory when instantiating a provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderOptions {
    pub player_id: String,
    /// Instance will run an inserted secondary playlist.
    pub instream_mode: bool,
}

impl ProviderOptions {
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            instream_mode: false,
        }
    }

    pub fn instream(mut self) -> Self {
        self.instream_mode = true;
        self
    }
}

/// A live playback backend instance.
///
/// Instances are owned by exactly one session. They publish every observable
/// change on their event stream; a session that is detached simply stops
/// reading it, and the instance keeps running.
///
/// Control operations are synchronous: the player core is single-threaded
/// and backends report progress through events rather than return values.
pub trait MediaProvider: PlatformSend {
    /// Kind tag of the descriptor this instance was created from.
    fn kind(&self) -> ProviderKind;

    /// Open a fresh receiver on the instance's event stream. Events published
    /// before the call are not replayed.
    fn subscribe(&self) -> ProviderEventReceiver;

    /// Preload hook invoked when an item is selected but not yet loaded.
    fn init(&mut self, _item: &PlaylistItem) {}

    fn load(&mut self, item: &PlaylistItem) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Seek to an absolute position in seconds.
    fn seek(&mut self, position: f64) -> Result<()>;

    /// Volume in `0..=100`.
    fn volume(&mut self, volume: u8);

    fn mute(&mut self, mute: bool);

    /// Backends without rate control ignore this.
    fn set_playback_rate(&mut self, _rate: f64) {}

    fn attach_media(&mut self);

    fn detach_media(&mut self);

    fn container(&self) -> Option<&MediaContainer>;

    fn set_container(&mut self, container: MediaContainer);

    /// Remove the instance from its container, handing the container back.
    fn remove(&mut self) -> Option<MediaContainer>;

    /// Force the backend into `state`, publishing the change.
    fn set_state(&mut self, state: ProviderState);

    fn set_current_quality(&mut self, _index: usize) {}

    fn set_current_audio_track(&mut self, _index: usize) {}

    /// 1-based caption index, 0 disables captions.
    fn set_subtitles_track(&mut self, _index: usize) {}

    fn set_fullscreen(&mut self, _fullscreen: bool) {}

    /// Current position in seconds.
    fn position(&self) -> f64;

    /// Release the media resource. The instance is unusable afterwards.
    fn destroy(&mut self);
}

/// Creates provider instances for one backend kind.
pub trait ProviderFactory: PlatformSendSync {
    fn kind(&self) -> ProviderKind;

    fn create(&self, options: &ProviderOptions) -> Box<dyn MediaProvider>;
}

/// Resolves backend implementations, possibly over the network.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait ProviderLoader: PlatformSendSync {
    /// Fetch the factory for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::LoadFailed`](crate::error::BridgeError::LoadFailed)
    /// when the backend cannot be fetched.
    async fn load(&self, kind: &ProviderKind) -> Result<Arc<dyn ProviderFactory>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_unique() {
        let a = PlaybackSessionId::new();
        let b = PlaybackSessionId::new();
        assert_ne!(a, b);
        assert_eq!(a, PlaybackSessionId::from_uuid(*a.as_uuid()));
    }

    #[test]
    fn source_extension_ignores_query_and_case() {
        let source = Source::new("https://cdn.example.com/media/Clip.MP4?token=abc#t=3");
        assert_eq!(source.extension().as_deref(), Some("mp4"));
        assert_eq!(source.resolved_type().as_deref(), Some("mp4"));

        let hinted = Source::new("https://cdn.example.com/stream").with_type("HLS");
        assert_eq!(hinted.extension(), None);
        assert_eq!(hinted.resolved_type().as_deref(), Some("hls"));
    }

    #[test]
    fn hidden_files_have_no_extension() {
        assert_eq!(Source::new("/media/.mp4").extension(), None);
        assert_eq!(Source::new("/media/file.").extension(), None);
    }

    #[test]
    fn stream_type_from_duration() {
        assert_eq!(StreamType::from_duration(30.0, None), StreamType::Vod);
        assert_eq!(StreamType::from_duration(f64::INFINITY, None), StreamType::Live);
        assert_eq!(StreamType::from_duration(-30.0, None), StreamType::Live);
        assert_eq!(StreamType::from_duration(-300.0, None), StreamType::Dvr);
        assert_eq!(StreamType::from_duration(-30.0, Some(20.0)), StreamType::Dvr);
    }

    #[test]
    fn playlist_item_deserializes_with_type_hint() {
        let item: PlaylistItem = serde_json::from_str(
            r#"{"sources":[{"file":"a.m3u8","type":"hls"}],"title":"Ad","starttime":5}"#,
        )
        .unwrap();
        assert_eq!(item.sources[0].media_type.as_deref(), Some("hls"));
        assert_eq!(item.starttime, 5.0);
        assert_eq!(item.title.as_deref(), Some("Ad"));
    }
}
