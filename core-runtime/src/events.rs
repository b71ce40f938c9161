//! # Event Bus System
//!
//! Typed publish/subscribe built on `tokio::sync::broadcast`. Every object
//! that emits events (playback sessions, the instream controller) owns an
//! [`EventBus`] instead of inheriting an emitter capability.
//!
//! ## Overview
//!
//! - **Event Types**: [`PlayerEvent`], the player-level vocabulary consumed by
//!   UI and controller layers, plus [`PlayerState`], [`ErrorKind`] and
//!   [`DestroyReason`].
//! - **EventBus**: broadcast channel for publishing events of any cloneable type.
//! - **EventStream**: receiver wrapper with filtering and non-blocking draining.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   publish   ┌───────────┐   subscribe   ┌────────────┐
//! │ PlaybackSession  ├────────────>│           ├──────────────>│ Controller │
//! └──────────────────┘             │ EventBus  │               └────────────┘
//!                                  │ (broadcast│
//! ┌──────────────────┐   publish   │  channel) │   subscribe   ┌────────────┐
//! │ Instream session ├────────────>│           ├──────────────>│ UI layer   │
//! └──────────────────┘             └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, EventStream, PlayerEvent};
//!
//! let bus: EventBus<PlayerEvent> = EventBus::new(64);
//! let mut stream = EventStream::new(bus.subscribe());
//!
//! bus.publish(PlayerEvent::PlaylistComplete);
//! assert_eq!(stream.drain(), vec![PlayerEvent::PlaylistComplete]);
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind by `n` events.
//!   Non-fatal; delivery continues with newer events.
//! - **`RecvError::Closed`**: every sender was dropped.
//!
//! A bus with no subscribers drops events. [`EventBus::emit`] reports that as
//! an error; [`EventBus::publish`] ignores it, which is what emitters that do
//! not care who listens want.

use bridge_traits::playback::{
    AudioTrack, CaptionTrack, MediaKind, ProviderKind, QualityLevel, StreamType,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::warn;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for event channels.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Player Vocabulary
// ============================================================================

/// Player-level playback state.
///
/// Backends also report `loading` and `stalled`; those collapse into
/// [`PlayerState::Buffering`] before reaching this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Idle,
    Buffering,
    Playing,
    Paused,
    Complete,
    Error,
}

impl PlayerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "idle",
            PlayerState::Buffering => "buffering",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Complete => "complete",
            PlayerState::Error => "error",
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error classification carried by [`PlayerEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No registered provider can play the item, or the playlist filtered to
    /// nothing.
    NoPlayableSource,
    /// The host platform is on an explicit denylist for the operation.
    PlatformUnsupported,
    /// A backend failed mid-playback.
    ProviderRuntimeError,
    /// No descriptor matched an item's source at selection time.
    InvalidProviderSelection,
}

/// Why an instream episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestroyReason {
    Complete,
    Destroyed,
}

impl DestroyReason {
    pub fn from_completed(completed: bool) -> Self {
        if completed {
            DestroyReason::Complete
        } else {
            DestroyReason::Destroyed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DestroyReason::Complete => "complete",
            DestroyReason::Destroyed => "destroyed",
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events published by playback sessions and the instream controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// A playlist was accepted after filtering.
    PlaylistLoaded { item_count: usize },
    /// The active item changed. `repeat` marks a wrap past the last item.
    PlaylistItem { index: usize, repeat: bool },
    PlaylistComplete,
    /// A new provider instance now backs the session.
    ProviderChanged { provider: ProviderKind },
    /// Playback was requested on an idle item.
    BeforePlay,
    /// The session asked its provider to load and start.
    PlayAttempt,
    StateChanged {
        old_state: PlayerState,
        new_state: PlayerState,
    },
    /// The backend entered its internal loading substate.
    ProviderLoading,
    /// The backend entered its internal stalled substate.
    ProviderStalled,
    /// Time from play attempt to the first playing frame.
    ProviderFirstFrame { load_time_ms: i64 },
    MediaTime { position: f64, duration: f64 },
    MediaBuffer { buffer_percent: f64, duration: f64 },
    BufferFull,
    MediaMeta {
        duration: Option<f64>,
        width: Option<u32>,
        height: Option<u32>,
    },
    MediaSeek { position: f64, offset: f64 },
    MediaSeeked,
    MediaType { media_type: MediaKind },
    StreamType { stream_type: StreamType },
    /// Fired once per item immediately before the completion transition.
    BeforeComplete,
    MediaComplete,
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
    SubtitlesTrackChanged {
        tracks: Vec<CaptionTrack>,
        current_track: usize,
    },
    Volume { volume: u8 },
    Mute { mute: bool },
    PlaybackRateChanged { playback_rate: f64 },
    Fullscreen { fullscreen: bool },
    ProviderClick,
    AutoplayFailed,
    InstreamClick { has_controls: bool },
    InstreamDestroyed { reason: DestroyReason },
    AdSkipped,
    Error { kind: ErrorKind, message: String },
}

impl PlayerEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PlayerEvent::PlaylistLoaded { .. } => "Playlist loaded",
            PlayerEvent::PlaylistItem { .. } => "Playlist item changed",
            PlayerEvent::PlaylistComplete => "Playlist complete",
            PlayerEvent::ProviderChanged { .. } => "Provider changed",
            PlayerEvent::BeforePlay => "Before play",
            PlayerEvent::PlayAttempt => "Play attempt",
            PlayerEvent::StateChanged { .. } => "Player state changed",
            PlayerEvent::ProviderLoading => "Provider loading",
            PlayerEvent::ProviderStalled => "Provider stalled",
            PlayerEvent::ProviderFirstFrame { .. } => "First frame rendered",
            PlayerEvent::MediaTime { .. } => "Media time",
            PlayerEvent::MediaBuffer { .. } => "Media buffer",
            PlayerEvent::BufferFull => "Buffer full",
            PlayerEvent::MediaMeta { .. } => "Media metadata",
            PlayerEvent::MediaSeek { .. } => "Seek requested",
            PlayerEvent::MediaSeeked => "Seek completed",
            PlayerEvent::MediaType { .. } => "Media type changed",
            PlayerEvent::StreamType { .. } => "Stream type changed",
            PlayerEvent::BeforeComplete => "Before complete",
            PlayerEvent::MediaComplete => "Media complete",
            PlayerEvent::Levels { .. } => "Quality levels",
            PlayerEvent::LevelChanged { .. } => "Quality level changed",
            PlayerEvent::AudioTracks { .. } => "Audio tracks",
            PlayerEvent::AudioTrackChanged { .. } => "Audio track changed",
            PlayerEvent::SubtitlesTrackChanged { .. } => "Subtitles track changed",
            PlayerEvent::Volume { .. } => "Volume changed",
            PlayerEvent::Mute { .. } => "Mute changed",
            PlayerEvent::PlaybackRateChanged { .. } => "Playback rate changed",
            PlayerEvent::Fullscreen { .. } => "Fullscreen changed",
            PlayerEvent::ProviderClick => "Provider clicked",
            PlayerEvent::AutoplayFailed => "Autoplay failed",
            PlayerEvent::InstreamClick { .. } => "Instream clicked",
            PlayerEvent::InstreamDestroyed { .. } => "Instream destroyed",
            PlayerEvent::AdSkipped => "Ad skipped",
            PlayerEvent::Error { .. } => "Player error",
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            PlayerEvent::Error { .. } => EventSeverity::Error,
            PlayerEvent::AutoplayFailed | PlayerEvent::ProviderStalled => EventSeverity::Warning,
            PlayerEvent::PlaylistLoaded { .. }
            | PlayerEvent::PlaylistComplete
            | PlayerEvent::ProviderChanged { .. }
            | PlayerEvent::InstreamDestroyed { .. }
            | PlayerEvent::AdSkipped => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast channel for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, PlayerEvent};
///
/// let bus = EventBus::new(16);
/// let mut first = bus.subscribe();
/// let mut second = bus.subscribe();
///
/// bus.emit(PlayerEvent::BeforePlay).ok();
/// assert_eq!(first.try_recv().unwrap(), PlayerEvent::BeforePlay);
/// assert_eq!(second.try_recv().unwrap(), PlayerEvent::BeforePlay);
/// ```
#[derive(Clone)]
pub struct EventBus<E = PlayerEvent> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, as `tokio::sync::broadcast::channel` does.
    /// `PlayerConfig::validate` rejects a zero buffer before it gets here.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are no active subscribers.
    pub fn emit(&self, event: E) -> Result<usize, SendError<E>> {
        self.sender.send(event)
    }

    /// Publishes an event, dropping it silently when nobody listens.
    pub fn publish(&self, event: E) {
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<E> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, EventSeverity, PlayerEvent};
///
/// let bus = EventBus::<PlayerEvent>::new(16);
/// let errors = EventStream::new(bus.subscribe())
///     .filter(|event: &PlayerEvent| event.severity() == EventSeverity::Error);
/// ```
pub struct EventStream<E = PlayerEvent> {
    receiver: Receiver<E>,
    filter: Option<EventFilter<E>>,
}

impl<E: Clone> EventStream<E> {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<E>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &E) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<E, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<E, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Collects every event currently buffered, skipping over lag gaps.
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Event stream lagged; older events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
