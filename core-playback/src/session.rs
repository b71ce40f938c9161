//! # Playback Session
//!
//! One playlist, one provider slot, one translated state machine.
//!
//! A session owns at most one live provider instance. It reads that
//! provider's raw event stream, translates it into [`PlayerEvent`]s on its
//! own [`EventBus`], and keeps the player-visible view of the media:
//! state, position, duration, volume, tracks.
//!
//! ## Turn Model
//!
//! Sessions never block and never spawn. The owner calls
//! [`PlaybackSession::process_events`] once per cooperative turn; each call
//! drains what the provider has published so far and returns a
//! [`SessionTurn`] summarising it. A detached session drops its receiver, so
//! anything the provider publishes while detached is never seen.
//!
//! ## Completion
//!
//! A provider `complete` latches the item as "before complete" and publishes
//! [`PlayerEvent::BeforeComplete`]. The transition itself settles at the
//! start of the next turn, and only if the session is still attached and
//! not already idle or complete. Collaborators that detach in between (a
//! post-roll, for example) keep the latch set; [`PlaybackSession::attach_media`]
//! finishes the completion on their way out.

use bridge_traits::error::BridgeError;
use bridge_traits::playback::{
    AudioTrack, CaptionTrack, MediaContainer, MediaKind, MediaProvider, PlaybackSessionId,
    PlaylistItem, ProviderEvent, ProviderEventReceiver, ProviderKind, ProviderOptions,
    ProviderState, QualityLevel, StreamType,
};
use bridge_traits::storage::PreferenceStore;
use bridge_traits::time::Clock;
use core_runtime::config::{PlayerConfig, MAX_PLAYBACK_RATE, MIN_PLAYBACK_RATE};
use core_runtime::events::{EventBus, EventStream, PlayerEvent, PlayerState};
use core_runtime::logging::redact_media_url;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, info, instrument, warn};

use crate::error::{PlaybackError, Result};
use crate::preferences::{
    PreferenceWriter, StoredPreferences, CAPTIONS_OFF, CAPTION_LABEL_KEY, QUALITY_LABEL_KEY,
};
use crate::qoe::{QoeReport, QoeTracker};
use crate::registry::ProviderRegistry;
use crate::state::{blocks_completion, exposed_state, substate_notification};

/// Volume restored when unmuting from zero.
pub const MIN_UNMUTE_VOLUME: u8 = 10;

// ============================================================================
// Settings
// ============================================================================

/// Construction-time settings for a session.
#[derive(Clone)]
pub struct SessionSettings {
    pub player_id: String,
    /// Providers are created for an inserted secondary playlist.
    pub instream_mode: bool,
    pub volume: u8,
    pub mute: bool,
    pub autostart_muted: bool,
    pub default_playback_rate: f64,
    pub event_buffer_size: usize,
    pub collect_qoe: bool,
    pub preference_store: Option<Arc<dyn PreferenceStore>>,
    pub clock: Arc<dyn Clock>,
    /// Quality level label restored from preferences.
    pub quality_label: Option<String>,
    /// Caption track label restored from preferences.
    pub caption_label: Option<String>,
}

impl SessionSettings {
    /// Settings for a primary session. Persisted volume and mute override
    /// the configured values when preference persistence is enabled.
    pub fn from_config(config: &PlayerConfig) -> Self {
        let store = config.active_preference_store();
        let stored = store
            .as_deref()
            .map(|s| StoredPreferences::load(s))
            .unwrap_or_default();

        Self {
            player_id: config.id.clone(),
            instream_mode: false,
            volume: stored.volume.unwrap_or(config.volume),
            mute: stored.mute.unwrap_or(config.mute),
            autostart_muted: config.autostart_muted,
            default_playback_rate: config.default_playback_rate,
            event_buffer_size: config.event_buffer_size,
            collect_qoe: config.features.collect_qoe,
            preference_store: store,
            clock: config.clock.clone(),
            quality_label: stored.quality_label,
            caption_label: stored.caption_label,
        }
    }

    /// Settings for a secondary session inheriting the primary's audio.
    ///
    /// Secondary sessions never persist preferences and always start at
    /// normal speed.
    pub fn for_instream(&self, volume: u8, mute: bool, autostart_muted: bool) -> Self {
        Self {
            instream_mode: true,
            volume,
            mute,
            autostart_muted,
            default_playback_rate: 1.0,
            preference_store: None,
            quality_label: None,
            caption_label: None,
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("player_id", &self.player_id)
            .field("instream_mode", &self.instream_mode)
            .field("volume", &self.volume)
            .field("mute", &self.mute)
            .field("autostart_muted", &self.autostart_muted)
            .field("default_playback_rate", &self.default_playback_rate)
            .field("persist", &self.preference_store.is_some())
            .finish()
    }
}

// ============================================================================
// Turn Summary
// ============================================================================

/// What happened during one [`PlaybackSession::process_events`] call,
/// including effects of direct calls made since the previous turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionTurn {
    /// Provider events handled plus settled completions.
    pub handled: usize,
    /// Exposed states entered, in order.
    pub entered: Vec<PlayerState>,
    /// The current item completed.
    pub completed: bool,
    pub buffer_full: bool,
    /// First error reported.
    pub error: Option<PlaybackError>,
}

impl SessionTurn {
    pub fn entered(&self, state: PlayerState) -> bool {
        self.entered.contains(&state)
    }

    pub fn is_quiet(&self) -> bool {
        self.handled == 0 && !self.completed && self.error.is_none() && self.entered.is_empty()
    }
}

/// Result of moving to a playlist index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemChange {
    pub index: usize,
    /// The requested index ran past the last item and wrapped.
    pub repeat: bool,
}

enum ProviderSlot {
    Empty,
    /// Chosen for the current item, factory not loaded yet.
    Pending(ProviderKind),
    Active(Box<dyn MediaProvider>),
}

// ============================================================================
// Session
// ============================================================================

pub struct PlaybackSession {
    id: PlaybackSessionId,
    registry: Arc<ProviderRegistry>,
    settings: SessionSettings,
    events: EventBus<PlayerEvent>,
    preferences: PreferenceWriter,

    slot: ProviderSlot,
    receiver: Option<ProviderEventReceiver>,
    container: Option<MediaContainer>,
    attached: bool,
    before_complete: bool,
    completion_pending: bool,

    playlist: Vec<PlaylistItem>,
    item_index: usize,
    deferred_load: Option<PlaylistItem>,

    state: PlayerState,
    raw_state: ProviderState,
    position: f64,
    duration: f64,
    buffer_percent: f64,
    media_type: Option<MediaKind>,
    stream_type: StreamType,

    volume: u8,
    mute: bool,
    autostart_muted: bool,
    autostart_failed: bool,
    default_playback_rate: f64,
    playback_rate: f64,
    fullscreen: bool,

    quality_levels: Vec<QualityLevel>,
    current_quality: Option<usize>,
    quality_label: Option<String>,
    audio_tracks: Vec<AudioTrack>,
    current_audio_track: Option<usize>,
    captions_list: Vec<CaptionTrack>,
    captions_index: usize,
    captions_track: Option<CaptionTrack>,
    caption_label: Option<String>,

    play_attempt: bool,
    play_on_attempt: bool,
    qoe: QoeTracker,
    turn: SessionTurn,
}

impl PlaybackSession {
    pub fn new(registry: Arc<ProviderRegistry>, settings: SessionSettings) -> Self {
        let id = PlaybackSessionId::new();
        debug!(session = %id, instream = settings.instream_mode, "Creating playback session");

        Self {
            id,
            registry,
            events: EventBus::new(settings.event_buffer_size.max(1)),
            preferences: PreferenceWriter::new(settings.preference_store.clone()),
            slot: ProviderSlot::Empty,
            receiver: None,
            container: None,
            attached: true,
            before_complete: false,
            completion_pending: false,
            playlist: Vec::new(),
            item_index: 0,
            deferred_load: None,
            state: PlayerState::Idle,
            raw_state: ProviderState::Idle,
            position: 0.0,
            duration: 0.0,
            buffer_percent: 0.0,
            media_type: None,
            stream_type: StreamType::Vod,
            volume: settings.volume,
            mute: settings.mute,
            autostart_muted: settings.autostart_muted,
            autostart_failed: false,
            default_playback_rate: settings.default_playback_rate,
            playback_rate: settings.default_playback_rate,
            fullscreen: false,
            quality_levels: Vec::new(),
            current_quality: None,
            quality_label: settings.quality_label.clone(),
            audio_tracks: Vec::new(),
            current_audio_track: None,
            captions_list: Vec::new(),
            captions_index: 0,
            captions_track: None,
            caption_label: settings.caption_label.clone(),
            play_attempt: false,
            play_on_attempt: false,
            qoe: QoeTracker::new(settings.clock.clone(), settings.collect_qoe),
            turn: SessionTurn::default(),
            settings,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> PlaybackSessionId {
        self.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn events(&self) -> &EventBus<PlayerEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream<PlayerEvent> {
        EventStream::new(self.events.subscribe())
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// Position as the provider reports it right now, falling back to the
    /// last translated position.
    pub fn provider_position(&self) -> f64 {
        match &self.slot {
            ProviderSlot::Active(provider) => provider.position(),
            _ => self.position,
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn buffer_percent(&self) -> f64 {
        self.buffer_percent
    }

    pub fn media_type(&self) -> Option<MediaKind> {
        self.media_type
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Effective mute: muted by the user or by a muted autostart.
    pub fn mute(&self) -> bool {
        self.autostart_muted || self.mute
    }

    pub fn autostart_muted(&self) -> bool {
        self.autostart_muted
    }

    pub fn autostart_failed(&self) -> bool {
        self.autostart_failed
    }

    pub fn default_playback_rate(&self) -> f64 {
        self.default_playback_rate
    }

    /// Rate last reported by the provider.
    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn playlist(&self) -> &[PlaylistItem] {
        &self.playlist
    }

    pub fn item_index(&self) -> usize {
        self.item_index
    }

    pub fn current_item(&self) -> Option<&PlaylistItem> {
        self.playlist.get(self.item_index)
    }

    pub fn provider_kind(&self) -> Option<ProviderKind> {
        match &self.slot {
            ProviderSlot::Empty => None,
            ProviderSlot::Pending(kind) => Some(kind.clone()),
            ProviderSlot::Active(provider) => Some(provider.kind()),
        }
    }

    pub fn has_provider(&self) -> bool {
        matches!(self.slot, ProviderSlot::Active(_))
    }

    pub fn has_pending_provider(&self) -> bool {
        matches!(self.slot, ProviderSlot::Pending(_))
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Whether a completion was latched and not yet applied.
    pub fn check_complete(&self) -> bool {
        self.before_complete
    }

    pub fn container(&self) -> Option<&MediaContainer> {
        self.container.as_ref()
    }

    pub fn quality_levels(&self) -> &[QualityLevel] {
        &self.quality_levels
    }

    pub fn current_quality(&self) -> Option<usize> {
        self.current_quality
    }

    pub fn quality_label(&self) -> Option<&str> {
        self.quality_label.as_deref()
    }

    pub fn audio_tracks(&self) -> &[AudioTrack] {
        &self.audio_tracks
    }

    pub fn current_audio_track(&self) -> Option<usize> {
        self.current_audio_track
    }

    /// 1-based captions index; 0 when captions are off.
    pub fn captions_index(&self) -> usize {
        self.captions_index
    }

    pub fn captions_track(&self) -> Option<&CaptionTrack> {
        self.captions_track.as_ref()
    }

    pub fn caption_label(&self) -> Option<&str> {
        self.caption_label.as_deref()
    }

    pub fn qoe_report(&self) -> QoeReport {
        self.qoe.report()
    }

    pub(crate) fn publish(&self, event: PlayerEvent) {
        self.events.publish(event);
    }

    // ========================================================================
    // Playlist
    // ========================================================================

    /// Replace the playlist with its playable subset and select the first
    /// item.
    ///
    /// When nothing is playable exactly one `NoPlayableSource` error is
    /// reported and no provider is created.
    #[instrument(skip_all, fields(session = %self.id))]
    pub fn set_playlist(&mut self, items: Vec<PlaylistItem>) -> Result<()> {
        let filtered = self.registry.filter_playlist(&items);
        if filtered.is_empty() {
            return Err(self.report(PlaybackError::NoPlayableSource));
        }

        info!(
            items = filtered.len(),
            dropped = items.len() - filtered.len(),
            "Playlist loaded"
        );
        let item_count = filtered.len();
        self.playlist = filtered;
        self.publish(PlayerEvent::PlaylistLoaded { item_count });
        self.set_item(0)?;
        Ok(())
    }

    /// Make `index` the active item. Indices past the end wrap and mark the
    /// change as a repeat.
    pub fn set_item(&mut self, index: usize) -> Result<ItemChange> {
        let len = self.playlist.len();
        if len == 0 {
            return Err(PlaybackError::EmptyPlaylist);
        }

        let repeat = index >= len;
        let index = index % len;
        self.item_index = index;
        let item = self.playlist[index].clone();

        debug!(session = %self.id, index, repeat, "Active item changed");
        self.reset_media(&item);
        self.publish(PlayerEvent::PlaylistItem { index, repeat });
        self.select_provider(&item)?;
        Ok(ItemChange { index, repeat })
    }

    fn reset_media(&mut self, item: &PlaylistItem) {
        self.position = item.starttime;
        self.duration = item.duration.unwrap_or(0.0);
        self.buffer_percent = 0.0;
        self.media_type = None;
        self.quality_levels.clear();
        self.current_quality = None;
        self.audio_tracks.clear();
        self.current_audio_track = None;
        self.captions_list = item.tracks.clone();
        self.captions_index = 0;
        self.captions_track = None;
        self.play_attempt = false;
        self.play_on_attempt = false;
        self.deferred_load = None;
        self.clear_completion();
        self.qoe.reset();
    }

    // ========================================================================
    // Provider Lifecycle
    // ========================================================================

    /// Keep the current provider when the item's first source maps to the
    /// same kind; otherwise tear it down and create the new one. The item is
    /// handed to the provider for preloading either way.
    fn select_provider(&mut self, item: &PlaylistItem) -> Result<()> {
        let kind = match self.registry.choose_for_item(item) {
            Some(descriptor) => descriptor.kind().clone(),
            None => {
                self.change_provider(None);
                let file = item
                    .first_source()
                    .map(|s| redact_media_url(&s.file))
                    .unwrap_or_default();
                return Err(self.report(PlaybackError::InvalidProviderSelection(file)));
            }
        };

        if self.provider_kind().as_ref() != Some(&kind) {
            self.change_provider(Some(kind));
        }
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.init(item);
        }
        Ok(())
    }

    fn change_provider(&mut self, kind: Option<ProviderKind>) {
        self.receiver = None;
        if let ProviderSlot::Active(mut old) = std::mem::replace(&mut self.slot, ProviderSlot::Empty) {
            debug!(session = %self.id, provider = %old.kind(), "Tearing down provider");
            old.remove();
            old.destroy();
        }

        let Some(kind) = kind else {
            return;
        };
        let Some(factory) = self.registry.factory(&kind) else {
            debug!(session = %self.id, provider = %kind, "Provider selected but not loaded");
            self.slot = ProviderSlot::Pending(kind);
            return;
        };

        let mut options = ProviderOptions::new(self.settings.player_id.clone());
        options.instream_mode = self.settings.instream_mode;
        let mut provider = factory.create(&options);
        if let Some(container) = &self.container {
            provider.set_container(container.clone());
        }
        provider.volume(self.volume);
        provider.mute(self.mute());
        self.slot = ProviderSlot::Active(provider);

        let rate = self.default_playback_rate;
        self.set_playback_rate(rate);
        if self.attached {
            self.subscribe_provider();
        }

        info!(session = %self.id, provider = %kind, "Provider changed");
        self.publish(PlayerEvent::ProviderChanged { provider: kind });
    }

    fn subscribe_provider(&mut self) {
        self.receiver = match &self.slot {
            ProviderSlot::Active(provider) => Some(provider.subscribe()),
            _ => None,
        };
    }

    /// Instantiate a provider that was selected before its factory loaded.
    ///
    /// Returns `Ok(false)` when nothing is pending or the factory is still
    /// missing. A load requested while pending runs now.
    pub fn resolve_pending_provider(&mut self) -> Result<bool> {
        let kind = match &self.slot {
            ProviderSlot::Pending(kind) if self.registry.is_loaded(kind) => kind.clone(),
            _ => return Ok(false),
        };

        self.slot = ProviderSlot::Empty;
        self.change_provider(Some(kind));
        if let Some(item) = self.current_item().cloned() {
            if let ProviderSlot::Active(provider) = &mut self.slot {
                provider.init(&item);
            }
        }
        if let Some(item) = self.deferred_load.take() {
            self.load_item(item)?;
        }
        Ok(true)
    }

    /// Run `op` against the live provider, reporting its failure.
    fn with_provider<F>(&mut self, op: F) -> Result<()>
    where
        F: FnOnce(&mut Box<dyn MediaProvider>) -> bridge_traits::error::Result<()>,
    {
        let result = match &mut self.slot {
            ProviderSlot::Active(provider) => op(provider),
            ProviderSlot::Pending(kind) => return Err(PlaybackError::ProviderNotLoaded(kind.clone())),
            ProviderSlot::Empty => return Err(PlaybackError::NoProvider),
        };
        result.map_err(|e| self.provider_failure(e))
    }

    fn provider_failure(&mut self, error: BridgeError) -> PlaybackError {
        let error = self.report(PlaybackError::ProviderRuntime(error.to_string()));
        self.apply_provider_state(ProviderState::Error);
        error
    }

    fn report(&mut self, error: PlaybackError) -> PlaybackError {
        warn!(session = %self.id, error = %error, "Playback error");
        self.publish(PlayerEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
        if self.turn.error.is_none() {
            self.turn.error = Some(error.clone());
        }
        error
    }

    // ========================================================================
    // Playback Control
    // ========================================================================

    pub fn load(&mut self) -> Result<()> {
        let item = self.current_item().cloned().ok_or(PlaybackError::EmptyPlaylist)?;
        self.load_item(item)
    }

    /// Load `item` and start playback once it has buffered.
    ///
    /// With the provider still pending the load is remembered and runs from
    /// [`resolve_pending_provider`](Self::resolve_pending_provider).
    #[instrument(skip_all, fields(session = %self.id, starttime = item.starttime))]
    pub fn load_item(&mut self, item: PlaylistItem) -> Result<()> {
        self.position = item.starttime;
        if let Some(duration) = item.duration {
            self.duration = duration;
        }
        self.play_attempt = true;
        self.qoe.on_play_attempt();
        self.publish(PlayerEvent::PlayAttempt);

        if let ProviderSlot::Pending(kind) = &self.slot {
            debug!(provider = %kind, "Deferring load until provider is available");
            self.deferred_load = Some(item);
            return Ok(());
        }

        self.with_provider(|provider| provider.load(&item))?;
        if std::mem::take(&mut self.play_on_attempt) {
            self.with_provider(|provider| provider.play())?;
        }
        Ok(())
    }

    pub fn play(&mut self) -> Result<()> {
        self.with_provider(|provider| provider.play())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.with_provider(|provider| provider.pause())
    }

    /// Stopping drops a completion that has not been applied yet and any
    /// outstanding play attempt.
    pub fn stop(&mut self) -> Result<()> {
        self.clear_completion();
        self.play_attempt = false;
        self.with_provider(|provider| provider.stop())
    }

    pub fn seek(&mut self, position: f64) -> Result<()> {
        self.with_provider(|provider| provider.seek(position))
    }

    /// Apply the completion transition: the provider is told first, then the
    /// translated state and `MediaComplete` follow. The provider's own echo
    /// of the state change is deduplicated when it arrives.
    pub fn playback_complete(&mut self) {
        self.before_complete = false;
        self.completion_pending = false;
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.set_state(ProviderState::Complete);
        }
        self.apply_provider_state(ProviderState::Complete);
        self.turn.completed = true;
        info!(session = %self.id, index = self.item_index, "Item complete");
        self.publish(PlayerEvent::MediaComplete);
    }

    /// Forget a completion latched for the current item.
    pub(crate) fn clear_completion(&mut self) {
        self.before_complete = false;
        self.completion_pending = false;
    }

    fn settle_completion(&mut self) -> bool {
        if !self.completion_pending {
            return false;
        }
        self.completion_pending = false;
        if self.before_complete && self.attached && !blocks_completion(self.state) {
            self.playback_complete();
        }
        true
    }

    // ========================================================================
    // Audio & Rate
    // ========================================================================

    /// Set volume in `0..=100`, rounding fractional values. Volume 0 mutes;
    /// any other volume unmutes.
    pub fn set_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.round().clamp(0.0, 100.0) as u8;
        self.volume = volume;
        self.preferences.volume(volume);
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.volume(volume);
        }
        self.publish(PlayerEvent::Volume { volume });

        let mute = volume == 0;
        if mute != self.mute() {
            self.set_mute(mute);
        }
    }

    /// Unmuting clears a muted autostart and lifts the volume to at least
    /// [`MIN_UNMUTE_VOLUME`].
    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.mute(mute);
        }
        if !mute {
            self.autostart_muted = false;
        }
        if !self.autostart_muted {
            self.preferences.mute(mute);
        }
        self.publish(PlayerEvent::Mute { mute });

        if !mute {
            let volume = self.volume.max(MIN_UNMUTE_VOLUME);
            self.set_volume(f64::from(volume));
        }
    }

    pub fn toggle_mute(&mut self) {
        let mute = !self.mute();
        self.set_mute(mute);
    }

    /// Clamp to the supported range and make it the default for every later
    /// provider. Live streams always play at 1. Ignored while detached.
    pub fn set_playback_rate(&mut self, rate: f64) {
        if !self.attached || !rate.is_finite() {
            return;
        }
        let rate = if self.stream_type == StreamType::Live {
            1.0
        } else {
            rate.clamp(MIN_PLAYBACK_RATE, MAX_PLAYBACK_RATE)
        };
        self.default_playback_rate = rate;
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.set_playback_rate(rate);
        }
    }

    pub fn set_stream_type(&mut self, stream_type: StreamType) {
        if self.stream_type != stream_type {
            self.stream_type = stream_type;
            self.publish(PlayerEvent::StreamType { stream_type });
        }
        if stream_type == StreamType::Live {
            self.set_playback_rate(1.0);
        }
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        if self.fullscreen == fullscreen {
            return;
        }
        self.fullscreen = fullscreen;
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.set_fullscreen(fullscreen);
        }
        self.publish(PlayerEvent::Fullscreen { fullscreen });
    }

    // ========================================================================
    // Tracks
    // ========================================================================

    /// Ask the provider to switch rendition; the provider confirms with a
    /// level change.
    pub fn set_current_quality(&mut self, index: usize) {
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.set_current_quality(index);
        }
    }

    pub fn set_current_audio_track(&mut self, index: usize) {
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.set_current_audio_track(index);
        }
    }

    /// Select a caption track by 1-based index; 0 switches captions off.
    pub fn set_subtitles_track(&mut self, index: usize) {
        let tracks = self.captions_list.clone();
        self.persist_subtitles_track(index, tracks, true);
    }

    fn track_quality(&mut self, quality: i32) {
        let youtube = self.provider_kind() == Some(ProviderKind::youtube());
        if quality > -1 && self.quality_levels.len() > 1 && !youtube {
            self.current_quality = Some(quality as usize);
        }
    }

    fn persist_quality(&mut self, quality: i32) {
        let label = usize::try_from(quality)
            .ok()
            .and_then(|idx| self.quality_levels.get(idx))
            .map(|level| level.label.clone());
        if let Some(label) = label {
            self.preferences.label(QUALITY_LABEL_KEY, &label);
            self.quality_label = Some(label);
        }
    }

    /// Switch to the remembered quality label when the new levels offer it.
    fn apply_preferred_quality(&mut self) {
        let Some(label) = &self.quality_label else {
            return;
        };
        let preferred = self.quality_levels.iter().position(|level| &level.label == label);
        if let Some(idx) = preferred {
            if self.current_quality != Some(idx) {
                debug!(session = %self.id, label = %label, "Restoring preferred quality");
                self.set_current_quality(idx);
            }
        }
    }

    fn track_audio(&mut self, track: i32) {
        if track > -1 && (track as usize) < self.audio_tracks.len() {
            self.current_audio_track = Some(track as usize);
        }
    }

    fn persist_subtitles_track(&mut self, index: usize, tracks: Vec<CaptionTrack>, forward: bool) {
        self.captions_track = index
            .checked_sub(1)
            .and_then(|i| tracks.get(i))
            .cloned();
        self.captions_list = tracks;
        self.captions_index = index;
        if forward {
            if let ProviderSlot::Active(provider) = &mut self.slot {
                provider.set_subtitles_track(index);
            }
        }

        let label = self
            .captions_track
            .as_ref()
            .map(|track| track.label.clone())
            .unwrap_or_else(|| CAPTIONS_OFF.to_string());
        self.preferences.label(CAPTION_LABEL_KEY, &label);
        self.caption_label = Some(label);
        self.publish(PlayerEvent::SubtitlesTrackChanged {
            tracks: self.captions_list.clone(),
            current_track: index,
        });
    }

    // ========================================================================
    // Media Attachment
    // ========================================================================

    /// Stop listening to the provider. Events it publishes meanwhile are lost.
    pub fn detach_media(&mut self) {
        if !self.attached {
            return;
        }
        debug!(session = %self.id, "Detaching media");
        self.attached = false;
        self.receiver = None;
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.detach_media();
        }
    }

    /// Resume listening. A completion latched before detaching is applied
    /// first, then the provider reattaches and the default rate is
    /// re-applied.
    pub fn attach_media(&mut self) {
        if self.attached {
            return;
        }
        debug!(session = %self.id, "Attaching media");
        self.attached = true;
        self.subscribe_provider();
        if self.before_complete {
            self.playback_complete();
        }
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.attach_media();
        }
        let rate = self.default_playback_rate;
        self.set_playback_rate(rate);
    }

    pub fn set_container(&mut self, container: MediaContainer) {
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.set_container(container.clone());
        }
        self.container = Some(container);
    }

    /// Take the render container away from this session's provider.
    pub fn take_container(&mut self) -> Option<MediaContainer> {
        if let ProviderSlot::Active(provider) = &mut self.slot {
            provider.remove();
        }
        self.container.take()
    }

    /// Release the provider and stop listening for good.
    pub fn destroy(&mut self) {
        debug!(session = %self.id, "Destroying playback session");
        self.detach_media();
        self.change_provider(None);
        self.completion_pending = false;
    }

    // ========================================================================
    // Event Translation
    // ========================================================================

    /// Run one turn: settle a pending completion, then translate every
    /// provider event published since the last turn.
    pub fn process_events(&mut self) -> SessionTurn {
        if self.settle_completion() {
            self.turn.handled += 1;
        }
        while let Some(event) = self.next_provider_event() {
            self.turn.handled += 1;
            self.handle_provider_event(event);
        }
        std::mem::take(&mut self.turn)
    }

    fn next_provider_event(&mut self) -> Option<ProviderEvent> {
        loop {
            let receiver = self.receiver.as_mut()?;
            match receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(session = %self.id, missed, "Provider events dropped");
                }
                Err(TryRecvError::Closed) => {
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    fn apply_provider_state(&mut self, raw: ProviderState) {
        let old_raw = std::mem::replace(&mut self.raw_state, raw);
        self.qoe.on_raw_state(old_raw, raw);
        if old_raw != raw {
            if let Some(notification) = substate_notification(raw) {
                self.publish(notification);
            }
        }
        self.set_state(exposed_state(raw));
    }

    fn set_state(&mut self, new_state: PlayerState) {
        if new_state == self.state {
            return;
        }
        let old_state = std::mem::replace(&mut self.state, new_state);
        debug!(session = %self.id, from = %old_state, to = %new_state, "State changed");
        self.turn.entered.push(new_state);
        self.publish(PlayerEvent::StateChanged {
            old_state,
            new_state,
        });

        if new_state == PlayerState::Playing {
            if let Some(load_time_ms) = self.qoe.on_playing() {
                self.publish(PlayerEvent::ProviderFirstFrame { load_time_ms });
            }
        }
    }

    fn update_duration(&mut self, duration: Option<f64>) {
        let Some(duration) = duration.filter(|d| !d.is_nan()) else {
            return;
        };
        self.duration = duration;
        let min_dvr_window = self.current_item().and_then(|item| item.min_dvr_window);
        let stream_type = StreamType::from_duration(duration, min_dvr_window);
        if stream_type != self.stream_type {
            self.set_stream_type(stream_type);
        }
    }

    fn handle_provider_event(&mut self, event: ProviderEvent) {
        match event {
            ProviderEvent::StateChanged { new_state, .. } => {
                self.apply_provider_state(new_state);
            }
            ProviderEvent::Time { position, duration } => {
                self.position = position;
                self.update_duration(duration);
                self.publish(PlayerEvent::MediaTime {
                    position,
                    duration: self.duration,
                });
            }
            ProviderEvent::Buffer {
                buffer_percent,
                duration,
            } => {
                self.buffer_percent = buffer_percent;
                self.update_duration(duration);
                self.publish(PlayerEvent::MediaBuffer {
                    buffer_percent,
                    duration: self.duration,
                });
            }
            ProviderEvent::BufferFull => {
                self.turn.buffer_full = true;
                if self.play_attempt {
                    if let Err(e) = self.play() {
                        debug!(session = %self.id, error = %e, "Play after buffering failed");
                    }
                } else {
                    self.play_on_attempt = true;
                }
                let rate = self.default_playback_rate;
                self.set_playback_rate(rate);
                self.publish(PlayerEvent::BufferFull);
            }
            ProviderEvent::Meta {
                duration,
                width,
                height,
            } => {
                self.update_duration(duration);
                self.publish(PlayerEvent::MediaMeta {
                    duration,
                    width,
                    height,
                });
            }
            ProviderEvent::Seek { position, offset } => {
                self.publish(PlayerEvent::MediaSeek { position, offset });
            }
            ProviderEvent::Seeked => self.publish(PlayerEvent::MediaSeeked),
            ProviderEvent::Levels {
                levels,
                current_quality,
            } => {
                self.quality_levels = levels.clone();
                self.track_quality(current_quality);
                self.publish(PlayerEvent::Levels {
                    levels,
                    current_quality,
                });
                self.apply_preferred_quality();
            }
            ProviderEvent::LevelChanged {
                levels,
                current_quality,
            } => {
                self.quality_levels = levels.clone();
                self.track_quality(current_quality);
                self.persist_quality(current_quality);
                self.publish(PlayerEvent::LevelChanged {
                    levels,
                    current_quality,
                });
            }
            ProviderEvent::AudioTracks {
                tracks,
                current_track,
            } => {
                self.audio_tracks = tracks.clone();
                self.track_audio(current_track);
                self.publish(PlayerEvent::AudioTracks {
                    tracks,
                    current_track,
                });
            }
            ProviderEvent::AudioTrackChanged {
                tracks,
                current_track,
            } => {
                self.audio_tracks = tracks.clone();
                self.track_audio(current_track);
                self.publish(PlayerEvent::AudioTrackChanged {
                    tracks,
                    current_track,
                });
            }
            ProviderEvent::SubtitlesTrackChanged {
                tracks,
                current_track,
            } => {
                self.persist_subtitles_track(current_track, tracks, false);
            }
            ProviderEvent::Volume { volume } => {
                if self.volume != volume {
                    self.volume = volume;
                    self.publish(PlayerEvent::Volume { volume });
                }
            }
            ProviderEvent::Mute { mute } => {
                // A muted autostart is transient and never overrides the
                // user's setting.
                if !self.autostart_muted {
                    self.mute = mute;
                    self.publish(PlayerEvent::Mute { mute });
                }
            }
            ProviderEvent::RateChange { playback_rate } => {
                self.playback_rate = playback_rate;
                self.publish(PlayerEvent::PlaybackRateChanged { playback_rate });
            }
            ProviderEvent::MediaType { media_type } => {
                if self.media_type != Some(media_type) {
                    self.media_type = Some(media_type);
                    self.publish(PlayerEvent::MediaType { media_type });
                }
            }
            ProviderEvent::Complete => {
                self.before_complete = true;
                self.completion_pending = true;
                debug!(session = %self.id, "Media reached its end");
                self.publish(PlayerEvent::BeforeComplete);
            }
            ProviderEvent::Error { message } => {
                self.report(PlaybackError::ProviderRuntime(message));
                self.apply_provider_state(ProviderState::Error);
            }
            ProviderEvent::Click => self.publish(PlayerEvent::ProviderClick),
            ProviderEvent::FullscreenChange { fullscreen } => {
                if self.fullscreen != fullscreen {
                    self.fullscreen = fullscreen;
                    self.publish(PlayerEvent::Fullscreen { fullscreen });
                }
            }
            ProviderEvent::AutoplayFailed => {
                self.autostart_failed = true;
                if self.state == PlayerState::Playing {
                    self.raw_state = ProviderState::Paused;
                    self.set_state(PlayerState::Paused);
                }
                self.publish(PlayerEvent::AutoplayFailed);
            }
        }
    }
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.id)
            .field("provider", &self.provider_kind())
            .field("attached", &self.attached)
            .field("state", &self.state)
            .field("item_index", &self.item_index)
            .field("items", &self.playlist.len())
            .finish()
    }
}
