//! # Instream Controller
//!
//! Runs a secondary playlist (an ad pod, typically) in place of the primary
//! content and puts the primary back exactly as it was afterwards.
//!
//! ## Episode Lifecycle
//!
//! ```text
//! start ──▶ load ──▶ item 0 ──▶ item 1 ──▶ … ──▶ playlist complete ──▶ destroy(complete)
//!   │         │          │                                              ▲
//!   │         └── error ─┴──────────── stop / destroy ──────────────────┴─ destroy(destroyed)
//!   └─ primary detached, position and intent captured
//! ```
//!
//! While an episode is active the primary session is detached: its provider
//! keeps running but nothing it publishes is observed, so the primary's
//! state is frozen. [`InstreamController::destroy`] always runs the full
//! restoration sequence, whatever ended the episode.
//!
//! ## Events
//!
//! Every event of an episode, including those translated by the secondary
//! session, is published on the controller's own bus wrapped in an
//! [`InstreamEvent`] carrying the episode tag. Item advances and playlist
//! completion go through a [`TaskQueue`] that runs at the end of the turn,
//! so they are observed after the completion events that caused them.

use bridge_traits::platform::PlatformInfo;
use bridge_traits::playback::PlaylistItem;
use core_runtime::events::{DestroyReason, EventBus, EventStream, PlayerEvent, PlayerState};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{InstreamItemOptions, InstreamOptions, Seekable};
use crate::error::{PlaybackError, Result};
use crate::registry::ProviderRegistry;
use crate::scheduler::{TaskHandle, TaskQueue};
use crate::session::PlaybackSession;

/// An event of the current episode, tagged with the episode's tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstreamEvent {
    pub tag: Option<String>,
    pub event: PlayerEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InstreamTask {
    AnnounceItem { index: usize },
    CompletePlaylist,
}

/// Primary-session context captured when the episode starts.
#[derive(Debug, Clone)]
struct SavedPrimary {
    position: f64,
    /// `Playing` resumes on teardown; `Idle` stops.
    intent: PlayerState,
    item: Option<PlaylistItem>,
    container_moved: bool,
}

struct Episode {
    session: PlaybackSession,
    stream: EventStream<PlayerEvent>,
    saved: SavedPrimary,
    items: Vec<PlaylistItem>,
    item_options: Vec<InstreamItemOptions>,
    base_options: InstreamOptions,
    options: InstreamOptions,
    index: usize,
    loaded: bool,
    pending: Option<TaskHandle>,
}

impl Episode {
    fn options_for(&self, index: usize) -> InstreamOptions {
        match self.item_options.get(index) {
            Some(overrides) => overrides.merged_over(&self.base_options),
            None => self.base_options.clone(),
        }
    }

    fn tagged(&self, event: PlayerEvent) -> InstreamEvent {
        InstreamEvent {
            tag: self.options.tag.clone(),
            event,
        }
    }
}

/// Playlist-level events of the secondary session are replaced by the
/// controller's own item and completion events.
fn forwarded(event: &PlayerEvent) -> bool {
    !matches!(
        event,
        PlayerEvent::PlaylistLoaded { .. }
            | PlayerEvent::PlaylistItem { .. }
            | PlayerEvent::PlaylistComplete
    )
}

pub struct InstreamController {
    registry: Arc<ProviderRegistry>,
    platform: PlatformInfo,
    events: EventBus<InstreamEvent>,
    tasks: TaskQueue<InstreamTask>,
    episode: Option<Episode>,
}

impl InstreamController {
    pub fn new(registry: Arc<ProviderRegistry>, platform: PlatformInfo, event_buffer_size: usize) -> Self {
        Self {
            registry,
            platform,
            events: EventBus::new(event_buffer_size.max(1)),
            tasks: TaskQueue::new(),
            episode: None,
        }
    }

    pub fn events(&self) -> &EventBus<InstreamEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream<InstreamEvent> {
        EventStream::new(self.events.subscribe())
    }

    pub fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    pub fn secondary(&self) -> Option<&PlaybackSession> {
        self.episode.as_ref().map(|ep| &ep.session)
    }

    /// Options in force for the current item; restrictive until the first
    /// load.
    pub fn options(&self) -> Option<&InstreamOptions> {
        self.episode.as_ref().map(|ep| &ep.options)
    }

    pub fn item_index(&self) -> Option<usize> {
        self.episode.as_ref().map(|ep| ep.index)
    }

    pub fn item_count(&self) -> usize {
        self.episode.as_ref().map(|ep| ep.items.len()).unwrap_or(0)
    }

    pub fn is_loaded(&self) -> bool {
        self.episode.as_ref().map(|ep| ep.loaded).unwrap_or(false)
    }

    /// Primary position captured at start.
    pub fn saved_position(&self) -> Option<f64> {
        self.episode.as_ref().map(|ep| ep.saved.position)
    }

    /// Primary state restored on teardown.
    pub fn saved_intent(&self) -> Option<PlayerState> {
        self.episode.as_ref().map(|ep| ep.saved.intent)
    }

    /// Whether the current item has passed its skip offset.
    pub fn can_skip(&self) -> bool {
        self.episode
            .as_ref()
            .and_then(|ep| {
                ep.options
                    .skip_offset
                    .map(|offset| ep.session.position() >= offset)
            })
            .unwrap_or(false)
    }

    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    fn active_mut(&mut self) -> Result<&mut Episode> {
        self.episode.as_mut().ok_or(PlaybackError::InstreamNotActive)
    }

    fn send(&self, event: PlayerEvent) {
        if let Some(ep) = &self.episode {
            self.events.publish(ep.tagged(event));
        }
    }

    fn send_error(&self, error: &PlaybackError) {
        warn!(error = %error, "Instream error");
        self.send(PlayerEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Begin an episode.
    ///
    /// The primary is detached first, then its position and the state to
    /// restore are captured. A playing primary is paused. `before_play`
    /// marks a start requested from inside the play gate (a pre-roll).
    pub fn start(&mut self, primary: &mut PlaybackSession, before_play: bool) -> Result<()> {
        if self.episode.is_some() {
            return Err(PlaybackError::InstreamAlreadyActive);
        }

        primary.detach_media();
        let old_position = primary.provider_position();
        let completed = primary.check_complete();

        let (position, intent) = if before_play || (old_position == 0.0 && !completed) {
            (0.0, PlayerState::Playing)
        } else if completed || primary.state() == PlayerState::Idle {
            (old_position, PlayerState::Idle)
        } else {
            (old_position, PlayerState::Playing)
        };

        if intent == PlayerState::Playing {
            if let Err(e) = primary.pause() {
                debug!(error = %e, "Primary could not be paused");
            }
        }

        let settings =
            primary
                .settings()
                .for_instream(primary.volume(), primary.mute(), primary.autostart_muted());
        let mut session = PlaybackSession::new(self.registry.clone(), settings);

        let container_moved = !self.platform.is_mobile();
        if container_moved {
            if let Some(container) = primary.take_container() {
                session.set_container(container);
            }
        } else if let Some(container) = primary.container().cloned() {
            session.set_container(container);
        }

        let stream = session.subscribe().filter(forwarded);
        info!(
            position,
            intent = %intent,
            pre_roll = before_play,
            post_roll = completed,
            "Instream episode started"
        );

        self.episode = Some(Episode {
            session,
            stream,
            saved: SavedPrimary {
                position,
                intent,
                item: primary.current_item().cloned(),
                container_moved,
            },
            items: Vec::new(),
            item_options: Vec::new(),
            base_options: InstreamOptions::default(),
            options: InstreamOptions::restrictive(),
            index: 0,
            loaded: false,
            pending: None,
        });
        Ok(())
    }

    /// Load the secondary playlist and start its first item.
    ///
    /// `item_options[i]` overrides `options` for item `i`. On a denylisted
    /// platform an error is reported and the episode is left for the caller
    /// to destroy.
    pub fn load(
        &mut self,
        primary: &mut PlaybackSession,
        items: Vec<PlaylistItem>,
        options: InstreamOptions,
        item_options: Vec<InstreamItemOptions>,
    ) -> Result<()> {
        if self.episode.is_none() {
            return Err(PlaybackError::InstreamNotActive);
        }
        if !self.platform.instream_supported() {
            let error = PlaybackError::PlatformUnsupported(
                "Error loading instream: Cannot play instream on Android 2.3".to_string(),
            );
            self.send_error(&error);
            return Err(error);
        }
        options.validate()?;
        for overrides in &item_options {
            overrides.merged_over(&options).validate()?;
        }
        if items.is_empty() {
            let error = PlaybackError::NoPlayableSource;
            self.send_error(&error);
            self.destroy(false, primary);
            return Err(error);
        }

        let ep = self.active_mut()?;
        ep.items = items;
        ep.item_options = item_options;
        ep.base_options = options;
        ep.index = 0;
        ep.options = ep.options_for(0);
        debug!(items = ep.items.len(), "Loading instream playlist");

        self.send(PlayerEvent::PlaylistItem {
            index: 0,
            repeat: false,
        });
        self.load_current(primary)
    }

    /// Load a single item.
    pub fn load_item(
        &mut self,
        primary: &mut PlaybackSession,
        item: PlaylistItem,
        options: InstreamOptions,
    ) -> Result<()> {
        self.load(primary, vec![item], options, Vec::new())
    }

    fn load_current(&mut self, primary: &mut PlaybackSession) -> Result<()> {
        let ep = self.active_mut()?;
        let item = ep.items[ep.index].clone();
        let result = ep
            .session
            .set_playlist(vec![item])
            .and_then(|_| ep.session.load());
        ep.loaded = true;

        if let Err(error) = result {
            self.forward_secondary();
            self.destroy(false, primary);
            return Err(error);
        }
        Ok(())
    }

    /// Current item finished or was skipped.
    fn complete_item(&mut self, primary: &mut PlaybackSession) {
        let Some(ep) = self.episode.as_mut() else {
            return;
        };

        if ep.index + 1 < ep.items.len() {
            ep.index += 1;
            ep.options = ep.options_for(ep.index);
            let index = ep.index;
            debug!(index, "Advancing instream playlist");
            if self.load_current(primary).is_err() {
                return;
            }
            if let Some(ep) = self.episode.as_mut() {
                ep.pending = Some(self.tasks.defer(InstreamTask::AnnounceItem { index }));
            }
        } else {
            ep.pending = Some(self.tasks.defer(InstreamTask::CompletePlaylist));
        }
    }

    /// End the episode and restore the primary.
    ///
    /// Restoration order: cancel deferred work, detach the secondary,
    /// reattach the primary, reload the primary item at the saved position
    /// (or stop it when it was idle), announce the teardown, resume the
    /// primary if it was playing. Returns `false` with no active episode.
    pub fn destroy(&mut self, completed: bool, primary: &mut PlaybackSession) -> bool {
        let Some(ep) = self.episode.as_mut() else {
            return false;
        };

        if let Some(handle) = ep.pending.take() {
            self.tasks.cancel(handle);
        }
        self.tasks.clear();

        ep.session.detach_media();
        if ep.saved.container_moved {
            if let Some(container) = ep.session.take_container() {
                primary.set_container(container);
            }
        }

        primary.attach_media();
        let restored = match (ep.saved.intent, ep.saved.item.clone()) {
            (PlayerState::Idle, _) | (_, None) => primary.stop(),
            (_, Some(item)) => primary.load_item(item.with_starttime(ep.saved.position)),
        };
        if let Err(e) = restored {
            debug!(error = %e, "Primary restore reported an error");
        }

        for event in ep.stream.drain() {
            self.events.publish(ep.tagged(event));
        }
        let reason = DestroyReason::from_completed(completed);
        self.events
            .publish(ep.tagged(PlayerEvent::InstreamDestroyed { reason }));

        if ep.saved.intent == PlayerState::Playing {
            if let Err(e) = primary.play() {
                debug!(error = %e, "Primary could not resume");
            }
        }

        ep.session.destroy();
        info!(reason = reason.as_str(), "Instream episode destroyed");
        self.episode = None;
        true
    }

    // ========================================================================
    // Turn Processing
    // ========================================================================

    fn forward_secondary(&mut self) -> usize {
        let Some(ep) = self.episode.as_mut() else {
            return 0;
        };
        let events = ep.stream.drain();
        let forwarded = events.len();
        for event in events {
            self.events.publish(ep.tagged(event));
        }
        forwarded
    }

    /// Translate secondary provider events and react to completion and
    /// errors. Returns the amount of work done.
    pub fn process_events(&mut self, primary: &mut PlaybackSession) -> usize {
        let Some(ep) = self.episode.as_mut() else {
            return 0;
        };
        let turn = ep.session.process_events();
        let mut work = turn.handled + self.forward_secondary();

        if let Some(error) = turn.error {
            debug!(error = %error, "Secondary session failed");
            self.destroy(false, primary);
            return work.max(1);
        }
        if turn.completed {
            self.complete_item(primary);
            work += 1;
        }
        work
    }

    /// Run tasks deferred during earlier turns.
    pub fn run_pending(&mut self, primary: &mut PlaybackSession) -> usize {
        let batch = self.tasks.take_batch();
        let ran = batch.len();

        for (handle, task) in batch {
            let Some(ep) = self.episode.as_mut() else {
                break;
            };
            if ep.pending == Some(handle) {
                ep.pending = None;
            }
            match task {
                InstreamTask::AnnounceItem { index } => {
                    self.send(PlayerEvent::PlaylistItem {
                        index,
                        repeat: false,
                    });
                }
                InstreamTask::CompletePlaylist => {
                    self.send(PlayerEvent::PlaylistComplete);
                    self.destroy(true, primary);
                }
            }
        }
        ran
    }

    // ========================================================================
    // Controls
    // ========================================================================

    /// Returns `Ok(false)` when the current options forbid pausing.
    pub fn play(&mut self) -> Result<bool> {
        let ep = self.active_mut()?;
        if !ep.options.pausable {
            return Ok(false);
        }
        ep.session.play()?;
        Ok(true)
    }

    pub fn pause(&mut self) -> Result<bool> {
        let ep = self.active_mut()?;
        if !ep.options.pausable {
            return Ok(false);
        }
        ep.session.pause()?;
        Ok(true)
    }

    /// Tear the episode down when stopping is allowed. The caller stops the
    /// primary afterwards.
    pub fn stop(&mut self, primary: &mut PlaybackSession) -> Result<bool> {
        let stoppable = self.active_mut()?.options.stoppable;
        if !stoppable {
            return Ok(false);
        }
        self.destroy(false, primary);
        Ok(true)
    }

    pub fn seek(&mut self, position: f64) -> Result<bool> {
        let ep = self.active_mut()?;
        let allowed = match ep.options.seekable {
            Seekable::Never => false,
            Seekable::Always => true,
            Seekable::Backwards => ep.session.position() > position,
        };
        if !allowed {
            return Ok(false);
        }
        ep.session.seek(position)?;
        Ok(true)
    }

    /// Skip the current item once its offset has passed.
    pub fn skip(&mut self, primary: &mut PlaybackSession) -> Result<()> {
        if self.episode.is_none() {
            return Err(PlaybackError::InstreamNotActive);
        }
        if !self.can_skip() {
            return Err(PlaybackError::SkipNotAvailable);
        }
        info!("Instream item skipped");
        self.send(PlayerEvent::AdSkipped);
        if let Some(ep) = self.episode.as_mut() {
            ep.session.clear_completion();
        }
        self.complete_item(primary);
        Ok(())
    }

    /// A click on the instream surface. Paused items resume only when
    /// controls are shown; anything else pauses.
    pub fn click(&mut self, has_controls: bool) -> Result<()> {
        let ep = self.active_mut()?;
        let event = ep.tagged(PlayerEvent::InstreamClick { has_controls });
        self.events.publish(event);

        let ep = self.active_mut()?;
        if ep.session.state() == PlayerState::Paused {
            if has_controls {
                ep.session.play()?;
            }
        } else {
            ep.session.pause()?;
        }
        Ok(())
    }

    /// Volume set during an episode applies to both sessions.
    pub fn set_volume(&mut self, primary: &mut PlaybackSession, volume: f64) {
        if let Some(ep) = self.episode.as_mut() {
            ep.session.set_volume(volume);
        }
        primary.set_volume(volume);
    }

    pub fn set_mute(&mut self, primary: &mut PlaybackSession, mute: bool) {
        if let Some(ep) = self.episode.as_mut() {
            ep.session.set_mute(mute);
        }
        primary.set_mute(mute);
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        self.active_mut()?.session.set_playback_rate(rate);
        Ok(())
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        if let Some(ep) = self.episode.as_mut() {
            ep.session.set_fullscreen(fullscreen);
        }
    }
}

impl std::fmt::Debug for InstreamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstreamController")
            .field("active", &self.is_active())
            .field("item_index", &self.item_index())
            .field("item_count", &self.item_count())
            .field("pending_tasks", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_events_are_not_forwarded() {
        assert!(!forwarded(&PlayerEvent::PlaylistItem {
            index: 0,
            repeat: false
        }));
        assert!(!forwarded(&PlayerEvent::PlaylistComplete));
        assert!(forwarded(&PlayerEvent::MediaComplete));
        assert!(forwarded(&PlayerEvent::BufferFull));
    }
}
