//! # Player Controller
//!
//! Façade over one player: the shared provider registry, the primary
//! playback session and the instream controller. Host control calls go
//! through here and are routed to the secondary session while an instream
//! episode is active.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = PlayerConfig::builder().id("player-1").build()?;
//! let mut player = PlayerController::with_builtin_providers(config)?;
//! let mut events = player.subscribe();
//!
//! player.load_playlist(vec![PlaylistItem::from_file("https://cdn.example.com/a.mp4")])?;
//! player.load_providers(&loader).await;
//! player.play()?;
//!
//! loop {
//!     player.pump();
//!     for event in events.drain() {
//!         // render
//!     }
//! }
//! ```

use bridge_traits::playback::{MediaContainer, PlaylistItem, ProviderLoader};
use core_runtime::config::PlayerConfig;
use core_runtime::events::{EventStream, PlayerEvent, PlayerState};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{InstreamItemOptions, InstreamOptions};
use crate::error::{PlaybackError, Result};
use crate::instream::{InstreamController, InstreamEvent};
use crate::providers::builtin_registry;
use crate::registry::ProviderRegistry;
use crate::session::{ItemChange, PlaybackSession, SessionSettings};

pub struct PlayerController {
    config: PlayerConfig,
    registry: Arc<ProviderRegistry>,
    primary: PlaybackSession,
    instream: InstreamController,
    before_play: bool,
}

impl PlayerController {
    pub fn new(config: PlayerConfig, registry: Arc<ProviderRegistry>) -> Result<Self> {
        config.validate()?;

        let primary = PlaybackSession::new(registry.clone(), SessionSettings::from_config(&config));
        let instream = InstreamController::new(
            registry.clone(),
            config.platform.clone(),
            config.event_buffer_size,
        );
        info!(player = %config.id, providers = ?registry.kinds(), "Player created");

        Ok(Self {
            config,
            registry,
            primary,
            instream,
            before_play: false,
        })
    }

    /// Controller over the html5, flash and youtube descriptors, with the
    /// configured primary provider promoted.
    pub fn with_builtin_providers(config: PlayerConfig) -> Result<Self> {
        let registry = builtin_registry(&config.platform, config.primary_provider.as_ref());
        Self::new(config, Arc::new(registry))
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn primary(&self) -> &PlaybackSession {
        &self.primary
    }

    pub fn instream(&self) -> &InstreamController {
        &self.instream
    }

    /// Primary session events.
    pub fn subscribe(&self) -> EventStream<PlayerEvent> {
        self.primary.subscribe()
    }

    pub fn subscribe_instream(&self) -> EventStream<InstreamEvent> {
        self.instream.subscribe()
    }

    /// Whether a play request is waiting for the primary to start.
    pub fn check_before_play(&self) -> bool {
        self.before_play
    }

    /// State of whichever session currently plays.
    pub fn state(&self) -> PlayerState {
        match self.instream.secondary() {
            Some(secondary) => secondary.state(),
            None => self.primary.state(),
        }
    }

    // ========================================================================
    // Playlist
    // ========================================================================

    /// Replace the primary playlist. An active episode is torn down first.
    pub fn load_playlist(&mut self, items: Vec<PlaylistItem>) -> Result<()> {
        if self.instream.is_active() {
            self.instream.destroy(false, &mut self.primary);
        }
        self.before_play = false;
        self.primary.set_playlist(items)?;
        if self.config.autostart {
            self.play()?;
        }
        Ok(())
    }

    /// Fetch the factories the current playlist needs, then instantiate a
    /// provider the primary selected before its factory was available.
    pub async fn load_providers(&mut self, loader: &dyn ProviderLoader) -> Vec<PlaybackError> {
        let mut failures = self
            .registry
            .load_required(self.primary.playlist(), loader)
            .await;
        for failure in &failures {
            self.primary.publish(PlayerEvent::Error {
                kind: failure.kind(),
                message: failure.to_string(),
            });
        }
        if let Err(e) = self.primary.resolve_pending_provider() {
            failures.push(e);
        }
        failures
    }

    pub fn set_item(&mut self, index: usize) -> Result<ItemChange> {
        if self.instream.is_active() {
            return Err(PlaybackError::InstreamAlreadyActive);
        }
        if let Err(e) = self.primary.stop() {
            debug!(error = %e, "Stop before item change failed");
        }
        let change = self.primary.set_item(index)?;
        self.begin_playback()?;
        Ok(change)
    }

    pub fn next(&mut self) -> Result<ItemChange> {
        let next = self.primary.item_index() + 1;
        self.set_item(next)
    }

    // ========================================================================
    // Playback Control
    // ========================================================================

    fn begin_playback(&mut self) -> Result<()> {
        self.before_play = true;
        self.primary.publish(PlayerEvent::BeforePlay);
        if let Err(e) = self.primary.load() {
            self.before_play = false;
            return Err(e);
        }
        Ok(())
    }

    /// Idle, complete or failed items load from the start behind the
    /// before-play gate; anything else resumes.
    pub fn play(&mut self) -> Result<()> {
        if self.instream.is_active() {
            self.instream.play()?;
            return Ok(());
        }
        match self.primary.state() {
            PlayerState::Idle | PlayerState::Complete | PlayerState::Error => self.begin_playback(),
            _ => self.primary.play(),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.instream.is_active() {
            self.instream.pause()?;
            return Ok(());
        }
        self.primary.pause()
    }

    pub fn stop(&mut self) -> Result<()> {
        if self.instream.is_active() && !self.instream.stop(&mut self.primary)? {
            return Ok(());
        }
        self.before_play = false;
        self.primary.stop()
    }

    pub fn seek(&mut self, position: f64) -> Result<()> {
        if self.instream.is_active() {
            self.instream.seek(position)?;
            return Ok(());
        }
        self.primary.seek(position)
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.instream.set_volume(&mut self.primary, volume);
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.instream.set_mute(&mut self.primary, mute);
    }

    pub fn set_playback_rate(&mut self, rate: f64) -> Result<()> {
        if self.instream.is_active() {
            return self.instream.set_playback_rate(rate);
        }
        self.primary.set_playback_rate(rate);
        Ok(())
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.primary.set_fullscreen(fullscreen);
        self.instream.set_fullscreen(fullscreen);
    }

    /// Render target for the primary session. It moves to the secondary
    /// session during a desktop instream episode.
    pub fn set_container(&mut self, container: MediaContainer) {
        self.primary.set_container(container);
    }

    pub fn set_current_quality(&mut self, index: usize) {
        self.primary.set_current_quality(index);
    }

    pub fn set_current_audio_track(&mut self, index: usize) {
        self.primary.set_current_audio_track(index);
    }

    pub fn set_subtitles_track(&mut self, index: usize) {
        self.primary.set_subtitles_track(index);
    }

    // ========================================================================
    // Instream
    // ========================================================================

    pub fn start_instream(&mut self) -> Result<()> {
        self.instream.start(&mut self.primary, self.before_play)
    }

    pub fn load_instream(
        &mut self,
        items: Vec<PlaylistItem>,
        options: InstreamOptions,
        item_options: Vec<InstreamItemOptions>,
    ) -> Result<()> {
        self.instream
            .load(&mut self.primary, items, options, item_options)
    }

    pub fn skip_ad(&mut self) -> Result<()> {
        self.instream.skip(&mut self.primary)
    }

    pub fn instream_click(&mut self) -> Result<()> {
        let controls = self.config.controls;
        self.instream.click(controls)
    }

    pub fn destroy_instream(&mut self) -> bool {
        self.instream.destroy(false, &mut self.primary)
    }

    // ========================================================================
    // Turn
    // ========================================================================

    /// Run one cooperative turn and return the amount of work done; zero
    /// means nothing was pending.
    pub fn pump(&mut self) -> usize {
        let turn = self.primary.process_events();
        let mut work = turn.handled;

        if self.before_play
            && (turn.entered(PlayerState::Playing)
                || turn.entered(PlayerState::Error)
                || turn.error.is_some())
        {
            debug!("Before-play gate closed");
            self.before_play = false;
        }
        if turn.completed {
            self.advance_after_complete();
            work += 1;
        }

        work += self.instream.process_events(&mut self.primary);
        work += self.instream.run_pending(&mut self.primary);
        work
    }

    fn advance_after_complete(&mut self) {
        let next = self.primary.item_index() + 1;
        let last = next >= self.primary.playlist().len();

        if last && !self.config.repeat {
            info!("Playlist complete");
            self.primary.publish(PlayerEvent::PlaylistComplete);
            if let Err(e) = self.primary.stop() {
                debug!(error = %e, "Stop after playlist completion failed");
            }
            return;
        }

        match self.primary.set_item(next) {
            Ok(_) => {
                if let Err(e) = self.begin_playback() {
                    debug!(error = %e, "Next item failed to load");
                }
            }
            Err(e) => debug!(error = %e, "Next item could not be selected"),
        }
    }
}

impl std::fmt::Debug for PlayerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerController")
            .field("player", &self.config.id)
            .field("primary", &self.primary)
            .field("instream", &self.instream)
            .field("before_play", &self.before_play)
            .finish()
    }
}
