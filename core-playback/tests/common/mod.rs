//! Scripted provider backend shared by the integration tests.
//!
//! `FakeProvider` behaves like a well-mannered media element: `load` moves to
//! the loading substate and reports a full buffer straight away, `play` and
//! `pause` publish their state changes, and every control call is recorded
//! so tests can assert what the core asked for. Tests keep a [`FakeHandle`]
//! to inspect an instance or make it publish events after it has been boxed
//! into a session.

#![allow(dead_code)]

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::{
    ManualClock, MediaContainer, MediaProvider, PlatformInfo, PlaylistItem, ProviderEvent,
    ProviderEventReceiver, ProviderFactory, ProviderKind, ProviderOptions, ProviderState, Source,
};
use core_playback::providers;
use core_playback::{PlaybackSession, PlayerController, ProviderRegistry, SessionSettings};
use core_runtime::config::{PlayerConfig, PlayerConfigBuilder};
use core_runtime::events::{EventStream, PlayerEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

// ============================================================================
// Recorded Calls
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Init(String),
    Load { file: String, starttime: f64 },
    Play,
    Pause,
    Stop,
    Seek(f64),
    Volume(u8),
    Mute(bool),
    Rate(f64),
    Attach,
    Detach,
    SetContainer(String),
    Remove,
    SetState(ProviderState),
    Quality(usize),
    AudioTrack(usize),
    Subtitles(usize),
    Fullscreen(bool),
    Destroy,
}

struct Inner {
    state: ProviderState,
    position: f64,
    container: Option<String>,
    calls: Vec<Call>,
    fail_next_load: Option<String>,
}

// ============================================================================
// Handle
// ============================================================================

/// Test-side view of one provider instance.
#[derive(Clone)]
pub struct FakeHandle {
    kind: ProviderKind,
    options: ProviderOptions,
    inner: Arc<Mutex<Inner>>,
    sender: broadcast::Sender<ProviderEvent>,
}

impl FakeHandle {
    fn new(kind: ProviderKind, options: ProviderOptions) -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            kind,
            options,
            inner: Arc::new(Mutex::new(Inner {
                state: ProviderState::Idle,
                position: 0.0,
                container: None,
                calls: Vec::new(),
                fail_next_load: None,
            })),
            sender,
        }
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.inner.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn loads(&self) -> Vec<(String, f64)> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Load { file, starttime } => Some((file.clone(), *starttime)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn state(&self) -> ProviderState {
        self.inner.lock().state
    }

    pub fn position(&self) -> f64 {
        self.inner.lock().position
    }

    pub fn container(&self) -> Option<String> {
        self.inner.lock().container.clone()
    }

    /// Move the playhead without telling anyone.
    pub fn set_position(&self, position: f64) {
        self.inner.lock().position = position;
    }

    /// Move the playhead and publish a time update.
    pub fn time(&self, position: f64, duration: Option<f64>) {
        self.set_position(position);
        self.emit(ProviderEvent::Time { position, duration });
    }

    pub fn complete(&self) {
        self.emit(ProviderEvent::Complete);
    }

    pub fn fail_next_load(&self, message: &str) {
        self.inner.lock().fail_next_load = Some(message.to_string());
    }

    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.sender.send(event);
    }

    fn record(&self, call: Call) {
        self.inner.lock().calls.push(call);
    }

    fn transition(&self, new_state: ProviderState) {
        let old_state = std::mem::replace(&mut self.inner.lock().state, new_state);
        if old_state != new_state {
            self.emit(ProviderEvent::StateChanged {
                old_state,
                new_state,
            });
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

pub struct FakeProvider {
    handle: FakeHandle,
    container: Option<MediaContainer>,
}

impl MediaProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.handle.kind.clone()
    }

    fn subscribe(&self) -> ProviderEventReceiver {
        self.handle.sender.subscribe()
    }

    fn init(&mut self, item: &PlaylistItem) {
        let file = item.first_source().map(|s| s.file.clone()).unwrap_or_default();
        self.handle.record(Call::Init(file));
    }

    fn load(&mut self, item: &PlaylistItem) -> Result<()> {
        let file = item.first_source().map(|s| s.file.clone()).unwrap_or_default();
        self.handle.record(Call::Load {
            file,
            starttime: item.starttime,
        });
        if let Some(message) = self.handle.inner.lock().fail_next_load.take() {
            return Err(BridgeError::Media(message));
        }
        self.handle.set_position(item.starttime);
        self.handle.transition(ProviderState::Loading);
        self.handle.emit(ProviderEvent::BufferFull);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.handle.record(Call::Play);
        self.handle.transition(ProviderState::Playing);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.handle.record(Call::Pause);
        self.handle.transition(ProviderState::Paused);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.handle.record(Call::Stop);
        self.handle.set_position(0.0);
        self.handle.transition(ProviderState::Idle);
        Ok(())
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        self.handle.record(Call::Seek(position));
        let from = self.handle.position();
        self.handle.set_position(position);
        self.handle.emit(ProviderEvent::Seek {
            position: from,
            offset: position,
        });
        Ok(())
    }

    fn volume(&mut self, volume: u8) {
        self.handle.record(Call::Volume(volume));
    }

    fn mute(&mut self, mute: bool) {
        self.handle.record(Call::Mute(mute));
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.handle.record(Call::Rate(rate));
    }

    fn attach_media(&mut self) {
        self.handle.record(Call::Attach);
    }

    fn detach_media(&mut self) {
        self.handle.record(Call::Detach);
    }

    fn container(&self) -> Option<&MediaContainer> {
        self.container.as_ref()
    }

    fn set_container(&mut self, container: MediaContainer) {
        self.handle.record(Call::SetContainer(container.id.clone()));
        self.handle.inner.lock().container = Some(container.id.clone());
        self.container = Some(container);
    }

    fn remove(&mut self) -> Option<MediaContainer> {
        self.handle.record(Call::Remove);
        self.handle.inner.lock().container = None;
        self.container.take()
    }

    fn set_state(&mut self, state: ProviderState) {
        self.handle.record(Call::SetState(state));
        self.handle.transition(state);
    }

    fn set_current_quality(&mut self, index: usize) {
        self.handle.record(Call::Quality(index));
    }

    fn set_current_audio_track(&mut self, index: usize) {
        self.handle.record(Call::AudioTrack(index));
    }

    fn set_subtitles_track(&mut self, index: usize) {
        self.handle.record(Call::Subtitles(index));
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.handle.record(Call::Fullscreen(fullscreen));
    }

    fn position(&self) -> f64 {
        self.handle.position()
    }

    fn destroy(&mut self) {
        self.handle.record(Call::Destroy);
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Creates fake instances and keeps a handle to each one, in creation order.
pub struct FakeFactory {
    kind: ProviderKind,
    instances: Mutex<Vec<FakeHandle>>,
}

impl FakeFactory {
    pub fn new(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            instances: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> usize {
        self.instances.lock().len()
    }

    /// Handle of the `n`th instance created.
    ///
    /// # Panics
    ///
    /// When fewer than `n + 1` instances exist.
    pub fn instance(&self, n: usize) -> FakeHandle {
        self.instances.lock()[n].clone()
    }

    pub fn last(&self) -> Option<FakeHandle> {
        self.instances.lock().last().cloned()
    }
}

impl ProviderFactory for FakeFactory {
    fn kind(&self) -> ProviderKind {
        self.kind.clone()
    }

    fn create(&self, options: &ProviderOptions) -> Box<dyn MediaProvider> {
        let handle = FakeHandle::new(self.kind.clone(), options.clone());
        self.instances.lock().push(handle.clone());
        Box::new(FakeProvider {
            handle,
            container: None,
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Registry over the html5 and youtube descriptors with fake factories
/// registered for both.
pub struct Fixture {
    pub registry: Arc<ProviderRegistry>,
    pub html5: Arc<FakeFactory>,
    pub youtube: Arc<FakeFactory>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        let fixture = Self::unloaded();
        fixture.registry.register_factory(fixture.html5.clone());
        fixture.registry.register_factory(fixture.youtube.clone());
        fixture
    }

    /// Same descriptors, no factories loaded yet.
    pub fn unloaded() -> Self {
        let platform = PlatformInfo::default();
        let registry = ProviderRegistry::new(vec![
            providers::html5(&platform),
            providers::youtube(),
        ]);
        Self {
            registry: Arc::new(registry),
            html5: FakeFactory::new(ProviderKind::html5()),
            youtube: FakeFactory::new(ProviderKind::youtube()),
            clock: Arc::new(ManualClock::default()),
        }
    }

    pub fn builder(&self) -> PlayerConfigBuilder {
        PlayerConfig::builder()
            .id("test-player")
            .clock(self.clock.clone())
    }

    pub fn config(&self) -> PlayerConfig {
        self.builder().build().expect("valid test config")
    }

    pub fn player(&self) -> PlayerController {
        self.player_with(self.config())
    }

    pub fn player_with(&self, config: PlayerConfig) -> PlayerController {
        PlayerController::new(config, self.registry.clone()).expect("player")
    }

    pub fn session(&self) -> PlaybackSession {
        PlaybackSession::new(self.registry.clone(), SessionSettings::from_config(&self.config()))
    }
}

pub fn item(file: &str) -> PlaylistItem {
    PlaylistItem::from_file(file)
}

pub fn youtube_item(id: &str) -> PlaylistItem {
    PlaylistItem::new(vec![Source::new(id).with_type("youtube")])
}

/// Pump until a turn does no work.
pub fn settle(player: &mut PlayerController) {
    for _ in 0..64 {
        if player.pump() == 0 {
            return;
        }
    }
    panic!("player never settled");
}

/// Run session turns until one is quiet.
pub fn settle_session(session: &mut PlaybackSession) {
    for _ in 0..64 {
        if session.process_events().is_quiet() {
            return;
        }
    }
    panic!("session never settled");
}

pub fn errors(events: &[PlayerEvent]) -> Vec<&PlayerEvent> {
    events
        .iter()
        .filter(|e| matches!(e, PlayerEvent::Error { .. }))
        .collect()
}

pub fn drain<E: Clone>(stream: &mut EventStream<E>) -> Vec<E> {
    stream.drain()
}
