//! # Mid-roll Walkthrough
//!
//! Plays a content item, inserts a two-item ad pod at 30 seconds and
//! resumes content where it left off. Providers are simulated media
//! elements whose playhead the demo advances by hand.
//!
//! Run with: `cargo run --example instream_demo --package core-playback`

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    LogLevel, MediaContainer, MediaProvider, PlaylistItem, ProviderEvent, ProviderEventReceiver,
    ProviderFactory, ProviderKind, ProviderLoader, ProviderOptions, ProviderState,
};
use core_playback::{InstreamOptions, PlayerController};
use core_runtime::config::PlayerConfig;
use core_runtime::events::PlayerEvent;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

// ============================================================================
// Simulated Media Element
// ============================================================================

struct Element {
    state: ProviderState,
    position: f64,
    duration: f64,
}

/// Shared view of one simulated element so the demo can move its playhead.
#[derive(Clone)]
struct ElementHandle {
    inner: Arc<Mutex<Element>>,
    sender: broadcast::Sender<ProviderEvent>,
}

impl ElementHandle {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(Element {
                state: ProviderState::Idle,
                position: 0.0,
                duration: 0.0,
            })),
            sender,
        }
    }

    fn transition(&self, new_state: ProviderState) {
        let old_state = std::mem::replace(&mut self.inner.lock().state, new_state);
        if old_state != new_state {
            let _ = self.sender.send(ProviderEvent::StateChanged {
                old_state,
                new_state,
            });
        }
    }

    /// Advance a playing element by `seconds`, completing at the end.
    fn advance(&self, seconds: f64) {
        let (position, duration) = {
            let mut element = self.inner.lock();
            if element.state != ProviderState::Playing {
                return;
            }
            element.position = (element.position + seconds).min(element.duration);
            (element.position, element.duration)
        };
        let _ = self.sender.send(ProviderEvent::Time {
            position,
            duration: Some(duration),
        });
        if position >= duration {
            let _ = self.sender.send(ProviderEvent::Complete);
        }
    }
}

struct SimulatedProvider {
    kind: ProviderKind,
    handle: ElementHandle,
    container: Option<MediaContainer>,
}

impl MediaProvider for SimulatedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind.clone()
    }

    fn subscribe(&self) -> ProviderEventReceiver {
        self.handle.sender.subscribe()
    }

    fn load(&mut self, item: &PlaylistItem) -> BridgeResult<()> {
        {
            let mut element = self.handle.inner.lock();
            element.position = item.starttime;
            element.duration = item.duration.unwrap_or(60.0);
        }
        self.handle.transition(ProviderState::Loading);
        let _ = self.handle.sender.send(ProviderEvent::BufferFull);
        Ok(())
    }

    fn play(&mut self) -> BridgeResult<()> {
        self.handle.transition(ProviderState::Playing);
        Ok(())
    }

    fn pause(&mut self) -> BridgeResult<()> {
        self.handle.transition(ProviderState::Paused);
        Ok(())
    }

    fn stop(&mut self) -> BridgeResult<()> {
        self.handle.inner.lock().position = 0.0;
        self.handle.transition(ProviderState::Idle);
        Ok(())
    }

    fn seek(&mut self, position: f64) -> BridgeResult<()> {
        let from = std::mem::replace(&mut self.handle.inner.lock().position, position);
        let _ = self.handle.sender.send(ProviderEvent::Seek {
            position: from,
            offset: position,
        });
        Ok(())
    }

    fn volume(&mut self, _volume: u8) {}

    fn mute(&mut self, _mute: bool) {}

    fn attach_media(&mut self) {}

    fn detach_media(&mut self) {}

    fn container(&self) -> Option<&MediaContainer> {
        self.container.as_ref()
    }

    fn set_container(&mut self, container: MediaContainer) {
        self.container = Some(container);
    }

    fn remove(&mut self) -> Option<MediaContainer> {
        self.container.take()
    }

    fn set_state(&mut self, state: ProviderState) {
        self.handle.transition(state);
    }

    fn position(&self) -> f64 {
        self.handle.inner.lock().position
    }

    fn destroy(&mut self) {}
}

struct SimulatedFactory {
    elements: Mutex<Vec<ElementHandle>>,
}

impl SimulatedFactory {
    /// Element created most recently; the one currently on screen.
    fn current(&self) -> Option<ElementHandle> {
        self.elements.lock().last().cloned()
    }
}

impl ProviderFactory for SimulatedFactory {
    fn kind(&self) -> ProviderKind {
        ProviderKind::html5()
    }

    fn create(&self, _options: &ProviderOptions) -> Box<dyn MediaProvider> {
        let handle = ElementHandle::new();
        self.elements.lock().push(handle.clone());
        Box::new(SimulatedProvider {
            kind: ProviderKind::html5(),
            handle,
            container: None,
        })
    }
}

/// Serves the simulated factory for html5 and refuses everything else.
struct DemoLoader {
    factory: Arc<SimulatedFactory>,
}

#[async_trait]
impl ProviderLoader for DemoLoader {
    async fn load(&self, kind: &ProviderKind) -> BridgeResult<Arc<dyn ProviderFactory>> {
        if *kind == ProviderKind::html5() {
            Ok(self.factory.clone() as Arc<dyn ProviderFactory>)
        } else {
            Err(BridgeError::LoadFailed(format!("no backend for {kind}")))
        }
    }
}

// ============================================================================
// Walkthrough
// ============================================================================

fn run_until_quiet(player: &mut PlayerController) {
    while player.pump() > 0 {}
}

fn print_events(label: &str, events: Vec<PlayerEvent>) {
    for event in events {
        if !matches!(event, PlayerEvent::MediaTime { .. }) {
            println!("  [{label}] {event:?}");
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Info),
    )?;

    let factory = Arc::new(SimulatedFactory {
        elements: Mutex::new(Vec::new()),
    });
    let loader = DemoLoader {
        factory: factory.clone(),
    };

    let config = PlayerConfig::builder().id("demo-player").build()?;
    let mut player = PlayerController::with_builtin_providers(config)?;
    player.set_container(MediaContainer::new("player-div"));
    let mut content_events = player.subscribe();
    let mut ad_events = player.subscribe_instream();

    println!("== Loading content ==");
    let mut feature = PlaylistItem::from_file("https://cdn.example.com/feature.mp4");
    feature.duration = Some(120.0);
    player.load_playlist(vec![feature])?;
    let failures = player.load_providers(&loader).await;
    if !failures.is_empty() {
        return Err(anyhow!("provider loading failed: {failures:?}"));
    }
    player.play()?;
    run_until_quiet(&mut player);

    let content = factory
        .current()
        .ok_or_else(|| anyhow!("no content element was created"))?;
    for _ in 0..3 {
        content.advance(10.0);
        run_until_quiet(&mut player);
    }
    print_events("content", content_events.drain());

    println!("== Mid-roll at {:.0}s ==", player.primary().position());
    let mut first = PlaylistItem::from_file("https://ads.example.com/spot-a.mp4");
    first.duration = Some(15.0);
    let mut second = PlaylistItem::from_file("https://ads.example.com/spot-b.mp4");
    second.duration = Some(10.0);
    let options = InstreamOptions {
        tag: Some("midroll-1".to_string()),
        skip_offset: Some(5.0),
        ..InstreamOptions::default()
    };

    player.start_instream()?;
    player.load_instream(vec![first, second], options, Vec::new())?;
    run_until_quiet(&mut player);

    while player.instream().is_active() {
        let Some(ad) = factory.current() else {
            break;
        };
        ad.advance(5.0);
        run_until_quiet(&mut player);
    }
    for event in ad_events.drain() {
        println!("  [ad {}] {:?}", event.tag.as_deref().unwrap_or("-"), event.event);
    }

    println!("== Content resumed ==");
    run_until_quiet(&mut player);
    print_events("content", content_events.drain());
    println!(
        "State: {:?}, position {:.0}s",
        player.state(),
        player.primary().position()
    );

    Ok(())
}
