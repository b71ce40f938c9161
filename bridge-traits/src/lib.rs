//! # Host Bridge Traits
//!
//! Contracts between the player core and everything it does not own.
//!
//! ## Overview
//!
//! The core orchestrates playback but never renders media itself. Backends
//! ("providers"), preference storage, time, and log forwarding are supplied by
//! the host through the traits in this crate.
//!
//! ## Traits
//!
//! ### Playback
//! - [`MediaProvider`](playback::MediaProvider) - A live backend instance driven by a session
//! - [`ProviderFactory`](playback::ProviderFactory) - Creates instances of one backend kind
//! - [`ProviderLoader`](playback::ProviderLoader) - Lazily fetches backend implementations
//!
//! ### Storage
//! - [`PreferenceStore`](storage::PreferenceStore) - Persisted user preferences (volume, mute, labels)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//! - [`PlatformInfo`](platform::PlatformInfo) - Host environment used by capability checks
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::error::Error;
//!
//! let store = config.preference_store.clone().ok_or_else(|| Error::CapabilityMissing {
//!     capability: "PreferenceStore".to_string(),
//!     message: "persist_preferences is enabled but no store was injected".to_string(),
//! })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Backends should
//! convert their own failures into it with an actionable message; the core
//! turns them into typed player error events.
//!
//! ## Thread Safety
//!
//! Factories, loaders, and stores are `Send + Sync` on native targets so a
//! player can be moved across threads. Provider instances only need `Send`:
//! a session drives them from one thread at a time.
//!
//! ## Examples
//!
//! ### Implementing ProviderFactory
//!
//! ```ignore
//! use bridge_traits::playback::{MediaProvider, ProviderFactory, ProviderKind, ProviderOptions};
//!
//! struct Html5Factory;
//!
//! impl ProviderFactory for Html5Factory {
//!     fn kind(&self) -> ProviderKind {
//!         ProviderKind::html5()
//!     }
//!
//!     fn create(&self, options: &ProviderOptions) -> Box<dyn MediaProvider> {
//!         Box::new(Html5Provider::new(&options.player_id))
//!     }
//! }
//! ```

pub mod error;
pub mod platform;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use platform::{Browser, OsFamily, PlatformInfo};
pub use playback::{
    AudioTrack, CaptionTrack, MediaContainer, MediaKind, MediaProvider, PlaybackSessionId,
    PlaylistItem, ProviderEvent, ProviderEventReceiver, ProviderFactory, ProviderKind,
    ProviderLoader, ProviderOptions, ProviderState, QualityLevel, Source, StreamType,
};
pub use storage::{MemoryPreferenceStore, PreferenceStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
