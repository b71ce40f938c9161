//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the player core:
//! - Logging and tracing infrastructure
//! - Player configuration
//! - Event bus system and the player event vocabulary
//!
//! ## Overview
//!
//! Every other player crate depends on this one. It fixes the logging
//! conventions, the shape of configuration, and the typed events sessions
//! publish to UI and controller layers.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{FeatureFlags, PlayerConfig, PlayerConfigBuilder};
pub use error::{Error, Result};
pub use events::{
    DestroyReason, ErrorKind, EventBus, EventSeverity, EventStream, PlayerEvent, PlayerState,
};
