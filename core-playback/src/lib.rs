//! # Playback Orchestration
//!
//! Coordinates interchangeable media backends ("providers") behind one
//! player state machine, and inserts secondary playlists (ads) without
//! losing the primary's position.
//!
//! ## Overview
//!
//! This crate handles:
//! - Provider selection from an ordered capability registry
//! - Playback sessions translating raw provider events into player events
//! - Instream episodes that suspend and restore the primary session
//! - A controller façade that routes host calls and runs cooperative turns
//!
//! Everything runs on one cooperative thread. Providers publish on
//! broadcast channels; sessions drain them when
//! [`PlayerController::pump`] runs.

pub mod config;
pub mod controller;
pub mod error;
pub mod instream;
pub mod preferences;
pub mod providers;
pub mod qoe;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod state;

pub use config::{InstreamItemOptions, InstreamOptions, Seekable};
pub use controller::PlayerController;
pub use error::{PlaybackError, Result};
pub use instream::{InstreamController, InstreamEvent};
pub use qoe::QoeReport;
pub use registry::{ProviderDescriptor, ProviderRegistry};
pub use scheduler::{TaskHandle, TaskQueue};
pub use session::{ItemChange, PlaybackSession, SessionSettings, SessionTurn};
