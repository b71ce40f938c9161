//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates (`core-runtime`, `core-playback`). Host applications can
//! depend on `player-workspace` and enable the `playback` feature without
//! wiring each crate individually.

#[cfg(feature = "playback")]
pub use core_playback;
#[cfg(feature = "playback")]
pub use core_runtime;
