//! # Playback Error Types
//!
//! Errors raised by provider selection, playback sessions and the instream
//! controller. Every error that reaches a listener does so as a
//! `PlayerEvent::Error`; [`PlaybackError::kind`] picks the event's
//! [`ErrorKind`].

use bridge_traits::error::BridgeError;
use bridge_traits::playback::ProviderKind;
use core_runtime::events::ErrorKind;
use thiserror::Error;

/// Errors that can occur during playback orchestration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    // ========================================================================
    // Selection Errors
    // ========================================================================
    /// No registered provider can play any source of the item or playlist.
    #[error("No playable sources found")]
    NoPlayableSource,

    /// No descriptor matched the item's source at selection time.
    #[error("No provider matches source: {0}")]
    InvalidProviderSelection(String),

    /// The selected provider's implementation has not been loaded yet.
    #[error("Provider not loaded: {0}")]
    ProviderNotLoaded(ProviderKind),

    /// Fetching a provider implementation failed.
    #[error("Failed to load provider {kind}: {message}")]
    ProviderLoadFailed { kind: ProviderKind, message: String },

    // ========================================================================
    // Platform Errors
    // ========================================================================
    /// The host platform is denylisted for the operation.
    #[error("Platform unsupported: {0}")]
    PlatformUnsupported(String),

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// A provider reported or returned a failure mid-playback.
    #[error("Provider error: {0}")]
    ProviderRuntime(String),

    /// Operation needs an active provider but the session has none.
    #[error("No provider attached")]
    NoProvider,

    /// Playlist index requested on an empty playlist.
    #[error("Playlist is empty")]
    EmptyPlaylist,

    // ========================================================================
    // Instream Errors
    // ========================================================================
    #[error("No instream episode is active")]
    InstreamNotActive,

    #[error("An instream episode is already active")]
    InstreamAlreadyActive,

    /// Skip requested before the skip offset was reached or with no offset.
    #[error("Skip not available")]
    SkipNotAvailable,

    /// Instream option values are invalid.
    #[error("Invalid instream options: {0}")]
    InvalidOptions(String),

    // ========================================================================
    // Wrapped Errors
    // ========================================================================
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

impl PlaybackError {
    /// Event-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::NoPlayableSource | PlaybackError::EmptyPlaylist => {
                ErrorKind::NoPlayableSource
            }
            PlaybackError::InvalidProviderSelection(_) => ErrorKind::InvalidProviderSelection,
            PlaybackError::PlatformUnsupported(_) => ErrorKind::PlatformUnsupported,
            _ => ErrorKind::ProviderRuntimeError,
        }
    }

    /// Returns `true` if this error ends the current playback attempt only.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidProviderSelection(_)
                | PlaybackError::ProviderNotLoaded(_)
                | PlaybackError::PlatformUnsupported(_)
        )
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_event_classification() {
        assert_eq!(PlaybackError::NoPlayableSource.kind(), ErrorKind::NoPlayableSource);
        assert_eq!(
            PlaybackError::PlatformUnsupported("Android 2.3".into()).kind(),
            ErrorKind::PlatformUnsupported
        );
        assert_eq!(
            PlaybackError::InvalidProviderSelection("a.xyz".into()).kind(),
            ErrorKind::InvalidProviderSelection
        );
        assert_eq!(
            PlaybackError::from(BridgeError::Media("decode".into())).kind(),
            ErrorKind::ProviderRuntimeError
        );
    }

    #[test]
    fn item_scoped_errors() {
        assert!(PlaybackError::ProviderNotLoaded(ProviderKind::html5()).is_item_scoped());
        assert!(!PlaybackError::ProviderRuntime("boom".into()).is_item_scoped());
    }
}
