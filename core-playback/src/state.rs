//! Raw provider state to player state translation.
//!
//! Backends report two internal substates, `loading` and `stalled`. Both
//! collapse to [`PlayerState::Buffering`] at the session boundary and are
//! surfaced separately as provider notifications.

use bridge_traits::playback::ProviderState;
use core_runtime::events::{PlayerEvent, PlayerState};

/// Player-visible state for a raw backend state.
pub fn exposed_state(raw: ProviderState) -> PlayerState {
    match raw {
        ProviderState::Idle => PlayerState::Idle,
        ProviderState::Loading | ProviderState::Stalled | ProviderState::Buffering => {
            PlayerState::Buffering
        }
        ProviderState::Playing => PlayerState::Playing,
        ProviderState::Paused => PlayerState::Paused,
        ProviderState::Complete => PlayerState::Complete,
        ProviderState::Error => PlayerState::Error,
    }
}

/// Notification emitted in addition to the state change for internal substates.
pub fn substate_notification(raw: ProviderState) -> Option<PlayerEvent> {
    match raw {
        ProviderState::Loading => Some(PlayerEvent::ProviderLoading),
        ProviderState::Stalled => Some(PlayerEvent::ProviderStalled),
        _ => None,
    }
}

/// Substates with their own QoE timer.
pub fn is_timed_substate(raw: ProviderState) -> bool {
    matches!(raw, ProviderState::Loading | ProviderState::Stalled)
}

/// States a completion signal must not re-complete.
pub fn blocks_completion(state: PlayerState) -> bool {
    matches!(state, PlayerState::Idle | PlayerState::Complete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_substates_collapse_to_buffering() {
        assert_eq!(exposed_state(ProviderState::Loading), PlayerState::Buffering);
        assert_eq!(exposed_state(ProviderState::Stalled), PlayerState::Buffering);
        assert_eq!(exposed_state(ProviderState::Buffering), PlayerState::Buffering);
        assert_eq!(exposed_state(ProviderState::Playing), PlayerState::Playing);
    }

    #[test]
    fn only_internal_substates_notify() {
        assert_eq!(
            substate_notification(ProviderState::Loading),
            Some(PlayerEvent::ProviderLoading)
        );
        assert_eq!(
            substate_notification(ProviderState::Stalled),
            Some(PlayerEvent::ProviderStalled)
        );
        assert_eq!(substate_notification(ProviderState::Buffering), None);
    }
}
