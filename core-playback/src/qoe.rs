//! Quality-of-experience timers.
//!
//! Timed per raw backend substate rather than per exposed state, so time
//! spent loading and time spent stalled are told apart even though both
//! surface as buffering.

use bridge_traits::playback::ProviderState;
use bridge_traits::time::Clock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::is_timed_substate;

/// Accumulated timings for the current item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QoeReport {
    pub loading_ms: i64,
    pub stalled_ms: i64,
    pub stall_count: u32,
    /// Play attempt to first playing frame.
    pub first_frame_ms: Option<i64>,
}

pub struct QoeTracker {
    clock: Arc<dyn Clock>,
    enabled: bool,
    open: HashMap<ProviderState, i64>,
    totals: HashMap<ProviderState, i64>,
    stall_count: u32,
    play_attempt_at: Option<i64>,
    first_frame_ms: Option<i64>,
}

impl QoeTracker {
    pub fn new(clock: Arc<dyn Clock>, enabled: bool) -> Self {
        Self {
            clock,
            enabled,
            open: HashMap::new(),
            totals: HashMap::new(),
            stall_count: 0,
            play_attempt_at: None,
            first_frame_ms: None,
        }
    }

    pub fn reset(&mut self) {
        self.open.clear();
        self.totals.clear();
        self.stall_count = 0;
        self.play_attempt_at = None;
        self.first_frame_ms = None;
    }

    fn start(&mut self, state: ProviderState) {
        let now = self.clock.unix_timestamp_millis();
        self.open.entry(state).or_insert(now);
        if state == ProviderState::Stalled {
            self.stall_count += 1;
        }
    }

    fn stop(&mut self, state: ProviderState) {
        if let Some(started) = self.open.remove(&state) {
            let elapsed = self.clock.unix_timestamp_millis() - started;
            *self.totals.entry(state).or_insert(0) += elapsed.max(0);
        }
    }

    /// Record a raw transition.
    pub fn on_raw_state(&mut self, old: ProviderState, new: ProviderState) {
        if !self.enabled || old == new {
            return;
        }
        if is_timed_substate(old) {
            self.stop(old);
        }
        if is_timed_substate(new) {
            self.start(new);
        }
    }

    pub fn on_play_attempt(&mut self) {
        if self.enabled {
            self.play_attempt_at = Some(self.clock.unix_timestamp_millis());
            self.first_frame_ms = None;
        }
    }

    /// Returns the first-frame time the first time playback starts after an
    /// attempt.
    pub fn on_playing(&mut self) -> Option<i64> {
        if self.first_frame_ms.is_some() {
            return None;
        }
        let attempt = self.play_attempt_at?;
        let elapsed = self.clock.unix_timestamp_millis() - attempt;
        self.first_frame_ms = Some(elapsed);
        Some(elapsed)
    }

    pub fn report(&self) -> QoeReport {
        let now = self.clock.unix_timestamp_millis();
        let total = |state: ProviderState| {
            let closed = self.totals.get(&state).copied().unwrap_or(0);
            let running = self
                .open
                .get(&state)
                .map(|started| (now - started).max(0))
                .unwrap_or(0);
            closed + running
        };
        QoeReport {
            loading_ms: total(ProviderState::Loading),
            stalled_ms: total(ProviderState::Stalled),
            stall_count: self.stall_count,
            first_frame_ms: self.first_frame_ms,
        }
    }
}

impl std::fmt::Debug for QoeTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QoeTracker")
            .field("enabled", &self.enabled)
            .field("report", &self.report())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;

    #[test]
    fn loading_and_stalled_are_timed_separately() {
        let clock = Arc::new(ManualClock::default());
        let mut qoe = QoeTracker::new(clock.clone(), true);

        qoe.on_raw_state(ProviderState::Idle, ProviderState::Loading);
        clock.advance_millis(300);
        qoe.on_raw_state(ProviderState::Loading, ProviderState::Playing);
        clock.advance_millis(1000);
        qoe.on_raw_state(ProviderState::Playing, ProviderState::Stalled);
        clock.advance_millis(200);
        qoe.on_raw_state(ProviderState::Stalled, ProviderState::Playing);

        let report = qoe.report();
        assert_eq!(report.loading_ms, 300);
        assert_eq!(report.stalled_ms, 200);
        assert_eq!(report.stall_count, 1);
    }

    #[test]
    fn first_frame_measured_once_per_attempt() {
        let clock = Arc::new(ManualClock::default());
        let mut qoe = QoeTracker::new(clock.clone(), true);

        assert_eq!(qoe.on_playing(), None);
        qoe.on_play_attempt();
        clock.advance_millis(450);
        assert_eq!(qoe.on_playing(), Some(450));
        assert_eq!(qoe.on_playing(), None);
        assert_eq!(qoe.report().first_frame_ms, Some(450));
    }

    #[test]
    fn disabled_tracker_records_nothing() {
        let clock = Arc::new(ManualClock::default());
        let mut qoe = QoeTracker::new(clock.clone(), false);
        qoe.on_play_attempt();
        qoe.on_raw_state(ProviderState::Idle, ProviderState::Loading);
        clock.advance_millis(100);

        assert_eq!(qoe.on_playing(), None);
        assert_eq!(qoe.report(), QoeReport::default());
    }
}
