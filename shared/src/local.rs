//! Client-side match runner.
//!
//! Drives the same `RoundController` the server uses, at whatever cadence the
//! caller ticks it. Used for solo play and for predicting between
//! authoritative snapshots in a networked match.

use crate::round::{GameState, RoundController, RoundEvent, Submission};
use crate::side::Side;
use rand::RngCore;

pub struct LocalMatch<R> {
    controller: RoundController<R>,
    state: GameState,
    last_tick_ms: u64,
}

impl<R: RngCore> LocalMatch<R> {
    pub fn start(mut controller: RoundController<R>, now_ms: u64) -> Self {
        let state = controller.new_game(now_ms);
        Self {
            controller,
            state,
            last_tick_ms: now_ms,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Advance to `now_ms` using the wall-clock delta since the previous call.
    pub fn advance(&mut self, now_ms: u64) -> Option<RoundEvent> {
        let dt = now_ms.saturating_sub(self.last_tick_ms) as f64 / 1000.0;
        self.last_tick_ms = now_ms;
        let state = self.state.clone();
        let (state, event) = self.controller.tick(state, dt, now_ms);
        self.state = state;
        event
    }

    /// Submit a word for the side currently on turn.
    pub fn submit(&mut self, word: &str, now_ms: u64) -> Submission {
        let side = self.state.current_player;
        let time_taken = now_ms.saturating_sub(self.state.word_started_at);
        let state = self.state.clone();
        let (state, outcome) = self.controller.submit(state, side, word, time_taken);
        self.state = state;
        outcome
    }

    pub fn type_input(&mut self, side: Side, input: &str) {
        let state = self.state.clone();
        self.state = state.with_input(side, input);
    }

    /// Replace the predicted state with an authoritative one.
    pub fn reconcile(&mut self, authoritative: GameState, now_ms: u64) {
        self.state = authoritative;
        self.last_tick_ms = now_ms;
    }
}
