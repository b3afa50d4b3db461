//! Per-match state machine: word assignment, input validation, scoring,
//! level progression and loss detection.
//!
//! A match alternates between two phases for the side the ball is heading to:
//!
//! - `AwaitingInput`: the ball travels at level speed, the target word is on
//!   display. A correct word moves to `ReturningToOpponent`; a wrong word or
//!   the ball reaching the wall ends the match.
//! - `ReturningToOpponent`: the word is solved and the ball finishes its trip
//!   to the wall at zoomed speed. Wall arrival bounces it back to the other
//!   side with a new word.
//!
//! Transitions take a `GameState` by value and hand back the next one.

use crate::config::GameConfig;
use crate::physics::{self, Ball};
use crate::side::Side;
use crate::words::WordSource;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Playing,
    Lost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    AwaitingInput,
    ReturningToOpponent,
    Finished { loser: Side },
}

/// Keystrokes typed for one word and how many of them were wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Keystrokes {
    pub total: u32,
    pub errant: u32,
}

impl Keystrokes {
    /// Position-by-position comparison of `input` against `target`.
    /// Extra characters beyond the target all count as errant.
    pub fn tally(input: &str, target: &str) -> Keystrokes {
        let input: Vec<char> = input.trim().to_lowercase().chars().collect();
        let target: Vec<char> = target.trim().to_lowercase().chars().collect();
        let mismatched = input
            .iter()
            .zip(target.iter())
            .filter(|(a, b)| a != b)
            .count();
        let overflow = input.len().saturating_sub(target.len());
        Keystrokes {
            total: input.len() as u32,
            errant: (mismatched + overflow) as u32,
        }
    }
}

/// Case-insensitive comparison after trimming surrounding whitespace.
pub fn words_match(input: &str, target: &str) -> bool {
    input.trim().to_lowercase() == target.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub volleys: u32,
    pub correct_words: u32,
    pub total_words: u32,
    /// Percentage of keystrokes that were correct, 0-100
    pub accuracy: u32,
    pub average_response_time: u32,
    pub total_keystrokes: u32,
    pub errant_keystrokes: u32,
}

impl Default for PlayerScore {
    fn default() -> Self {
        Self {
            volleys: 0,
            correct_words: 0,
            total_words: 0,
            accuracy: 100,
            average_response_time: 0,
            total_keystrokes: 0,
            errant_keystrokes: 0,
        }
    }
}

fn accuracy(total: u32, errant: u32) -> u32 {
    if total == 0 {
        return 100;
    }
    let correct = total.saturating_sub(errant) as f64;
    (correct / total as f64 * 100.0).round() as u32
}

impl PlayerScore {
    pub fn record_volley(&self, time_taken_ms: u64, keystrokes: Keystrokes) -> PlayerScore {
        let correct_words = self.correct_words + 1;
        let average = (self.average_response_time as f64 * (correct_words - 1) as f64
            + time_taken_ms as f64)
            / correct_words as f64;
        let total_keystrokes = self.total_keystrokes + keystrokes.total;
        let errant_keystrokes = self.errant_keystrokes + keystrokes.errant;
        PlayerScore {
            volleys: self.volleys + 1,
            correct_words,
            total_words: self.total_words + 1,
            accuracy: accuracy(total_keystrokes, errant_keystrokes),
            average_response_time: average.round().min(u32::MAX as f64) as u32,
            total_keystrokes,
            errant_keystrokes,
        }
    }

    pub fn record_miss(&self, keystrokes: Keystrokes) -> PlayerScore {
        let total_keystrokes = self.total_keystrokes + keystrokes.total;
        let errant_keystrokes = self.errant_keystrokes + keystrokes.errant;
        PlayerScore {
            total_words: self.total_words + 1,
            accuracy: accuracy(total_keystrokes, errant_keystrokes),
            total_keystrokes,
            errant_keystrokes,
            ..*self
        }
    }
}

/// Why a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCause {
    WrongWord,
    /// Ball reached the wall before the word was solved
    WallReached,
    /// Turn deadline passed without the ball arriving
    Deadline,
    /// Player left mid-match
    Forfeit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Out of phase: match over, word already solved, or not this side's turn
    Ignored,
    Correct { level_up: bool },
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundEvent {
    /// Ball bounced off a wall after a solved word; `next` must type now
    Bounced { next: Side },
    Lost { loser: Side, cause: LossCause },
}

/// Live state of one match.
#[derive(Debug, Clone, PartialEq)]
pub struct GameState {
    pub level: u32,
    /// Side whose wall the ball is approaching
    pub current_player: Side,
    pub status: MatchStatus,
    pub losing_player: Option<Side>,
    pub ball: Ball,
    pub ball_moving_to_wall: bool,
    pub target_word: String,
    pub player_input: String,
    /// Epoch millis when the current word was shown
    pub word_started_at: u64,
    pub scores: [PlayerScore; 2],
    /// Expected crossing time at the current level, in ms
    pub ball_travel_time: f64,
    /// Epoch millis after which the current side loses even without a wall hit
    pub turn_deadline_at: u64,
    pub game_started_at: u64,
    /// Most recent target words, oldest first
    pub recent_words: Vec<String>,
}

impl GameState {
    pub fn phase(&self) -> RoundPhase {
        match (self.status, self.losing_player) {
            (MatchStatus::Lost, Some(loser)) => RoundPhase::Finished { loser },
            _ if self.ball_moving_to_wall => RoundPhase::ReturningToOpponent,
            _ => RoundPhase::AwaitingInput,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == MatchStatus::Playing
    }

    pub fn score(&self, side: Side) -> &PlayerScore {
        &self.scores[side.index()]
    }

    pub fn winner(&self) -> Option<Side> {
        self.losing_player.map(Side::opponent)
    }

    pub fn combined_volleys(&self) -> u32 {
        self.scores.iter().map(|s| s.volleys).sum()
    }

    /// Record what `side` has typed so far. Only the side on turn is tracked.
    pub fn with_input(self, side: Side, input: &str) -> GameState {
        if !self.is_playing() || self.ball_moving_to_wall || side != self.current_player {
            return self;
        }
        GameState {
            player_input: input.to_string(),
            ..self
        }
    }

    /// End the match with `side` as loser because it left.
    pub fn forfeit(self, side: Side) -> GameState {
        if !self.is_playing() {
            return self;
        }
        GameState {
            status: MatchStatus::Lost,
            losing_player: Some(side),
            ..self
        }
    }

    fn lose(mut self, loser: Side) -> GameState {
        let keystrokes = Keystrokes::tally(&self.player_input, &self.target_word);
        let score = self.scores[loser.index()].record_miss(keystrokes);
        self.scores[loser.index()] = score;
        self.status = MatchStatus::Lost;
        self.losing_player = Some(loser);
        self
    }
}

fn millis(seconds: f64) -> u64 {
    if seconds.is_finite() {
        (seconds * 1000.0).max(0.0).round() as u64
    } else {
        u64::MAX
    }
}

/// Applies the match rules. Owns the tuning parameters, the word source and
/// the RNG for launch angles, so a seeded controller replays identically.
pub struct RoundController<R> {
    config: GameConfig,
    words: Arc<dyn WordSource + Send + Sync>,
    rng: R,
}

impl<R: RngCore> RoundController<R> {
    pub fn new(config: GameConfig, words: Arc<dyn WordSource + Send + Sync>, rng: R) -> Self {
        Self { config, words, rng }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Fresh match at level 1 with a random starting side.
    pub fn new_game(&mut self, now_ms: u64) -> GameState {
        let starting = if self.rng.gen_bool(0.5) {
            Side::One
        } else {
            Side::Two
        };
        self.new_game_with(starting, now_ms)
    }

    pub fn new_game_with(&mut self, starting: Side, now_ms: u64) -> GameState {
        let ball = physics::init_ball(&self.config, 1, starting, &mut self.rng);
        let mut recent_words = Vec::new();
        let target_word = self.next_word(1, &mut recent_words);
        let mut state = GameState {
            level: 1,
            current_player: starting,
            status: MatchStatus::Playing,
            losing_player: None,
            ball,
            ball_moving_to_wall: false,
            target_word,
            player_input: String::new(),
            word_started_at: now_ms,
            scores: [PlayerScore::default(); 2],
            ball_travel_time: self.config.ball_travel_time(1),
            turn_deadline_at: 0,
            game_started_at: now_ms,
            recent_words,
        };
        state.turn_deadline_at = self.turn_deadline(&state, now_ms);
        state
    }

    /// Apply a typed word from `side`.
    pub fn submit(
        &self,
        state: GameState,
        side: Side,
        word: &str,
        time_taken_ms: u64,
    ) -> (GameState, Submission) {
        if !state.is_playing() || state.ball_moving_to_wall || side != state.current_player {
            return (state, Submission::Ignored);
        }

        let keystrokes = Keystrokes::tally(word, &state.target_word);
        let mut state = GameState {
            player_input: word.to_string(),
            ..state
        };

        if !words_match(word, &state.target_word) {
            let score = state.scores[side.index()].record_miss(keystrokes);
            state.scores[side.index()] = score;
            state.status = MatchStatus::Lost;
            state.losing_player = Some(side);
            return (state, Submission::Incorrect);
        }

        let score = state.scores[side.index()].record_volley(time_taken_ms, keystrokes);
        state.scores[side.index()] = score;

        let level_up = state.combined_volleys() % self.config.volleys_per_level == 0;
        if level_up {
            state.level += 1;
            state.ball.speed = self.config.speed(state.level);
        }

        state.ball = state.ball.scaled(self.config.zoom_multiplier);
        state.ball_moving_to_wall = true;
        (state, Submission::Correct { level_up })
    }

    /// Advance the match by `dt` seconds of simulated time.
    pub fn tick(&mut self, state: GameState, dt: f64, now_ms: u64) -> (GameState, Option<RoundEvent>) {
        if !state.is_playing() {
            return (state, None);
        }

        let ball = physics::step(&self.config, &state.ball, dt);
        let state = GameState { ball, ..state };

        match physics::wall_hit(&self.config, &state.ball) {
            Some(wall) if state.ball_moving_to_wall => {
                let next = wall.opponent();
                let state = self.bounce_to(state, wall, now_ms);
                (state, Some(RoundEvent::Bounced { next }))
            }
            Some(wall) => {
                let state = state.lose(wall);
                let event = RoundEvent::Lost {
                    loser: wall,
                    cause: LossCause::WallReached,
                };
                (state, Some(event))
            }
            None if !state.ball_moving_to_wall && now_ms >= state.turn_deadline_at => {
                let loser = state.current_player;
                let state = state.lose(loser);
                let event = RoundEvent::Lost {
                    loser,
                    cause: LossCause::Deadline,
                };
                (state, Some(event))
            }
            None => (state, None),
        }
    }

    fn bounce_to(&mut self, mut state: GameState, wall: Side, now_ms: u64) -> GameState {
        let mut ball = physics::bounce(&self.config, &state.ball, state.level, &mut self.rng);
        let clearance = ball.radius + self.config.wall_clearance;
        ball.position.x = match wall {
            Side::One => ball.position.x.max(self.config.left_wall_face() + clearance),
            Side::Two => ball.position.x.min(self.config.right_wall_face() - clearance),
        };

        let mut recent_words = std::mem::take(&mut state.recent_words);
        let target_word = self.next_word(state.level, &mut recent_words);
        let mut state = GameState {
            current_player: wall.opponent(),
            ball,
            ball_moving_to_wall: false,
            target_word,
            player_input: String::new(),
            word_started_at: now_ms,
            ball_travel_time: self.config.ball_travel_time(state.level),
            recent_words,
            ..state
        };
        state.turn_deadline_at = self.turn_deadline(&state, now_ms);
        state
    }

    fn turn_deadline(&self, state: &GameState, now_ms: u64) -> u64 {
        let expected = physics::time_to_wall(&self.config, &state.ball, state.current_player);
        let expected_ms = if expected.is_finite() {
            millis(expected)
        } else {
            state.ball_travel_time.round() as u64
        };
        now_ms
            .saturating_add(expected_ms)
            .saturating_add(self.config.time_buffer_ms.round() as u64)
    }

    fn next_word(&mut self, level: u32, recent: &mut Vec<String>) -> String {
        let difficulty = self.config.difficulty(level);
        let word = self.words.random_word(difficulty, recent, &mut self.rng);
        recent.push(word.clone());
        let memory = self.config.recent_word_memory;
        if recent.len() > memory {
            let excess = recent.len() - memory;
            recent.drain(..excess);
        }
        word
    }
}
