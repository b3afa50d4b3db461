use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::physics::{Ball, Vec2, Velocity};
use crate::round::{GameState, MatchStatus, PlayerScore};
use crate::side::Side;

/// Protocol version - increment when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

// === Server -> Client ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(tag = "type")]
pub enum ServerMsg {
    #[serde(rename = "room_joined")]
    RoomJoined(RoomJoinedMsg),
    #[serde(rename = "player_joined")]
    PlayerJoined(PlayerJoinedMsg),
    #[serde(rename = "game_start")]
    GameStart(GameSnapshot),
    #[serde(rename = "game_state_update")]
    GameStateUpdate(GameStateUpdateMsg),
    #[serde(rename = "opponent_input_update")]
    OpponentInputUpdate(OpponentInputMsg),
    #[serde(rename = "player_disconnected")]
    PlayerDisconnected(PlayerDisconnectedMsg),
    #[serde(rename = "error")]
    Error(ErrorMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct RoomJoinedMsg {
    pub protocol_version: u32,
    pub room_code: String,
    pub connection_id: u32,
    pub side: u8,
    pub player_name: String,
    /// Name of the player already in the room, if any
    pub other_player_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct PlayerJoinedMsg {
    pub player_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
pub struct PlayerNames {
    #[serde(rename = "1")]
    pub one: Option<String>,
    #[serde(rename = "2")]
    pub two: Option<String>,
}

impl PlayerNames {
    pub fn set(&mut self, side: Side, name: Option<String>) {
        match side {
            Side::One => self.one = name,
            Side::Two => self.two = name,
        }
    }
}

/// Canonical match state sent to both players every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub level: u32,
    pub current_player: u8,
    pub game_status: MatchStatus,
    pub losing_player: Option<u8>,
    pub ball: Ball,
    pub ball_moving_to_wall: bool,
    pub target_word: String,
    pub player_input: String,
    #[ts(type = "number")]
    pub word_started_at: u64,
    pub player1_score: PlayerScore,
    pub player2_score: PlayerScore,
    pub ball_travel_time: f64,
    #[ts(type = "number")]
    pub turn_deadline_at: u64,
    #[ts(type = "number")]
    pub game_started_at: u64,
    pub player_names: PlayerNames,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdateMsg {
    #[serde(flatten)]
    pub snapshot: GameSnapshot,
    /// Set only on the update that answers a word submission
    pub submitted_word: Option<String>,
    pub is_correct: Option<bool>,
    #[ts(type = "number | null")]
    pub time_taken: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
pub struct OpponentInputMsg {
    pub side: u8,
    pub input: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
pub struct PlayerDisconnectedMsg {
    pub side: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
pub struct ErrorMsg {
    pub message: String,
}

// === Client -> Server ===

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(tag = "type")]
pub enum ClientMsg {
    #[serde(rename = "create_room")]
    CreateRoom(CreateRoomMsg),
    #[serde(rename = "join_room")]
    JoinRoom(JoinRoomMsg),
    #[serde(rename = "start_game")]
    StartGame,
    #[serde(rename = "word_submitted")]
    WordSubmitted(WordSubmittedMsg),
    #[serde(rename = "player_input_update")]
    PlayerInputUpdate { input: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomMsg {
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomMsg {
    pub room_code: String,
    pub player_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
#[serde(rename_all = "camelCase")]
pub struct WordSubmittedMsg {
    pub word: String,
    /// Milliseconds the player took, as measured by the client
    #[ts(type = "number")]
    #[serde(deserialize_with = "client_millis")]
    pub time_taken: u64,
}

// === Conversion helpers ===

/// Client durations arrive as JS numbers: fractional, or negative under clock
/// skew. Rounded and floored at zero.
fn client_millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let ms = f64::deserialize(deserializer)?;
    if ms.is_finite() {
        Ok(ms.max(0.0).round() as u64)
    } else {
        Ok(0)
    }
}

/// Round to 2 decimal places (sub-pixel precision is plenty for rendering)
#[inline]
fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn ball_wire(ball: &Ball) -> Ball {
    Ball {
        position: Vec2 {
            x: round2(ball.position.x),
            y: round2(ball.position.y),
        },
        velocity: Velocity {
            vx: round2(ball.velocity.vx),
            vy: round2(ball.velocity.vy),
        },
        radius: ball.radius,
        speed: round2(ball.speed),
    }
}

impl GameSnapshot {
    pub fn from_state(state: &GameState, player_names: PlayerNames) -> Self {
        Self {
            level: state.level,
            current_player: state.current_player.number(),
            game_status: state.status,
            losing_player: state.losing_player.map(Side::number),
            ball: ball_wire(&state.ball),
            ball_moving_to_wall: state.ball_moving_to_wall,
            target_word: state.target_word.clone(),
            player_input: state.player_input.clone(),
            word_started_at: state.word_started_at,
            player1_score: *state.score(Side::One),
            player2_score: *state.score(Side::Two),
            ball_travel_time: state.ball_travel_time.round(),
            turn_deadline_at: state.turn_deadline_at,
            game_started_at: state.game_started_at,
            player_names,
        }
    }

    /// Rebuild a simulation state from a snapshot, e.g. to reconcile a local
    /// prediction. Returns `None` when a side number is out of range.
    pub fn to_state(&self) -> Option<GameState> {
        let losing_player = match self.losing_player {
            Some(n) => Some(Side::from_number(n)?),
            None => None,
        };
        Some(GameState {
            level: self.level,
            current_player: Side::from_number(self.current_player)?,
            status: self.game_status,
            losing_player,
            ball: self.ball,
            ball_moving_to_wall: self.ball_moving_to_wall,
            target_word: self.target_word.clone(),
            player_input: self.player_input.clone(),
            word_started_at: self.word_started_at,
            scores: [self.player1_score, self.player2_score],
            ball_travel_time: self.ball_travel_time,
            turn_deadline_at: self.turn_deadline_at,
            game_started_at: self.game_started_at,
            recent_words: vec![self.target_word.clone()],
        })
    }
}

impl ServerMsg {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMsg::Error(ErrorMsg {
            message: message.into(),
        })
    }
}
