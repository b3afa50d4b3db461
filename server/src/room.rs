use crate::player::Player;
use rand::RngCore;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use typetype_shared::protocol::{
    GameSnapshot, GameStateUpdateMsg, OpponentInputMsg, PlayerDisconnectedMsg, PlayerNames,
    ServerMsg,
};
use typetype_shared::round::{RoundEvent, Submission};
use typetype_shared::{GameState, RoundController, Side};

/// Commands from the lobby to one room task
#[derive(Debug)]
pub enum RoomCommand {
    Seat(Player),
    Unseat {
        side: Side,
    },
    Start,
    SubmitWord {
        side: Side,
        word: String,
        time_taken: u64,
    },
    InputUpdate {
        side: Side,
        input: String,
    },
}

/// Sending half of a room task's queue. When the last handle is dropped the
/// room task exits.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn new(tx: mpsc::UnboundedSender<RoomCommand>) -> Self {
        Self { tx }
    }

    pub fn send(&self, cmd: RoomCommand) -> bool {
        self.tx.send(cmd).is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Active,
    Finished,
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Epoch-millisecond timestamps read off a monotonic clock. Anchored to the
/// wall clock once, so deadlines are unaffected by later system clock steps.
#[derive(Debug, Clone, Copy)]
pub struct MatchClock {
    origin: Instant,
    origin_ms: u64,
}

impl MatchClock {
    pub fn start() -> Self {
        Self::anchored(Instant::now(), epoch_millis())
    }

    pub fn anchored(origin: Instant, origin_ms: u64) -> Self {
        Self { origin, origin_ms }
    }

    pub fn now_ms(&self) -> u64 {
        self.at(Instant::now())
    }

    /// Timestamp of `instant`; instants before the anchor map to the anchor.
    pub fn at(&self, instant: Instant) -> u64 {
        let elapsed = instant.saturating_duration_since(self.origin);
        self.origin_ms
            .saturating_add(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }
}

/// One duel: its two seats and the match being played in it.
pub struct Room<R> {
    code: String,
    players: [Option<Player>; 2],
    controller: RoundController<R>,
    game: Option<GameState>,
}

impl<R: RngCore> Room<R> {
    pub fn new(code: String, controller: RoundController<R>) -> Self {
        Self {
            code,
            players: [None, None],
            controller,
            game: None,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn status(&self) -> RoomStatus {
        match &self.game {
            None => RoomStatus::Waiting,
            Some(game) if game.is_playing() => RoomStatus::Active,
            Some(_) => RoomStatus::Finished,
        }
    }

    /// The tick timer should run
    pub fn is_ticking(&self) -> bool {
        self.status() == RoomStatus::Active
    }

    fn player(&self, side: Side) -> Option<&Player> {
        self.players[side.index()].as_ref()
    }

    fn names(&self) -> PlayerNames {
        let mut names = PlayerNames::default();
        for side in Side::BOTH {
            names.set(side, self.player(side).map(|p| p.name.clone()));
        }
        names
    }

    fn broadcast(&self, msg: ServerMsg) {
        for player in self.players.iter().flatten() {
            player.send(msg.clone());
        }
    }

    fn update(&self, state: &GameState) -> GameStateUpdateMsg {
        GameStateUpdateMsg {
            snapshot: GameSnapshot::from_state(state, self.names()),
            submitted_word: None,
            is_correct: None,
            time_taken: None,
        }
    }

    /// Apply one command between ticks.
    pub fn apply(&mut self, cmd: RoomCommand, now_ms: u64) {
        match cmd {
            RoomCommand::Seat(player) => {
                let idx = player.side.index();
                self.players[idx] = Some(player);
            }
            RoomCommand::Unseat { side } => self.unseat(side),
            RoomCommand::Start => self.start(now_ms),
            RoomCommand::SubmitWord {
                side,
                word,
                time_taken,
            } => self.submit(side, &word, time_taken),
            RoomCommand::InputUpdate { side, input } => {
                if let Some(game) = self.game.take() {
                    self.game = Some(game.with_input(side, &input));
                }
                if let Some(opponent) = self.player(side.opponent()) {
                    opponent.send(ServerMsg::OpponentInputUpdate(OpponentInputMsg {
                        side: side.number(),
                        input,
                    }));
                }
            }
        }
    }

    fn unseat(&mut self, side: Side) {
        self.players[side.index()] = None;

        if let Some(game) = self.game.take() {
            let was_playing = game.is_playing();
            let game = game.forfeit(side);
            if was_playing {
                tracing::info!("Room {}: player {} forfeited", self.code, side);
                self.broadcast(ServerMsg::GameStateUpdate(self.update(&game)));
            }
            self.game = Some(game);
        }

        self.broadcast(ServerMsg::PlayerDisconnected(PlayerDisconnectedMsg {
            side: side.number(),
        }));
    }

    fn start(&mut self, now_ms: u64) {
        if self.is_ticking() {
            tracing::debug!("Room {}: start ignored, match in progress", self.code);
            return;
        }
        if self.players.iter().any(Option::is_none) {
            return;
        }

        let game = self.controller.new_game(now_ms);
        tracing::info!(
            "Room {}: match started, player {} to type {:?}",
            self.code,
            game.current_player,
            game.target_word
        );
        self.broadcast(ServerMsg::GameStart(GameSnapshot::from_state(
            &game,
            self.names(),
        )));
        self.game = Some(game);
    }

    fn submit(&mut self, side: Side, word: &str, time_taken: u64) {
        let Some(game) = self.game.take() else {
            return;
        };
        let (game, submission) = self.controller.submit(game, side, word, time_taken);

        let is_correct = match submission {
            Submission::Ignored => {
                self.game = Some(game);
                return;
            }
            Submission::Correct { level_up } => {
                if level_up {
                    tracing::debug!("Room {}: level {}", self.code, game.level);
                }
                true
            }
            Submission::Incorrect => {
                tracing::info!("Room {}: player {} mistyped, match over", self.code, side);
                false
            }
        };

        let msg = GameStateUpdateMsg {
            submitted_word: Some(word.to_string()),
            is_correct: Some(is_correct),
            time_taken: Some(time_taken),
            ..self.update(&game)
        };
        self.broadcast(ServerMsg::GameStateUpdate(msg));
        self.game = Some(game);
    }

    /// Advance the match by `dt` seconds and broadcast the result.
    pub fn tick(&mut self, dt: f64, now_ms: u64) {
        let Some(game) = self.game.take() else {
            return;
        };
        if !game.is_playing() {
            self.game = Some(game);
            return;
        }

        let (game, event) = self.controller.tick(game, dt, now_ms);
        match event {
            Some(RoundEvent::Lost { loser, cause }) => {
                tracing::info!(
                    "Room {}: player {} lost at level {} ({:?})",
                    self.code,
                    loser,
                    game.level,
                    cause
                );
            }
            Some(RoundEvent::Bounced { next }) => {
                tracing::trace!("Room {}: bounce, player {} to type", self.code, next);
            }
            None => {}
        }

        self.broadcast(ServerMsg::GameStateUpdate(self.update(&game)));
        self.game = Some(game);
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Run one room until every handle to it is dropped. The tick timer exists
/// only while a match is being played.
pub async fn run_room<R: RngCore>(
    mut room: Room<R>,
    mut cmd_rx: mpsc::UnboundedReceiver<RoomCommand>,
    tick_rate_hz: u32,
) {
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate_hz as f64);
    let mut ticker: Option<Interval> = None;
    let clock = MatchClock::start();
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = next_tick(&mut ticker) => {
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f64();
                last_tick = now;
                room.tick(dt, clock.at(now));
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => room.apply(cmd, clock.now_ms()),
                    None => break,
                }
            }
        }

        match (room.is_ticking(), ticker.is_some()) {
            (true, false) => {
                let mut interval =
                    tokio::time::interval_at(Instant::now() + tick_duration, tick_duration);
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker = Some(interval);
                last_tick = Instant::now();
            }
            (false, true) => ticker = None,
            _ => {}
        }
    }

    tracing::info!("Room {} closed", room.code());
}
