//! Session manager: owns the room registry and turns client messages into
//! registry changes and room commands.

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::player::{ConnectionId, Outbox, Player};
use crate::registry::{normalize_room_code, RoomRegistry};
use crate::room::{run_room, Room, RoomCommand, RoomHandle};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use tokio::sync::mpsc;
use typetype_shared::protocol::{
    ClientMsg, PlayerJoinedMsg, RoomJoinedMsg, ServerMsg, PROTOCOL_VERSION,
};
use typetype_shared::words::WordSource;
use typetype_shared::{GameConfig, RoundController};

/// Commands from WebSocket connections to the lobby
#[derive(Debug)]
pub enum LobbyCommand {
    Client {
        conn: ConnectionId,
        outbox: Outbox,
        msg: ClientMsg,
    },
    Disconnect {
        conn: ConnectionId,
    },
}

pub struct Lobby {
    registry: RoomRegistry,
    game: GameConfig,
    words: Arc<dyn WordSource + Send + Sync>,
    tick_rate_hz: u32,
    rng: ChaCha8Rng,
}

impl Lobby {
    pub fn new(config: &ServerConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            registry: RoomRegistry::new(),
            game: config.game.clone(),
            words: Arc::new(config.words.clone()),
            tick_rate_hz: config.tick_rate_hz,
            rng,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn handle(&mut self, cmd: LobbyCommand) {
        match cmd {
            LobbyCommand::Client { conn, outbox, msg } => {
                if let Err(e) = self.dispatch(conn, &outbox, msg) {
                    tracing::debug!("Connection {} rejected: {}", conn, e);
                    let _ = outbox.send(ServerMsg::error(e.to_string()));
                }
            }
            LobbyCommand::Disconnect { conn } => self.leave(conn),
        }
    }

    fn dispatch(
        &mut self,
        conn: ConnectionId,
        outbox: &Outbox,
        msg: ClientMsg,
    ) -> Result<(), SessionError> {
        match msg {
            ClientMsg::CreateRoom(m) => {
                self.leave(conn);
                self.create_room(conn, &m.player_name, outbox.clone());
                Ok(())
            }
            ClientMsg::JoinRoom(m) => {
                let code = normalize_room_code(&m.room_code);
                if self.registry.seat(conn).is_some_and(|seat| seat.code == code) {
                    self.resend_room_joined(conn, &code);
                    return Ok(());
                }
                self.registry.check_joinable(&code)?;
                self.leave(conn);
                self.join_room(conn, &code, &m.player_name, outbox.clone())
            }
            ClientMsg::StartGame => {
                self.registry.start_target(conn)?.send(RoomCommand::Start);
                Ok(())
            }
            ClientMsg::WordSubmitted(m) => {
                let (side, room) = self.registry.route(conn)?;
                room.send(RoomCommand::SubmitWord {
                    side,
                    word: m.word,
                    time_taken: m.time_taken,
                });
                Ok(())
            }
            ClientMsg::PlayerInputUpdate { input } => {
                let (side, room) = self.registry.route(conn)?;
                room.send(RoomCommand::InputUpdate { side, input });
                Ok(())
            }
        }
    }

    fn create_room(&mut self, conn: ConnectionId, name: &str, outbox: Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = RoomHandle::new(tx);
        let (code, player) =
            self.registry
                .create_room(conn, name, outbox, handle.clone(), &mut self.rng);

        let controller = RoundController::new(
            self.game.clone(),
            self.words.clone(),
            ChaCha8Rng::seed_from_u64(self.rng.gen()),
        );
        tokio::spawn(run_room(Room::new(code.clone(), controller), rx, self.tick_rate_hz));

        tracing::info!(
            "Room {} created by {} ({}), {} rooms open",
            code,
            player.name,
            conn,
            self.registry.room_count()
        );
        player.send(room_joined(conn, &code, &player, None));
        handle.send(RoomCommand::Seat(player));
    }

    fn join_room(
        &mut self,
        conn: ConnectionId,
        code: &str,
        name: &str,
        outbox: Outbox,
    ) -> Result<(), SessionError> {
        let joined = self.registry.join_room(code, conn, name, outbox)?;
        let player = joined.player;

        tracing::info!(
            "{} ({}) joined room {} as player {}",
            player.name,
            conn,
            joined.code,
            player.side
        );
        player.send(room_joined(
            conn,
            &joined.code,
            &player,
            joined.opponent.as_ref(),
        ));
        if let Some(opponent) = &joined.opponent {
            opponent.send(ServerMsg::PlayerJoined(PlayerJoinedMsg {
                player_name: player.name.clone(),
            }));
        }
        joined.handle.send(RoomCommand::Seat(player));
        Ok(())
    }

    /// Repeat `room_joined` for a connection asking to join the room it is in.
    fn resend_room_joined(&self, conn: ConnectionId, code: &str) {
        let (Some(seat), Some(room)) = (self.registry.seat(conn), self.registry.room(code)) else {
            return;
        };
        if let Some(player) = room.player(seat.side) {
            player.send(room_joined(
                conn,
                code,
                player,
                room.player(seat.side.opponent()),
            ));
        }
    }

    fn leave(&mut self, conn: ConnectionId) {
        let Some(departure) = self.registry.leave(conn) else {
            return;
        };
        departure.handle.send(RoomCommand::Unseat {
            side: departure.side,
        });
        if departure.room_closed {
            tracing::info!(
                "Room {} empty, closing ({} rooms open)",
                departure.code,
                self.registry.room_count()
            );
        } else {
            tracing::info!(
                "Player {} ({}) left room {}",
                departure.side,
                conn,
                departure.code
            );
        }
    }
}

fn room_joined(
    conn: ConnectionId,
    code: &str,
    player: &Player,
    opponent: Option<&Player>,
) -> ServerMsg {
    ServerMsg::RoomJoined(RoomJoinedMsg {
        protocol_version: PROTOCOL_VERSION,
        room_code: code.to_string(),
        connection_id: conn.0,
        side: player.side.number(),
        player_name: player.name.clone(),
        other_player_name: opponent.map(|p| p.name.clone()),
    })
}

/// Run the lobby until every connection sender is dropped.
pub async fn run_lobby(mut cmd_rx: mpsc::Receiver<LobbyCommand>, config: ServerConfig) {
    let mut lobby = Lobby::new(&config);
    while let Some(cmd) = cmd_rx.recv().await {
        lobby.handle(cmd);
    }
    tracing::info!("Lobby stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use typetype_shared::protocol::{CreateRoomMsg, JoinRoomMsg, WordSubmittedMsg};
    use typetype_shared::round::MatchStatus;

    type Inbox = mpsc::UnboundedReceiver<ServerMsg>;

    fn lobby() -> Lobby {
        Lobby::new(&ServerConfig {
            rng_seed: Some(99),
            ..Default::default()
        })
    }

    fn client() -> (Outbox, Inbox) {
        mpsc::unbounded_channel()
    }

    fn send(lobby: &mut Lobby, conn: u32, outbox: &Outbox, msg: ClientMsg) {
        lobby.handle(LobbyCommand::Client {
            conn: ConnectionId(conn),
            outbox: outbox.clone(),
            msg,
        });
    }

    fn create(lobby: &mut Lobby, conn: u32, outbox: &Outbox, name: &str) {
        send(
            lobby,
            conn,
            outbox,
            ClientMsg::CreateRoom(CreateRoomMsg {
                player_name: name.to_string(),
            }),
        );
    }

    fn join(lobby: &mut Lobby, conn: u32, outbox: &Outbox, code: &str, name: &str) {
        send(
            lobby,
            conn,
            outbox,
            ClientMsg::JoinRoom(JoinRoomMsg {
                room_code: code.to_string(),
                player_name: name.to_string(),
            }),
        );
    }

    async fn recv(rx: &mut Inbox) -> ServerMsg {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("outbox closed")
    }

    fn room_code(msg: ServerMsg) -> String {
        match msg {
            ServerMsg::RoomJoined(joined) => joined.room_code,
            other => panic!("Expected RoomJoined, got {:?}", other),
        }
    }

    fn error_text(msg: ServerMsg) -> String {
        match msg {
            ServerMsg::Error(e) => e.message,
            other => panic!("Expected Error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_then_join_pairs_players() {
        let mut lobby = lobby();
        let (tx1, mut rx1) = client();
        let (tx2, mut rx2) = client();

        create(&mut lobby, 1, &tx1, "Ada");
        let code = room_code(recv(&mut rx1).await);
        assert_eq!(code.len(), 6);

        join(&mut lobby, 2, &tx2, &code.to_lowercase(), "Linus");
        match recv(&mut rx2).await {
            ServerMsg::RoomJoined(joined) => {
                assert_eq!(joined.side, 2);
                assert_eq!(joined.room_code, code);
                assert_eq!(joined.other_player_name.as_deref(), Some("Ada"));
                assert_eq!(joined.protocol_version, PROTOCOL_VERSION);
            }
            other => panic!("Expected RoomJoined, got {:?}", other),
        }
        match recv(&mut rx1).await {
            ServerMsg::PlayerJoined(m) => assert_eq!(m.player_name, "Linus"),
            other => panic!("Expected PlayerJoined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn join_errors_are_reported_to_sender() {
        let mut lobby = lobby();
        let (tx1, mut rx1) = client();
        let (tx2, _rx2) = client();
        let (tx3, mut rx3) = client();

        join(&mut lobby, 3, &tx3, "NOPE00", "Grace");
        assert_eq!(error_text(recv(&mut rx3).await), "Room not found");

        create(&mut lobby, 1, &tx1, "Ada");
        let code = room_code(recv(&mut rx1).await);
        join(&mut lobby, 2, &tx2, &code, "Linus");
        join(&mut lobby, 3, &tx3, &code, "Grace");
        assert_eq!(error_text(recv(&mut rx3).await), "Room is full");
        assert_eq!(lobby.registry().connection_count(), 2);
    }

    #[tokio::test]
    async fn start_needs_two_players() {
        let mut lobby = lobby();
        let (tx1, mut rx1) = client();
        let (tx2, mut rx2) = client();

        create(&mut lobby, 1, &tx1, "Ada");
        let code = room_code(recv(&mut rx1).await);
        send(&mut lobby, 1, &tx1, ClientMsg::StartGame);
        assert_eq!(
            error_text(recv(&mut rx1).await),
            "Cannot start game: not enough players"
        );

        join(&mut lobby, 2, &tx2, &code, "Linus");
        let _ = recv(&mut rx1).await; // player_joined
        let _ = recv(&mut rx2).await; // room_joined
        send(&mut lobby, 2, &tx2, ClientMsg::StartGame);
        assert!(matches!(recv(&mut rx1).await, ServerMsg::GameStart(_)));
        assert!(matches!(recv(&mut rx2).await, ServerMsg::GameStart(_)));
    }

    #[tokio::test]
    async fn unseated_submission_is_stale() {
        let mut lobby = lobby();
        let (tx, mut rx) = client();
        send(
            &mut lobby,
            5,
            &tx,
            ClientMsg::WordSubmitted(WordSubmittedMsg {
                word: "cat".to_string(),
                time_taken: 100,
            }),
        );
        assert_eq!(error_text(recv(&mut rx).await), "Not in a room");

        send(
            &mut lobby,
            5,
            &tx,
            ClientMsg::PlayerInputUpdate {
                input: "c".to_string(),
            },
        );
        assert_eq!(error_text(recv(&mut rx).await), "Not in a room");
    }

    #[tokio::test]
    async fn rejoining_own_room_resends_room_joined() {
        let mut lobby = lobby();
        let (tx1, mut rx1) = client();
        let (tx2, mut rx2) = client();

        create(&mut lobby, 1, &tx1, "Ada");
        let code = room_code(recv(&mut rx1).await);
        join(&mut lobby, 2, &tx2, &code, "Linus");
        let _ = recv(&mut rx2).await;
        let _ = recv(&mut rx1).await; // player_joined

        join(&mut lobby, 1, &tx1, &code.to_lowercase(), "Ada");
        match recv(&mut rx1).await {
            ServerMsg::RoomJoined(joined) => {
                assert_eq!(joined.room_code, code);
                assert_eq!(joined.connection_id, 1);
                assert_eq!(joined.side, 1);
                assert_eq!(joined.player_name, "Ada");
                assert_eq!(joined.other_player_name.as_deref(), Some("Linus"));
            }
            other => panic!("Expected RoomJoined, got {:?}", other),
        }
        assert!(rx2.try_recv().is_err());
        assert_eq!(lobby.registry().room_count(), 1);
        assert_eq!(lobby.registry().connection_count(), 2);
    }

    async fn started_pair(lobby: &mut Lobby, first: u32) -> ([(Outbox, Inbox); 2], u8) {
        let (tx1, mut rx1) = client();
        let (tx2, mut rx2) = client();
        create(lobby, first, &tx1, "Ada");
        let code = room_code(recv(&mut rx1).await);
        join(lobby, first + 1, &tx2, &code, "Linus");
        let _ = recv(&mut rx1).await; // player_joined
        let _ = recv(&mut rx2).await; // room_joined
        send(lobby, first, &tx1, ClientMsg::StartGame);
        let current = match recv(&mut rx1).await {
            ServerMsg::GameStart(snapshot) => snapshot.current_player,
            other => panic!("Expected GameStart, got {:?}", other),
        };
        assert!(matches!(recv(&mut rx2).await, ServerMsg::GameStart(_)));
        ([(tx1, rx1), (tx2, rx2)], current)
    }

    #[tokio::test]
    async fn rooms_run_independently() {
        let mut lobby = lobby();
        let ([mut a1, mut a2], current) = started_pair(&mut lobby, 1).await;
        let ([mut b1, mut b2], _) = started_pair(&mut lobby, 3).await;
        assert_eq!(lobby.registry().room_count(), 2);

        let conn = u32::from(current);
        let outbox = if current == 1 { a1.0.clone() } else { a2.0.clone() };
        send(
            &mut lobby,
            conn,
            &outbox,
            ClientMsg::WordSubmitted(WordSubmittedMsg {
                word: "definitely-not-the-word".to_string(),
                time_taken: 50,
            }),
        );

        for inbox in [&mut a1.1, &mut a2.1] {
            loop {
                if let ServerMsg::GameStateUpdate(update) = recv(inbox).await {
                    if update.submitted_word.is_some() {
                        assert_eq!(update.snapshot.game_status, MatchStatus::Lost);
                        assert_eq!(update.snapshot.losing_player, Some(current));
                        break;
                    }
                }
            }
        }

        let window = tokio::time::sleep(Duration::from_millis(300));
        tokio::pin!(window);
        let mut seen = 0;
        loop {
            tokio::select! {
                _ = &mut window => break,
                Some(msg) = b1.1.recv() => {
                    if let ServerMsg::GameStateUpdate(update) = msg {
                        assert!(update.submitted_word.is_none());
                        assert_eq!(update.snapshot.game_status, MatchStatus::Playing);
                        seen += 1;
                    }
                }
            }
        }
        assert!(seen > 0, "room B stopped ticking");
        while let Ok(msg) = b2.1.try_recv() {
            if let ServerMsg::GameStateUpdate(update) = msg {
                assert_eq!(update.snapshot.game_status, MatchStatus::Playing);
            }
        }
    }

    #[tokio::test]
    async fn disconnect_notifies_and_last_leave_closes_room() {
        let mut lobby = lobby();
        let (tx1, mut rx1) = client();
        let (tx2, mut rx2) = client();

        create(&mut lobby, 1, &tx1, "Ada");
        let code = room_code(recv(&mut rx1).await);
        join(&mut lobby, 2, &tx2, &code, "Linus");
        let _ = recv(&mut rx1).await;

        lobby.handle(LobbyCommand::Disconnect {
            conn: ConnectionId(1),
        });
        let _ = recv(&mut rx2).await; // room_joined
        match recv(&mut rx2).await {
            ServerMsg::PlayerDisconnected(m) => assert_eq!(m.side, 1),
            other => panic!("Expected PlayerDisconnected, got {:?}", other),
        }
        assert_eq!(lobby.registry().room_count(), 1);

        lobby.handle(LobbyCommand::Disconnect {
            conn: ConnectionId(2),
        });
        assert_eq!(lobby.registry().room_count(), 0);
        assert_eq!(lobby.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn creating_again_leaves_previous_room() {
        let mut lobby = lobby();
        let (tx, mut rx) = client();
        create(&mut lobby, 1, &tx, "Ada");
        let first = room_code(recv(&mut rx).await);
        create(&mut lobby, 1, &tx, "Ada");
        let second = room_code(recv(&mut rx).await);

        assert_ne!(first, second);
        assert_eq!(lobby.registry().room_count(), 1);
        assert!(lobby.registry().room(&first).is_none());
    }
}
