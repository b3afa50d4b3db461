//! Room membership: which connection sits in which room, on which side.
//!
//! The registry holds the only two process-wide maps (room code to room,
//! connection to seat). It is owned by the lobby task and only changed
//! through the methods below.

use crate::error::SessionError;
use crate::player::{ConnectionId, Outbox, Player};
use crate::room::RoomHandle;
use rand::Rng;
use std::collections::HashMap;
use typetype_shared::Side;

pub const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

pub fn generate_room_code(rng: &mut impl Rng) -> String {
    (0..ROOM_CODE_LEN)
        .map(|_| ROOM_CODE_CHARS[rng.gen_range(0..ROOM_CODE_CHARS.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and without surrounding whitespace.
pub fn normalize_room_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Registry-side view of a room: its seated players and the channel to its task.
#[derive(Debug)]
pub struct RoomEntry {
    pub code: String,
    pub players: Vec<Player>,
    pub handle: RoomHandle,
}

impl RoomEntry {
    pub fn player(&self, side: Side) -> Option<&Player> {
        self.players.iter().find(|p| p.side == side)
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= 2
    }

    fn free_side(&self) -> Side {
        if self.player(Side::One).is_some() {
            Side::Two
        } else {
            Side::One
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub code: String,
    pub side: Side,
}

/// Result of a successful join.
#[derive(Debug)]
pub struct Joined {
    pub code: String,
    pub player: Player,
    /// The player who was already waiting in the room
    pub opponent: Option<Player>,
    pub handle: RoomHandle,
}

/// Result of a connection leaving its room.
#[derive(Debug)]
pub struct Departure {
    pub code: String,
    pub side: Side,
    pub handle: RoomHandle,
    /// The room had no players left and was removed
    pub room_closed: bool,
}

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, RoomEntry>,
    connections: HashMap<ConnectionId, Seat>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn room(&self, code: &str) -> Option<&RoomEntry> {
        self.rooms.get(code)
    }

    pub fn seat(&self, conn: ConnectionId) -> Option<&Seat> {
        self.connections.get(&conn)
    }

    /// Open a new room with `conn` on side 1. The code is unique among live rooms.
    pub fn create_room(
        &mut self,
        conn: ConnectionId,
        name: &str,
        outbox: Outbox,
        handle: RoomHandle,
        rng: &mut impl Rng,
    ) -> (String, Player) {
        let mut code = generate_room_code(rng);
        while self.rooms.contains_key(&code) {
            code = generate_room_code(rng);
        }

        let player = Player::new(conn, Side::One, name, outbox);
        self.rooms.insert(
            code.clone(),
            RoomEntry {
                code: code.clone(),
                players: vec![player.clone()],
                handle,
            },
        );
        self.connections.insert(
            conn,
            Seat {
                code: code.clone(),
                side: Side::One,
            },
        );
        (code, player)
    }

    /// Check that `code` names a room with a free seat, without changing anything.
    pub fn check_joinable(&self, code: &str) -> Result<(), SessionError> {
        let room = self
            .rooms
            .get(&normalize_room_code(code))
            .ok_or(SessionError::RoomNotFound)?;
        if room.is_full() {
            return Err(SessionError::RoomFull);
        }
        Ok(())
    }

    /// Seat `conn` in the free side of room `code`.
    pub fn join_room(
        &mut self,
        code: &str,
        conn: ConnectionId,
        name: &str,
        outbox: Outbox,
    ) -> Result<Joined, SessionError> {
        let code = normalize_room_code(code);
        let room = self.rooms.get_mut(&code).ok_or(SessionError::RoomNotFound)?;
        if room.is_full() {
            return Err(SessionError::RoomFull);
        }

        let side = room.free_side();
        let opponent = room.player(side.opponent()).cloned();
        let player = Player::new(conn, side, name, outbox);
        room.players.push(player.clone());
        let handle = room.handle.clone();

        self.connections.insert(
            conn,
            Seat {
                code: code.clone(),
                side,
            },
        );
        Ok(Joined {
            code,
            player,
            opponent,
            handle,
        })
    }

    /// Seat and room channel for a message from `conn`.
    pub fn route(&self, conn: ConnectionId) -> Result<(Side, &RoomHandle), SessionError> {
        let seat = self.connections.get(&conn).ok_or(SessionError::StaleSession)?;
        let room = self.rooms.get(&seat.code).ok_or(SessionError::RoomNotFound)?;
        Ok((seat.side, &room.handle))
    }

    /// Room channel for a start request; requires both seats taken.
    pub fn start_target(&self, conn: ConnectionId) -> Result<&RoomHandle, SessionError> {
        let seat = self.connections.get(&conn).ok_or(SessionError::StaleSession)?;
        let room = self.rooms.get(&seat.code).ok_or(SessionError::RoomNotFound)?;
        if room.players.len() != 2 {
            return Err(SessionError::InsufficientPlayers);
        }
        Ok(&room.handle)
    }

    /// Remove `conn` from its room, closing the room when it empties.
    pub fn leave(&mut self, conn: ConnectionId) -> Option<Departure> {
        let seat = self.connections.remove(&conn)?;
        let room = self.rooms.get_mut(&seat.code)?;
        room.players.retain(|p| p.connection_id != conn);
        let handle = room.handle.clone();

        let room_closed = room.players.is_empty();
        if room_closed {
            self.rooms.remove(&seat.code);
        }
        Some(Departure {
            code: seat.code,
            side: seat.side,
            handle,
            room_closed,
        })
    }
}
