use std::fmt;
use tokio::sync::mpsc;
use typetype_shared::protocol::ServerMsg;
use typetype_shared::Side;

/// Longest display name kept after sanitizing
const MAX_NAME_CHARS: usize = 20;

/// Outbound queue of one WebSocket connection. Unbounded so the simulation
/// never waits on a slow socket.
pub type Outbox = mpsc::UnboundedSender<ServerMsg>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connection seated in a room.
#[derive(Debug, Clone)]
pub struct Player {
    pub connection_id: ConnectionId,
    pub side: Side,
    pub name: String,
    pub outbox: Outbox,
}

impl Player {
    pub fn new(connection_id: ConnectionId, side: Side, name: &str, outbox: Outbox) -> Self {
        Self {
            connection_id,
            side,
            name: sanitize_name(name, side),
            outbox,
        }
    }

    /// Queue a message. Returns false if the connection is already gone.
    pub fn send(&self, msg: ServerMsg) -> bool {
        self.outbox.send(msg).is_ok()
    }
}

/// Trimmed, control-character free, at most `MAX_NAME_CHARS` long.
/// Blank names become "Player 1" / "Player 2".
pub fn sanitize_name(name: &str, side: Side) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NAME_CHARS)
        .collect();
    if cleaned.is_empty() {
        format!("Player {}", side)
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_name_gets_side_default() {
        assert_eq!(sanitize_name("   ", Side::Two), "Player 2");
        assert_eq!(sanitize_name("", Side::One), "Player 1");
    }

    #[test]
    fn long_names_are_truncated() {
        let name = sanitize_name("  abcdefghijklmnopqrstuvwxyz  ", Side::One);
        assert_eq!(name, "abcdefghijklmnopqrst");
    }

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(sanitize_name("Ada\n\u{7}", Side::One), "Ada");
    }

    #[test]
    fn send_reports_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        let player = Player::new(ConnectionId(1), Side::One, "Ada", tx);
        assert!(player.send(ServerMsg::error("x")));
        drop(rx);
        assert!(!player.send(ServerMsg::error("x")));
    }
}
