/// Session-level failures reported back to the originating connection.
///
/// The `Display` text is what the client sees in the `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Cannot start game: not enough players")]
    InsufficientPlayers,
    /// Message from a connection that is not seated in any room
    #[error("Not in a room")]
    StaleSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_wire_text() {
        assert_eq!(SessionError::RoomNotFound.to_string(), "Room not found");
        assert_eq!(SessionError::RoomFull.to_string(), "Room is full");
        assert_eq!(
            SessionError::InsufficientPlayers.to_string(),
            "Cannot start game: not enough players"
        );
    }
}
