//! Shared simulation for the typing duel.
//!
//! Pure kinematics and match rules used by both the authoritative server
//! loop and the client-side predictive loop, plus the wire protocol they
//! exchange.

pub mod config;
pub mod local;
pub mod physics;
pub mod protocol;
pub mod round;
pub mod side;
pub mod words;

pub use config::GameConfig;
pub use round::{GameState, RoundController};
pub use side::Side;
