//! Typetype duel server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod error;
pub mod lobby;
pub mod player;
pub mod registry;
pub mod room;
pub mod ws;
