//! # Hydra Music
//!
//! Text-command Discord music bot whose audio is played by an external
//! Lavalink node. The crate keeps one authoritative playback session per
//! guild, shared by user commands and node events.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod node;
pub mod ui;

#[cfg(test)]
pub(crate) mod testing;
