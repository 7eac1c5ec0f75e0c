//! # Audio Module
//!
//! Per-guild playback state for Hydra Music.
//!
//! The audio itself is produced by an external node; this module only keeps
//! the authoritative queue and playback state for each guild:
//!
//! ### [`registry`] - Session Registry
//! - At most one live [`session::Session`] per guild
//! - Per-guild exclusive lock shared by commands and node events
//!
//! ### [`session`] - Session State Machine
//! - `Idle → Playing ⇄ Paused → Idle`, `any → Destroyed`
//! - Sends directives to the node, one track at a time
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue of resolved tracks
//!
//! ### [`resolver`] - Track Resolution
//! - Free text or URL into `NoMatch | SingleTrack | Playlist`
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hydra_music::audio::registry::SessionRegistry;
//! use serenity::all::{ChannelId, GuildId};
//!
//! # async fn example(registry: &SessionRegistry) -> anyhow::Result<()> {
//! let guild_id = GuildId::new(123456789);
//! let mut guard = registry
//!     .get_or_create(guild_id, ChannelId::new(1), ChannelId::new(2))
//!     .await?;
//! guard.session()?.set_volume(80).await?;
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod track;
