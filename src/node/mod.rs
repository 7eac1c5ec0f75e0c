//! # Node Module
//!
//! Boundary with the external audio node that actually fetches, decodes and
//! streams audio.
//!
//! - [`AudioNode`]: directives the bot sends (connect, play, stop, volume...)
//! - [`NodeEvent`]: lifecycle events the node pushes back, consumed by the
//!   event bridge
//! - [`NodeHealth`]: shared flag that degrades session creation while the node
//!   is erroring or disconnected
//!
//! [`lavalink`] holds the Lavalink v4 implementation.

pub mod lavalink;

use async_trait::async_trait;
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;

use crate::audio::track::TrackDescriptor;
use crate::error::NodeError;

/// Directivas aceptadas por el nodo de audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioNode: Send + Sync {
    /// Une el bot al canal de voz y entrega la conexión al nodo
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), NodeError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), NodeError>;

    /// Resultado crudo (JSON) del cargador de pistas
    async fn load_tracks(&self, identifier: &str) -> Result<serde_json::Value, NodeError>;

    async fn play(&self, guild_id: GuildId, handle: &str) -> Result<(), NodeError>;

    async fn stop_current(&self, guild_id: GuildId) -> Result<(), NodeError>;

    async fn set_volume(&self, guild_id: GuildId, percent: u8) -> Result<(), NodeError>;

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError>;
}

/// Motivo de fin de pista reportado por el nodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

impl TrackEndReason {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "finished" | "FINISHED" => Some(Self::Finished),
            "loadFailed" | "LOAD_FAILED" => Some(Self::LoadFailed),
            "stopped" | "STOPPED" => Some(Self::Stopped),
            "replaced" | "REPLACED" => Some(Self::Replaced),
            "cleanup" | "CLEANUP" => Some(Self::Cleanup),
            _ => None,
        }
    }

    /// Si el nodo considera que puede arrancar la siguiente pista
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished | Self::LoadFailed)
    }
}

/// Eventos empujados por el nodo.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    NodeConnect { session_id: String, resumed: bool },
    NodeError { message: String },
    NodeDisconnect { reason: String },
    TrackStart { guild_id: GuildId, track: TrackDescriptor },
    TrackEnd { guild_id: GuildId, track: TrackDescriptor, reason: TrackEndReason },
    TrackException { guild_id: GuildId, track: TrackDescriptor, message: String },
    TrackStuck { guild_id: GuildId, track: TrackDescriptor, threshold_ms: u64 },
    /// El websocket de voz entre el nodo y Discord se cerró
    VoiceClosed { guild_id: GuildId, code: u16, reason: String },
    /// Para nodos que administran su propia cola
    QueueEnd { guild_id: GuildId },
}

impl NodeEvent {
    /// Guild dueño del evento; `None` para eventos del nodo completo
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::NodeConnect { .. } | Self::NodeError { .. } | Self::NodeDisconnect { .. } => None,
            Self::TrackStart { guild_id, .. }
            | Self::TrackEnd { guild_id, .. }
            | Self::TrackException { guild_id, .. }
            | Self::TrackStuck { guild_id, .. }
            | Self::VoiceClosed { guild_id, .. }
            | Self::QueueEnd { guild_id } => Some(*guild_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Available,
    Degraded(String),
}

/// Estado compartido de la conexión con el nodo.
///
/// Lo escribe el bridge; el registro lo consulta antes de crear sesiones.
#[derive(Debug, Clone)]
pub struct NodeHealth {
    status: Arc<RwLock<NodeStatus>>,
}

impl NodeHealth {
    /// Arranca degradado hasta que el nodo mande `ready`
    pub fn new() -> Self {
        Self {
            status: Arc::new(RwLock::new(NodeStatus::Degraded("node not connected yet".to_string()))),
        }
    }

    pub fn available() -> Self {
        let health = Self::new();
        health.mark_available();
        health
    }

    pub fn mark_available(&self) {
        *self.status.write() = NodeStatus::Available;
    }

    pub fn mark_degraded(&self, reason: impl Into<String>) {
        *self.status.write() = NodeStatus::Degraded(reason.into());
    }

    pub fn status(&self) -> NodeStatus {
        self.status.read().clone()
    }

    pub fn is_available(&self) -> bool {
        matches!(*self.status.read(), NodeStatus::Available)
    }
}

impl Default for NodeHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_advancing() {
        assert!(TrackEndReason::parse("finished").unwrap().may_start_next());
        assert!(TrackEndReason::parse("LOAD_FAILED").unwrap().may_start_next());
        assert!(!TrackEndReason::parse("stopped").unwrap().may_start_next());
        assert!(!TrackEndReason::parse("replaced").unwrap().may_start_next());
        assert_eq!(TrackEndReason::parse("bogus"), None);
    }

    #[test]
    fn test_health_transitions() {
        let health = NodeHealth::new();
        assert!(!health.is_available());

        health.mark_available();
        assert!(health.is_available());

        health.mark_degraded("socket closed");
        assert_eq!(health.status(), NodeStatus::Degraded("socket closed".to_string()));
    }
}
