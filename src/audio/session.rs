use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::queue::TrackQueue;
use crate::audio::resolver::ResolvedResult;
use crate::audio::track::TrackDescriptor;
use crate::error::{MusicError, MusicResult};
use crate::node::{AudioNode, TrackEndReason};

/// Volumen con el que el nodo crea cada player
const NODE_DEFAULT_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    Connecting,
    Playing,
    Paused,
    Destroyed,
}

/// Resultado de `play()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started(TrackDescriptor),
    QueueEmpty,
}

/// Resumen de lo que hizo `enqueue_and_maybe_start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub added: usize,
    pub started: Option<TrackDescriptor>,
}

/// Decisión ante un `TrackEnd` del nodo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackEndOutcome {
    /// Evento viejo o que no avanza la cola
    Ignored,
    /// Hay más pistas: el bridge debe llamar a `play()`
    Advance,
    /// No queda nada: stop + destroy
    QueueExhausted,
}

/// Estado de reproducción de un guild.
///
/// Solo se muta a través de un `SessionGuard`, que mantiene el lock exclusivo
/// del guild mientras dura cada operación.
pub struct Session {
    id: u64,
    guild_id: GuildId,
    voice_channel_id: ChannelId,
    text_channel_id: ChannelId,
    queue: TrackQueue,
    current: Option<TrackDescriptor>,
    status: PlaybackStatus,
    volume: u8,
    connected: bool,
    skip_requested: bool,
    /// El player del nodo conserva la pausa entre pistas
    paused_on_node: bool,
    created_at: DateTime<Utc>,
    node: Arc<dyn AudioNode>,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        guild_id: GuildId,
        voice_channel_id: ChannelId,
        text_channel_id: ChannelId,
        volume: u8,
        node: Arc<dyn AudioNode>,
    ) -> Self {
        Self {
            id,
            guild_id,
            voice_channel_id,
            text_channel_id,
            queue: TrackQueue::new(),
            current: None,
            status: PlaybackStatus::Connecting,
            volume: volume.min(100),
            connected: false,
            skip_requested: false,
            paused_on_node: false,
            created_at: Utc::now(),
            node,
        }
    }

    // Getters
    pub fn id(&self) -> u64 {
        self.id
    }
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }
    pub fn voice_channel_id(&self) -> ChannelId {
        self.voice_channel_id
    }
    pub fn text_channel_id(&self) -> ChannelId {
        self.text_channel_id
    }
    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }
    pub fn current(&self) -> Option<&TrackDescriptor> {
        self.current.as_ref()
    }
    pub fn status(&self) -> PlaybackStatus {
        self.status
    }
    pub fn volume(&self) -> u8 {
        self.volume
    }
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn ensure_alive(&self) -> MusicResult<()> {
        if self.status == PlaybackStatus::Destroyed {
            return Err(MusicError::SessionGone);
        }
        Ok(())
    }

    /// Directiva de conexión inicial: Connecting → Idle
    ///
    /// El player nuevo del nodo arranca al 100%; cualquier otro volumen
    /// inicial se le manda explícitamente.
    pub(crate) async fn connect(&mut self) -> MusicResult<()> {
        self.ensure_alive()?;
        self.node.connect(self.guild_id, self.voice_channel_id).await?;
        self.connected = true;
        self.status = PlaybackStatus::Idle;

        if self.volume != NODE_DEFAULT_VOLUME {
            if let Err(e) = self.node.set_volume(self.guild_id, self.volume).await {
                warn!(
                    "No se pudo aplicar el volumen inicial {}% en guild {}: {}",
                    self.volume, self.guild_id, e
                );
                self.volume = NODE_DEFAULT_VOLUME;
            }
        }
        info!(
            "🔊 Sesión #{} conectada al canal {} en guild {}",
            self.id, self.voice_channel_id, self.guild_id
        );
        Ok(())
    }

    /// Mueve el bot a otro canal de voz si cambió
    pub async fn bind_voice_channel(&mut self, channel_id: ChannelId) -> MusicResult<bool> {
        self.ensure_alive()?;
        if channel_id == self.voice_channel_id {
            return Ok(false);
        }
        if !self.connected {
            return Err(MusicError::NodeUnavailable("session is not connected".to_string()));
        }

        self.node.connect(self.guild_id, channel_id).await?;
        info!(
            "🔀 Guild {} movido del canal {} al {}",
            self.guild_id, self.voice_channel_id, channel_id
        );
        self.voice_channel_id = channel_id;
        Ok(true)
    }

    /// Agrega todo lo resuelto y arranca si estaba inactiva
    pub async fn enqueue_and_maybe_start(&mut self, resolved: ResolvedResult) -> MusicResult<Enqueued> {
        self.ensure_alive()?;
        if matches!(resolved, ResolvedResult::NoMatch) {
            return Err(MusicError::NoMatch);
        }

        let tracks = resolved.into_tracks();
        let added = tracks.len();
        self.queue.extend(tracks);
        info!("➕ {} pistas agregadas a la cola de {}", added, self.guild_id);

        let started = if self.status == PlaybackStatus::Idle {
            match self.play().await? {
                PlayOutcome::Started(track) => Some(track),
                PlayOutcome::QueueEmpty => None,
            }
        } else {
            None
        };

        Ok(Enqueued { added, started })
    }

    /// Saca una sola pista y la entrega al nodo.
    ///
    /// El estado se confirma antes de esperar al nodo; si la directiva falla
    /// la pista vuelve a la cabeza y el estado anterior se restaura.
    pub async fn play(&mut self) -> MusicResult<PlayOutcome> {
        self.ensure_alive()?;
        if self.queue.is_empty() {
            debug!("📭 Cola vacía en guild {}", self.guild_id);
            return Ok(PlayOutcome::QueueEmpty);
        }

        // Una pausa previa (p. ej. skip en pausa) seguiría activa en el nodo
        if self.paused_on_node {
            self.node.set_paused(self.guild_id, false).await?;
            self.paused_on_node = false;
        }

        let Some(track) = self.queue.pop_front() else {
            return Ok(PlayOutcome::QueueEmpty);
        };

        let previous_status = self.status;
        let previous_track = self.current.replace(track.clone());
        self.status = PlaybackStatus::Playing;
        self.skip_requested = false;

        if let Err(e) = self.node.play(self.guild_id, &track.handle).await {
            warn!("Error al reproducir {} en guild {}: {}", track.title, self.guild_id, e);
            self.current = previous_track;
            self.status = previous_status;
            self.queue.requeue_front(track);
            return Err(e.into());
        }

        info!("🎵 Reproduciendo: {} en guild {}", track.title, self.guild_id);
        Ok(PlayOutcome::Started(track))
    }

    /// Pide al nodo cortar la pista actual; el `TrackEnd` resultante avanza la cola
    pub async fn skip(&mut self) -> MusicResult<Option<TrackDescriptor>> {
        self.ensure_alive()?;
        let Some(current) = self.current.clone() else {
            return Ok(None);
        };

        self.node.stop_current(self.guild_id).await?;
        self.skip_requested = true;
        info!("⏭️ Skip solicitado para {} en guild {}", current.title, self.guild_id);
        Ok(Some(current))
    }

    /// Limpia la cola y detiene la reproducción
    pub async fn stop(&mut self) -> MusicResult<()> {
        self.ensure_alive()?;
        self.queue.clear();
        self.current = None;
        self.skip_requested = false;
        self.status = PlaybackStatus::Idle;

        self.node.stop_current(self.guild_id).await?;
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(())
    }

    pub async fn set_volume(&mut self, volume: i64) -> MusicResult<u8> {
        self.ensure_alive()?;
        let volume = u8::try_from(volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| MusicError::Validation("Volume must be between 0 and 100.".to_string()))?;

        self.node.set_volume(self.guild_id, volume).await?;
        self.volume = volume;
        info!("🔊 Volumen de guild {} en {}%", self.guild_id, volume);
        Ok(volume)
    }

    pub async fn pause(&mut self) -> MusicResult<()> {
        self.ensure_alive()?;
        if self.status != PlaybackStatus::Playing {
            return Err(MusicError::Validation("Nothing is playing.".to_string()));
        }
        self.node.set_paused(self.guild_id, true).await?;
        self.paused_on_node = true;
        self.status = PlaybackStatus::Paused;
        Ok(())
    }

    pub async fn resume(&mut self) -> MusicResult<()> {
        self.ensure_alive()?;
        if self.status != PlaybackStatus::Paused {
            return Err(MusicError::Validation("Playback is not paused.".to_string()));
        }
        self.node.set_paused(self.guild_id, false).await?;
        self.paused_on_node = false;
        self.status = PlaybackStatus::Playing;
        Ok(())
    }

    /// Desconecta del nodo y pasa a Destroyed. Nunca falla por el nodo.
    ///
    /// Quitarla del registro es responsabilidad de `SessionGuard::destroy`.
    pub(crate) async fn destroy(&mut self) {
        if self.status == PlaybackStatus::Destroyed {
            return;
        }
        self.status = PlaybackStatus::Destroyed;
        self.queue.clear();
        self.current = None;

        if self.connected {
            if let Err(e) = self.node.disconnect(self.guild_id).await {
                warn!("Error al desconectar guild {} del nodo: {}", self.guild_id, e);
            }
        }
        self.connected = false;

        let lifetime = Utc::now().signed_duration_since(self.created_at);
        info!(
            "👋 Sesión #{} de guild {} destruida tras {}s",
            self.id,
            self.guild_id,
            lifetime.num_seconds()
        );
    }

    fn is_current(&self, track: &TrackDescriptor) -> bool {
        self.current.as_ref().is_some_and(|c| c.handle == track.handle)
    }

    /// `Some` si el inicio corresponde a la pista que la sesión entregó
    pub fn on_track_start(&self, track: &TrackDescriptor) -> Option<&TrackDescriptor> {
        if self.status == PlaybackStatus::Destroyed || !self.is_current(track) {
            return None;
        }
        self.current.as_ref()
    }

    pub fn on_track_end(&mut self, track: &TrackDescriptor, reason: TrackEndReason) -> TrackEndOutcome {
        if !matches!(self.status, PlaybackStatus::Playing | PlaybackStatus::Paused) || !self.is_current(track) {
            return TrackEndOutcome::Ignored;
        }

        let advance = reason.may_start_next() || (reason == TrackEndReason::Stopped && self.skip_requested);
        if !advance {
            return TrackEndOutcome::Ignored;
        }

        // Sin pista cargada la sesión queda Idle hasta que `play()` confirme otra
        self.current = None;
        self.skip_requested = false;
        self.status = PlaybackStatus::Idle;
        if self.queue.is_empty() {
            TrackEndOutcome::QueueExhausted
        } else {
            TrackEndOutcome::Advance
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("guild_id", &self.guild_id)
            .field("voice_channel_id", &self.voice_channel_id)
            .field("text_channel_id", &self.text_channel_id)
            .field("status", &self.status)
            .field("queued", &self.queue.size())
            .field("volume", &self.volume)
            .finish()
    }
}
