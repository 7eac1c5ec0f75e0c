use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audio::registry::SessionRegistry;
use crate::audio::resolver::{ResolvedResult, TrackResolver};
use crate::bot::gateway::ChatGateway;
use crate::config::Config;
use crate::error::{MusicError, MusicResult};
use crate::ui::messages;

/// Comandos de texto soportados
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Play(String),
    Skip,
    Stop,
    Leave,
    /// El argumento crudo; se valida al ejecutar
    Volume(Option<String>),
    Pause,
    Resume,
    Queue,
}

impl Command {
    /// `None` si el mensaje no lleva el prefijo o el comando es desconocido
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.strip_prefix(prefix)?.trim();
        let mut parts = rest.split_whitespace();
        let name = parts.next()?.to_lowercase();
        let args: Vec<&str> = parts.collect();

        let command = match name.as_str() {
            "join" => Self::Join,
            "play" => Self::Play(args.join(" ")),
            "skip" => Self::Skip,
            "stop" => Self::Stop,
            "leave" => Self::Leave,
            "volume" => Self::Volume(args.first().map(|a| a.to_string())),
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "queue" => Self::Queue,
            _ => return None,
        };
        Some(command)
    }
}

/// Quién puede dar órdenes y a qué canal de voz apuntan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandPolicy {
    /// Aceptar comandos de otros bots
    pub allow_bot_authors: bool,
    /// Usar el canal del primer usuario mencionado antes que el del autor
    pub target_mentioned_user: bool,
}

impl CommandPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allow_bot_authors: config.allow_bot_commands,
            target_mentioned_user: config.target_mentioned_user,
        }
    }
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self {
            allow_bot_authors: true,
            target_mentioned_user: true,
        }
    }
}

/// Mensaje entrante ya despojado de tipos del gateway
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub guild_id: GuildId,
    pub text_channel_id: ChannelId,
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub mentions: Vec<UserId>,
    pub content: String,
}

/// Traduce comandos de texto en operaciones del registro y la sesión.
pub struct CommandDispatcher {
    registry: Arc<SessionRegistry>,
    resolver: Arc<TrackResolver>,
    policy: CommandPolicy,
    prefix: String,
}

impl CommandDispatcher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<TrackResolver>,
        policy: CommandPolicy,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            resolver,
            policy,
            prefix: prefix.into(),
        }
    }

    /// Procesa un mensaje; cada comando produce a lo sumo un mensaje de respuesta
    pub async fn handle(&self, gateway: &dyn ChatGateway, message: IncomingMessage) {
        if message.author_is_bot && !self.policy.allow_bot_authors {
            return;
        }
        let Some(command) = Command::parse(&self.prefix, &message.content) else {
            return;
        };

        info!(
            "📝 Comando {:?} de {} en guild {}",
            command, message.author_id, message.guild_id
        );

        let reply = match self.execute(gateway, &message, command).await {
            Ok(Some(text)) => text,
            Ok(None) => return,
            Err(e) => {
                warn!("Comando rechazado en guild {}: {}", message.guild_id, e);
                messages::error_message(&e)
            }
        };

        if let Err(e) = gateway.send_message(message.text_channel_id, &reply).await {
            warn!("No se pudo responder en {}: {:?}", message.text_channel_id, e);
        }
    }

    async fn execute(
        &self,
        gateway: &dyn ChatGateway,
        message: &IncomingMessage,
        command: Command,
    ) -> MusicResult<Option<String>> {
        let guild_id = message.guild_id;

        match command {
            Command::Join => {
                let voice = self.target_voice_channel(gateway, message)?;
                let mut guard = self
                    .registry
                    .get_or_create(guild_id, voice, message.text_channel_id)
                    .await?;
                guard.session()?.bind_voice_channel(voice).await?;
                Ok(Some(messages::joined(voice)))
            }
            Command::Play(query) => self.play(gateway, message, &query).await.map(Some),
            Command::Skip => {
                let mut guard = self.registry.get(guild_id).await.ok_or(MusicError::SessionGone)?;
                let reply = match guard.session()?.skip().await? {
                    Some(track) => messages::skipped(&track),
                    None => messages::nothing_playing(),
                };
                Ok(Some(reply))
            }
            Command::Stop => {
                let mut guard = self.registry.get(guild_id).await.ok_or(MusicError::SessionGone)?;
                if let Err(e) = guard.session()?.stop().await {
                    warn!("Stop falló en guild {}, destruyendo igual: {}", guild_id, e);
                }
                guard.destroy().await;
                self.registry.prune(guild_id);
                Ok(Some(messages::stopped()))
            }
            Command::Leave => {
                self.registry.destroy(guild_id).await;
                Ok(Some(messages::left()))
            }
            Command::Volume(raw) => {
                let mut guard = self.registry.get(guild_id).await.ok_or(MusicError::SessionGone)?;
                let volume = raw
                    .as_deref()
                    .and_then(|v| v.parse::<i64>().ok())
                    .ok_or_else(|| MusicError::Validation("Volume must be between 0 and 100.".to_string()))?;
                let volume = guard.session()?.set_volume(volume).await?;
                Ok(Some(messages::volume_set(volume)))
            }
            Command::Pause => {
                let mut guard = self.registry.get(guild_id).await.ok_or(MusicError::SessionGone)?;
                guard.session()?.pause().await?;
                Ok(Some(messages::paused()))
            }
            Command::Resume => {
                let mut guard = self.registry.get(guild_id).await.ok_or(MusicError::SessionGone)?;
                guard.session()?.resume().await?;
                Ok(Some(messages::resumed()))
            }
            Command::Queue => {
                let guard = self.registry.get(guild_id).await.ok_or(MusicError::SessionGone)?;
                let session = guard.session_ref()?;
                Ok(Some(messages::queue_listing(session.current(), session.queue())))
            }
        }
    }

    async fn play(
        &self,
        gateway: &dyn ChatGateway,
        message: &IncomingMessage,
        query: &str,
    ) -> MusicResult<String> {
        if query.trim().is_empty() {
            return Err(MusicError::Validation(messages::missing_query()));
        }
        let voice = self.target_voice_channel(gateway, message)?;

        // Búsqueda fuera del lock del guild: no toca estado de la sesión
        let resolved = self.resolver.resolve(query).await?;
        let reply = match &resolved {
            ResolvedResult::NoMatch => return Err(MusicError::NoMatch),
            ResolvedResult::Playlist { name, tracks } => messages::playlist_added(name, tracks.len()),
            ResolvedResult::SingleTrack(track) => messages::track_added(track),
        };

        let mut guard = self
            .registry
            .get_or_create(message.guild_id, voice, message.text_channel_id)
            .await?;
        let session = guard.session()?;
        session.bind_voice_channel(voice).await?;
        let enqueued = session.enqueue_and_maybe_start(resolved).await?;
        debug!(
            "{} pistas encoladas en guild {} (arrancó: {})",
            enqueued.added,
            message.guild_id,
            enqueued.started.is_some()
        );

        Ok(reply)
    }

    /// Canal de voz objetivo según la política
    fn target_voice_channel(&self, gateway: &dyn ChatGateway, message: &IncomingMessage) -> MusicResult<ChannelId> {
        let mentioned = if self.policy.target_mentioned_user {
            message
                .mentions
                .first()
                .and_then(|user| gateway.voice_channel_of(message.guild_id, *user))
        } else {
            None
        };

        mentioned
            .or_else(|| gateway.voice_channel_of(message.guild_id, message.author_id))
            .ok_or(MusicError::NoVoiceChannel)
    }
}
