use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::cache::Cache;
use serenity::http::Http;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::sync::Arc;

/// Operaciones del gateway de chat que usan el dispatcher y el bridge.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()>;

    /// Canal de voz actual del usuario según la caché de estados de voz
    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId>;
}

/// Implementación sobre el cliente HTTP y la caché de serenity.
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityGateway {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>) -> Self {
        Self { http, cache }
    }

    pub fn from_context(ctx: &serenity::prelude::Context) -> Self {
        Self::new(ctx.http.clone(), ctx.cache.clone())
    }
}

#[async_trait]
impl ChatGateway for SerenityGateway {
    async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        channel_id
            .say(&self.http, content)
            .await
            .with_context(|| format!("Error al enviar mensaje al canal {}", channel_id))?;
        Ok(())
    }

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = guild_id.to_guild_cached(&self.cache)?;
        guild.voice_states.get(&user_id).and_then(|state| state.channel_id)
    }
}
