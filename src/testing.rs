//! Dobles de prueba compartidos por los tests del crate.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::bot::gateway::ChatGateway;
use crate::error::NodeError;
use crate::node::AudioNode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Connect(GuildId, ChannelId),
    Disconnect(GuildId),
    Load(String),
    Play(GuildId, String),
    StopCurrent(GuildId),
    Volume(GuildId, u8),
    Paused(GuildId, bool),
}

/// Nodo falso que registra cada directiva recibida.
#[derive(Default)]
pub struct RecordingNode {
    directives: Mutex<Vec<Directive>>,
    load_results: Mutex<HashMap<String, serde_json::Value>>,
    connect_delay: Option<Duration>,
    fail_play: AtomicBool,
    fail_connect: AtomicBool,
}

impl RecordingNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_delay(delay: Duration) -> Self {
        Self {
            connect_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn directives(&self) -> Vec<Directive> {
        self.directives.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Directive) -> bool) -> usize {
        self.directives.lock().iter().filter(|d| pred(d)).count()
    }

    pub fn set_load_result(&self, identifier: &str, value: serde_json::Value) {
        self.load_results.lock().insert(identifier.to_string(), value);
    }

    pub fn set_fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    fn record(&self, directive: Directive) {
        self.directives.lock().push(directive);
    }
}

#[async_trait]
impl AudioNode for RecordingNode {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), NodeError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(NodeError::Voice("join timed out".to_string()));
        }
        self.record(Directive::Connect(guild_id, channel_id));
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(Directive::Disconnect(guild_id));
        Ok(())
    }

    async fn load_tracks(&self, identifier: &str) -> Result<serde_json::Value, NodeError> {
        self.record(Directive::Load(identifier.to_string()));
        Ok(self
            .load_results
            .lock()
            .get(identifier)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "loadType": "empty", "data": {} })))
    }

    async fn play(&self, guild_id: GuildId, handle: &str) -> Result<(), NodeError> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(NodeError::Status { status: 500, body: "boom".to_string() });
        }
        self.record(Directive::Play(guild_id, handle.to_string()));
        Ok(())
    }

    async fn stop_current(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.record(Directive::StopCurrent(guild_id));
        Ok(())
    }

    async fn set_volume(&self, guild_id: GuildId, percent: u8) -> Result<(), NodeError> {
        self.record(Directive::Volume(guild_id, percent));
        Ok(())
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.record(Directive::Paused(guild_id, paused));
        Ok(())
    }
}

/// Gateway falso: guarda mensajes enviados y responde estados de voz fijos.
#[derive(Default)]
pub struct RecordingGateway {
    messages: Mutex<Vec<(ChannelId, String)>>,
    voice: Mutex<HashMap<(GuildId, UserId), ChannelId>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_in_voice(&self, guild_id: GuildId, user_id: UserId, channel_id: ChannelId) {
        self.voice.lock().insert((guild_id, user_id), channel_id);
    }

    pub fn messages(&self) -> Vec<(ChannelId, String)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl ChatGateway for RecordingGateway {
    async fn send_message(&self, channel_id: ChannelId, content: &str) -> anyhow::Result<()> {
        self.messages.lock().push((channel_id, content.to_string()));
        Ok(())
    }

    fn voice_channel_of(&self, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        self.voice.lock().get(&(guild_id, user_id)).copied()
    }
}

pub fn track_json(title: &str) -> serde_json::Value {
    serde_json::json!({
        "encoded": format!("enc-{}", title),
        "info": {
            "identifier": format!("id-{}", title),
            "title": title,
            "author": "Tester",
            "length": 180000,
            "isStream": false,
            "uri": format!("https://example.com/{}", title),
            "sourceName": "http"
        }
    })
}
