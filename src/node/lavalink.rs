use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::{json, Value};
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::Songbird;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::track::TrackDescriptor;
use crate::config::Config;
use crate::error::NodeError;
use crate::node::{AudioNode, NodeEvent, TrackEndReason};

const CLIENT_NAME: &str = concat!("hydra-music/", env!("CARGO_PKG_VERSION"));

/// Cliente de un nodo Lavalink v4.
///
/// Las directivas van por REST; los eventos llegan por websocket y se publican
/// en el canal devuelto por [`LavalinkNode::new`]. La señalización de voz la
/// hace songbird (solo gateway) y se reenvía al nodo.
pub struct LavalinkNode {
    http: reqwest::Client,
    rest_url: String,
    ws_url: String,
    password: String,
    reconnect_delay: Duration,
    session_id: RwLock<Option<String>>,
    voice: Arc<Songbird>,
    events: mpsc::UnboundedSender<NodeEvent>,
}

impl LavalinkNode {
    pub fn new(config: &Config, voice: Arc<Songbird>) -> (Arc<Self>, mpsc::UnboundedReceiver<NodeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();

        info!("🎼 Configurando Lavalink en {}", config.lavalink_rest_url());

        let node = Arc::new(Self {
            http: reqwest::Client::new(),
            rest_url: config.lavalink_rest_url(),
            ws_url: config.lavalink_ws_url(),
            password: config.lavalink_password.clone(),
            reconnect_delay: config.node_reconnect_delay(),
            session_id: RwLock::new(None),
            voice,
            events,
        });

        (node, rx)
    }

    /// Lanza el lazo del websocket con reconexión hasta el shutdown
    pub fn spawn_event_loop(self: &Arc<Self>, user_id: UserId, shutdown: CancellationToken) -> JoinHandle<()> {
        let node = Arc::clone(self);
        tokio::spawn(async move { node.run_events(user_id, shutdown).await })
    }

    async fn run_events(self: Arc<Self>, user_id: UserId, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.listen_once(user_id) => {
                    self.session_id.write().take();
                    let event = match result {
                        Ok(()) => NodeEvent::NodeDisconnect { reason: "websocket closed".to_string() },
                        Err(e) => NodeEvent::NodeError { message: e.to_string() },
                    };
                    self.emit(event);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {
                    info!("🔄 Reconectando al nodo Lavalink...");
                }
            }
        }

        info!("Lazo de eventos de Lavalink terminado");
    }

    async fn listen_once(&self, user_id: UserId) -> Result<(), NodeError> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .map_err(|e| NodeError::Protocol(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert("Authorization", header_value(&self.password)?);
        headers.insert("User-Id", header_value(&user_id.to_string())?);
        headers.insert("Client-Name", HeaderValue::from_static(CLIENT_NAME));

        let (mut stream, _response) = connect_async(request)
            .await
            .map_err(|e| NodeError::Protocol(format!("websocket connect failed: {}", e)))?;
        info!("✅ Websocket de Lavalink conectado: {}", self.ws_url);

        while let Some(message) = stream.next().await {
            match message.map_err(|e| NodeError::Protocol(e.to_string()))? {
                Message::Text(text) => self.handle_ws_text(text.as_str()),
                Message::Close(frame) => {
                    warn!("🔌 Lavalink cerró el websocket: {:?}", frame);
                    break;
                }
                // ping/pong los responde tungstenite
                _ => {}
            }
        }

        Ok(())
    }

    fn handle_ws_text(&self, text: &str) {
        match parse_ws_message(text) {
            Ok(Some(event)) => {
                if let NodeEvent::NodeConnect { session_id, .. } = &event {
                    *self.session_id.write() = Some(session_id.clone());
                }
                self.emit(event);
            }
            Ok(None) => {}
            Err(e) => warn!("Mensaje de Lavalink no reconocido ({}): {}", e, text),
        }
    }

    fn emit(&self, event: NodeEvent) {
        if self.events.send(event).is_err() {
            debug!("Nadie escucha eventos del nodo");
        }
    }

    fn session_id(&self) -> Result<String, NodeError> {
        self.session_id.read().clone().ok_or(NodeError::NotReady)
    }

    #[cfg(test)]
    pub(crate) fn set_session_id(&self, session_id: &str) {
        *self.session_id.write() = Some(session_id.to_string());
    }

    fn player_url(&self, guild_id: GuildId) -> Result<String, NodeError> {
        Ok(format!(
            "{}/v4/sessions/{}/players/{}",
            self.rest_url,
            self.session_id()?,
            guild_id
        ))
    }

    async fn update_player(&self, guild_id: GuildId, body: Value) -> Result<(), NodeError> {
        let url = self.player_url(guild_id)?;
        debug!("PATCH {} {}", url, body);

        let response = self
            .http
            .patch(&url)
            .header("Authorization", &self.password)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    /// Versión del nodo (usada por `--health-check`)
    pub async fn version(&self) -> Result<String, NodeError> {
        let response = self
            .http
            .get(format!("{}/version", self.rest_url))
            .header("Authorization", &self.password)
            .send()
            .await?;
        Ok(check_status(response).await?.text().await?)
    }
}

fn header_value(raw: &str) -> Result<HeaderValue, NodeError> {
    HeaderValue::from_str(raw).map_err(|e| NodeError::Protocol(format!("invalid header value: {}", e)))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, NodeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NodeError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl AudioNode for LavalinkNode {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), NodeError> {
        // Sin sesión del nodo no tiene sentido unirse al canal
        self.session_id()?;

        let (info, _call) = self
            .voice
            .join_gateway(guild_id, channel_id)
            .await
            .map_err(|e| NodeError::Voice(e.to_string()))?;

        self.update_player(
            guild_id,
            json!({
                "voice": {
                    "token": info.token,
                    "endpoint": info.endpoint,
                    "sessionId": info.session_id,
                }
            }),
        )
        .await?;

        info!("Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), NodeError> {
        if let Err(e) = self.voice.remove(guild_id).await {
            debug!("Songbird no tenía llamada en guild {}: {}", guild_id, e);
        }

        let url = self.player_url(guild_id)?;
        let response = self
            .http
            .delete(&url)
            .header("Authorization", &self.password)
            .send()
            .await?;

        // 404: el nodo ya no tenía player
        if response.status() != reqwest::StatusCode::NOT_FOUND {
            check_status(response).await?;
        }

        info!("Desconectado del guild {}", guild_id);
        Ok(())
    }

    async fn load_tracks(&self, identifier: &str) -> Result<Value, NodeError> {
        let url = format!(
            "{}/v4/loadtracks?identifier={}",
            self.rest_url,
            urlencoding::encode(identifier)
        );

        let response = self
            .http
            .get(&url)
            .header("Authorization", &self.password)
            .send()
            .await?;

        let value = check_status(response).await?.json::<Value>().await.map_err(|e| {
            error!("Respuesta inválida del cargador de Lavalink: {}", e);
            NodeError::Protocol(e.to_string())
        })?;
        Ok(value)
    }

    async fn play(&self, guild_id: GuildId, handle: &str) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "track": { "encoded": handle } })).await
    }

    async fn stop_current(&self, guild_id: GuildId) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "track": { "encoded": null } })).await
    }

    async fn set_volume(&self, guild_id: GuildId, percent: u8) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "volume": percent })).await
    }

    async fn set_paused(&self, guild_id: GuildId, paused: bool) -> Result<(), NodeError> {
        self.update_player(guild_id, json!({ "paused": paused })).await
    }
}

/// Traduce un frame del websocket; `Ok(None)` para ops sin interés.
pub(crate) fn parse_ws_message(text: &str) -> Result<Option<NodeEvent>, String> {
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    let op = str_field(&value, "op")?;

    match op {
        "ready" => Ok(Some(NodeEvent::NodeConnect {
            session_id: str_field(&value, "sessionId")?.to_string(),
            resumed: value.get("resumed").and_then(Value::as_bool).unwrap_or(false),
        })),
        "event" => parse_event(&value).map(Some),
        "playerUpdate" | "stats" => Ok(None),
        other => {
            debug!("Op de Lavalink ignorado: {}", other);
            Ok(None)
        }
    }
}

fn parse_event(value: &Value) -> Result<NodeEvent, String> {
    let guild_id = str_field(value, "guildId")?
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(GuildId::new)
        .ok_or_else(|| "invalid guildId".to_string())?;

    let track = || -> Result<TrackDescriptor, String> {
        let raw = value.get("track").ok_or_else(|| "missing track".to_string())?;
        TrackDescriptor::from_node_json(raw)
    };

    match str_field(value, "type")? {
        "TrackStartEvent" => Ok(NodeEvent::TrackStart { guild_id, track: track()? }),
        "TrackEndEvent" => {
            let raw_reason = str_field(value, "reason")?;
            let reason = TrackEndReason::parse(raw_reason)
                .ok_or_else(|| format!("unknown end reason '{}'", raw_reason))?;
            Ok(NodeEvent::TrackEnd { guild_id, track: track()?, reason })
        }
        "TrackExceptionEvent" => {
            let message = value
                .get("exception")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unknown playback error")
                .to_string();
            Ok(NodeEvent::TrackException { guild_id, track: track()?, message })
        }
        "TrackStuckEvent" => Ok(NodeEvent::TrackStuck {
            guild_id,
            track: track()?,
            threshold_ms: value.get("thresholdMs").and_then(Value::as_u64).unwrap_or(0),
        }),
        "WebSocketClosedEvent" => Ok(NodeEvent::VoiceClosed {
            guild_id,
            code: value
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(0),
            reason: value.get("reason").and_then(Value::as_str).unwrap_or_default().to_string(),
        }),
        other => Err(format!("unknown event type '{}'", other)),
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> Result<&'a str, String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing {}", field))
}
