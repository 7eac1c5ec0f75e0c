//! # Bot Module
//!
//! Discord side of Hydra Music.
//!
//! - [`dispatcher`]: prefix text commands (`!join`, `!play`, `!skip`, ...)
//! - [`bridge`]: audio-node events routed to the owning session, in order
//! - [`gateway`]: the slice of the chat gateway the core needs
//!
//! [`HydraBot`] implements serenity's [`EventHandler`]: it turns messages into
//! dispatcher calls and starts the event bridge once the gateway is ready.

pub mod bridge;
pub mod dispatcher;
pub mod gateway;

use parking_lot::Mutex;
use serenity::{
    all::{Context, EventHandler, Message, Ready},
    async_trait,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    audio::registry::SessionRegistry,
    bot::{
        bridge::EventBridge,
        dispatcher::{CommandDispatcher, IncomingMessage},
        gateway::SerenityGateway,
    },
    node::{NodeEvent, NodeHealth},
};

/// Main Discord event handler.
///
/// ## Fields
///
/// - `dispatcher`: command parsing and execution
/// - `registry`: per-guild sessions, shared with the event bridge
/// - `node_events`: receiver handed to the bridge on the first `ready`
pub struct HydraBot {
    dispatcher: Arc<CommandDispatcher>,
    registry: Arc<SessionRegistry>,
    health: NodeHealth,
    node_events: Mutex<Option<UnboundedReceiver<NodeEvent>>>,
    shutdown: CancellationToken,
}

impl HydraBot {
    pub fn new(
        dispatcher: Arc<CommandDispatcher>,
        registry: Arc<SessionRegistry>,
        health: NodeHealth,
        node_events: UnboundedReceiver<NodeEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            health,
            node_events: Mutex::new(Some(node_events)),
            shutdown,
        }
    }
}

#[async_trait]
impl EventHandler for HydraBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 Conectado como {}", ready.user.name);

        // Los reconnects del gateway vuelven a disparar ready
        let Some(events) = self.node_events.lock().take() else {
            return;
        };

        let gateway = Arc::new(SerenityGateway::from_context(&ctx));
        let bridge = Arc::new(EventBridge::new(self.registry.clone(), gateway, self.health.clone()));
        tokio::spawn(bridge.run(events, self.shutdown.clone()));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        if msg.author.id == ctx.cache.current_user().id {
            return;
        }
        if msg.content.is_empty() {
            return;
        }

        let incoming = IncomingMessage {
            guild_id,
            text_channel_id: msg.channel_id,
            author_id: msg.author.id,
            author_is_bot: msg.author.bot,
            mentions: msg.mentions.iter().map(|user| user.id).collect(),
            content: msg.content.clone(),
        };

        let gateway = SerenityGateway::from_context(&ctx);
        self.dispatcher.handle(&gateway, incoming).await;
    }

    async fn resume(&self, _ctx: Context, _: serenity::model::event::ResumedEvent) {
        info!("🔄 Gateway reanudado ({} sesiones activas)", self.registry.active_sessions());
        if !self.health.is_available() {
            warn!("Gateway reanudado con el nodo de audio degradado");
        }
    }
}
