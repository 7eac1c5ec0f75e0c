use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::SendError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audio::registry::{SessionGuard, SessionRegistry};
use crate::audio::session::{PlayOutcome, TrackEndOutcome};
use crate::audio::track::TrackDescriptor;
use crate::bot::gateway::ChatGateway;
use crate::node::{NodeEvent, NodeHealth, TrackEndReason};
use crate::ui::messages;

/// Enruta eventos del nodo hacia la sesión dueña.
///
/// Cada guild tiene su propio worker secuencial, así que los eventos de un
/// mismo guild se procesan en el orden en que el nodo los emitió mientras
/// guilds distintos avanzan en paralelo. Un worker se retira cuando su guild
/// se queda sin sesión y sin eventos pendientes.
pub struct EventBridge {
    registry: Arc<SessionRegistry>,
    gateway: Arc<dyn ChatGateway>,
    health: NodeHealth,
}

impl EventBridge {
    pub fn new(registry: Arc<SessionRegistry>, gateway: Arc<dyn ChatGateway>, health: NodeHealth) -> Self {
        Self {
            registry,
            gateway,
            health,
        }
    }

    /// Lazo principal: consume el canal de eventos hasta el shutdown
    pub async fn run(self: Arc<Self>, mut events: UnboundedReceiver<NodeEvent>, shutdown: CancellationToken) {
        info!("🌉 Event bridge iniciado");
        let mut workers: HashMap<GuildId, GuildWorker> = HashMap::new();

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let Some(guild_id) = event.guild_id() else {
                self.handle_node_event(event);
                continue;
            };

            let rejected = match workers.get(&guild_id) {
                Some(worker) => worker.events.send(event).err().map(|SendError(event)| event),
                None => Some(event),
            };
            if let Some(event) = rejected {
                // Worker nuevo o reemplazo de uno retirado: hereda el evento
                let previous = workers.remove(&guild_id).map(|worker| worker.task);
                let worker = self.spawn_worker(guild_id, previous);
                if worker.events.send(event).is_err() {
                    warn!("Worker de guild {} no aceptó el evento", guild_id);
                }
                workers.insert(guild_id, worker);
                workers.retain(|_, worker| !(worker.events.is_closed() && worker.task.is_finished()));
            }
        }

        info!("Event bridge detenido ({} workers)", workers.len());
    }

    fn spawn_worker(self: &Arc<Self>, guild_id: GuildId, previous: Option<JoinHandle<()>>) -> GuildWorker {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let bridge = Arc::clone(self);

        let task = tokio::spawn(async move {
            // El worker retirado termina de drenar antes de que este arranque
            if let Some(previous) = previous {
                if let Err(e) = previous.await {
                    warn!("Worker anterior de guild {} terminó con error: {:?}", guild_id, e);
                }
            }

            while let Some(event) = rx.recv().await {
                bridge.handle_guild_event(event).await;

                if rx.is_empty() && !bridge.registry.has_session(guild_id) {
                    rx.close();
                    while let Ok(event) = rx.try_recv() {
                        bridge.handle_guild_event(event).await;
                    }
                    break;
                }
            }
            debug!("Worker de eventos de guild {} retirado", guild_id);
        });

        GuildWorker { events: tx, task }
    }

    /// Eventos del nodo completo: solo afectan la salud del nodo
    pub fn handle_node_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::NodeConnect { session_id, resumed } => {
                info!("✅ Nodo de audio conectado (sesión {}, resumed={})", session_id, resumed);
                self.health.mark_available();
            }
            NodeEvent::NodeError { message } => {
                error!("❌ Error del nodo de audio: {}", message);
                self.health.mark_degraded(message);
            }
            NodeEvent::NodeDisconnect { reason } => {
                warn!("🔌 Nodo de audio desconectado: {}", reason);
                self.health.mark_degraded(reason);
            }
            other => debug!("Evento de guild recibido como evento de nodo: {:?}", other),
        }
    }

    /// Procesa un evento de guild bajo el lock de su sesión
    pub async fn handle_guild_event(&self, event: NodeEvent) {
        match event {
            NodeEvent::TrackStart { guild_id, track } => self.on_track_start(guild_id, &track).await,
            NodeEvent::TrackEnd { guild_id, track, reason } => self.on_track_end(guild_id, &track, reason).await,
            NodeEvent::TrackException { guild_id, track, message } => {
                warn!("⚠️ Excepción reproduciendo {} en guild {}: {}", track.title, guild_id, message);
                let channel = match self.registry.get(guild_id).await {
                    Some(guard) => guard.session_ref().ok().map(|s| s.text_channel_id()),
                    None => None,
                };
                if let Some(channel) = channel {
                    self.notify(channel, &messages::track_failed(&track, &message)).await;
                }
            }
            NodeEvent::TrackStuck { guild_id, track, threshold_ms } => {
                warn!("Pista {} atascada {}ms en guild {}", track.title, threshold_ms, guild_id);
            }
            NodeEvent::VoiceClosed { guild_id, code, reason } => {
                warn!("🔌 Voz cerrada en guild {} (código {}): {}", guild_id, code, reason);
            }
            NodeEvent::QueueEnd { guild_id } => self.on_queue_end(guild_id).await,
            node_level => self.handle_node_event(node_level),
        }
    }

    async fn on_track_start(&self, guild_id: GuildId, track: &TrackDescriptor) {
        let notice = match self.registry.get(guild_id).await {
            Some(guard) => guard.session_ref().ok().and_then(|session| {
                session
                    .on_track_start(track)
                    .map(|current| (session.text_channel_id(), messages::now_playing(current)))
            }),
            None => None,
        };

        match notice {
            Some((channel, text)) => self.notify(channel, &text).await,
            None => debug!("TrackStart viejo descartado en guild {}: {}", guild_id, track.title),
        }
    }

    async fn on_track_end(&self, guild_id: GuildId, track: &TrackDescriptor, reason: TrackEndReason) {
        let Some(mut guard) = self.registry.get(guild_id).await else {
            debug!("TrackEnd sin sesión en guild {}", guild_id);
            return;
        };
        let Ok(session) = guard.session() else {
            return;
        };
        let channel = session.text_channel_id();

        match session.on_track_end(track, reason) {
            TrackEndOutcome::Ignored => {
                debug!("TrackEnd ({:?}) ignorado en guild {}", reason, guild_id);
            }
            TrackEndOutcome::Advance => match session.play().await {
                Ok(PlayOutcome::Started(next)) => debug!("Avanzando a {} en guild {}", next.title, guild_id),
                Ok(PlayOutcome::QueueEmpty) => {}
                Err(e) => {
                    drop(guard);
                    self.notify(channel, &messages::error_message(&e)).await;
                }
            },
            TrackEndOutcome::QueueExhausted => {
                if let Some(channel) = self.end_session(guard).await {
                    self.notify(channel, &messages::queue_ended()).await;
                }
            }
        }
    }

    /// Nada más que reproducir: detener y salir del canal
    async fn on_queue_end(&self, guild_id: GuildId) {
        let Some(guard) = self.registry.get(guild_id).await else {
            debug!("QueueEnd sin sesión en guild {}", guild_id);
            return;
        };
        if let Some(channel) = self.end_session(guard).await {
            self.notify(channel, &messages::queue_ended()).await;
        }
    }

    async fn end_session(&self, mut guard: SessionGuard) -> Option<ChannelId> {
        let guild_id = guard.guild_id();
        let session = guard.session().ok()?;
        let channel = session.text_channel_id();
        if let Err(e) = session.stop().await {
            warn!("Stop falló al terminar la cola de guild {}: {}", guild_id, e);
        }
        guard.destroy().await;
        self.registry.prune(guild_id);
        Some(channel)
    }

    async fn notify(&self, channel_id: ChannelId, text: &str) {
        if let Err(e) = self.gateway.send_message(channel_id, text).await {
            warn!("No se pudo notificar en {}: {:?}", channel_id, e);
        }
    }
}

/// Cola secuencial de un guild y la tarea que la consume
struct GuildWorker {
    events: UnboundedSender<NodeEvent>,
    task: JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::resolver::ResolvedResult;
    use crate::audio::session::PlaybackStatus;
    use crate::testing::{Directive, RecordingGateway, RecordingNode};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(1);
    const VOICE: ChannelId = ChannelId::new(20);
    const TEXT: ChannelId = ChannelId::new(30);

    struct Fixture {
        node: Arc<RecordingNode>,
        gateway: Arc<RecordingGateway>,
        registry: Arc<SessionRegistry>,
        health: NodeHealth,
        bridge: Arc<EventBridge>,
    }

    fn fixture() -> Fixture {
        let node = Arc::new(RecordingNode::new());
        let gateway = Arc::new(RecordingGateway::new());
        let health = NodeHealth::available();
        let registry = Arc::new(SessionRegistry::new(node.clone(), health.clone(), 100));
        let bridge = Arc::new(EventBridge::new(registry.clone(), gateway.clone(), health.clone()));
        Fixture {
            node,
            gateway,
            registry,
            health,
            bridge,
        }
    }

    async fn playing(fx: &Fixture, titles: &[&str]) {
        let mut guard = fx.registry.get_or_create(GUILD, VOICE, TEXT).await.unwrap();
        let tracks = titles.iter().map(|t| TrackDescriptor::sample(t)).collect();
        guard
            .session()
            .unwrap()
            .enqueue_and_maybe_start(ResolvedResult::Playlist {
                name: "test".to_string(),
                tracks,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_track_start_announces_now_playing() {
        let fx = fixture();
        playing(&fx, &["T1"]).await;

        fx.bridge
            .handle_guild_event(NodeEvent::TrackStart {
                guild_id: GUILD,
                track: TrackDescriptor::sample("T1"),
            })
            .await;

        assert_eq!(fx.gateway.messages(), vec![(TEXT, "▶ Now playing: **T1** (3:00)".to_string())]);
    }

    #[tokio::test]
    async fn test_queue_end_without_session_is_noop() {
        let fx = fixture();
        fx.bridge.handle_guild_event(NodeEvent::QueueEnd { guild_id: GUILD }).await;
        fx.bridge
            .handle_guild_event(NodeEvent::TrackEnd {
                guild_id: GUILD,
                track: TrackDescriptor::sample("T1"),
                reason: TrackEndReason::Finished,
            })
            .await;

        assert!(fx.gateway.messages().is_empty());
        assert!(fx.node.directives().is_empty());
    }

    #[tokio::test]
    async fn test_late_track_start_after_destroy_is_dropped() {
        let fx = fixture();
        playing(&fx, &["T1"]).await;
        assert!(fx.registry.destroy(GUILD).await);

        fx.bridge
            .handle_guild_event(NodeEvent::TrackStart {
                guild_id: GUILD,
                track: TrackDescriptor::sample("T1"),
            })
            .await;

        assert!(fx.gateway.messages().is_empty());
        assert!(fx.registry.get(GUILD).await.is_none());
        assert_eq!(fx.node.count(|d| matches!(d, Directive::Connect(..))), 1);
    }

    #[tokio::test]
    async fn test_track_end_advances_then_leaves_on_exhaustion() {
        let fx = fixture();
        playing(&fx, &["T1", "T2"]).await;

        fx.bridge
            .handle_guild_event(NodeEvent::TrackEnd {
                guild_id: GUILD,
                track: TrackDescriptor::sample("T1"),
                reason: TrackEndReason::Finished,
            })
            .await;
        assert_eq!(fx.node.count(|d| *d == Directive::Play(GUILD, "enc-T2".to_string())), 1);
        assert!(fx.gateway.messages().is_empty());

        fx.bridge
            .handle_guild_event(NodeEvent::TrackEnd {
                guild_id: GUILD,
                track: TrackDescriptor::sample("T2"),
                reason: TrackEndReason::Finished,
            })
            .await;

        assert_eq!(
            fx.gateway.messages(),
            vec![(TEXT, "Queue ended, leaving voice channel.".to_string())]
        );
        assert!(fx.registry.get(GUILD).await.is_none());
        assert_eq!(fx.node.count(|d| matches!(d, Directive::Disconnect(_))), 1);
    }

    #[tokio::test]
    async fn test_skip_then_stopped_end_plays_next_once() {
        let fx = fixture();
        playing(&fx, &["T1", "T2"]).await;
        {
            let mut guard = fx.registry.get(GUILD).await.unwrap();
            guard.session().unwrap().skip().await.unwrap();
        }

        let stopped = NodeEvent::TrackEnd {
            guild_id: GUILD,
            track: TrackDescriptor::sample("T1"),
            reason: TrackEndReason::Stopped,
        };
        fx.bridge.handle_guild_event(stopped.clone()).await;
        // Un duplicado tardío no debe arrancar otra pista
        fx.bridge.handle_guild_event(stopped).await;

        assert_eq!(fx.node.count(|d| matches!(d, Directive::Play(..))), 2);
        let mut guard = fx.registry.get(GUILD).await.unwrap();
        assert_eq!(guard.session().unwrap().current().map(|t| t.title.as_str()), Some("T2"));
    }

    #[tokio::test]
    async fn test_rejected_advance_keeps_session_restartable() {
        let fx = fixture();
        playing(&fx, &["T1", "T2"]).await;
        fx.node.set_fail_play(true);

        fx.bridge
            .handle_guild_event(NodeEvent::TrackEnd {
                guild_id: GUILD,
                track: TrackDescriptor::sample("T1"),
                reason: TrackEndReason::Finished,
            })
            .await;

        assert_eq!(
            fx.gateway.messages(),
            vec![(TEXT, "The audio node is unavailable right now, try again later.".to_string())]
        );
        fx.node.set_fail_play(false);
        let mut guard = fx.registry.get(GUILD).await.unwrap();
        let session = guard.session().unwrap();
        assert_eq!(session.status(), PlaybackStatus::Idle);
        assert_eq!(session.current(), None);

        let enqueued = session
            .enqueue_and_maybe_start(ResolvedResult::SingleTrack(TrackDescriptor::sample("T3")))
            .await
            .unwrap();
        assert_eq!(enqueued.started.map(|t| t.title), Some("T2".to_string()));
        assert_eq!(session.status(), PlaybackStatus::Playing);
    }

    #[tokio::test]
    async fn test_node_errors_degrade_health() {
        let fx = fixture();

        fx.bridge.handle_node_event(NodeEvent::NodeError {
            message: "connection refused".to_string(),
        });
        assert!(!fx.health.is_available());
        assert!(fx.registry.get_or_create(GUILD, VOICE, TEXT).await.is_err());

        fx.bridge.handle_node_event(NodeEvent::NodeConnect {
            session_id: "s2".to_string(),
            resumed: false,
        });
        assert!(fx.health.is_available());
        assert!(fx.registry.get_or_create(GUILD, VOICE, TEXT).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_preserves_per_guild_order() {
        let fx = fixture();
        playing(&fx, &["T1"]).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(fx.bridge.clone().run(rx, shutdown.clone()));

        tx.send(NodeEvent::TrackStart {
            guild_id: GUILD,
            track: TrackDescriptor::sample("T1"),
        })
        .unwrap();
        tx.send(NodeEvent::QueueEnd { guild_id: GUILD }).unwrap();
        // Otro guild sin sesión: no interfiere
        tx.send(NodeEvent::QueueEnd { guild_id: GuildId::new(2) }).unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.gateway.messages().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("bridge did not process events");

        assert_eq!(
            fx.gateway.messages(),
            vec![
                (TEXT, "▶ Now playing: **T1** (3:00)".to_string()),
                (TEXT, "Queue ended, leaving voice channel.".to_string()),
            ]
        );

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_worker_retires_and_new_session_gets_events() {
        let fx = fixture();
        playing(&fx, &["T1"]).await;

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(fx.bridge.clone().run(rx, shutdown.clone()));

        tx.send(NodeEvent::TrackEnd {
            guild_id: GUILD,
            track: TrackDescriptor::sample("T1"),
            reason: TrackEndReason::Finished,
        })
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.gateway.messages().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue end not processed");
        assert_eq!(fx.registry.tracked_guilds(), 0);

        // Sesión nueva en el mismo guild: sus eventos siguen llegando
        playing(&fx, &["T2"]).await;
        tx.send(NodeEvent::TrackStart {
            guild_id: GUILD,
            track: TrackDescriptor::sample("T2"),
        })
        .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while fx.gateway.messages().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("event for the new session was lost");

        assert_eq!(
            fx.gateway.messages(),
            vec![
                (TEXT, "Queue ended, leaving voice channel.".to_string()),
                (TEXT, "▶ Now playing: **T2** (3:00)".to_string()),
            ]
        );

        shutdown.cancel();
        task.await.unwrap();
    }
}
