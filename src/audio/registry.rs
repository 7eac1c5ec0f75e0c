use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::audio::session::Session;
use crate::error::{MusicError, MusicResult};
use crate::node::{AudioNode, NodeHealth, NodeStatus};

/// Celda de un guild: el mutex es el lock exclusivo por guild y el `Option`
/// indica si hay una sesión registrada.
type GuildSlot = Arc<Mutex<Option<Session>>>;

/// Tabla de sesiones del proceso: a lo sumo una sesión viva por guild.
///
/// Destruir una sesión solo vacía su celda. La celda sale del mapa con
/// `prune`, y únicamente cuando nadie más conserva una referencia a ella, así
/// que nadie puede quedarse esperando un lock que ya no pertenece al mapa.
pub struct SessionRegistry {
    slots: DashMap<GuildId, GuildSlot>,
    node: Arc<dyn AudioNode>,
    health: NodeHealth,
    default_volume: u8,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new(node: Arc<dyn AudioNode>, health: NodeHealth, default_volume: u8) -> Self {
        Self {
            slots: DashMap::new(),
            node,
            health,
            default_volume: default_volume.min(100),
            next_id: AtomicU64::new(1),
        }
    }

    fn slot(&self, guild_id: GuildId) -> GuildSlot {
        // El guard del shard se suelta antes de cualquier await
        self.slots.entry(guild_id).or_default().clone()
    }

    /// Devuelve la sesión existente o crea, registra y conecta una nueva.
    ///
    /// Llamadas concurrentes para el mismo guild se serializan en su lock, así
    /// que solo la primera emite la directiva de conexión.
    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        voice_channel_id: ChannelId,
        text_channel_id: ChannelId,
    ) -> MusicResult<SessionGuard> {
        let mut guard = self.slot(guild_id).lock_owned().await;
        if guard.is_some() {
            return Ok(SessionGuard { guild_id, inner: guard });
        }

        if let NodeStatus::Degraded(reason) = self.health.status() {
            warn!("Nodo degradado, rechazando nueva sesión en guild {}: {}", guild_id, reason);
            drop(guard);
            self.prune(guild_id);
            return Err(MusicError::NodeUnavailable(reason));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut session = Session::new(
            id,
            guild_id,
            voice_channel_id,
            text_channel_id,
            self.default_volume,
            self.node.clone(),
        );
        if let Err(e) = session.connect().await {
            drop(guard);
            self.prune(guild_id);
            return Err(e);
        }

        info!("🆕 Sesión #{} creada para guild {}", id, guild_id);
        *guard = Some(session);
        Ok(SessionGuard { guild_id, inner: guard })
    }

    /// Bloquea la sesión del guild si existe
    pub async fn get(&self, guild_id: GuildId) -> Option<SessionGuard> {
        let slot = self.slots.get(&guild_id).map(|entry| entry.value().clone())?;
        let guard = slot.lock_owned().await;
        guard.is_some().then_some(SessionGuard { guild_id, inner: guard })
    }

    /// Quita la sesión del registro sin mandar directivas (idempotente)
    pub async fn remove(&self, guild_id: GuildId) -> Option<Session> {
        let slot = self.slots.get(&guild_id).map(|entry| entry.value().clone())?;
        let removed = slot.lock().await.take();
        drop(slot);
        self.prune(guild_id);
        if removed.is_some() {
            debug!("Sesión de guild {} quitada del registro", guild_id);
        }
        removed
    }

    /// Destruye la sesión del guild si existe
    pub async fn destroy(&self, guild_id: GuildId) -> bool {
        match self.get(guild_id).await {
            Some(guard) => {
                guard.destroy().await;
                self.prune(guild_id);
                true
            }
            None => false,
        }
    }

    /// Saca del mapa la celda vacía del guild si nadie más la referencia.
    ///
    /// Cada `lock_owned` pendiente o guard vivo conserva un `Arc` de la celda,
    /// y el mapa solo se clona bajo el lock de su shard, que `remove_if` tiene
    /// tomado en exclusiva.
    pub fn prune(&self, guild_id: GuildId) -> bool {
        let pruned = self
            .slots
            .remove_if(&guild_id, |_, slot| {
                Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|session| session.is_none())
            })
            .is_some();
        if pruned {
            debug!("Celda de guild {} liberada", guild_id);
        }
        pruned
    }

    /// `true` si el guild tiene sesión (o alguien tiene tomado su lock)
    pub fn has_session(&self, guild_id: GuildId) -> bool {
        self.slots
            .get(&guild_id)
            .is_some_and(|entry| match entry.value().try_lock() {
                Ok(slot) => slot.is_some(),
                Err(_) => true,
            })
    }

    #[cfg(test)]
    pub(crate) fn tracked_guilds(&self) -> usize {
        self.slots.len()
    }

    /// Cantidad de sesiones vivas (bloquea sin esperar: las ocupadas cuentan)
    pub fn active_sessions(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| match entry.value().try_lock() {
                Ok(slot) => slot.is_some(),
                Err(_) => true,
            })
            .count()
    }

    pub fn health(&self) -> &NodeHealth {
        &self.health
    }
}

/// Acceso exclusivo a la sesión de un guild mientras viva el guard.
///
/// No llamar a métodos del registro para el mismo guild mientras se sostiene
/// un guard: el lock no es reentrante.
#[derive(Debug)]
pub struct SessionGuard {
    guild_id: GuildId,
    inner: OwnedMutexGuard<Option<Session>>,
}

impl SessionGuard {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// La sesión bloqueada; `SessionGone` si ya fue destruida con este guard
    pub fn session(&mut self) -> MusicResult<&mut Session> {
        self.inner.as_mut().ok_or(MusicError::SessionGone)
    }

    pub fn session_ref(&self) -> MusicResult<&Session> {
        self.inner.as_ref().ok_or(MusicError::SessionGone)
    }

    /// Desconecta, marca Destroyed y vacía la celda del registro
    pub async fn destroy(mut self) -> Option<Session> {
        let mut session = self.inner.take()?;
        session.destroy().await;
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::PlaybackStatus;
    use crate::testing::{Directive, RecordingNode};
    use std::time::Duration;

    const VOICE: ChannelId = ChannelId::new(20);
    const TEXT: ChannelId = ChannelId::new(30);

    fn registry_with(node: Arc<RecordingNode>) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(node, NodeHealth::available(), 100))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_yields_one_session() {
        let node = Arc::new(RecordingNode::with_connect_delay(Duration::from_millis(20)));
        let registry = registry_with(node.clone());
        let guild = GuildId::new(1);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                let mut guard = registry.get_or_create(guild, VOICE, TEXT).await.unwrap();
                guard.session().unwrap().id()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();

        assert_eq!(ids.len(), 1);
        assert_eq!(node.count(|d| matches!(d, Directive::Connect(..))), 1);
        assert_eq!(registry.active_sessions(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_guilds_do_not_block_each_other() {
        let node = Arc::new(RecordingNode::new());
        let registry = registry_with(node.clone());

        // Lock de G1 retenido mientras se opera sobre G2
        let _held = registry.get_or_create(GuildId::new(1), VOICE, TEXT).await.unwrap();

        let other = tokio::time::timeout(
            Duration::from_secs(1),
            registry.get_or_create(GuildId::new(2), VOICE, TEXT),
        )
        .await
        .expect("G2 blocked by G1");
        let mut other = other.unwrap();
        other.session().unwrap().set_volume(40).await.unwrap();

        drop(other);
        drop(_held);
        let mut g1 = registry.get(GuildId::new(1)).await.unwrap();
        assert_eq!(g1.session().unwrap().volume(), 100);
    }

    #[tokio::test]
    async fn test_get_and_remove() {
        let node = Arc::new(RecordingNode::new());
        let registry = registry_with(node.clone());
        let guild = GuildId::new(3);

        assert!(registry.get(guild).await.is_none());
        assert!(registry.remove(guild).await.is_none());

        drop(registry.get_or_create(guild, VOICE, TEXT).await.unwrap());
        let removed = registry.remove(guild).await;
        assert!(removed.is_some());
        assert!(registry.get(guild).await.is_none());
        assert!(registry.remove(guild).await.is_none());
    }

    #[tokio::test]
    async fn test_destroy_unregisters_and_disconnects() {
        let node = Arc::new(RecordingNode::new());
        let registry = registry_with(node.clone());
        let guild = GuildId::new(4);

        let guard = registry.get_or_create(guild, VOICE, TEXT).await.unwrap();
        let destroyed = guard.destroy().await.unwrap();

        assert_eq!(destroyed.status(), PlaybackStatus::Destroyed);
        assert!(registry.get(guild).await.is_none());
        assert_eq!(node.count(|d| matches!(d, Directive::Disconnect(_))), 1);
        assert!(!registry.destroy(guild).await);
        assert_eq!(registry.tracked_guilds(), 0);

        // Una nueva sesión vuelve a conectar con otro id
        let mut fresh = registry.get_or_create(guild, VOICE, TEXT).await.unwrap();
        assert_ne!(fresh.session().unwrap().id(), destroyed.id());
        assert_eq!(node.count(|d| matches!(d, Directive::Connect(..))), 2);
    }

    #[tokio::test]
    async fn test_degraded_node_fails_fast() {
        let node = Arc::new(RecordingNode::new());
        let health = NodeHealth::available();
        let registry = SessionRegistry::new(node.clone(), health.clone(), 100);
        let guild = GuildId::new(5);

        // Sesiones existentes siguen accesibles
        drop(registry.get_or_create(guild, VOICE, TEXT).await.unwrap());
        health.mark_degraded("socket closed");
        assert!(registry.get_or_create(guild, VOICE, TEXT).await.is_ok());

        let err = registry.get_or_create(GuildId::new(6), VOICE, TEXT).await.unwrap_err();
        assert_eq!(err, MusicError::NodeUnavailable("socket closed".to_string()));
        assert_eq!(node.count(|d| matches!(d, Directive::Connect(..))), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_registers_nothing() {
        let node = Arc::new(RecordingNode::new());
        node.set_fail_connect(true);
        let registry = registry_with(node.clone());

        let err = registry.get_or_create(GuildId::new(7), VOICE, TEXT).await.unwrap_err();
        assert!(matches!(err, MusicError::NodeUnavailable(_)));
        assert!(registry.get(GuildId::new(7)).await.is_none());
        assert_eq!(registry.tracked_guilds(), 0);
    }

    #[tokio::test]
    async fn test_default_volume_reaches_node() {
        let node = Arc::new(RecordingNode::new());
        let registry = SessionRegistry::new(node.clone(), NodeHealth::available(), 50);
        let guild = GuildId::new(8);

        let mut guard = registry.get_or_create(guild, VOICE, TEXT).await.unwrap();

        assert_eq!(guard.session().unwrap().volume(), 50);
        assert_eq!(
            node.directives(),
            vec![Directive::Connect(guild, VOICE), Directive::Volume(guild, 50)]
        );
    }

    #[tokio::test]
    async fn test_prune_keeps_slots_in_use() {
        let node = Arc::new(RecordingNode::new());
        let registry = registry_with(node.clone());
        let guild = GuildId::new(9);

        let guard = registry.get_or_create(guild, VOICE, TEXT).await.unwrap();
        // Con sesión viva y guard tomado la celda se queda
        assert!(!registry.prune(guild));
        assert!(registry.has_session(guild));

        drop(guard);
        assert!(!registry.prune(guild));
        assert!(registry.destroy(guild).await);
        assert!(!registry.has_session(guild));
        assert_eq!(registry.tracked_guilds(), 0);
        assert!(!registry.prune(guild));
    }
}
