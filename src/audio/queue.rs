use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::audio::track::TrackDescriptor;

/// Cola FIFO de una sesión. Sin límite de tamaño en esta capa.
#[derive(Debug, Default)]
pub struct TrackQueue {
    items: VecDeque<TrackDescriptor>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una pista al final
    pub fn add(&mut self, track: TrackDescriptor) {
        debug!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);
    }

    /// Agrega varias pistas preservando su orden
    pub fn extend(&mut self, tracks: impl IntoIterator<Item = TrackDescriptor>) {
        self.items.extend(tracks);
    }

    /// Saca la cabeza de la cola; `None` cuando está vacía
    pub fn pop_front(&mut self) -> Option<TrackDescriptor> {
        self.items.pop_front()
    }

    /// Devuelve una pista a la cabeza (rollback de un `play` fallido)
    pub(crate) fn requeue_front(&mut self, track: TrackDescriptor) {
        self.items.push_front(track);
    }

    pub fn peek(&self) -> Option<&TrackDescriptor> {
        self.items.front()
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            debug!("🗑️ Cola limpiada ({} pistas)", self.items.len());
        }
        self.items.clear();
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackDescriptor> {
        self.items.iter()
    }

    /// Duración total conocida (los streams no suman)
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|track| track.duration).sum()
    }
}
