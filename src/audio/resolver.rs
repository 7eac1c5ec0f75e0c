use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::audio::track::TrackDescriptor;
use crate::error::{MusicError, MusicResult};
use crate::node::AudioNode;

/// Resultado tipado de una búsqueda; nadie fuera del resolver ve el JSON crudo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedResult {
    NoMatch,
    SingleTrack(TrackDescriptor),
    Playlist { name: String, tracks: Vec<TrackDescriptor> },
}

impl ResolvedResult {
    pub fn tracks(&self) -> &[TrackDescriptor] {
        match self {
            Self::NoMatch => &[],
            Self::SingleTrack(track) => std::slice::from_ref(track),
            Self::Playlist { tracks, .. } => tracks,
        }
    }

    pub fn into_tracks(self) -> Vec<TrackDescriptor> {
        match self {
            Self::NoMatch => Vec::new(),
            Self::SingleTrack(track) => vec![track],
            Self::Playlist { tracks, .. } => tracks,
        }
    }
}

/// Convierte texto libre o URLs en pistas usando el cargador del nodo.
pub struct TrackResolver {
    node: Arc<dyn AudioNode>,
    search_prefix: String,
}

impl TrackResolver {
    pub fn new(node: Arc<dyn AudioNode>, search_prefix: impl Into<String>) -> Self {
        Self {
            node,
            search_prefix: search_prefix.into(),
        }
    }

    /// URLs pasan tal cual; lo demás se prefija como búsqueda
    pub fn identifier_for(&self, query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            query.to_string()
        } else {
            format!("{}:{}", self.search_prefix, query)
        }
    }

    pub async fn resolve(&self, query: &str) -> MusicResult<ResolvedResult> {
        let identifier = self.identifier_for(query);
        debug!("🔍 Resolviendo: {}", identifier);

        let raw = self.node.load_tracks(&identifier).await.map_err(|e| {
            warn!("Error al cargar tracks para {}: {}", identifier, e);
            MusicError::Resolution(e.to_string())
        })?;

        parse_load_result(&raw)
    }
}

/// Verifica si el texto es una URL http(s) bien formada
pub fn is_url(input: &str) -> bool {
    url::Url::parse(input)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}

/// Interpreta la respuesta del cargador (dialectos v4 y v3).
pub fn parse_load_result(raw: &Value) -> MusicResult<ResolvedResult> {
    let load_type = raw
        .get("loadType")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing loadType"))?;

    match load_type {
        // v4
        "track" => {
            let data = raw.get("data").ok_or_else(|| malformed("missing data"))?;
            Ok(ResolvedResult::SingleTrack(parse_track(data)?))
        }
        "playlist" => {
            let data = raw.get("data").ok_or_else(|| malformed("missing data"))?;
            let name = playlist_name(data.get("info"));
            let tracks = parse_tracks(data.get("tracks"))?;
            Ok(playlist_or_no_match(name, tracks))
        }
        "search" => {
            let tracks = parse_tracks(raw.get("data"))?;
            Ok(first_or_no_match(tracks))
        }
        "empty" | "NO_MATCHES" => Ok(ResolvedResult::NoMatch),
        "error" => Err(load_failed(raw.get("data"))),

        // v3
        "TRACK_LOADED" | "SEARCH_RESULT" => {
            let tracks = parse_tracks(raw.get("tracks"))?;
            Ok(first_or_no_match(tracks))
        }
        "PLAYLIST_LOADED" => {
            let name = playlist_name(raw.get("playlistInfo"));
            let tracks = parse_tracks(raw.get("tracks"))?;
            Ok(playlist_or_no_match(name, tracks))
        }
        "LOAD_FAILED" => Err(load_failed(raw.get("exception"))),

        other => Err(malformed(&format!("unknown loadType '{}'", other))),
    }
}

fn parse_track(value: &Value) -> MusicResult<TrackDescriptor> {
    TrackDescriptor::from_node_json(value).map_err(MusicError::Resolution)
}

// Todo o nada: una pista inválida invalida la lista completa
fn parse_tracks(value: Option<&Value>) -> MusicResult<Vec<TrackDescriptor>> {
    value
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("missing track list"))?
        .iter()
        .map(parse_track)
        .collect()
}

fn playlist_name(info: Option<&Value>) -> String {
    info.and_then(|i| i.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown playlist")
        .to_string()
}

fn first_or_no_match(tracks: Vec<TrackDescriptor>) -> ResolvedResult {
    tracks
        .into_iter()
        .next()
        .map(ResolvedResult::SingleTrack)
        .unwrap_or(ResolvedResult::NoMatch)
}

fn playlist_or_no_match(name: String, tracks: Vec<TrackDescriptor>) -> ResolvedResult {
    if tracks.is_empty() {
        ResolvedResult::NoMatch
    } else {
        ResolvedResult::Playlist { name, tracks }
    }
}

fn load_failed(exception: Option<&Value>) -> MusicError {
    let message = exception
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("the node could not load the track");
    MusicError::Resolution(message.to_string())
}

fn malformed(detail: &str) -> MusicError {
    MusicError::Resolution(format!("malformed node response: {}", detail))
}
