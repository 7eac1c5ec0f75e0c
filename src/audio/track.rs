use serde::Deserialize;
use std::time::Duration;

/// Metadatos inmutables de una pista resuelta por el nodo.
///
/// `handle` es el blob opaco (`encoded`) que el nodo necesita para reproducirla.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackDescriptor {
    pub identifier: String,
    pub title: String,
    pub author: Option<String>,
    /// `None` para streams en vivo
    pub duration: Option<Duration>,
    pub uri: Option<String>,
    pub source_name: Option<String>,
    pub handle: String,
}

// Forma JSON de una pista en Lavalink (v3 usa `track`, v4 usa `encoded`)
#[derive(Debug, Deserialize)]
struct RawTrack {
    #[serde(alias = "track")]
    encoded: String,
    info: RawTrackInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrackInfo {
    identifier: String,
    title: String,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    length: u64,
    #[serde(default)]
    is_stream: bool,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
}

impl TrackDescriptor {
    /// Convierte un objeto de pista del nodo en un descriptor tipado.
    pub fn from_node_json(value: &serde_json::Value) -> Result<Self, String> {
        let raw = RawTrack::deserialize(value).map_err(|e| format!("malformed track: {}", e))?;

        Ok(Self {
            identifier: raw.info.identifier,
            title: raw.info.title,
            author: raw.info.author.filter(|a| !a.is_empty()),
            duration: (!raw.info.is_stream).then(|| Duration::from_millis(raw.info.length)),
            uri: raw.info.uri,
            source_name: raw.info.source_name,
            handle: raw.encoded,
        })
    }

    #[cfg(test)]
    pub fn sample(title: &str) -> Self {
        Self {
            identifier: format!("id-{}", title),
            title: title.to_string(),
            author: None,
            duration: Some(Duration::from_secs(180)),
            uri: Some(format!("https://example.com/{}", title)),
            source_name: Some("http".to_string()),
            handle: format!("enc-{}", title),
        }
    }
}
