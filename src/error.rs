use thiserror::Error;

/// Errores que el dispatcher convierte en un único mensaje de chat.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    /// Ni el autor ni el usuario mencionado están en un canal de voz
    #[error("no voice channel to bind to")]
    NoVoiceChannel,

    /// La sesión fue destruida o nunca existió
    #[error("no active session for this guild")]
    SessionGone,

    /// La búsqueda o URL no devolvió ninguna pista
    #[error("no tracks matched the query")]
    NoMatch,

    #[error("track resolution failed: {0}")]
    Resolution(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("audio node unavailable: {0}")]
    NodeUnavailable(String),
}

/// Fallos de transporte hacia el nodo de audio.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("node answered {status}: {body}")]
    Status { status: u16, body: String },

    /// Todavía no llegó el op `ready` por el websocket
    #[error("node session not ready")]
    NotReady,

    #[error("voice gateway join failed: {0}")]
    Voice(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<NodeError> for MusicError {
    fn from(err: NodeError) -> Self {
        MusicError::NodeUnavailable(err.to_string())
    }
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;
