//! Error taxonomy for the live audio bridge
//!
//! Every fatal path ends the session: there is no retry and no reconnect.

/// Errors surfaced by the bridge and its collaborators
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Microphone access was denied or no input device is available
    #[error("microphone unavailable: {0}")]
    Permission(String),

    /// The live service could not be reached or rejected the setup
    #[error("connection failed: {0}")]
    Connection(String),

    /// Mid-session network fault or service-side error
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed inbound audio payload
    #[error("audio decode failed: {0}")]
    Decode(String),

    /// Audio output device could not be opened or driven
    #[error("audio device error: {0}")]
    Device(String),

    /// Missing or invalid configuration (API key, sample rates, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// A session is already running on this bridge
    #[error("a session is already active")]
    SessionActive,
}

impl BridgeError {
    /// Message handed to the `on_error` callback (shown to the person being interviewed)
    pub fn user_message(&self) -> String {
        match self {
            BridgeError::Permission(_) => format!(
                "Impossible de démarrer la session : accès au microphone refusé ({})",
                self
            ),
            BridgeError::Connection(_) | BridgeError::Config(_) | BridgeError::Device(_) => {
                format!("Impossible de démarrer la session : {}", self)
            }
            BridgeError::Transport(_) => {
                format!("La connexion avec l'assistant a été interrompue : {}", self)
            }
            BridgeError::Decode(_) => format!("Erreur de lecture audio : {}", self),
            BridgeError::SessionActive => "Une session est déjà en cours".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
