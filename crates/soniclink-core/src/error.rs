use thiserror::Error;

/// Errors produced by the SonicLink control plane.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("port {0} is already in use")]
    PortInUse(u16),

    #[error("bind failed: {0}")]
    Bind(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ControlError {
    fn from(e: serde_json::Error) -> Self {
        ControlError::InvalidMessage(e.to_string())
    }
}

pub type ControlResult<T> = Result<T, ControlError>;
