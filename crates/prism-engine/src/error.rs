#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session has not resolved yet")]
    Unresolved,

    /// The driver stopped before every platform reached a terminal status.
    #[error("session stalled before resolution")]
    Stalled,

    #[error("session abandoned")]
    Abandoned,
}

impl SessionError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::Stalled => "stalled",
            Self::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("connect failed after {attempts} attempt(s): {reason}")]
    Connect { attempts: u32, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("driver cancelled")]
    Cancelled,
}

impl DriverError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Transport(_) => "transport",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DriverError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
