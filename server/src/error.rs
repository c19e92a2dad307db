use shared::ConfigError;
use thiserror::Error;

/// Errors that stop the server as a whole.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that end a single player's session. They never reach other sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("outbound channel closed")]
    OutboundClosed,
}
