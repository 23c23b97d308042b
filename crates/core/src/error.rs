use migration_monitor_api_client::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    /// Network/HTTP failure or a malformed body.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server answered the start request with `status: "error"`.
    #[error("start rejected by server: {0}")]
    StartRejected(String),

    /// The status payload itself reported `status: "error"`.
    #[error("migration failed on server: {0}")]
    ServerReported(String),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
