use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- transport errors ------------------------------------------
    #[error("connection lost before a response arrived")]
    ConnectionLost,
    #[error("no response after {0:?}")]
    Timeout(Duration),
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    // --------------------------------- handshake errors ------------------------------------------
    #[error("malformed subprocess announcement: {0}")]
    MalformedAnnouncement(serde_json::Error),
    #[error("unsupported request `{0}`")]
    UnsupportedRequest(String),
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("announcement dropped without acknowledgment")]
    AcknowledgmentOmitted,

    // --------------------------------- configuration errors --------------------------------------
    #[error("launch options already set")]
    OptionsAlreadySet,
    #[error("process is not a subprocess: {0} not configured")]
    NotASubprocess(&'static str),
}

impl Error {
    /// Return true if error means that the peer went away.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Error::ConnectionLost => true,
            Error::IO(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
