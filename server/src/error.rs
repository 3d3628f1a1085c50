use sim_shared::ScenarioId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimError>;

/// Errors raised by the simulation server.
///
/// The first four variants are reported back to the client that caused them
/// as an `error` event; their messages are part of the wire protocol.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid JSON")]
    InvalidJson,

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("You are not allowed to control this simulation.")]
    NotAuthorized,

    #[error("Simulation state not initialized.")]
    NotInitialized(ScenarioId),

    #[error("scenario directory error: {0}")]
    Directory(String),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SimError {
    /// True for errors caused by the client's own request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SimError::InvalidJson
                | SimError::UnknownAction(_)
                | SimError::NotAuthorized
                | SimError::NotInitialized(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_facing_messages() {
        assert_eq!(SimError::InvalidJson.to_string(), "Invalid JSON");
        assert_eq!(
            SimError::UnknownAction("rewind".into()).to_string(),
            "Unknown action 'rewind'"
        );
        assert_eq!(
            SimError::NotAuthorized.to_string(),
            "You are not allowed to control this simulation."
        );
        assert_eq!(
            SimError::NotInitialized(4).to_string(),
            "Simulation state not initialized."
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(SimError::NotAuthorized.is_client_error());
        assert!(!SimError::Directory("gone".into()).is_client_error());
    }
}
