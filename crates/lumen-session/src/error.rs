use lumen_ai::LumenAiError;
use thiserror::Error;

use crate::transcript::EntryId;

#[derive(Debug, Error)]
/// Enumerates supported `SessionError` values.
pub enum SessionError {
    #[error("an exchange is already in progress")]
    Busy,
    #[error("no transcript entry with id {0}")]
    UnknownEntry(EntryId),
    #[error("entry {0} has no server timestamp yet and cannot be deleted")]
    NotReconciled(EntryId),
    #[error("unknown persona: {0}")]
    UnknownPersona(String),
    #[error("invalid image payload: {0}")]
    InvalidImage(String),
    #[error("image resize failed: {0}")]
    ImageResize(String),
    #[error(transparent)]
    Backend(#[from] LumenAiError),
}

impl SessionError {
    /// Text suitable for showing to the person using the client.
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(error) => error.user_message(),
            other => other.to_string(),
        }
    }
}
