use shared::{
    domain::{LiftplanName, LoomCommandKind, LoomState},
    error::ValidationError,
};
use thiserror::Error;

pub type ControlResult<T> = std::result::Result<T, ControlError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    NotFound,
    Remote,
    Network,
}

#[derive(Debug, Clone, Error)]
pub enum ControlError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot {command} while loom is {state}")]
    InvalidTransition {
        state: LoomState,
        command: LoomCommandKind,
    },
    #[error("cannot {action} while loom is {state}")]
    LoomBusy {
        state: LoomState,
        action: &'static str,
    },
    #[error("liftplan {name} not found")]
    NotFound { name: LiftplanName },
    #[error("{endpoint} returned HTTP {status}")]
    Remote { endpoint: String, status: u16 },
    #[error("loom rejected {command} command")]
    CommandRejected { command: LoomCommandKind },
    #[error("malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },
    #[error("request to {endpoint} failed: {message}")]
    Network { endpoint: String, message: String },
}

impl ControlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControlError::Validation(_) => ErrorKind::Validation,
            ControlError::InvalidTransition { .. } | ControlError::LoomBusy { .. } => {
                ErrorKind::InvalidTransition
            }
            ControlError::NotFound { .. } => ErrorKind::NotFound,
            ControlError::Remote { .. }
            | ControlError::CommandRejected { .. }
            | ControlError::MalformedResponse { .. } => ErrorKind::Remote,
            ControlError::Network { .. } => ErrorKind::Network,
        }
    }

    /// Raised locally, before anything was sent to the loom.
    pub fn is_local(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::InvalidTransition
        )
    }

    /// Text for the status line of the panel.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation => format!("Error: {self}"),
            ErrorKind::InvalidTransition => format!("Not allowed: {self}"),
            ErrorKind::NotFound => format!("Missing: {self}"),
            ErrorKind::Remote => format!("Loom error: {self}"),
            ErrorKind::Network => format!("Loom unreachable: {self}"),
        }
    }
}
