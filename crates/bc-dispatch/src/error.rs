use bc_common::RecipientId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("A broadcast is already in progress")]
    AlreadyRunning,

    #[error("No targets found")]
    NoTargets,

    #[error("Invalid pacing interval: {0:?}")]
    InvalidPacing(std::time::Duration),

    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),
}

/// Errors raised by a recipient directory backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Directory unavailable: {0}")]
    Unavailable(String),

    #[error("Recipient not found: {0}")]
    NotFound(RecipientId),

    #[error("Invalid seed data: {0}")]
    Seed(String),
}

/// Errors raised while talking to the operator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Failed to send notice: {0}")]
    Send(String),

    #[error("Failed to edit notice: {0}")]
    Edit(String),
}

/// Problems with the broadcast command input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Reply to a message to broadcast")]
    MissingSource,

    #[error("Flag '{0}' needs a value")]
    MissingValue(&'static str),

    #[error("Invalid limit '{0}': expected a positive integer")]
    InvalidLimit(String),

    #[error("Invalid delay '{0}': expected a positive duration such as 50ms, 1s or 1m30s")]
    InvalidDelay(String),
}
