use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Media resource error: {0}")]
    Media(String),

    #[error("Provider backend failed to load: {0}")]
    LoadFailed(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
