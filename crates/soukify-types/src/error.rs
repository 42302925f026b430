use thiserror::Error;

/// Failure taxonomy for the sync core.
///
/// Validation errors are rejected before any backend call; backend errors
/// surface on the operation or feed that hit them and never clear
/// previously delivered state.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("message text is empty")]
    EmptyMessage,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("no signed-in user")]
    NotSignedIn,

    #[error("backend error: {0}")]
    Backend(String),
}

impl SyncError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyMessage | Self::MissingField(_) | Self::NotSignedIn
        )
    }
}

impl From<anyhow::Error> for SyncError {
    fn from(err: anyhow::Error) -> Self {
        SyncError::Backend(err.to_string())
    }
}
