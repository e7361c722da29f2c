use thiserror::Error;

/// Failure kinds shared by every component. The HTTP boundary maps these
/// one-to-one onto status codes.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("complete your profile before getting recommendations")]
    ProfileIncomplete,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl CoreError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(e: anyhow::Error) -> Self {
        // {:#} keeps the context chain on one line
        Self::StorageFailure(format!("{:#}", e))
    }
}
