//! Error types for credential lifecycle operations

/// Errors from credential lifecycle operations.
///
/// `AuthRejected` is only produced when the token endpoint answers 401 to a
/// refresh; callers handle it like any other failure but it is logged and
/// counted separately.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("credential rejected: {0}")]
    AuthRejected(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("invite code is empty")]
    EmptyInviteCode,

    #[error("no valid refresh token available")]
    NoValidRefreshToken,

    #[error("new access token failed validation")]
    ValidationFailed,
}

impl Error {
    /// Short label for the `outcome` metric dimension.
    pub fn outcome(&self) -> &'static str {
        match self {
            Error::Transport(_) => "transport",
            Error::AuthRejected(_) => "rejected",
            Error::MalformedResponse(_) => "malformed",
            Error::Persistence(_) => "persistence",
            Error::EmptyInviteCode => "empty_code",
            Error::NoValidRefreshToken => "no_refresh_token",
            Error::ValidationFailed => "invalid",
        }
    }
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
