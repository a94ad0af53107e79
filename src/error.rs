use crate::utils::PlatformError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required argument was missing; no request was sent.
    #[error("missing required parameter: {0}")]
    Validation(&'static str),
    #[error("invalid environment url: {0}")]
    InvalidEnvironment(String),
    #[error("not authenticated: log in or provide an access token first")]
    NotAuthenticated,
    #[error("auth: {0}")]
    Auth(#[source] PlatformError),
    #[error("platform: {0}")]
    Platform(#[from] PlatformError),
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::NotAuthenticated)
    }

    /// The server's error body, for auth and platform failures.
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            Self::Auth(err) | Self::Platform(err) => Some(err),
            _ => None,
        }
    }
}
