//! Authorization logic.

pub mod oauth;
pub mod token_manager;

use crate::error::Error;

pub use self::oauth::{Grant, OAuthEndpoint, TokenResponse};
pub use self::token_manager::{
    AuthEvent, RefreshFailurePolicy, SessionState, TokenManager, TokenSet,
};

/// Exchanges credentials for a token pair.
#[async_trait::async_trait]
pub trait TokenGrant: Send + Sync {
    async fn grant(&self, user_key: &str, grant: Grant<'_>) -> Result<TokenResponse, Error>;
}
