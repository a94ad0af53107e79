//! Client configuration.
//!
//! A [`ClientConfig`] can be assembled in code or read from the environment:
//!
//! - `TRACKVIA_API_KEY` (required): the account's user key.
//! - `TRACKVIA_ACCESS_TOKEN`: an access token obtained elsewhere.
//! - `TRACKVIA_ENVIRONMENT`: base url of the platform, defaults to production.

use std::time::Duration;

use crate::{
    auth::token_manager::{RefreshFailurePolicy, DEFAULT_REFRESH_LEAD},
    error::Error,
};

pub const DEFAULT_ENVIRONMENT: &str = "https://go.trackvia.com";

pub const ENV_API_KEY: &str = "TRACKVIA_API_KEY";
pub const ENV_ACCESS_TOKEN: &str = "TRACKVIA_ACCESS_TOKEN";
pub const ENV_ENVIRONMENT: &str = "TRACKVIA_ENVIRONMENT";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub user_key: String,
    pub access_token: Option<String>,
    pub environment: String,
    /// How long before expiry the access token gets refreshed.
    pub refresh_lead: Duration,
    pub refresh_failure: RefreshFailurePolicy,
}

impl ClientConfig {
    pub fn new(user_key: impl Into<String>) -> Self {
        Self {
            user_key: user_key.into(),
            access_token: None,
            environment: DEFAULT_ENVIRONMENT.to_owned(),
            refresh_lead: DEFAULT_REFRESH_LEAD,
            refresh_failure: RefreshFailurePolicy::default(),
        }
    }

    pub fn from_env() -> Result<Self, Error> {
        let user_key = getenv(ENV_API_KEY).ok_or(Error::Validation(ENV_API_KEY))?;
        let mut config = Self::new(user_key);
        if let Some(access_token) = getenv(ENV_ACCESS_TOKEN) {
            config = config.with_access_token(access_token);
        }
        if let Some(environment) = getenv(ENV_ENVIRONMENT) {
            config = config.with_environment(environment);
        }
        Ok(config)
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = Some(access_token.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn with_refresh_lead(mut self, refresh_lead: Duration) -> Self {
        self.refresh_lead = refresh_lead;
        self
    }

    pub fn with_refresh_failure(mut self, policy: RefreshFailurePolicy) -> Self {
        self.refresh_failure = policy;
        self
    }
}

fn getenv(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}
