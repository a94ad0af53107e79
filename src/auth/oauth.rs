//! The platform's OAuth token endpoint.

use serde::Deserialize;
use tracing::debug;

use crate::{error::Error, utils::check_status};

/// Client id the platform expects from API consumers.
pub const CLIENT_ID: &str = "TrackViaAPI";

#[derive(Debug, Clone, Copy)]
pub enum Grant<'a> {
    Password { username: &'a str, password: &'a str },
    RefreshToken { refresh_token: &'a str },
}

impl Grant<'_> {
    fn grant_type(&self) -> &'static str {
        match self {
            Grant::Password { .. } => "password",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }
}

pub struct OAuthEndpoint {
    pub client: reqwest::Client,
    pub environment: String,
}

impl OAuthEndpoint {
    /// Perform a token grant.
    pub async fn perform(&self, user_key: &str, grant: Grant<'_>) -> Result<TokenResponse, Error> {
        let mut params = vec![
            ("client_id", CLIENT_ID),
            ("grant_type", grant.grant_type()),
        ];
        match grant {
            Grant::Password { username, password } => {
                params.push(("username", username));
                params.push(("password", password));
            }
            Grant::RefreshToken { refresh_token } => {
                params.push(("refresh_token", refresh_token));
            }
        }
        let params = serde_urlencoded::to_string(&params)
            .expect("string pairs always serialize");

        let url = format!("{}/oauth/token", self.environment);
        debug!(message = "Requesting token", grant_type = grant.grant_type());

        let req = self
            .client
            .post(url)
            .query(&[("user_key", user_key)])
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(params)
            .build()?;

        let res = self.client.execute(req).await?;
        let res = check_status(res).await.map_err(classify)?;
        let token_response = res.json().await?;
        Ok(token_response)
    }
}

/// Rejected credentials come back as 400 or 401 from the token endpoint.
fn classify(err: Error) -> Error {
    match err {
        Error::Platform(err) if matches!(err.status_code, 400 | 401) => Error::Auth(err),
        other => other,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
}

#[async_trait::async_trait]
impl super::TokenGrant for OAuthEndpoint {
    async fn grant(&self, user_key: &str, grant: Grant<'_>) -> Result<TokenResponse, Error> {
        self.perform(user_key, grant).await
    }
}
