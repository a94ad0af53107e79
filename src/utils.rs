use serde::Deserialize;

use crate::error::Error;

/// Error reported by the platform, decoded from the response body when possible.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{status_code} status code: {}", .message.as_deref().unwrap_or("no details"))]
pub struct PlatformError {
    pub status_code: u16,
    pub message: Option<String>,
    pub name: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    name: Option<String>,
    code: Option<serde_json::Value>,
    // OAuth endpoints use the RFC 6749 field names instead.
    error: Option<String>,
    error_description: Option<String>,
}

impl PlatformError {
    pub fn from_body(status_code: u16, body: &str) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let code = parsed.code.map(|code| match code {
            serde_json::Value::String(code) => code,
            other => other.to_string(),
        });
        let message = parsed
            .message
            .or(parsed.error_description)
            .or_else(|| (!body.trim().is_empty() && code.is_none()).then(|| body.trim().to_owned()));
        Self {
            status_code,
            message,
            name: parsed.name.or(parsed.error),
            code,
        }
    }
}

pub async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(PlatformError::from_body(status.as_u16(), &body).into())
}
