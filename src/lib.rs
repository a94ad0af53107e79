//! Client for the TrackVia REST API.
//!
//! ```no_run
//! # async fn run() -> Result<(), trackvia_api::Error> {
//! use trackvia_api::{ClientConfig, TrackviaApi};
//!
//! let api = TrackviaApi::new(ClientConfig::new("my-user-key"))?;
//! api.login("someone@example.com", "secret").await?;
//! let apps = api.get_apps().await?;
//! # Ok(())
//! # }
//! ```
//!
//! After a login the access token is refreshed in the background shortly before it
//! expires, see [`auth::TokenManager`].

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
mod utils;

pub use api::TrackviaApi;
pub use config::ClientConfig;
pub use error::Error;
pub use utils::PlatformError;
