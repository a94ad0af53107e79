//! Client for the platform's REST API.
//!
//! [`TrackviaApi`] validates arguments up front, then issues requests authorized
//! with the access token held by its [`TokenManager`].

use std::{path::Path, sync::Arc};

use reqwest::{multipart, Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use self::model::{
    App, DataEnvelope, Paging, Record, RecordResponse, RecordSet, RecordUpdate, UserInfo, View,
};
use crate::{
    auth::{OAuthEndpoint, SessionState, TokenManager, TokenSet},
    config::ClientConfig,
    error::Error,
    utils::check_status,
};

pub mod model;

pub struct TrackviaApi {
    client: reqwest::Client,
    base_url: Url,
    auth: Arc<TokenManager>,
}

impl TrackviaApi {
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Like [`TrackviaApi::new`], reusing an existing HTTP client.
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Result<Self, Error> {
        if config.user_key.trim().is_empty() {
            return Err(Error::Validation("user key"));
        }
        let base_url = Url::parse(&format!("{}/openapi", config.environment))
            .map_err(|err| Error::InvalidEnvironment(format!("{}: {}", config.environment, err)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidEnvironment(config.environment));
        }

        let provider = OAuthEndpoint {
            client: client.clone(),
            environment: config.environment.clone(),
        };
        let auth = TokenManager::new(Arc::new(provider), &config);

        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.auth
    }

    pub fn user_key(&self) -> Option<String> {
        self.auth.user_key()
    }

    pub fn access_token(&self) -> Option<String> {
        self.auth.access_token()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.auth.refresh_token()
    }

    pub fn session_state(&self) -> SessionState {
        self.auth.state()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<TokenSet, Error> {
        self.auth.login(username, password).await
    }

    pub async fn get_apps(&self) -> Result<Vec<App>, Error> {
        self.get_json(&["apps"], &[]).await
    }

    pub async fn get_app_by_name(&self, name: &str) -> Result<Vec<App>, Error> {
        let name = require_str(name, "app name")?;
        self.get_json(&["apps"], &[("name", name.to_owned())]).await
    }

    pub async fn get_users(&self, paging: Option<Paging>) -> Result<RecordSet, Error> {
        self.get_json(&["users"], &paging_query(paging)).await
    }

    pub async fn add_user(&self, info: &UserInfo) -> Result<RecordSet, Error> {
        let mut query = vec![
            ("email", require_str(&info.email, "user email")?.to_owned()),
            (
                "firstName",
                require_str(&info.first_name, "user first name")?.to_owned(),
            ),
            (
                "lastName",
                require_str(&info.last_name, "user last name")?.to_owned(),
            ),
        ];
        if let Some(time_zone) = &info.time_zone {
            query.push(("timeZone", time_zone.clone()));
        }
        let req = self.request(Method::POST, &["users"])?.query(&query);
        Self::parse_json(self.exec(req).await?).await
    }

    pub async fn get_views(&self) -> Result<Vec<View>, Error> {
        self.get_json(&["views"], &[]).await
    }

    pub async fn get_view_by_name(&self, name: &str) -> Result<Vec<View>, Error> {
        let name = require_str(name, "view name")?;
        self.get_json(&["views"], &[("name", name.to_owned())]).await
    }

    /// Fetch a page of a view's records, optionally filtered by a search query.
    pub async fn get_view(
        &self,
        view_id: u64,
        paging: Option<Paging>,
        query: Option<&str>,
    ) -> Result<RecordSet, Error> {
        let view_id = require_id(view_id, "view id")?;
        let mut params = paging_query(paging);
        match query {
            Some(query) => {
                params.push(("q", query.to_owned()));
                self.get_json(&["views", view_id.as_str(), "find"], &params).await
            }
            None => self.get_json(&["views", view_id.as_str()], &params).await,
        }
    }

    pub async fn get_record(&self, view_id: u64, record_id: u64) -> Result<RecordResponse, Error> {
        let view_id = require_id(view_id, "view id")?;
        let record_id = require_id(record_id, "record id")?;
        self.get_json(&["views", view_id.as_str(), "records", record_id.as_str()], &[])
            .await
    }

    pub async fn add_record(&self, view_id: u64, data: Record) -> Result<RecordSet, Error> {
        let view_id = require_id(view_id, "view id")?;
        let body = DataEnvelope { data: vec![data] };
        self.send_json(Method::POST, &["views", view_id.as_str(), "records"], &body)
            .await
    }

    pub async fn update_record(
        &self,
        view_id: u64,
        record_id: u64,
        data: Record,
    ) -> Result<RecordSet, Error> {
        let view_id = require_id(view_id, "view id")?;
        let record_id = require_id(record_id, "record id")?;
        let body = DataEnvelope { data: vec![data] };
        let segments = ["views", view_id.as_str(), "records", record_id.as_str()];
        self.send_json(Method::PUT, &segments, &body).await
    }

    /// Update several records of a view in one request.
    pub async fn update_records(
        &self,
        view_id: u64,
        records: Vec<RecordUpdate>,
    ) -> Result<RecordSet, Error> {
        let view_id = require_id(view_id, "view id")?;
        if records.is_empty() {
            return Err(Error::Validation("records"));
        }
        for record in &records {
            require_id(record.id, "record id")?;
        }
        let body = DataEnvelope { data: records };
        self.send_json(Method::PUT, &["views", view_id.as_str(), "records"], &body)
            .await
    }

    pub async fn delete_record(&self, view_id: u64, record_id: u64) -> Result<(), Error> {
        let view_id = require_id(view_id, "view id")?;
        let record_id = require_id(record_id, "record id")?;
        let segments = ["views", view_id.as_str(), "records", record_id.as_str()];
        let req = self.request(Method::DELETE, &segments)?;
        self.exec(req).await?;
        Ok(())
    }

    pub async fn delete_all_records_in_view(&self, view_id: u64) -> Result<(), Error> {
        let view_id = require_id(view_id, "view id")?;
        let req = self.request(Method::DELETE, &["views", view_id.as_str(), "records", "all"])?;
        self.exec(req).await?;
        Ok(())
    }

    /// Upload the file at `file_path` into a document field of a record.
    pub async fn attach_file(
        &self,
        view_id: u64,
        record_id: u64,
        field_name: &str,
        file_path: Option<&Path>,
    ) -> Result<RecordResponse, Error> {
        let view_id = require_id(view_id, "view id")?;
        let record_id = require_id(record_id, "record id")?;
        let field_name = require_str(field_name, "field name")?;
        let file_path = file_path
            .filter(|path| !path.as_os_str().is_empty())
            .ok_or(Error::Validation("file path"))?;
        let req = self.request(
            Method::POST,
            &["views", view_id.as_str(), "records", record_id.as_str(), "files", field_name],
        )?;

        let content = tokio::fs::read(file_path).await?;
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        debug!(message = "Attaching file", file_name = %file_name, bytes = content.len());
        let part = multipart::Part::bytes(content).file_name(file_name);
        let form = multipart::Form::new().part("file", part);

        Self::parse_json(self.exec(req.multipart(form)).await?).await
    }

    /// Download the contents of a document or image field.
    pub async fn get_file(
        &self,
        view_id: u64,
        record_id: u64,
        field_name: &str,
    ) -> Result<Vec<u8>, Error> {
        let view_id = require_id(view_id, "view id")?;
        let record_id = require_id(record_id, "record id")?;
        let field_name = require_str(field_name, "field name")?;
        let req = self.request(
            Method::GET,
            &["views", view_id.as_str(), "records", record_id.as_str(), "files", field_name],
        )?;
        let res = self.exec(req).await?;
        Ok(res.bytes().await?.to_vec())
    }

    pub async fn delete_file(
        &self,
        view_id: u64,
        record_id: u64,
        field_name: &str,
    ) -> Result<(), Error> {
        let view_id = require_id(view_id, "view id")?;
        let record_id = require_id(record_id, "record id")?;
        let field_name = require_str(field_name, "field name")?;
        let req = self.request(
            Method::DELETE,
            &["views", view_id.as_str(), "records", record_id.as_str(), "files", field_name],
        )?;
        self.exec(req).await?;
        Ok(())
    }

    fn build_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in the constructor: the base url can always take path segments.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<reqwest::RequestBuilder, Error> {
        let access_token = self.auth.access_token().ok_or(Error::NotAuthenticated)?;
        let user_key = self.auth.user_key().ok_or(Error::Validation("user key"))?;
        let url = self.build_url(segments);
        debug!(message = "Sending request", method = %method, path = url.path());

        Ok(self
            .client
            .request(method, url)
            .bearer_auth(access_token)
            .query(&[("user_key", user_key)]))
    }

    async fn get_json<T>(&self, segments: &[&str], query: &[(&str, String)]) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let req = self.request(Method::GET, segments)?.query(query);
        Self::parse_json(self.exec(req).await?).await
    }

    async fn send_json<B, T>(&self, method: Method, segments: &[&str], body: &B) -> Result<T, Error>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let req = self.request(method, segments)?.json(body);
        Self::parse_json(self.exec(req).await?).await
    }

    async fn exec(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, Error> {
        let res = req.send().await?;
        check_status(res).await
    }

    async fn parse_json<T>(res: reqwest::Response) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        res.json().await.map_err(Error::Reqwest)
    }
}

fn require_id(id: u64, name: &'static str) -> Result<String, Error> {
    match id {
        0 => Err(Error::Validation(name)),
        id => Ok(id.to_string()),
    }
}

fn require_str<'a>(value: &'a str, name: &'static str) -> Result<&'a str, Error> {
    match value.trim() {
        "" => Err(Error::Validation(name)),
        _ => Ok(value),
    }
}

fn paging_query(paging: Option<Paging>) -> Vec<(&'static str, String)> {
    paging
        .map(|paging| {
            vec![
                ("start", paging.start.to_string()),
                ("max", paging.max.to_string()),
            ]
        })
        .unwrap_or_default()
}
