use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::FetchError;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Authenticated JSON client shared by the reqwest-backed providers
#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// `authorization` is the full header value, e.g. `token abc` or `Bearer abc`
    pub fn new(base_url: &str, authorization: &str) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(authorization)
            .map_err(|e| FetchError::Transport(format!("invalid token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a GET without judging the status
    pub async fn get_raw(&self, url: &str) -> Result<Response, FetchError> {
        debug!("GET {}", url);
        Ok(self.http.get(url).send().await?)
    }

    /// GET and decode, mapping every non-2xx to a [`FetchError`]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = ensure_success(self.get_raw(url).await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// GET that only checks for success
    pub async fn get_ok(&self, url: &str) -> Result<(), FetchError> {
        ensure_success(self.get_raw(url).await?).await.map(|_| ())
    }

    /// GET a resource whose absence means the owner does not exist
    pub async fn resource_exists(&self, url: &str, owner: &str) -> Result<bool, FetchError> {
        let response = self.get_raw(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response).await?;
        debug!("{} exists at {}", owner, url);
        Ok(true)
    }
}

/// Pass 2xx responses through, turn the rest into errors
pub(crate) async fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(FetchError::Unauthorized);
    }

    let url = response.url().to_string();
    let body = response.text().await.unwrap_or_default();
    Err(FetchError::Status {
        status: status.as_u16(),
        url,
        body,
    })
}
