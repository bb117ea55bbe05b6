//! Authenticated HTTP plumbing shared by the service clients.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::debug;

use super::auth::{Credentials, IssuedToken, issue_token};
use super::error::OpenStackError;

const ERROR_BODY_LIMIT: usize = 512;

/// Extra headers attached to a request.
pub(super) type Headers<'a> = &'a [(&'static str, &'static str)];

/// HTTP client carrying a Keystone token that is renewed once on 401.
pub(super) struct ApiClient {
    http: reqwest::Client,
    credentials: Credentials,
    token: RwLock<String>,
    timeout: Duration,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("credentials", &self.credentials)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Authenticates and returns the client plus the issued token's catalog.
    pub(super) async fn connect(
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<(Self, IssuedToken), OpenStackError> {
        // Image downloads can take hours, so only API calls carry a timeout.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| OpenStackError::Config(format!("http client: {err}")))?;
        let issued = issue_token(&http, &credentials, timeout).await?;
        let client = Self {
            http,
            credentials,
            token: RwLock::new(issued.value.clone()),
            timeout,
        };
        Ok((client, issued))
    }

    pub(super) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Headers<'_>,
    ) -> Result<T, OpenStackError> {
        let response = self
            .send(Method::GET, url, Some(self.timeout), |request| {
                with_headers(request, headers)
            })
            .await?;
        decode(&Method::GET, url, checked(&Method::GET, url, response).await?).await
    }

    /// Like [`Self::get_json`] but maps 404 to `None`.
    pub(super) async fn get_optional_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: Headers<'_>,
    ) -> Result<Option<T>, OpenStackError> {
        let response = self
            .send(Method::GET, url, Some(self.timeout), |request| {
                with_headers(request, headers)
            })
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(&Method::GET, url, checked(&Method::GET, url, response).await?)
            .await
            .map(Some)
    }

    pub(super) async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, OpenStackError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .send(Method::POST, url, Some(self.timeout), |request| {
                request.json(body)
            })
            .await?;
        decode(&Method::POST, url, checked(&Method::POST, url, response).await?).await
    }

    /// Deletes `url`; a 404 means the resource is already gone.
    pub(super) async fn delete(&self, url: &str) -> Result<(), OpenStackError> {
        let response = self
            .send(Method::DELETE, url, Some(self.timeout), |request| request)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(url, "resource already deleted");
            return Ok(());
        }
        checked(&Method::DELETE, url, response).await.map(drop)
    }

    /// Starts a streaming GET without a request timeout.
    pub(super) async fn get_stream(&self, url: &str) -> Result<Response, OpenStackError> {
        let response = self.send(Method::GET, url, None, |request| request).await?;
        checked(&Method::GET, url, response).await
    }

    async fn send<F>(
        &self,
        method: Method,
        url: &str,
        timeout: Option<Duration>,
        build: F,
    ) -> Result<Response, OpenStackError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let token = self.token.read().await.clone();
        let response = self
            .attempt(&method, url, timeout, &token, &build)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        debug!(%method, url, "token rejected; re-authenticating");
        let renewed = self.renew_token(&token).await?;
        self.attempt(&method, url, timeout, &renewed, &build).await
    }

    async fn attempt<F>(
        &self,
        method: &Method,
        url: &str,
        timeout: Option<Duration>,
        token: &str,
        build: &F,
    ) -> Result<Response, OpenStackError>
    where
        F: Fn(RequestBuilder) -> RequestBuilder,
    {
        let mut request = build(self.http.request(method.clone(), url)).header("X-Auth-Token", token);
        if let Some(limit) = timeout {
            request = request.timeout(limit);
        }
        request
            .send()
            .await
            .map_err(|source| OpenStackError::Transport {
                method: method.to_string(),
                url: url.to_owned(),
                source,
            })
    }

    /// Replaces `rejected` with a fresh token unless another task already did.
    async fn renew_token(&self, rejected: &str) -> Result<String, OpenStackError> {
        let mut current = self.token.write().await;
        if current.as_str() != rejected {
            return Ok(current.clone());
        }
        let issued = issue_token(&self.http, &self.credentials, self.timeout).await?;
        current.clone_from(&issued.value);
        Ok(issued.value)
    }
}

fn with_headers(request: RequestBuilder, headers: Headers<'_>) -> RequestBuilder {
    headers
        .iter()
        .fold(request, |builder, (name, value)| builder.header(*name, *value))
}

async fn checked(method: &Method, url: &str, response: Response) -> Result<Response, OpenStackError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OpenStackError::Http {
        method: method.to_string(),
        url: url.to_owned(),
        status: status.as_u16(),
        body: truncate(&body),
    })
}

async fn decode<T: DeserializeOwned>(
    method: &Method,
    url: &str,
    response: Response,
) -> Result<T, OpenStackError> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| OpenStackError::Transport {
            method: method.to_string(),
            url: url.to_owned(),
            source,
        })?;
    serde_json::from_slice(&bytes).map_err(|err| OpenStackError::Decode {
        url: url.to_owned(),
        message: err.to_string(),
    })
}

fn truncate(body: &str) -> String {
    body.trim().chars().take(ERROR_BODY_LIMIT).collect()
}
