//! Keystone v3 password authentication.

use std::time::Duration;

use tracing::debug;

use crate::config::BackupConfig;

use super::error::OpenStackError;
use super::types::{
    AuthBody, AuthRequest, CatalogEntry, Identity, NamedRef, PasswordMethod, PasswordUser, Scope,
    ScopedProject, TokenResponse,
};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Password credentials scoped to a project.
#[derive(Clone)]
pub(super) struct Credentials {
    tokens_url: String,
    user: String,
    password: String,
    domain: String,
    project: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("tokens_url", &self.tokens_url)
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("project", &self.project)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub(super) fn from_config(config: &BackupConfig) -> Self {
        Self {
            tokens_url: tokens_url(&config.keystone_url),
            user: config.user.clone(),
            password: config.password.clone(),
            domain: config.domain.clone(),
            project: config.project.clone(),
        }
    }

    fn request(&self) -> AuthRequest<'_> {
        AuthRequest {
            auth: AuthBody {
                identity: Identity {
                    methods: ["password"],
                    password: PasswordMethod {
                        user: PasswordUser {
                            name: &self.user,
                            domain: NamedRef { name: &self.domain },
                            password: &self.password,
                        },
                    },
                },
                scope: Scope {
                    project: ScopedProject {
                        name: &self.project,
                        domain: NamedRef { name: &self.domain },
                    },
                },
            },
        }
    }
}

/// A scoped token together with the catalog Keystone returned with it.
#[derive(Debug)]
pub(super) struct IssuedToken {
    pub(super) value: String,
    pub(super) catalog: Vec<CatalogEntry>,
}

/// Requests a new project-scoped token.
pub(super) async fn issue_token(
    http: &reqwest::Client,
    credentials: &Credentials,
    timeout: Duration,
) -> Result<IssuedToken, OpenStackError> {
    let url = credentials.tokens_url.as_str();
    debug!(url, user = %credentials.user, project = %credentials.project, "requesting keystone token");
    let response = http
        .post(url)
        .json(&credentials.request())
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| OpenStackError::Transport {
            method: "POST".to_owned(),
            url: url.to_owned(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenStackError::Auth(format!("HTTP {}: {body}", status.as_u16())));
    }

    let value = response
        .headers()
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|header| header.to_str().ok())
        .map(str::to_owned)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| OpenStackError::Auth(format!("response carried no {SUBJECT_TOKEN_HEADER}")))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|source| OpenStackError::Transport {
            method: "POST".to_owned(),
            url: url.to_owned(),
            source,
        })?;
    let body: TokenResponse =
        serde_json::from_slice(&bytes).map_err(|err| OpenStackError::Decode {
            url: url.to_owned(),
            message: err.to_string(),
        })?;

    Ok(IssuedToken {
        value,
        catalog: body.token.catalog,
    })
}

/// Builds the token endpoint, adding the `/v3` root when it is missing.
pub(super) fn tokens_url(keystone_url: &str) -> String {
    let trimmed = keystone_url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v3") {
        format!("{trimmed}/auth/tokens")
    } else {
        format!("{trimmed}/v3/auth/tokens")
    }
}
