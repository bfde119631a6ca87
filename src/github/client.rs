//! Remote Run API interface and its reqwest-backed implementation.
//!
//! [`RunApi`] is the seam between the synchronization core and GitHub: the
//! poller and hook manager hold an `Arc<dyn RunApi>`, and tests substitute a
//! mock. [`GitHubClient`] is the production implementation over the REST API
//! with a settable bearer token (token acquisition is the embedding
//! application's concern).

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use crate::types::{HookId, RepoId, RunSnapshot, WorkflowId};

use super::error::ApiError;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const ACCEPT_JSON: &str = "application/vnd.github+json";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const CLIENT_USER_AGENT: &str = concat!("runwatch/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote operations the synchronization core consumes.
///
/// All methods may fail with network, auth, rate-limit, or not-found errors;
/// the core treats every failure kind identically (swallow and continue), so
/// implementations should not retry internally.
#[async_trait]
pub trait RunApi: Send + Sync {
    /// Fetches the most recent runs of one workflow, newest first.
    async fn list_runs(
        &self,
        repo: &RepoId,
        workflow: WorkflowId,
        limit: u8,
    ) -> Result<Vec<RunSnapshot>, ApiError>;

    /// Creates a `workflow_run` webhook on the repository pointed at the
    /// relay channel URL. Requires admin permission on the repository.
    async fn create_hook(&self, repo: &RepoId, relay_url: &str) -> Result<HookId, ApiError>;

    /// Deletes a repository webhook. Deleting an already-gone hook returns a
    /// not-found error, which callers treat as success.
    async fn delete_hook(&self, repo: &RepoId, hook: HookId) -> Result<(), ApiError>;
}

/// Wire shape of the runs-list endpoint.
#[derive(Debug, Deserialize)]
struct ListRunsResponse {
    workflow_runs: Vec<RunSnapshot>,
}

/// Request body for hook creation.
#[derive(Debug, Serialize)]
struct CreateHookRequest<'a> {
    name: &'a str,
    active: bool,
    events: [&'a str; 1],
    config: HookConfig<'a>,
}

#[derive(Debug, Serialize)]
struct HookConfig<'a> {
    url: &'a str,
    content_type: &'a str,
    insecure_ssl: &'a str,
}

/// Wire shape of the hook-creation response.
#[derive(Debug, Deserialize)]
struct CreateHookResponse {
    id: HookId,
}

/// reqwest-backed [`RunApi`] implementation.
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl GitHubClient {
    /// Creates a client against the public GitHub API.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Creates a client against a custom API base (GitHub Enterprise, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::transport("failed to build HTTP client", e))?;

        Ok(GitHubClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Sets or clears the bearer token used for all subsequent requests.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("token lock poisoned") = token;
    }

    fn bearer(&self) -> Result<String, ApiError> {
        self.token
            .read()
            .expect("token lock poisoned")
            .as_deref()
            .map(|t| format!("Bearer {t}"))
            .ok_or_else(|| ApiError::permanent("no token configured"))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> Result<reqwest::RequestBuilder, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        Ok(self
            .http
            .request(method, url)
            .header(ACCEPT, ACCEPT_JSON)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(AUTHORIZATION, self.bearer()?))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.chars().take(200).collect()
        };
        Err(ApiError::from_status(status.as_u16(), message))
    }
}

#[async_trait]
impl RunApi for GitHubClient {
    async fn list_runs(
        &self,
        repo: &RepoId,
        workflow: WorkflowId,
        limit: u8,
    ) -> Result<Vec<RunSnapshot>, ApiError> {
        let path = format!(
            "/repos/{}/{}/actions/workflows/{}/runs?per_page={}",
            repo.owner, repo.repo, workflow, limit
        );
        let response = self
            .request(reqwest::Method::GET, &path)?
            .send()
            .await
            .map_err(|e| ApiError::transport("runs request failed", e))?;
        let response = Self::check_status(response).await?;
        let body: ListRunsResponse = response
            .json()
            .await
            .map_err(|e| ApiError::transport("failed to decode runs response", e))?;

        debug!(repo = %repo, workflow = %workflow, count = body.workflow_runs.len(), "fetched runs");
        Ok(body.workflow_runs)
    }

    async fn create_hook(&self, repo: &RepoId, relay_url: &str) -> Result<HookId, ApiError> {
        let path = format!("/repos/{}/{}/hooks", repo.owner, repo.repo);
        let body = CreateHookRequest {
            name: "web",
            active: true,
            events: ["workflow_run"],
            config: HookConfig {
                url: relay_url,
                content_type: "json",
                insecure_ssl: "0",
            },
        };
        let response = self
            .request(reqwest::Method::POST, &path)?
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::transport("hook creation request failed", e))?;
        let response = Self::check_status(response).await?;
        let created: CreateHookResponse = response
            .json()
            .await
            .map_err(|e| ApiError::transport("failed to decode hook response", e))?;

        debug!(repo = %repo, hook = %created.id, "created webhook");
        Ok(created.id)
    }

    async fn delete_hook(&self, repo: &RepoId, hook: HookId) -> Result<(), ApiError> {
        let path = format!("/repos/{}/{}/hooks/{}", repo.owner, repo.repo, hook);
        let response = self
            .request(reqwest::Method::DELETE, &path)?
            .send()
            .await
            .map_err(|e| ApiError::transport("hook deletion request failed", e))?;
        Self::check_status(response).await?;

        debug!(repo = %repo, hook = %hook, "deleted webhook");
        Ok(())
    }
}
