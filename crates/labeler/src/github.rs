//! # GitHub REST Client
//!
//! Reads repository labels and issue/pull request snapshots, and performs
//! label mutations, over the GitHub REST API.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client as HttpClient, Method, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::catalog::LabelDefinition;
use crate::context::char_prefix;
use crate::entity::{EntityKind, FileChange, TargetEntity};
use crate::errors::{LabelerError, LabelerResult};
use crate::reconcile::LabelMutator;
use crate::workflow::RepositorySource;

/// Public GitHub API endpoint
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Colour given to labels this tool creates
pub const DEFAULT_LABEL_COLOR: &str = "ededed";

/// GitHub rejects longer label descriptions
pub const MAX_LABEL_DESCRIPTION_CHARS: usize = 100;

const PER_PAGE: usize = 100;

/// GitHub stops listing pull request files after this many
const MAX_PR_FILES: usize = 3000;

#[derive(Debug, Deserialize)]
struct GitHubError {
    message: String,
    #[serde(default)]
    errors: Vec<GitHubErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GitHubErrorDetail {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubLabel {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<GitHubUser>,
    #[serde(default)]
    labels: Vec<GitHubLabel>,
    /// Present only when the issue is a pull request
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GitHubPullFile {
    filename: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    additions: u32,
    #[serde(default)]
    deletions: u32,
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateLabelRequest<'a> {
    name: &'a str,
    description: &'a str,
    color: &'a str,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest<'a> {
    labels: [&'a str; 1],
}

impl From<GitHubLabel> for LabelDefinition {
    fn from(label: GitHubLabel) -> Self {
        Self {
            name: label.name,
            description: label.description.filter(|d| !d.trim().is_empty()),
            instructions: None,
        }
    }
}

impl From<GitHubPullFile> for FileChange {
    fn from(file: GitHubPullFile) -> Self {
        Self {
            path: file.filename,
            status: file.status,
            additions: file.additions,
            deletions: file.deletions,
            patch: file.patch,
        }
    }
}

/// GitHub API client scoped to one repository.
#[derive(Clone)]
pub struct GitHubClient {
    http_client: HttpClient,
    base_url: Url,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// Create a client for `owner/repo` authenticated with `token`.
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
    ) -> LabelerResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("ai-labeler/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            base_url: parse_base_url(GITHUB_API_URL)?,
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
        })
    }

    /// Point the client at a different API root (GitHub Enterprise).
    pub fn with_base_url(mut self, url: &str) -> LabelerResult<Self> {
        self.base_url = parse_base_url(url)?;
        Ok(self)
    }

    /// Build `{base}/repos/{owner}/{repo}/{segments...}` with each segment encoded.
    fn repo_url(&self, segments: &[&str]) -> LabelerResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| LabelerError::config("GitHub API URL cannot be a base"))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> LabelerResult<Response> {
        let mut request = self
            .http_client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(body) = body {
            request = request.json(&body);
        }

        Ok(request.send().await?)
    }

    /// Fetch every page of a list endpoint.
    async fn get_paginated<T>(&self, segments: &[&str], limit: usize) -> LabelerResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let mut items = Vec::new();
        let mut page = 1usize;

        loop {
            let mut url = self.repo_url(segments)?;
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let response = error_for_status(self.send(Method::GET, url, None).await?).await?;
            let batch: Vec<T> = response.json().await?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);

            if done || items.len() >= limit {
                break;
            }
            page += 1;
        }

        items.truncate(limit);
        Ok(items)
    }

    /// List every label defined on the repository.
    #[instrument(skip(self), fields(repo = %format!("{}/{}", self.owner, self.repo)))]
    pub async fn list_repo_labels(&self) -> LabelerResult<Vec<LabelDefinition>> {
        let labels: Vec<GitHubLabel> = self.get_paginated(&["labels"], usize::MAX).await?;
        debug!("Retrieved {} repository labels", labels.len());
        Ok(labels.into_iter().map(LabelDefinition::from).collect())
    }

    /// Fetch an issue or pull request, including changed files for pull requests.
    #[instrument(skip(self), fields(number = %number))]
    pub async fn fetch_entity(&self, number: u64) -> LabelerResult<TargetEntity> {
        let url = self.repo_url(&["issues", &number.to_string()])?;
        let response = error_for_status(self.send(Method::GET, url, None).await?).await?;
        let issue: GitHubIssue = response.json().await?;

        let kind = if issue.pull_request.is_some() {
            EntityKind::PullRequest
        } else {
            EntityKind::Issue
        };

        let files = if kind == EntityKind::PullRequest {
            let files: Vec<GitHubPullFile> = self
                .get_paginated(&["pulls", &number.to_string(), "files"], MAX_PR_FILES)
                .await?;
            files.into_iter().map(FileChange::from).collect()
        } else {
            Vec::new()
        };

        debug!(
            kind = %kind,
            labels = issue.labels.len(),
            files = files.len(),
            "Fetched entity"
        );

        Ok(TargetEntity {
            number: issue.number,
            kind,
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            author: issue.user.map(|u| u.login),
            current_labels: issue.labels.into_iter().map(|l| l.name).collect::<BTreeSet<_>>(),
            files,
        })
    }
}

#[async_trait]
impl RepositorySource for GitHubClient {
    async fn list_labels(&self) -> LabelerResult<Vec<LabelDefinition>> {
        self.list_repo_labels().await
    }

    async fn fetch_entity(&self, number: u64) -> LabelerResult<TargetEntity> {
        GitHubClient::fetch_entity(self, number).await
    }
}

#[async_trait]
impl LabelMutator for GitHubClient {
    #[instrument(skip(self, label), fields(label = %label.name))]
    async fn create_label(&self, label: &LabelDefinition) -> LabelerResult<()> {
        let url = self.repo_url(&["labels"])?;
        let body = serde_json::to_value(CreateLabelRequest {
            name: &label.name,
            description: repository_description(label),
            color: DEFAULT_LABEL_COLOR,
        })?;

        let response = self.send(Method::POST, url, Some(body)).await?;
        match error_for_status(response).await {
            Ok(_) => {
                info!("Created label '{}'", label.name);
                Ok(())
            }
            Err(LabelerError::GitHub { status: 422, message }) if message.contains("already_exists") => {
                debug!("Label '{}' already exists", label.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(number = %number, label = %label))]
    async fn add_label(&self, number: u64, label: &str) -> LabelerResult<()> {
        let url = self.repo_url(&["issues", &number.to_string(), "labels"])?;
        let body = serde_json::to_value(AddLabelsRequest { labels: [label] })?;

        error_for_status(self.send(Method::POST, url, Some(body)).await?).await?;
        info!("Added label '{}' to #{}", label, number);
        Ok(())
    }

    #[instrument(skip(self), fields(number = %number, label = %label))]
    async fn remove_label(&self, number: u64, label: &str) -> LabelerResult<()> {
        let url = self.repo_url(&["issues", &number.to_string(), "labels", label])?;
        let response = self.send(Method::DELETE, url, None).await?;

        if response.status() == StatusCode::NOT_FOUND {
            // Already gone, which is what we wanted
            debug!("Label '{}' not on #{} (already removed)", label, number);
            return Ok(());
        }

        error_for_status(response).await?;
        info!("Removed label '{}' from #{}", label, number);
        Ok(())
    }
}

/// Description stored on the repository label. The catalog keeps the full text.
fn repository_description(label: &LabelDefinition) -> &str {
    char_prefix(
        label.description.as_deref().unwrap_or_default(),
        MAX_LABEL_DESCRIPTION_CHARS,
    )
}

fn parse_base_url(url: &str) -> LabelerResult<Url> {
    Url::parse(url).map_err(|e| LabelerError::config(format!("invalid GitHub API URL '{url}': {e}")))
}

/// Turn a non-success response into a typed error.
async fn error_for_status(response: Response) -> LabelerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
        if let Some(reset_in) = rate_limit_reset(&response) {
            return Err(LabelerError::RateLimited { reset_in });
        }
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<GitHubError>(&body) {
        Ok(error) => {
            let codes: Vec<String> = error.errors.into_iter().filter_map(|e| e.code).collect();
            if codes.is_empty() {
                error.message
            } else {
                format!("{} ({})", error.message, codes.join(", "))
            }
        }
        Err(_) => body,
    };

    Err(LabelerError::GitHub {
        status: status.as_u16(),
        message,
    })
}

/// Time until the rate limit resets, when the response says it is exhausted.
fn rate_limit_reset(response: &Response) -> Option<Duration> {
    let headers = response.headers();
    let remaining = headers
        .get("x-ratelimit-remaining")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())?;
    if remaining > 0 {
        return None;
    }

    headers
        .get("x-ratelimit-reset")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .map(|reset_timestamp| {
            let now = chrono::Utc::now().timestamp();
            #[allow(clippy::cast_sign_loss)]
            let seconds_until_reset = (reset_timestamp - now).max(0) as u64;
            Duration::from_secs(seconds_until_reset)
        })
}
