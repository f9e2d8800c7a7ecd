//! forge::github
//!
//! GitHub forge implementation using the REST API.
//!
//! # Design
//!
//! Every primitive maps to one REST call:
//!
//! | Operation | Endpoint |
//! |---|---|
//! | `get_branch` | `GET git/ref/heads/{branch}` |
//! | `create_branch` | `POST git/refs` |
//! | `delete_branch` | `DELETE git/refs/heads/{branch}` |
//! | `update_branch` | `PATCH git/refs/heads/{branch}` (`force: false`) |
//! | `download_archive` | `GET zipball/{ref}` |
//! | `create_blob` / `create_tree` / `create_commit` | `POST git/{blobs,trees,commits}` |
//! | `get_commit` | `GET commits/{ref}` |
//! | `compare_commits` | `GET compare/{base}...{head}` |
//! | pull requests | `pulls`, `pulls/{n}`, `pulls/{n}/merge` |
//!
//! # Authentication
//!
//! A [`TokenProvider`] is asked for a bearer token on every request, so
//! rotated tokens are picked up without rebuilding the forge.
//!
//! # Rate Limiting
//!
//! Returns `ForgeError::RateLimited` when limits are hit. No automatic retry.
//!
//! # Example
//!
//! ```ignore
//! use releasegate::auth::EnvTokenProvider;
//! use releasegate::forge::github::GitHubForge;
//! use std::sync::Arc;
//!
//! let forge = GitHubForge::new(Arc::new(EnvTokenProvider::new("GITHUB_TOKEN")));
//! let repo = RepoSlug::new("acme", "deployments")?;
//! let info = forge.get_repository(&repo).await?;
//! println!("default branch: {}", info.default_branch);
//! ```
//!
//! [`TokenProvider`]: crate::auth::TokenProvider

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::traits::{
    Branch, CompareStatus, CreatePrRequest, Forge, ForgeError, GitCommit, MergeMethod, NewCommit,
    PrState, PullRequest, Repository, ResolvedCommit, Signature, TreeContent, TreeEntry,
    UpdatePrRequest, FILE_MODE,
};
use crate::auth::TokenProvider;
use crate::core::types::{BranchName, Oid, RepoSlug};

/// Default GitHub API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = concat!("releasegate/", env!("CARGO_PKG_VERSION"));

/// Media type for JSON responses.
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Media type for unified diffs.
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";

/// GitHub forge implementation.
pub struct GitHubForge {
    /// HTTP client for making requests
    client: Client,
    /// Token source, consulted per request
    token_provider: Arc<dyn TokenProvider>,
    /// API base URL (configurable for GitHub Enterprise)
    api_base: String,
}

impl std::fmt::Debug for GitHubForge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubForge")
            .field("host", &self.token_provider.host())
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl GitHubForge {
    /// Create a forge against the public GitHub API.
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self::with_api_base(provider, DEFAULT_API_BASE)
    }

    /// Create a forge with a custom API base URL.
    ///
    /// Use this for GitHub Enterprise (e.g., `https://github.example.com/api/v3`).
    pub fn with_api_base(provider: Arc<dyn TokenProvider>, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token_provider: provider,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the current bearer token.
    async fn get_bearer_token(&self) -> Result<String, ForgeError> {
        self.token_provider
            .bearer_token()
            .await
            .map_err(|e| ForgeError::AuthFailed(e.to_string()))
    }

    /// Build common headers for API requests.
    async fn headers(&self, accept: &'static str) -> Result<HeaderMap, ForgeError> {
        let token = self.get_bearer_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ForgeError::AuthFailed("token is not a valid header value".into()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    /// Build URL for a repository endpoint.
    fn repo_url(&self, repo: &RepoSlug, path: &str) -> String {
        let base = format!("{}/repos/{}/{}", self.api_base, repo.owner(), repo.name());
        if path.is_empty() {
            base
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Send a request with JSON headers.
    async fn send(&self, request: RequestBuilder) -> Result<Response, ForgeError> {
        self.send_accepting(request, JSON_MEDIA_TYPE).await
    }

    async fn send_accepting(
        &self,
        request: RequestBuilder,
        accept: &'static str,
    ) -> Result<Response, ForgeError> {
        request
            .headers(self.headers(accept).await?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, ForgeError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle a response whose body is not needed.
    async fn handle_empty_response(&self, response: Response) -> Result<(), ForgeError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            self.handle_error_response(response, status).await
        }
    }

    /// Handle an error response from the API.
    async fn handle_error_response<T>(
        &self,
        response: Response,
        status: StatusCode,
    ) -> Result<T, ForgeError> {
        // GitHub Apps use X-Accepted-GitHub-Permissions to name what was missing
        let required_permissions = response
            .headers()
            .get("X-Accepted-GitHub-Permissions")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let rate_limit_exhausted = response
            .headers()
            .get("X-RateLimit-Remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0");

        let message = match response.json::<GitHubErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        Err(match status {
            StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
            StatusCode::FORBIDDEN if rate_limit_exhausted => ForgeError::RateLimited,
            StatusCode::FORBIDDEN => {
                let mut err_msg = format!("Permission denied: {}", message);
                if let Some(perms) = required_permissions.filter(|p| !p.is_empty()) {
                    err_msg.push_str(&format!(" [required: {}]", perms));
                }
                ForgeError::AuthFailed(err_msg)
            }
            StatusCode::NOT_FOUND => ForgeError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
            _ if status.is_server_error() => ForgeError::ApiError {
                status: status.as_u16(),
                message: format!("GitHub server error: {}", message),
            },
            _ => ForgeError::ApiError {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl Forge for GitHubForge {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn get_repository(&self, repo: &RepoSlug) -> Result<Repository, ForgeError> {
        let url = self.repo_url(repo, "");
        let response = self.send(self.client.get(&url)).await?;
        let info: GitHubRepository = self.handle_response(response).await?;
        info.try_into()
    }

    async fn get_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
    ) -> Result<Branch, ForgeError> {
        let url = self.repo_url(repo, &format!("git/ref/heads/{}", branch));
        let response = self.send(self.client.get(&url)).await?;
        let reference: GitHubRef = self.handle_response(response).await?;
        reference.try_into()
    }

    async fn create_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<Branch, ForgeError> {
        let url = self.repo_url(repo, "git/refs");
        let body = CreateRefBody {
            reference: format!("refs/heads/{}", branch),
            sha: sha.as_str(),
        };
        let response = self.send(self.client.post(&url).json(&body)).await?;
        let reference: GitHubRef = self.handle_response(response).await?;
        reference.try_into()
    }

    async fn delete_branch(&self, repo: &RepoSlug, branch: &BranchName) -> Result<(), ForgeError> {
        let url = self.repo_url(repo, &format!("git/refs/heads/{}", branch));
        let response = self.send(self.client.delete(&url)).await?;

        // GitHub answers 422 "Reference does not exist" for a missing branch
        match self.handle_empty_response(response).await {
            Err(ForgeError::ApiError { status: 422, message })
                if message.contains("Reference does not exist") =>
            {
                Err(ForgeError::NotFound(message))
            }
            other => other,
        }
    }

    async fn update_branch(
        &self,
        repo: &RepoSlug,
        branch: &BranchName,
        sha: &Oid,
    ) -> Result<Branch, ForgeError> {
        let url = self.repo_url(repo, &format!("git/refs/heads/{}", branch));
        let body = UpdateRefBody {
            sha: sha.as_str(),
            force: false,
        };
        let response = self.send(self.client.patch(&url).json(&body)).await?;
        let reference: GitHubRef = self.handle_response(response).await?;
        reference.try_into()
    }

    async fn download_archive(
        &self,
        repo: &RepoSlug,
        reference: &str,
    ) -> Result<Vec<u8>, ForgeError> {
        let url = self.repo_url(repo, &format!("zipball/{}", reference));
        let response = self.send(self.client.get(&url)).await?;
        let status = response.status();
        if !status.is_success() {
            return self.handle_error_response(response, status).await;
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn create_blob(&self, repo: &RepoSlug, content: &[u8]) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, "git/blobs");
        let body = CreateBlobBody {
            content: base64::engine::general_purpose::STANDARD.encode(content),
            encoding: "base64",
        };
        let response = self.send(self.client.post(&url).json(&body)).await?;
        let created: ShaResponse = self.handle_response(response).await?;
        parse_oid(&created.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoSlug,
        base_tree: &Oid,
        entries: &[TreeEntry],
    ) -> Result<Oid, ForgeError> {
        let url = self.repo_url(repo, "git/trees");
        let body = CreateTreeBody {
            base_tree: base_tree.as_str(),
            tree: entries.iter().map(TreeEntryBody::from).collect(),
        };
        let response = self.send(self.client.post(&url).json(&body)).await?;
        let created: ShaResponse = self.handle_response(response).await?;
        parse_oid(&created.sha)
    }

    async fn get_git_commit(&self, repo: &RepoSlug, sha: &Oid) -> Result<GitCommit, ForgeError> {
        let url = self.repo_url(repo, &format!("git/commits/{}", sha));
        let response = self.send(self.client.get(&url)).await?;
        let commit: GitHubGitCommit = self.handle_response(response).await?;
        commit.try_into()
    }

    async fn create_commit(
        &self,
        repo: &RepoSlug,
        commit: &NewCommit,
    ) -> Result<GitCommit, ForgeError> {
        let url = self.repo_url(repo, "git/commits");
        let body = CreateCommitBody {
            message: &commit.message,
            tree: commit.tree.as_str(),
            parents: commit.parents.iter().map(Oid::as_str).collect(),
            author: SignatureBody::from(&commit.author),
            committer: SignatureBody::from(&commit.committer),
        };
        let response = self.send(self.client.post(&url).json(&body)).await?;
        let created: GitHubGitCommit = self.handle_response(response).await?;
        created.try_into()
    }

    async fn get_commit(
        &self,
        repo: &RepoSlug,
        reference: &str,
    ) -> Result<ResolvedCommit, ForgeError> {
        let url = self.repo_url(repo, &format!("commits/{}", reference));
        let response = self.send(self.client.get(&url)).await?;
        let commit: GitHubCommit = self.handle_response(response).await?;
        Ok(ResolvedCommit {
            sha: parse_oid(&commit.sha)?,
            url: commit.html_url,
        })
    }

    async fn compare_commits(
        &self,
        repo: &RepoSlug,
        base: &str,
        head: &str,
    ) -> Result<CompareStatus, ForgeError> {
        let url = self.repo_url(repo, &format!("compare/{}...{}", base, head));
        let response = self.send(self.client.get(&url)).await?;
        let comparison: GitHubComparison = self.handle_response(response).await?;
        CompareStatus::parse(&comparison.status).ok_or_else(|| {
            ForgeError::InvalidResponse(format!("unknown compare status '{}'", comparison.status))
        })
    }

    async fn create_pr(
        &self,
        repo: &RepoSlug,
        request: CreatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        let url = self.repo_url(repo, "pulls");
        let body = CreatePrBody {
            head: &request.head,
            base: &request.base,
            title: &request.title,
            body: request.body.as_deref(),
        };
        let response = self.send(self.client.post(&url).json(&body)).await?;
        let pr: GitHubPullRequest = self.handle_response(response).await?;
        Ok(pr.into())
    }

    async fn get_pr(&self, repo: &RepoSlug, number: u64) -> Result<PullRequest, ForgeError> {
        let url = self.repo_url(repo, &format!("pulls/{}", number));
        let response = self.send(self.client.get(&url)).await?;
        let pr: GitHubPullRequest = self.handle_response(response).await?;
        Ok(pr.into())
    }

    async fn merge_pr(
        &self,
        repo: &RepoSlug,
        number: u64,
        method: MergeMethod,
    ) -> Result<(), ForgeError> {
        let url = self.repo_url(repo, &format!("pulls/{}/merge", number));
        let body = MergePrBody {
            merge_method: method.to_string(),
        };
        let response = self.send(self.client.put(&url).json(&body)).await?;
        let result: GitHubMergeResponse = self.handle_response(response).await?;
        if result.merged {
            Ok(())
        } else {
            Err(ForgeError::ApiError {
                status: 405,
                message: result.message,
            })
        }
    }

    async fn update_pr(
        &self,
        repo: &RepoSlug,
        request: UpdatePrRequest,
    ) -> Result<PullRequest, ForgeError> {
        let url = self.repo_url(repo, &format!("pulls/{}", request.number));
        let body = UpdatePrBody {
            title: request.title.as_deref(),
            body: request.body.as_deref(),
            state: request.state.map(|s| s.to_string()),
        };
        let response = self.send(self.client.patch(&url).json(&body)).await?;
        let pr: GitHubPullRequest = self.handle_response(response).await?;
        Ok(pr.into())
    }

    async fn get_pr_diff(&self, repo: &RepoSlug, number: u64) -> Result<String, ForgeError> {
        let url = self.repo_url(repo, &format!("pulls/{}", number));
        let response = self
            .send_accepting(self.client.get(&url), DIFF_MEDIA_TYPE)
            .await?;
        let status = response.status();
        if !status.is_success() {
            return self.handle_error_response(response, status).await;
        }
        response
            .text()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))
    }
}

fn parse_oid(sha: &str) -> Result<Oid, ForgeError> {
    Oid::new(sha).map_err(|e| ForgeError::InvalidResponse(e.to_string()))
}

fn parse_branch(name: &str) -> Result<BranchName, ForgeError> {
    BranchName::new(name).map_err(|e| ForgeError::InvalidResponse(e.to_string()))
}

// --------------------------------------------------------------------------
// API Request/Response Types
// --------------------------------------------------------------------------

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubRepository {
    default_branch: String,
    html_url: String,
}

impl TryFrom<GitHubRepository> for Repository {
    type Error = ForgeError;

    fn try_from(repo: GitHubRepository) -> Result<Self, Self::Error> {
        Ok(Repository {
            default_branch: parse_branch(&repo.default_branch)?,
            url: repo.html_url,
        })
    }
}

#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
    object: GitHubObject,
}

#[derive(Deserialize)]
struct GitHubObject {
    sha: String,
}

impl TryFrom<GitHubRef> for Branch {
    type Error = ForgeError;

    fn try_from(reference: GitHubRef) -> Result<Self, Self::Error> {
        let name = reference
            .ref_name
            .strip_prefix("refs/heads/")
            .unwrap_or(&reference.ref_name);
        Ok(Branch {
            name: parse_branch(name)?,
            sha: parse_oid(&reference.object.sha)?,
        })
    }
}

#[derive(Serialize)]
struct CreateRefBody<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRefBody<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct CreateBlobBody {
    content: String,
    encoding: &'static str,
}

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Serialize)]
struct CreateTreeBody<'a> {
    base_tree: &'a str,
    tree: Vec<TreeEntryBody<'a>>,
}

/// A tree entry carries either inline `content` or a `sha`; a `null` sha
/// deletes the path.
#[derive(Serialize)]
struct TreeEntryBody<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<Option<&'a str>>,
}

impl<'a> From<&'a TreeEntry> for TreeEntryBody<'a> {
    fn from(entry: &'a TreeEntry) -> Self {
        let (content, sha) = match &entry.content {
            TreeContent::Inline(text) => (Some(text.as_str()), None),
            TreeContent::Blob(oid) => (None, Some(Some(oid.as_str()))),
            TreeContent::Delete => (None, Some(None)),
        };
        TreeEntryBody {
            path: &entry.path,
            mode: FILE_MODE,
            kind: "blob",
            content,
            sha,
        }
    }
}

#[derive(Deserialize)]
struct GitHubGitCommit {
    sha: String,
    tree: GitHubObject,
}

impl TryFrom<GitHubGitCommit> for GitCommit {
    type Error = ForgeError;

    fn try_from(commit: GitHubGitCommit) -> Result<Self, Self::Error> {
        Ok(GitCommit {
            sha: parse_oid(&commit.sha)?,
            tree: parse_oid(&commit.tree.sha)?,
        })
    }
}

#[derive(Serialize)]
struct SignatureBody<'a> {
    name: &'a str,
    email: &'a str,
    date: String,
}

impl<'a> From<&'a Signature> for SignatureBody<'a> {
    fn from(sig: &'a Signature) -> Self {
        SignatureBody {
            name: &sig.identity.name,
            email: &sig.identity.email,
            date: sig.date.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct CreateCommitBody<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
    author: SignatureBody<'a>,
    committer: SignatureBody<'a>,
}

#[derive(Deserialize)]
struct GitHubCommit {
    sha: String,
    html_url: String,
}

#[derive(Deserialize)]
struct GitHubComparison {
    status: String,
}

/// Request body for creating a PR.
#[derive(Serialize)]
struct CreatePrBody<'a> {
    head: &'a str,
    base: &'a str,
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

/// Request body for updating a PR.
#[derive(Serialize)]
struct UpdatePrBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<String>,
}

/// Request body for merging a PR.
#[derive(Serialize)]
struct MergePrBody {
    merge_method: String,
}

#[derive(Deserialize)]
struct GitHubMergeResponse {
    merged: bool,
    #[serde(default)]
    message: String,
}

/// GitHub PR response format.
#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    html_url: String,
    state: String,
    head: GitHubPrRef,
    base: GitHubPrRef,
    title: String,
    body: Option<String>,
    merged: Option<bool>,
    merged_at: Option<String>,
}

/// GitHub ref (head/base) format.
#[derive(Deserialize)]
struct GitHubPrRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

impl From<GitHubPullRequest> for PullRequest {
    fn from(pr: GitHubPullRequest) -> Self {
        // `merged` is absent from list payloads; `merged_at` is always present
        let state = if pr.merged.unwrap_or(false) || pr.merged_at.is_some() {
            PrState::Merged
        } else if pr.state == "closed" {
            PrState::Closed
        } else {
            PrState::Open
        };

        PullRequest {
            number: pr.number,
            url: pr.html_url,
            state,
            head: pr.head.ref_name,
            base: pr.base.ref_name,
            title: pr.title,
            body: pr.body,
        }
    }
}
