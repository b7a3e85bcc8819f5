//! Access facade over the GitLab REST API v4
//!
//! [`GitlabClient`] exposes one method per supported operation. Every
//! method builds a [`Call`], runs it through the read or write
//! [`RetryPolicy`], and authenticates each attempt with fresh headers from
//! the [`AuthProvider`] so a refreshed OAuth token is picked up mid-retry.
//!
//! The client knows nothing about MCP tools or policy; it only speaks
//! GitLab.

pub mod models;
pub mod queries;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, HeaderMap, HeaderValue, RANGE};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use self::models::*;
use self::queries::*;
use super::auth::AuthProvider;
use super::errors::{GitlabError, GitlabResult};
use super::retry::{DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use super::streaming::{
    LogTail, artifact_destination, download_bounded, fill_head, read_tail, trim_to_char_boundary,
};

/// Default `User-Agent` sent with every request
pub fn default_user_agent() -> String {
    format!("gitlab-mcp/{}", env!("CARGO_PKG_VERSION"))
}

/// Settings the facade needs besides credentials
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL such as `https://gitlab.com`; `/api/v4` is appended
    pub host: String,
    pub user_agent: String,
    pub max_attempts: u32,
    /// Fallback for `trigger_pipeline` when no token is passed
    pub trigger_token: Option<String>,
    /// Root directory for downloaded artifacts
    pub artifact_dir: PathBuf,
}

impl ClientOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user_agent: default_user_agent(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            trigger_token: None,
            artifact_dir: std::env::temp_dir().join("gitlab-mcp-artifacts"),
        }
    }
}

/// Project to default branch, owned by one facade instance
#[derive(Debug, Clone, Default)]
pub struct DefaultBranchCache {
    inner: Arc<parking_lot::RwLock<HashMap<String, String>>>,
}

impl DefaultBranchCache {
    pub fn get(&self, project: &str) -> Option<String> {
        self.inner.read().get(project).cloned()
    }

    pub fn insert(&self, project: &str, branch: &str) {
        self.inner
            .write()
            .insert(project.to_string(), branch.to_string());
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
enum Body {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// One outbound request, replayable across retry attempts
#[derive(Debug, Clone)]
struct Call {
    method: Method,
    path: String,
    query: QueryPairs,
    body: Option<Body>,
    headers: HeaderMap,
}

impl Call {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: QueryPairs::new(),
            body: None,
            headers: HeaderMap::new(),
        }
    }

    fn get(path: String) -> Self {
        Self::new(Method::GET, path)
    }

    fn post(path: String) -> Self {
        Self::new(Method::POST, path)
    }

    fn put(path: String) -> Self {
        Self::new(Method::PUT, path)
    }

    fn query(mut self, query: QueryPairs) -> Self {
        self.query = query;
        self
    }

    fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(Body::Form(fields));
        self
    }

    fn header(mut self, name: reqwest::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// `/projects/<id>` with the id or path encoded as a single segment
fn project_path(project: &str) -> String {
    format!("/projects/{}", urlencoding::encode(project))
}

fn to_body<T: Serialize>(value: &T) -> GitlabResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| GitlabError::Decode(e.to_string()))
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> GitlabResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| GitlabError::Decode(format!("Unexpected GitLab response: {}", e)))
}

async fn ensure_success(response: reqwest::Response) -> GitlabResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GitlabError::api(status.as_u16(), &body))
}

fn decode_file_content(raw: &RawRepoFile) -> GitlabResult<Vec<u8>> {
    match raw.encoding.as_deref() {
        Some("base64") => {
            let compact: String = raw.content.split_whitespace().collect();
            STANDARD
                .decode(compact)
                .map_err(|e| GitlabError::Decode(format!("Invalid base64 file content: {}", e)))
        }
        _ => Ok(raw.content.clone().into_bytes()),
    }
}

/// GitLab access facade
#[derive(Debug, Clone)]
pub struct GitlabClient {
    http: reqwest::Client,
    api_base: String,
    auth: AuthProvider,
    reads: RetryPolicy,
    writes: RetryPolicy,
    default_branches: DefaultBranchCache,
    trigger_token: Option<String>,
    artifact_dir: PathBuf,
}

impl GitlabClient {
    pub fn new(options: ClientOptions, auth: AuthProvider) -> GitlabResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_http(options, auth, http))
    }

    /// Builds the facade around an existing HTTP client
    pub fn with_http(options: ClientOptions, auth: AuthProvider, http: reqwest::Client) -> Self {
        Self {
            http,
            api_base: format!("{}/api/v4", options.host.trim_end_matches('/')),
            auth,
            reads: RetryPolicy::reads(options.max_attempts),
            writes: RetryPolicy::writes(options.max_attempts),
            default_branches: DefaultBranchCache::default(),
            trigger_token: options.trigger_token,
            artifact_dir: options.artifact_dir,
        }
    }

    /// Replaces both retry policies
    pub fn with_retry_policies(mut self, reads: RetryPolicy, writes: RetryPolicy) -> Self {
        self.reads = reads;
        self.writes = writes;
        self
    }

    /// Copy sharing credentials and HTTP pool but with an empty branch cache
    pub fn with_fresh_cache(&self) -> Self {
        Self {
            default_branches: DefaultBranchCache::default(),
            ..self.clone()
        }
    }

    pub fn auth(&self) -> &AuthProvider {
        &self.auth
    }

    pub fn default_branches(&self) -> &DefaultBranchCache {
        &self.default_branches
    }

    /// Sends one attempt of `call` without looking at the status
    async fn dispatch(&self, call: &Call) -> GitlabResult<reqwest::Response> {
        let url = format!("{}{}", self.api_base, call.path);
        debug!(method = %call.method, path = %call.path, "GitLab request");

        let mut request = self
            .http
            .request(call.method.clone(), &url)
            .headers(self.auth.auth_headers().await?)
            .header(ACCEPT, "application/json")
            .headers(call.headers.clone());
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        request = match &call.body {
            Some(Body::Json(value)) => request.json(value),
            Some(Body::Form(fields)) => request.form(fields),
            None => request,
        };
        Ok(request.send().await?)
    }

    async fn send(&self, call: &Call) -> GitlabResult<reqwest::Response> {
        ensure_success(self.dispatch(call).await?).await
    }

    async fn read<T: DeserializeOwned>(&self, call: Call) -> GitlabResult<T> {
        let call = &call;
        self.reads
            .execute(move || async move { decode(self.send(call).await?).await })
            .await
    }

    async fn write<T: DeserializeOwned>(&self, call: Call) -> GitlabResult<T> {
        let call = &call;
        self.writes
            .execute(move || async move { decode(self.send(call).await?).await })
            .await
    }

    /// Write whose response body carries nothing worth decoding
    async fn write_discarding(&self, call: Call) -> GitlabResult<()> {
        let call = &call;
        self.writes
            .execute(move || async move { self.send(call).await.map(drop) })
            .await
    }

    async fn open_stream(&self, call: Call) -> GitlabResult<reqwest::Response> {
        let call = &call;
        self.reads
            .execute(move || async move { self.send(call).await })
            .await
    }

    pub async fn current_user(&self) -> GitlabResult<CurrentUser> {
        self.read(Call::get("/user".to_string())).await
    }

    pub async fn list_projects(&self, query: &ProjectQuery) -> GitlabResult<Vec<Project>> {
        self.read(Call::get("/projects".to_string()).query(query.to_pairs()))
            .await
    }

    pub async fn get_project(&self, project: &str) -> GitlabResult<Project> {
        self.read(Call::get(project_path(project))).await
    }

    pub async fn list_branches(&self, query: &ListQuery) -> GitlabResult<Vec<Branch>> {
        let path = format!("{}/repository/branches", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs())).await
    }

    pub async fn list_tags(&self, query: &ListQuery) -> GitlabResult<Vec<Tag>> {
        let path = format!("{}/repository/tags", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs())).await
    }

    pub async fn list_project_labels(&self, query: &ListQuery) -> GitlabResult<Vec<Label>> {
        let path = format!("{}/labels", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs())).await
    }

    /// Default branch of `project`, fetched once per facade instance
    pub async fn default_branch(&self, project: &str) -> GitlabResult<String> {
        if let Some(branch) = self.default_branches.get(project) {
            return Ok(branch);
        }
        let branch = self.get_project(project).await?.default_branch.ok_or_else(|| {
            GitlabError::Decode(format!(
                "Could not determine default branch for project '{}'.",
                project
            ))
        })?;
        self.default_branches.insert(project, &branch);
        Ok(branch)
    }

    async fn resolve_ref(&self, project: &str, git_ref: Option<&str>) -> GitlabResult<String> {
        match git_ref.filter(|r| !r.is_empty()) {
            Some(r) => Ok(r.to_string()),
            None => self.default_branch(project).await,
        }
    }

    pub async fn search_issues(&self, query: &IssueQuery) -> GitlabResult<Vec<IssueSummary>> {
        let path = format!("{}/issues", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs())).await
    }

    pub async fn get_issue(&self, project: &str, issue_iid: u64) -> GitlabResult<Issue> {
        let path = format!("{}/issues/{}", project_path(project), issue_iid);
        self.read(Call::get(path)).await
    }

    pub async fn list_issue_notes(
        &self,
        project: &str,
        issue_iid: u64,
        page: Page,
    ) -> GitlabResult<Vec<Note>> {
        let path = format!("{}/issues/{}/notes", project_path(project), issue_iid);
        self.read(Call::get(path).query(page.to_pairs())).await
    }

    pub async fn list_merge_requests(
        &self,
        query: &MergeRequestQuery,
    ) -> GitlabResult<Vec<MergeRequestSummary>> {
        let path = format!("{}/merge_requests", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs())).await
    }

    pub async fn get_merge_request(&self, project: &str, mr_iid: u64) -> GitlabResult<MergeRequest> {
        let path = format!("{}/merge_requests/{}", project_path(project), mr_iid);
        self.read(Call::get(path)).await
    }

    pub async fn list_merge_request_notes(
        &self,
        project: &str,
        mr_iid: u64,
        page: Page,
    ) -> GitlabResult<Vec<Note>> {
        let path = format!("{}/merge_requests/{}/notes", project_path(project), mr_iid);
        self.read(Call::get(path).query(page.to_pairs())).await
    }

    pub async fn list_merge_request_discussions(
        &self,
        project: &str,
        mr_iid: u64,
        page: Page,
    ) -> GitlabResult<Vec<Discussion>> {
        let path = format!("{}/merge_requests/{}/discussions", project_path(project), mr_iid);
        self.read(Call::get(path).query(page.to_pairs())).await
    }

    pub async fn get_merge_request_changes(
        &self,
        project: &str,
        mr_iid: u64,
    ) -> GitlabResult<MergeRequestChanges> {
        let path = format!("{}/merge_requests/{}/changes", project_path(project), mr_iid);
        self.read(Call::get(path)).await
    }

    /// Reads a file at `git_ref`, or at the default branch when none is given
    pub async fn get_file(
        &self,
        project: &str,
        file_path: &str,
        git_ref: Option<&str>,
    ) -> GitlabResult<RepoFile> {
        let git_ref = self.resolve_ref(project, git_ref).await?;
        let path = format!(
            "{}/repository/files/{}",
            project_path(project),
            urlencoding::encode(file_path)
        );
        let raw: RawRepoFile = self
            .read(Call::get(path).query(vec![("ref", git_ref.clone())]))
            .await?;
        let bytes = decode_file_content(&raw)?;
        Ok(RepoFile {
            file_path: raw.file_path.unwrap_or_else(|| file_path.to_string()),
            git_ref,
            size_bytes: bytes.len(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    pub async fn list_repo_tree(&self, query: &TreeQuery) -> GitlabResult<Vec<TreeEntry>> {
        let git_ref = self
            .resolve_ref(&query.project, query.git_ref.as_deref())
            .await?;
        let path = format!("{}/repository/tree", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs(&git_ref)))
            .await
    }

    pub async fn search_code(&self, query: &CodeSearchQuery) -> GitlabResult<Vec<CodeSearchMatch>> {
        let path = format!("{}/search", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs())).await
    }

    pub async fn list_pipelines(&self, query: &PipelineQuery) -> GitlabResult<Vec<PipelineSummary>> {
        let path = format!("{}/pipelines", project_path(&query.project));
        self.read(Call::get(path).query(query.to_pairs())).await
    }

    pub async fn get_pipeline(&self, project: &str, pipeline_id: u64) -> GitlabResult<Pipeline> {
        let path = format!("{}/pipelines/{}", project_path(project), pipeline_id);
        self.read(Call::get(path)).await
    }

    /// First page of up to 100 jobs of a pipeline
    pub async fn list_pipeline_jobs(&self, project: &str, pipeline_id: u64) -> GitlabResult<Vec<Job>> {
        let path = format!("{}/pipelines/{}/jobs", project_path(project), pipeline_id);
        let query = vec![("per_page", "100".to_string()), ("page", "1".to_string())];
        self.read(Call::get(path).query(query)).await
    }

    fn trace_path(project: &str, job_id: u64) -> String {
        format!("{}/jobs/{}/trace", project_path(project), job_id)
    }

    /// Head of a job log; at most `max_bytes` are kept in memory
    pub async fn get_job_log(
        &self,
        project: &str,
        job_id: u64,
        max_bytes: usize,
    ) -> GitlabResult<JobLog> {
        let response = self
            .open_stream(Call::get(Self::trace_path(project, job_id)))
            .await?;
        let (head, bytes_total) = fill_head(response.bytes_stream(), max_bytes).await?;
        let truncated = bytes_total > head.len() as u64;
        let kept = if truncated { trim_to_char_boundary(&head) } else { &head[..] };
        Ok(JobLog {
            truncated,
            text: String::from_utf8_lossy(kept).into_owned(),
            bytes_total,
        })
    }

    /// Last `max_bytes` of a job log via `Range: bytes=-K`
    ///
    /// A `416` means the log is empty.
    pub async fn get_job_log_tail(
        &self,
        project: &str,
        job_id: u64,
        max_bytes: usize,
    ) -> GitlabResult<LogTail> {
        let range = HeaderValue::from_str(&format!("bytes=-{}", max_bytes))
            .map_err(|e| GitlabError::InvalidArgument(e.to_string()))?;
        let call = Call::get(Self::trace_path(project, job_id)).header(RANGE, range);
        let call = &call;

        let response = self
            .reads
            .execute(move || async move {
                let response = self.dispatch(call).await?;
                if response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
                    return Ok(None);
                }
                ensure_success(response).await.map(Some)
            })
            .await?;

        match response {
            Some(response) => read_tail(response, max_bytes).await,
            None => Ok(LogTail::empty()),
        }
    }

    /// Job record including `artifacts_file` and `artifacts`
    pub async fn get_job_artifacts(&self, project: &str, job_id: u64) -> GitlabResult<JobArtifacts> {
        let path = format!("{}/jobs/{}", project_path(project), job_id);
        self.read(Call::get(path)).await
    }

    /// Downloads the artifacts archive of a job, bounded by `max_bytes`
    ///
    /// The declared size is checked before the archive is requested; the
    /// stream itself is cut off as soon as it passes the limit.
    pub async fn download_job_artifacts(
        &self,
        project: &str,
        job_id: u64,
        max_bytes: u64,
    ) -> GitlabResult<DownloadedArtifacts> {
        let metadata = self.get_job_artifacts(project, job_id).await?;
        let archive = metadata.artifacts_file.ok_or_else(|| GitlabError::Api {
            status: 404,
            message: format!("Job {} has no artifacts archive.", job_id),
        })?;
        if let Some(declared) = archive.size.filter(|size| *size > max_bytes) {
            return Err(GitlabError::ArtifactTooLarge {
                declared,
                limit: max_bytes,
            });
        }

        let path = format!("{}/jobs/{}/artifacts", project_path(project), job_id);
        let response = self.open_stream(Call::get(path)).await?;
        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(declared) = declared.filter(|len| *len > max_bytes) {
            return Err(GitlabError::ArtifactTooLarge {
                declared,
                limit: max_bytes,
            });
        }

        let dest = artifact_destination(&self.artifact_dir, project, job_id, &archive.filename);
        let downloaded_bytes = download_bounded(response.bytes_stream(), &dest, max_bytes).await?;
        info!(job_id, downloaded_bytes, path = %dest.display(), "Downloaded job artifacts");

        Ok(DownloadedArtifacts {
            job_id,
            filename: archive.filename,
            downloaded_bytes,
            local_path: dest.display().to_string(),
        })
    }

    pub async fn create_issue(&self, project: &str, issue: &NewIssue) -> GitlabResult<Issue> {
        let path = format!("{}/issues", project_path(project));
        self.write(Call::post(path).json(to_body(issue)?)).await
    }

    pub async fn add_issue_note(&self, project: &str, issue_iid: u64, body: &str) -> GitlabResult<Note> {
        let path = format!("{}/issues/{}/notes", project_path(project), issue_iid);
        self.write(Call::post(path).json(json!({ "body": body })))
            .await
    }

    pub async fn update_issue(
        &self,
        project: &str,
        issue_iid: u64,
        update: &IssueUpdate,
    ) -> GitlabResult<Issue> {
        let path = format!("{}/issues/{}", project_path(project), issue_iid);
        self.write(Call::put(path).json(to_body(update)?)).await
    }

    pub async fn update_merge_request(
        &self,
        project: &str,
        mr_iid: u64,
        update: &MergeRequestUpdate,
    ) -> GitlabResult<MergeRequest> {
        let path = format!("{}/merge_requests/{}", project_path(project), mr_iid);
        self.write(Call::put(path).json(to_body(update)?)).await
    }

    pub async fn add_merge_request_note(
        &self,
        project: &str,
        mr_iid: u64,
        body: &str,
    ) -> GitlabResult<Note> {
        let path = format!("{}/merge_requests/{}/notes", project_path(project), mr_iid);
        self.write(Call::post(path).json(json!({ "body": body })))
            .await
    }

    /// Starts a thread, inline on the diff when `position` is given
    pub async fn create_merge_request_discussion(
        &self,
        project: &str,
        mr_iid: u64,
        body: &str,
        position: Option<&DiffPosition>,
    ) -> GitlabResult<Discussion> {
        let path = format!("{}/merge_requests/{}/discussions", project_path(project), mr_iid);
        let mut payload = json!({ "body": body });
        if let Some(position) = position {
            let mut position = to_body(position)?;
            position["position_type"] = json!("text");
            payload["position"] = position;
        }
        self.write(Call::post(path).json(payload)).await
    }

    pub async fn add_merge_request_discussion_note(
        &self,
        project: &str,
        mr_iid: u64,
        discussion_id: &str,
        body: &str,
    ) -> GitlabResult<Note> {
        let path = format!(
            "{}/merge_requests/{}/discussions/{}/notes",
            project_path(project),
            mr_iid,
            urlencoding::encode(discussion_id)
        );
        self.write(Call::post(path).json(json!({ "body": body })))
            .await
    }

    pub async fn update_merge_request_discussion_note(
        &self,
        project: &str,
        mr_iid: u64,
        discussion_id: &str,
        note_id: u64,
        update: &NoteUpdate,
    ) -> GitlabResult<Note> {
        let path = format!(
            "{}/merge_requests/{}/discussions/{}/notes/{}",
            project_path(project),
            mr_iid,
            urlencoding::encode(discussion_id),
            note_id
        );
        self.write(Call::put(path).json(to_body(update)?)).await
    }

    /// Approves as the authenticated user, optionally pinned to the head `sha`
    pub async fn approve_merge_request(
        &self,
        project: &str,
        mr_iid: u64,
        sha: Option<&str>,
    ) -> GitlabResult<MergeRequestApprovals> {
        let path = format!("{}/merge_requests/{}/approve", project_path(project), mr_iid);
        let call = match sha {
            Some(sha) => Call::post(path).json(json!({ "sha": sha })),
            None => Call::post(path),
        };
        self.write(call).await
    }

    pub async fn unapprove_merge_request(
        &self,
        project: &str,
        mr_iid: u64,
    ) -> GitlabResult<ApprovalWithdrawn> {
        let path = format!("{}/merge_requests/{}/unapprove", project_path(project), mr_iid);
        self.write_discarding(Call::post(path)).await?;
        Ok(ApprovalWithdrawn {
            iid: mr_iid,
            unapproved: true,
        })
    }

    pub async fn merge_merge_request(
        &self,
        project: &str,
        mr_iid: u64,
        options: &MergeOptions,
    ) -> GitlabResult<MergeRequest> {
        let path = format!("{}/merge_requests/{}/merge", project_path(project), mr_iid);
        self.write(Call::put(path).json(to_body(options)?)).await
    }

    pub async fn create_commit(&self, project: &str, commit: &NewCommit) -> GitlabResult<Commit> {
        let path = format!("{}/repository/commits", project_path(project));
        self.write(Call::post(path).json(to_body(commit)?)).await
    }

    /// Creates `branch` from `git_ref`, or from the default branch
    pub async fn create_branch(
        &self,
        project: &str,
        branch: &str,
        git_ref: Option<&str>,
    ) -> GitlabResult<CreatedBranch> {
        let git_ref = self.resolve_ref(project, git_ref).await?;
        let path = format!("{}/repository/branches", project_path(project));
        let raw: RawBranch = self
            .write(Call::post(path).json(json!({ "branch": branch, "ref": git_ref })))
            .await?;
        Ok(raw.into())
    }

    /// Opens a merge request; an empty target means the default branch
    pub async fn create_merge_request(
        &self,
        project: &str,
        request: &NewMergeRequest,
    ) -> GitlabResult<MergeRequest> {
        let target = self
            .resolve_ref(project, request.target_branch.as_deref())
            .await?;
        let request = NewMergeRequest {
            target_branch: Some(target),
            ..request.clone()
        };
        let path = format!("{}/merge_requests", project_path(project));
        self.write(Call::post(path).json(to_body(&request)?)).await
    }

    pub async fn retry_job(&self, project: &str, job_id: u64) -> GitlabResult<Job> {
        let path = format!("{}/jobs/{}/retry", project_path(project), job_id);
        self.write(Call::post(path)).await
    }

    pub async fn cancel_job(&self, project: &str, job_id: u64) -> GitlabResult<Job> {
        let path = format!("{}/jobs/{}/cancel", project_path(project), job_id);
        self.write(Call::post(path)).await
    }

    /// Starts a manual job
    pub async fn play_job(&self, project: &str, job_id: u64) -> GitlabResult<Job> {
        let path = format!("{}/jobs/{}/play", project_path(project), job_id);
        self.write(Call::post(path)).await
    }

    /// Retries the failed and canceled jobs of a pipeline
    pub async fn retry_pipeline(&self, project: &str, pipeline_id: u64) -> GitlabResult<Pipeline> {
        let path = format!("{}/pipelines/{}/retry", project_path(project), pipeline_id);
        self.write(Call::post(path)).await
    }

    pub async fn cancel_pipeline(&self, project: &str, pipeline_id: u64) -> GitlabResult<Pipeline> {
        let path = format!("{}/pipelines/{}/cancel", project_path(project), pipeline_id);
        self.write(Call::post(path)).await
    }

    /// Triggers a pipeline with a trigger token
    ///
    /// `token` falls back to the configured trigger token; without either
    /// the call fails before anything is sent.
    pub async fn trigger_pipeline(
        &self,
        project: &str,
        git_ref: &str,
        token: Option<&str>,
        variables: &[PipelineVariable],
    ) -> GitlabResult<Pipeline> {
        let token = token
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| self.trigger_token.clone())
            .ok_or(GitlabError::MissingTriggerToken)?;

        let mut fields = vec![
            ("token".to_string(), token),
            ("ref".to_string(), git_ref.to_string()),
        ];
        fields.extend(
            variables
                .iter()
                .map(|v| (format!("variables[{}]", v.key), v.value.clone())),
        );

        let path = format!("{}/trigger/pipeline", project_path(project));
        self.write(Call::post(path).form(fields)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_paths_are_single_segments() {
        assert_eq!(project_path("group/sub/project"), "/projects/group%2Fsub%2Fproject");
        assert_eq!(project_path("42"), "/projects/42");
    }

    #[test]
    fn base64_content_is_decoded() {
        let raw = RawRepoFile {
            file_path: Some("README.md".into()),
            content: "aGVs\nbG8=".into(),
            encoding: Some("base64".into()),
        };
        assert_eq!(decode_file_content(&raw).unwrap(), b"hello");

        let plain = RawRepoFile {
            file_path: None,
            content: "text".into(),
            encoding: Some("text".into()),
        };
        assert_eq!(decode_file_content(&plain).unwrap(), b"text");
    }

    #[test]
    fn branch_cache_is_per_instance() {
        let options = ClientOptions::new("https://gitlab.example/");
        let client = GitlabClient::with_http(
            options,
            AuthProvider::personal_access_token("t"),
            reqwest::Client::new(),
        );
        client.default_branches().insert("g/p", "main");
        assert_eq!(client.api_base, "https://gitlab.example/api/v4");

        let forked = client.with_fresh_cache();
        assert!(forked.default_branches().is_empty());
        assert_eq!(client.default_branches().get("g/p").as_deref(), Some("main"));
    }
}
