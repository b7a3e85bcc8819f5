//! Normalized GitLab API records
//!
//! GitLab responses carry far more fields than a tool caller needs. These
//! structs deserialize straight from the API (unknown fields are ignored)
//! and serialize back out as the tool payloads.

use serde::{Deserialize, Serialize};

/// The authenticated user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// Author reference embedded in notes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub path_with_namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    pub web_url: String,
    #[serde(default)]
    pub last_activity_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueSummary {
    pub iid: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub web_url: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub iid: u64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub web_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,
    pub body: String,
    #[serde(default)]
    pub author: Option<UserRef>,
    /// Set on notes GitLab generates itself (label changes, pushes, ...)
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub resolvable: bool,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Thread of notes on a merge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    pub id: String,
    #[serde(default)]
    pub individual_note: bool,
    #[serde(default)]
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approver {
    pub user: UserRef,
}

/// Approval state returned by `POST .../approve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestApprovals {
    pub iid: u64,
    #[serde(default)]
    pub approved: Option<bool>,
    #[serde(default)]
    pub approvals_left: Option<u64>,
    #[serde(default)]
    pub approved_by: Vec<Approver>,
}

/// Acknowledgement of an approval withdrawal, which has no useful body
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalWithdrawn {
    pub iid: u64,
    pub unapproved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestSummary {
    pub iid: u64,
    pub title: String,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    pub web_url: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    pub title: String,
    pub state: String,
    pub source_branch: String,
    pub target_branch: String,
    pub web_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// One file of a merge request diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub old_path: String,
    pub new_path: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    #[serde(default)]
    pub diff: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeRequestChanges {
    pub iid: u64,
    pub title: String,
    pub source_branch: String,
    pub target_branch: String,
    #[serde(default)]
    pub changes: Vec<FileChange>,
}

/// File as returned by `GET /projects/:id/repository/files/:path`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawRepoFile {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Decoded repository file
#[derive(Debug, Clone, Serialize)]
pub struct RepoFile {
    pub file_path: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub content: String,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSearchMatch {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub startline: Option<u64>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: u64,
    pub status: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
    pub web_url: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
    pub web_url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub name: String,
    pub stage: String,
    pub status: String,
    pub web_url: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
}

/// Archive described by `artifacts_file` on a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsFile {
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Individual artifact listed under `artifacts` on a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub file_format: Option<String>,
}

/// Artifact metadata of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobArtifacts {
    #[serde(rename = "id")]
    pub job_id: u64,
    #[serde(default)]
    pub artifacts_file: Option<ArtifactsFile>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
}

/// Where a downloaded archive ended up
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedArtifacts {
    pub job_id: u64,
    pub filename: String,
    pub downloaded_bytes: u64,
    pub local_path: String,
}

/// First bytes of a job log
#[derive(Debug, Clone, Serialize)]
pub struct JobLog {
    pub text: String,
    pub truncated: bool,
    pub bytes_total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawBranch {
    pub name: String,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub commit: Option<RawCommitRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawCommitRef {
    pub id: String,
}

/// Commit summary embedded in branches and tags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRef {
    pub id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub committed_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub commit: Option<CommitRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub commit: Option<CommitRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub open_issues_count: Option<u64>,
    #[serde(default)]
    pub open_merge_requests_count: Option<u64>,
}

/// Commit created through `POST /projects/:id/repository/commits`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    #[serde(default)]
    pub short_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedBranch {
    pub name: String,
    pub web_url: String,
    pub commit_sha: String,
}

impl From<RawBranch> for CreatedBranch {
    fn from(raw: RawBranch) -> Self {
        Self {
            name: raw.name,
            web_url: raw.web_url.unwrap_or_default(),
            commit_sha: raw.commit.map(|c| c.id).unwrap_or_default(),
        }
    }
}

/// Key/value passed to a triggered pipeline
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct PipelineVariable {
    pub key: String,
    pub value: String,
}
