//! Typed inputs for list/search/create calls
//!
//! Each query knows how to render itself as GitLab query parameters; `None`
//! fields are left out so GitLab applies its own defaults.

use serde::{Deserialize, Serialize};

/// Pagination shared by list endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl Page {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub(crate) fn to_pairs(self) -> QueryPairs {
        with_page(QueryPairs::new(), self)
    }
}

/// Query parameters in wire order
pub(crate) type QueryPairs = Vec<(&'static str, String)>;

pub(crate) fn push_opt(pairs: &mut QueryPairs, key: &'static str, value: Option<impl ToString>) {
    if let Some(v) = value {
        pairs.push((key, v.to_string()));
    }
}

fn with_page(mut pairs: QueryPairs, page: Page) -> QueryPairs {
    pairs.push(("page", page.page.to_string()));
    pairs.push(("per_page", page.per_page.to_string()));
    pairs
}

#[derive(Debug, Clone, Default)]
pub struct ProjectQuery {
    pub search: Option<String>,
    pub membership: bool,
    pub page: Page,
}

impl ProjectQuery {
    pub(crate) fn to_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "search", self.search.as_deref());
        if self.membership {
            pairs.push(("membership", "true".to_string()));
        }
        pairs.push(("simple", "true".to_string()));
        with_page(pairs, self.page)
    }
}

#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    pub project: String,
    pub search: Option<String>,
    /// `opened`, `closed` or `all`
    pub state: Option<String>,
    pub labels: Vec<String>,
    pub assignee: Option<String>,
    pub author: Option<String>,
    pub page: Page,
}

impl IssueQuery {
    pub(crate) fn to_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "search", self.search.as_deref());
        push_opt(&mut pairs, "state", self.state.as_deref());
        if !self.labels.is_empty() {
            pairs.push(("labels", self.labels.join(",")));
        }
        push_opt(&mut pairs, "assignee_username", self.assignee.as_deref());
        push_opt(&mut pairs, "author_username", self.author.as_deref());
        with_page(pairs, self.page)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeRequestQuery {
    pub project: String,
    /// `opened`, `closed`, `merged` or `all`
    pub state: Option<String>,
    pub search: Option<String>,
    pub page: Page,
}

impl MergeRequestQuery {
    pub(crate) fn to_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "state", self.state.as_deref());
        push_opt(&mut pairs, "search", self.search.as_deref());
        with_page(pairs, self.page)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeQuery {
    pub project: String,
    pub git_ref: Option<String>,
    pub path: Option<String>,
    pub recursive: bool,
    pub page: Page,
}

impl TreeQuery {
    pub(crate) fn to_pairs(&self, git_ref: &str) -> QueryPairs {
        let mut pairs = vec![("ref", git_ref.to_string())];
        push_opt(&mut pairs, "path", self.path.as_deref());
        if self.recursive {
            pairs.push(("recursive", "true".to_string()));
        }
        with_page(pairs, self.page)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CodeSearchQuery {
    pub project: String,
    pub query: String,
    pub git_ref: Option<String>,
    pub page: Page,
}

impl CodeSearchQuery {
    pub(crate) fn to_pairs(&self) -> QueryPairs {
        let mut pairs = vec![
            ("scope", "blobs".to_string()),
            ("search", self.query.clone()),
        ];
        push_opt(&mut pairs, "ref", self.git_ref.as_deref());
        with_page(pairs, self.page)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineQuery {
    pub project: String,
    pub git_ref: Option<String>,
    pub status: Option<String>,
    pub page: Page,
}

impl PipelineQuery {
    pub(crate) fn to_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "ref", self.git_ref.as_deref());
        push_opt(&mut pairs, "status", self.status.as_deref());
        with_page(pairs, self.page)
    }
}

/// Body of `POST /projects/:id/issues`
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewIssue {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Comma separated on the wire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
}

/// Body of `POST /projects/:id/merge_requests`
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewMergeRequest {
    pub source_branch: String,
    /// Filled with the default branch when empty
    pub target_branch: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_source_branch: Option<bool>,
}

/// Name-filtered listing of branches, tags or labels
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub project: String,
    pub search: Option<String>,
    pub page: Page,
}

impl ListQuery {
    pub(crate) fn to_pairs(&self) -> QueryPairs {
        let mut pairs = QueryPairs::new();
        push_opt(&mut pairs, "search", self.search.as_deref());
        with_page(pairs, self.page)
    }
}

/// Body of `PUT /projects/:id/issues/:iid`
#[derive(Debug, Clone, Default, Serialize)]
pub struct IssueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `close` or `reopen`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_event: Option<String>,
    /// Replaces the label set; an empty string clears it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_labels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_labels: Option<String>,
}

impl IssueUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.state_event.is_none()
            && self.labels.is_none()
            && self.add_labels.is_none()
            && self.remove_labels.is_none()
    }
}

/// Body of `PUT /projects/:id/merge_requests/:iid`
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeRequestUpdate {
    #[serde(flatten)]
    pub common: IssueUpdate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer_ids: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remove_source_branch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squash: Option<bool>,
}

impl MergeRequestUpdate {
    pub fn is_empty(&self) -> bool {
        self.common.is_empty()
            && self.assignee_id.is_none()
            && self.reviewer_ids.is_none()
            && self.target_branch.is_none()
            && self.remove_source_branch.is_none()
            && self.squash.is_none()
    }
}

/// Diff location of an inline merge request thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DiffPosition {
    /// Merge base of the diff
    pub base_sha: String,
    /// Commit the diff starts from
    pub start_sha: String,
    /// Head commit of the merge request
    pub head_sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_line: Option<u64>,
}

/// Body of `PUT .../discussions/:discussion_id/notes/:note_id`
#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved: Option<bool>,
}

/// Body of `PUT /projects/:id/merge_requests/:iid/merge`
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeOptions {
    /// Refuse the merge unless the source branch head is this commit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squash: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub should_remove_source_branch: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_when_pipeline_succeeds: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_commit_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommitActionKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ContentEncoding {
    Text,
    Base64,
}

/// One file change of a multi-file commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CommitAction {
    /// create, update or delete
    pub action: CommitActionKind,
    /// Repository path of the file
    pub file_path: String,
    /// New file content; required for create and update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// text (default) or base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<ContentEncoding>,
    /// Fails the commit if the file changed after this commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_id: Option<String>,
}

/// Body of `POST /projects/:id/repository/commits`
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewCommit {
    pub branch: String,
    pub commit_message: String,
    /// Branch to fork `branch` from when it does not exist yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_branch: Option<String>,
    pub actions: Vec<CommitAction>,
}
