//! MCP tools over the GitLab access facade
//!
//! Every tool maps onto exactly one [`GitlabClient`] method. Policy is
//! checked when a tool is called, before any argument reaches GitLab, and
//! results are rendered as pretty JSON. Failures come back as
//! `{"error": ..., "status": ...}`.

pub mod args;
pub mod responses;

use std::future::Future;
use std::sync::Arc;

use rmcp::{ServerHandler, model::*, schemars, tool};
use serde::Serialize;
use tracing::warn;

use self::args::*;
use self::responses::*;
use crate::gitlab::client::models::PipelineVariable;
use crate::gitlab::client::queries::*;
use crate::gitlab::{AuthMode, GitlabClient};
use crate::policy::{Policy, validate_repo_file_path};

/// GitLab tools exposed through the MCP protocol
#[derive(Clone)]
pub struct GitLabTools {
    client: GitlabClient,
    policy: Arc<Policy>,
}

impl GitLabTools {
    pub fn new(client: GitlabClient, policy: Policy) -> Self {
        Self {
            client,
            policy: Arc::new(policy),
        }
    }

    /// Instance for a new transport session
    ///
    /// Shares credentials and policy; the default-branch cache starts empty.
    pub fn for_session(&self) -> Self {
        Self {
            client: self.client.with_fresh_cache(),
            policy: Arc::clone(&self.policy),
        }
    }

    pub fn client(&self) -> &GitlabClient {
        &self.client
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    async fn run_read<T, Fut>(&self, tool: &'static str, call: Fut) -> Result<String, String>
    where
        T: Serialize,
        Fut: Future<Output = ToolResult<T>>,
    {
        let outcome = match self.policy.check_tool(tool) {
            Ok(()) => call.await,
            Err(denied) => Err(denied.into()),
        };
        finish(tool, outcome)
    }

    async fn run_write<T, Fut>(
        &self,
        tool: &'static str,
        project: &str,
        call: Fut,
    ) -> Result<String, String>
    where
        T: Serialize,
        Fut: Future<Output = ToolResult<T>>,
    {
        let outcome = match self.policy.check_write(tool, project.trim()) {
            Ok(()) => call.await,
            Err(denied) => Err(denied.into()),
        };
        finish(tool, outcome)
    }
}

fn finish<T: Serialize>(tool: &str, outcome: ToolResult<T>) -> Result<String, String> {
    if let Err(err) = &outcome {
        warn!(tool, error = %err, "Tool call failed");
    }
    render(outcome)
}

#[tool(tool_box)]
impl ServerHandler for GitLabTools {
    fn get_info(&self) -> ServerInfo {
        let auth = match self.client.auth().mode() {
            AuthMode::Pat => "personal access token",
            AuthMode::OAuth => "OAuth",
        };
        let tools = self
            .policy
            .visible_tools()
            .iter()
            .map(|name| format!("- `{}`", name))
            .collect::<Vec<_>>()
            .join("\n");
        let instructions = format!(
            "# GitLab MCP Server

Authenticated with a {}{}.

## Available Tools
{}

Projects are addressed by numeric id or full path (`group/subgroup/project`).
Reads that take an optional ref fall back to the project's default branch.
",
            auth,
            if self.policy.read_only() {
                "; read-only mode"
            } else {
                ""
            },
            tools
        );

        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(instructions),
        }
    }
}

#[tool(tool_box)]
impl GitLabTools {
    #[tool(description = "Return the user the server is authenticated as.")]
    async fn gitlab_get_current_user(&self) -> Result<String, String> {
        self.run_read("gitlab_get_current_user", async {
            ToolResult::Ok(self.client.current_user().await?)
        })
        .await
    }

    #[tool(
        description = "List projects visible to the authenticated user. Example: `{\"name\": \"gitlab_list_projects\", \"arguments\": {\"search\": \"api\", \"membership\": true}}`"
    )]
    async fn gitlab_list_projects(
        &self,
        #[tool(param)]
        #[schemars(description = "Filter projects by name (optional).")]
        search: Option<String>,

        #[tool(param)]
        #[schemars(description = "Only projects the user is a member of (optional, default false).")]
        membership: Option<bool>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_projects", async {
            let query = ProjectQuery {
                search,
                membership: membership.unwrap_or(false),
                page: args::page(page, per_page)?,
            };
            ToolResult::Ok(self.client.list_projects(&query).await?)
        })
        .await
    }

    #[tool(description = "Fetch a single project by id or path.")]
    async fn gitlab_get_project(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_project", async {
            let project = required("project", &project)?;
            ToolResult::Ok(self.client.get_project(project).await?)
        })
        .await
    }

    #[tool(description = "List repository branches.")]
    async fn gitlab_list_branches(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Filter branches by name (optional).")]
        search: Option<String>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_branches", async {
            let query = list_query(&project, search, page, per_page)?;
            ToolResult::Ok(self.client.list_branches(&query).await?)
        })
        .await
    }

    #[tool(description = "List repository tags, newest first.")]
    async fn gitlab_list_tags(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Filter tags by name (optional).")]
        search: Option<String>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_tags", async {
            let query = list_query(&project, search, page, per_page)?;
            ToolResult::Ok(self.client.list_tags(&query).await?)
        })
        .await
    }

    #[tool(description = "List the labels of a project with their issue and merge request counts.")]
    async fn gitlab_list_project_labels(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Filter labels by name (optional).")]
        search: Option<String>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_project_labels", async {
            let query = list_query(&project, search, page, per_page)?;
            ToolResult::Ok(self.client.list_project_labels(&query).await?)
        })
        .await
    }

    #[tool(
        description = "Search issues of a project by text, state, labels, assignee or author. Example: `{\"name\": \"gitlab_search_issues\", \"arguments\": {\"project\": \"group/project\", \"search\": \"flaky\", \"state\": \"opened\"}}`"
    )]
    async fn gitlab_search_issues(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Text to search in titles and descriptions (optional).")]
        search: Option<String>,

        #[tool(param)]
        #[schemars(description = "Issue state: opened, closed or all (optional).")]
        state: Option<String>,

        #[tool(param)]
        #[schemars(description = "Labels that must all be present (optional).")]
        labels: Option<Vec<String>>,

        #[tool(param)]
        #[schemars(description = "Assignee username (optional).")]
        assignee_username: Option<String>,

        #[tool(param)]
        #[schemars(description = "Author username (optional).")]
        author_username: Option<String>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_search_issues", async {
            let query = IssueQuery {
                project: required("project", &project)?.to_string(),
                search,
                state,
                labels: labels.unwrap_or_default(),
                assignee: assignee_username,
                author: author_username,
                page: args::page(page, per_page)?,
            };
            ToolResult::Ok(self.client.search_issues(&query).await?)
        })
        .await
    }

    #[tool(description = "Fetch one issue by its project-scoped iid.")]
    async fn gitlab_get_issue(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Issue iid (the number shown in the UI).")]
        issue_iid: u64,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_issue", async {
            let project = required("project", &project)?;
            let iid = positive("issue_iid", issue_iid)?;
            ToolResult::Ok(self.client.get_issue(project, iid).await?)
        })
        .await
    }

    #[tool(description = "List the comments of an issue, oldest first.")]
    async fn gitlab_list_issue_notes(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Issue iid.")]
        issue_iid: u64,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_issue_notes", async {
            let project = required("project", &project)?;
            let iid = positive("issue_iid", issue_iid)?;
            let page = args::page(page, per_page)?;
            ToolResult::Ok(self.client.list_issue_notes(project, iid, page).await?)
        })
        .await
    }

    #[tool(description = "List merge requests of a project.")]
    async fn gitlab_list_merge_requests(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "State: opened, closed, merged or all (optional).")]
        state: Option<String>,

        #[tool(param)]
        #[schemars(description = "Text to search in titles and descriptions (optional).")]
        search: Option<String>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_merge_requests", async {
            let query = MergeRequestQuery {
                project: required("project", &project)?.to_string(),
                state,
                search,
                page: args::page(page, per_page)?,
            };
            ToolResult::Ok(self.client.list_merge_requests(&query).await?)
        })
        .await
    }

    #[tool(description = "Fetch one merge request by its project-scoped iid.")]
    async fn gitlab_get_merge_request(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_merge_request", async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            ToolResult::Ok(self.client.get_merge_request(project, iid).await?)
        })
        .await
    }

    #[tool(description = "List the comments of a merge request, oldest first.")]
    async fn gitlab_list_merge_request_notes(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_merge_request_notes", async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let page = args::page(page, per_page)?;
            ToolResult::Ok(self.client.list_merge_request_notes(project, iid, page).await?)
        })
        .await
    }

    #[tool(description = "List the discussion threads of a merge request, including inline diff threads.")]
    async fn gitlab_list_merge_request_discussions(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_merge_request_discussions", async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let page = args::page(page, per_page)?;
            ToolResult::Ok(self.client.list_merge_request_discussions(project, iid, page).await?)
        })
        .await
    }

    #[tool(
        description = "Fetch the diff of a merge request. Output is bounded by file count, per-file diff size and total diff size."
    )]
    async fn gitlab_get_merge_request_changes(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Maximum files returned (optional, 1-200, default 50).")]
        max_files: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Maximum characters per file diff (optional, 100-100000, default 10000).")]
        max_diff_chars_per_file: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Maximum characters across all diffs (optional, 100-500000, default 50000).")]
        max_total_diff_chars: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_merge_request_changes", async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let budget = DiffBudget {
                max_files: bounded("max_files", max_files, DEFAULT_MAX_FILES, 1, MAX_FILES)? as usize,
                per_file_chars: bounded(
                    "max_diff_chars_per_file",
                    max_diff_chars_per_file,
                    DEFAULT_DIFF_CHARS_PER_FILE,
                    100,
                    MAX_DIFF_CHARS_PER_FILE,
                )? as usize,
                total_chars: bounded(
                    "max_total_diff_chars",
                    max_total_diff_chars,
                    DEFAULT_TOTAL_DIFF_CHARS,
                    100,
                    MAX_TOTAL_DIFF_CHARS,
                )? as usize,
            };
            let changes = self.client.get_merge_request_changes(project, iid).await?;
            ToolResult::Ok(ChangesResponse::new(changes, budget))
        })
        .await
    }

    #[tool(
        description = "Read a file from a repository. Uses the default branch when no ref is given. Content is truncated at 200000 characters. Example: `{\"name\": \"gitlab_get_file\", \"arguments\": {\"project\": \"group/project\", \"file_path\": \".gitlab-ci.yml\"}}`"
    )]
    async fn gitlab_get_file(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Path relative to the repository root, e.g. 'src/main.rs'.")]
        file_path: String,

        #[tool(param)]
        #[schemars(description = "Branch, tag or commit (optional, default is the project's default branch).")]
        ref_name: Option<String>,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_file", async {
            let project = required("project", &project)?;
            validate_repo_file_path(&file_path)?;
            let file = self
                .client
                .get_file(project, &file_path, ref_name.as_deref())
                .await?;
            ToolResult::Ok(FileResponse::new(file, MAX_FILE_CHARS))
        })
        .await
    }

    #[tool(description = "List files and directories of a repository.")]
    async fn gitlab_list_repo_tree(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Branch, tag or commit (optional, default is the project's default branch).")]
        ref_name: Option<String>,

        #[tool(param)]
        #[schemars(description = "Directory inside the repository (optional, default is the root).")]
        path: Option<String>,

        #[tool(param)]
        #[schemars(description = "List subdirectories recursively (optional, default false).")]
        recursive: Option<bool>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_repo_tree", async {
            if let Some(dir) = path.as_deref().filter(|p| !p.is_empty()) {
                validate_repo_file_path(dir)?;
            }
            let query = TreeQuery {
                project: required("project", &project)?.to_string(),
                git_ref: ref_name,
                path,
                recursive: recursive.unwrap_or(false),
                page: args::page(page, per_page)?,
            };
            ToolResult::Ok(self.client.list_repo_tree(&query).await?)
        })
        .await
    }

    #[tool(description = "Search code (blobs) inside one project.")]
    async fn gitlab_search_code(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Text to search for.")]
        query: String,

        #[tool(param)]
        #[schemars(description = "Branch or tag to search (optional).")]
        ref_name: Option<String>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_search_code", async {
            let query = CodeSearchQuery {
                project: required("project", &project)?.to_string(),
                query: required("query", &query)?.to_string(),
                git_ref: ref_name,
                page: args::page(page, per_page)?,
            };
            ToolResult::Ok(self.client.search_code(&query).await?)
        })
        .await
    }

    #[tool(description = "List CI pipelines of a project, newest first.")]
    async fn gitlab_list_pipelines(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Only pipelines for this branch or tag (optional).")]
        ref_name: Option<String>,

        #[tool(param)]
        #[schemars(description = "Only pipelines with this status, e.g. 'failed' (optional).")]
        status: Option<String>,

        #[tool(param)]
        #[schemars(description = "Page number (optional, default 1).")]
        page: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Results per page (optional, 1-100, default 20).")]
        per_page: Option<u32>,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_pipelines", async {
            let query = PipelineQuery {
                project: required("project", &project)?.to_string(),
                git_ref: ref_name,
                status,
                page: args::page(page, per_page)?,
            };
            ToolResult::Ok(self.client.list_pipelines(&query).await?)
        })
        .await
    }

    #[tool(description = "Fetch one pipeline.")]
    async fn gitlab_get_pipeline(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Pipeline id.")]
        pipeline_id: u64,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_pipeline", async {
            let project = required("project", &project)?;
            let id = positive("pipeline_id", pipeline_id)?;
            ToolResult::Ok(self.client.get_pipeline(project, id).await?)
        })
        .await
    }

    #[tool(description = "List the jobs of a pipeline (first 100).")]
    async fn gitlab_list_pipeline_jobs(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Pipeline id.")]
        pipeline_id: u64,
    ) -> Result<String, String> {
        self.run_read("gitlab_list_pipeline_jobs", async {
            let project = required("project", &project)?;
            let id = positive("pipeline_id", pipeline_id)?;
            ToolResult::Ok(self.client.list_pipeline_jobs(project, id).await?)
        })
        .await
    }

    #[tool(
        description = "Fetch a CI job log from the start, truncated to max_chars. Use gitlab_get_job_log_tail for the end of long logs."
    )]
    async fn gitlab_get_job_log(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,

        #[tool(param)]
        #[schemars(description = "Maximum characters returned (optional, 1-200000, default 50000).")]
        max_chars: Option<u64>,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_job_log", async {
            let project = required("project", &project)?;
            let job_id = positive("job_id", job_id)?;
            let max_chars = bounded(
                "max_chars",
                max_chars,
                DEFAULT_JOB_LOG_MAX_CHARS,
                1,
                MAX_JOB_LOG_MAX_CHARS,
            )? as usize;
            // A UTF-8 character is at most four bytes.
            let log = self.client.get_job_log(project, job_id, max_chars * 4).await?;
            let text = truncate_log_head(&log.text, max_chars, !log.truncated, log.bytes_total);
            ToolResult::Ok(JobLogResponse {
                job_id,
                log: text.text,
                log_truncated: text.truncated,
                log_original_length: text.original_length,
                log_bytes_total: log.bytes_total,
            })
        })
        .await
    }

    #[tool(
        description = "Fetch the last lines of a CI job log, reading at most max_bytes from the end. Example: `{\"name\": \"gitlab_get_job_log_tail\", \"arguments\": {\"project\": \"group/project\", \"job_id\": 123, \"lines\": 100}}`"
    )]
    async fn gitlab_get_job_log_tail(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,

        #[tool(param)]
        #[schemars(description = "Number of lines returned (optional, 1-5000, default 200).")]
        lines: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Bytes read from the end of the log (optional, 1-2000000, default 200000).")]
        max_bytes: Option<u64>,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_job_log_tail", async {
            let project = required("project", &project)?;
            let job_id = positive("job_id", job_id)?;
            let lines = bounded("lines", lines, DEFAULT_TAIL_LINES, 1, MAX_TAIL_LINES)?;
            let max_bytes = bounded(
                "max_bytes",
                max_bytes,
                DEFAULT_TAIL_MAX_BYTES,
                1,
                MAX_TAIL_MAX_BYTES,
            )?;
            let tail = self
                .client
                .get_job_log_tail(project, job_id, max_bytes as usize)
                .await?;
            ToolResult::Ok(LogTailResponse::new(job_id, lines, max_bytes, &tail))
        })
        .await
    }

    #[tool(
        description = "Search the tail of a CI job log for a substring and return matching lines with context."
    )]
    async fn gitlab_search_job_log(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,

        #[tool(param)]
        #[schemars(description = "Substring to look for (1-200 characters).")]
        query: String,

        #[tool(param)]
        #[schemars(description = "Ignore case (optional, default true).")]
        case_insensitive: Option<bool>,

        #[tool(param)]
        #[schemars(description = "Lines of context around each match (optional, 0-50, default 2).")]
        context_lines: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Stop after this many matches (optional, 1-50, default 10).")]
        max_matches: Option<u32>,

        #[tool(param)]
        #[schemars(description = "Bytes read from the end of the log (optional, 1-2000000, default 200000).")]
        max_bytes: Option<u64>,
    ) -> Result<String, String> {
        self.run_read("gitlab_search_job_log", async {
            let project = required("project", &project)?;
            let job_id = positive("job_id", job_id)?;
            if query.is_empty() || query.chars().count() > MAX_SEARCH_QUERY_CHARS {
                return Err(ToolError::InvalidArgument(format!(
                    "query must be 1-{} characters",
                    MAX_SEARCH_QUERY_CHARS
                )));
            }
            let case_insensitive = case_insensitive.unwrap_or(true);
            let context_lines = bounded(
                "context_lines",
                context_lines,
                DEFAULT_CONTEXT_LINES,
                0,
                MAX_CONTEXT_LINES,
            )?;
            let max_matches = bounded("max_matches", max_matches, DEFAULT_MAX_MATCHES, 1, MAX_MATCHES)?;
            let max_bytes = bounded(
                "max_bytes",
                max_bytes,
                DEFAULT_TAIL_MAX_BYTES,
                1,
                MAX_TAIL_MAX_BYTES,
            )?;

            let tail = self
                .client
                .get_job_log_tail(project, job_id, max_bytes as usize)
                .await?;
            let matches = search_lines(
                &tail.text,
                &query,
                case_insensitive,
                context_lines as usize,
                max_matches as usize,
            );
            ToolResult::Ok(LogSearchResponse {
                job_id,
                query: query.clone(),
                case_insensitive,
                context_lines,
                max_matches,
                searched_tail_bytes: max_bytes,
                is_partial: tail.is_partial,
                bytes_total: tail.bytes_total,
                bytes_start: tail.bytes_start,
                bytes_end: tail.bytes_end,
                matches_found: matches.len(),
                matches,
            })
        })
        .await
    }

    #[tool(description = "Describe the artifacts of a CI job without downloading them.")]
    async fn gitlab_get_job_artifacts(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,
    ) -> Result<String, String> {
        self.run_read("gitlab_get_job_artifacts", async {
            let project = required("project", &project)?;
            let job_id = positive("job_id", job_id)?;
            ToolResult::Ok(self.client.get_job_artifacts(project, job_id).await?)
        })
        .await
    }

    #[tool(
        description = "Download the artifacts archive of a CI job to the server's artifact directory. Refuses archives larger than max_bytes."
    )]
    async fn gitlab_download_job_artifacts(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,

        #[tool(param)]
        #[schemars(description = "Size ceiling in bytes (optional, 1-50000000, default 10000000).")]
        max_bytes: Option<u64>,
    ) -> Result<String, String> {
        self.run_read("gitlab_download_job_artifacts", async {
            let project = required("project", &project)?;
            let job_id = positive("job_id", job_id)?;
            let max_bytes = bounded(
                "max_bytes",
                max_bytes,
                DEFAULT_ARTIFACT_MAX_BYTES,
                1,
                MAX_ARTIFACT_MAX_BYTES,
            )?;
            ToolResult::Ok(
                self.client
                    .download_job_artifacts(project, job_id, max_bytes)
                    .await?,
            )
        })
        .await
    }

    #[tool(description = "Create an issue.")]
    async fn gitlab_create_issue(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Issue title.")]
        title: String,

        #[tool(param)]
        #[schemars(description = "Issue description in Markdown (optional).")]
        description: Option<String>,

        #[tool(param)]
        #[schemars(description = "Labels to apply (optional).")]
        labels: Option<Vec<String>>,
    ) -> Result<String, String> {
        self.run_write("gitlab_create_issue", &project, async {
            let project = required("project", &project)?;
            let issue = NewIssue {
                title: required("title", &title)?.to_string(),
                description,
                labels: join_labels(labels),
            };
            ToolResult::Ok(self.client.create_issue(project, &issue).await?)
        })
        .await
    }

    #[tool(
        description = "Update an issue: title, description, state (close or reopen) and labels. At least one field is required."
    )]
    async fn gitlab_update_issue(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Issue iid.")]
        issue_iid: u64,

        #[tool(param)]
        #[schemars(description = "New title (optional).")]
        title: Option<String>,

        #[tool(param)]
        #[schemars(description = "New description in Markdown (optional).")]
        description: Option<String>,

        #[tool(param)]
        #[schemars(description = "close or reopen (optional).")]
        state_event: Option<String>,

        #[tool(param)]
        #[schemars(description = "Replace all labels with this list; an empty list removes every label (optional). Cannot be combined with add_labels or remove_labels.")]
        labels: Option<Vec<String>>,

        #[tool(param)]
        #[schemars(description = "Labels to add (optional).")]
        add_labels: Option<Vec<String>>,

        #[tool(param)]
        #[schemars(description = "Labels to remove (optional).")]
        remove_labels: Option<Vec<String>>,
    ) -> Result<String, String> {
        self.run_write("gitlab_update_issue", &project, async {
            let project = required("project", &project)?;
            let iid = positive("issue_iid", issue_iid)?;
            let update = issue_update(
                title,
                description,
                state_event,
                labels,
                add_labels,
                remove_labels,
            )?;
            require_update(update.is_empty())?;
            ToolResult::Ok(self.client.update_issue(project, iid, &update).await?)
        })
        .await
    }

    #[tool(description = "Add a comment to an issue.")]
    async fn gitlab_add_issue_note(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Issue iid.")]
        issue_iid: u64,

        #[tool(param)]
        #[schemars(description = "Comment body in Markdown.")]
        body: String,
    ) -> Result<String, String> {
        self.run_write("gitlab_add_issue_note", &project, async {
            let project = required("project", &project)?;
            let iid = positive("issue_iid", issue_iid)?;
            let body = required("body", &body)?;
            ToolResult::Ok(self.client.add_issue_note(project, iid, body).await?)
        })
        .await
    }

    #[tool(
        description = "Update a merge request: title, description, state, labels, assignee, reviewers, target branch and merge settings. At least one field is required."
    )]
    async fn gitlab_update_merge_request(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "New title (optional).")]
        title: Option<String>,

        #[tool(param)]
        #[schemars(description = "New description in Markdown (optional, at most 100000 characters).")]
        description: Option<String>,

        #[tool(param)]
        #[schemars(description = "close or reopen (optional).")]
        state_event: Option<String>,

        #[tool(param)]
        #[schemars(description = "Replace all labels with this list; an empty list removes every label (optional). Cannot be combined with add_labels or remove_labels.")]
        labels: Option<Vec<String>>,

        #[tool(param)]
        #[schemars(description = "Labels to add (optional).")]
        add_labels: Option<Vec<String>>,

        #[tool(param)]
        #[schemars(description = "Labels to remove (optional).")]
        remove_labels: Option<Vec<String>>,

        #[tool(param)]
        #[schemars(description = "User id to assign; 0 unassigns (optional).")]
        assignee_id: Option<u64>,

        #[tool(param)]
        #[schemars(description = "User ids of the reviewers; an empty list removes all (optional, at most 20).")]
        reviewer_ids: Option<Vec<u64>>,

        #[tool(param)]
        #[schemars(description = "New target branch (optional).")]
        target_branch: Option<String>,

        #[tool(param)]
        #[schemars(description = "Delete the source branch after merge (optional).")]
        remove_source_branch: Option<bool>,

        #[tool(param)]
        #[schemars(description = "Squash commits on merge (optional).")]
        squash: Option<bool>,
    ) -> Result<String, String> {
        self.run_write("gitlab_update_merge_request", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            if reviewer_ids.as_ref().is_some_and(|ids| ids.len() > MAX_REVIEWERS) {
                return Err(ToolError::InvalidArgument(format!(
                    "reviewer_ids must have at most {} entries",
                    MAX_REVIEWERS
                )));
            }
            let target_branch = match target_branch {
                Some(branch) => Some(required("target_branch", &branch)?.to_string()),
                None => None,
            };
            let update = MergeRequestUpdate {
                common: issue_update(
                    title,
                    description,
                    state_event,
                    labels,
                    add_labels,
                    remove_labels,
                )?,
                assignee_id,
                reviewer_ids,
                target_branch,
                remove_source_branch,
                squash,
            };
            require_update(update.is_empty())?;
            ToolResult::Ok(self.client.update_merge_request(project, iid, &update).await?)
        })
        .await
    }

    #[tool(description = "Add a comment to a merge request.")]
    async fn gitlab_add_merge_request_note(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Comment body in Markdown (at most 50000 characters).")]
        body: String,
    ) -> Result<String, String> {
        self.run_write("gitlab_add_merge_request_note", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let body = note_body(&body)?;
            ToolResult::Ok(self.client.add_merge_request_note(project, iid, body).await?)
        })
        .await
    }

    #[tool(
        description = "Start a discussion thread on a merge request. With a position the thread is attached to a diff line. Example: `{\"name\": \"gitlab_create_merge_request_discussion\", \"arguments\": {\"project\": \"group/project\", \"mr_iid\": 12, \"body\": \"Off by one?\", \"position\": {\"base_sha\": \"...\", \"start_sha\": \"...\", \"head_sha\": \"...\", \"new_path\": \"src/lib.rs\", \"new_line\": 42}}}`"
    )]
    async fn gitlab_create_merge_request_discussion(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "First comment of the thread in Markdown (at most 50000 characters).")]
        body: String,

        #[tool(param)]
        #[schemars(description = "Diff location for an inline thread; needs the three diff SHAs and new_path/new_line and/or old_path/old_line (optional).")]
        position: Option<DiffPosition>,
    ) -> Result<String, String> {
        self.run_write("gitlab_create_merge_request_discussion", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let body = note_body(&body)?;
            if let Some(position) = &position {
                check_position(position)?;
            }
            ToolResult::Ok(
                self.client
                    .create_merge_request_discussion(project, iid, body, position.as_ref())
                    .await?,
            )
        })
        .await
    }

    #[tool(description = "Reply to a merge request discussion thread.")]
    async fn gitlab_add_merge_request_discussion_note(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Discussion id, as returned by gitlab_list_merge_request_discussions.")]
        discussion_id: String,

        #[tool(param)]
        #[schemars(description = "Reply body in Markdown (at most 50000 characters).")]
        body: String,
    ) -> Result<String, String> {
        self.run_write("gitlab_add_merge_request_discussion_note", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let discussion_id = required("discussion_id", &discussion_id)?;
            let body = note_body(&body)?;
            ToolResult::Ok(
                self.client
                    .add_merge_request_discussion_note(project, iid, discussion_id, body)
                    .await?,
            )
        })
        .await
    }

    #[tool(
        description = "Edit a note of a merge request discussion, or resolve and unresolve its thread. Needs a body or resolved."
    )]
    async fn gitlab_update_merge_request_discussion_note(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Discussion id.")]
        discussion_id: String,

        #[tool(param)]
        #[schemars(description = "Note id inside the discussion.")]
        note_id: u64,

        #[tool(param)]
        #[schemars(description = "New note body in Markdown (optional).")]
        body: Option<String>,

        #[tool(param)]
        #[schemars(description = "Resolve (true) or unresolve (false) the thread (optional).")]
        resolved: Option<bool>,
    ) -> Result<String, String> {
        self.run_write("gitlab_update_merge_request_discussion_note", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let discussion_id = required("discussion_id", &discussion_id)?;
            let note_id = positive("note_id", note_id)?;
            let body = match body {
                Some(body) => Some(note_body(&body)?.to_string()),
                None => None,
            };
            let update = NoteUpdate { body, resolved };
            require_update(update.body.is_none() && update.resolved.is_none())?;
            ToolResult::Ok(
                self.client
                    .update_merge_request_discussion_note(
                        project,
                        iid,
                        discussion_id,
                        note_id,
                        &update,
                    )
                    .await?,
            )
        })
        .await
    }

    #[tool(description = "Approve a merge request as the authenticated user.")]
    async fn gitlab_approve_merge_request(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Approve only if the source branch head is this commit (optional).")]
        sha: Option<String>,
    ) -> Result<String, String> {
        self.run_write("gitlab_approve_merge_request", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            let sha = sha.as_deref().map(str::trim).filter(|s| !s.is_empty());
            ToolResult::Ok(self.client.approve_merge_request(project, iid, sha).await?)
        })
        .await
    }

    #[tool(description = "Withdraw the authenticated user's approval of a merge request.")]
    async fn gitlab_unapprove_merge_request(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,
    ) -> Result<String, String> {
        self.run_write("gitlab_unapprove_merge_request", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            ToolResult::Ok(self.client.unapprove_merge_request(project, iid).await?)
        })
        .await
    }

    #[tool(
        description = "Merge a merge request, or schedule the merge for when its pipeline succeeds."
    )]
    async fn gitlab_merge_merge_request(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Merge request iid.")]
        mr_iid: u64,

        #[tool(param)]
        #[schemars(description = "Merge only if the source branch head is this commit (optional).")]
        sha: Option<String>,

        #[tool(param)]
        #[schemars(description = "Squash commits (optional).")]
        squash: Option<bool>,

        #[tool(param)]
        #[schemars(description = "Delete the source branch after merge (optional).")]
        should_remove_source_branch: Option<bool>,

        #[tool(param)]
        #[schemars(description = "Merge once the pipeline succeeds instead of now (optional).")]
        merge_when_pipeline_succeeds: Option<bool>,

        #[tool(param)]
        #[schemars(description = "Custom merge commit message (optional, at most 10000 characters).")]
        merge_commit_message: Option<String>,
    ) -> Result<String, String> {
        self.run_write("gitlab_merge_merge_request", &project, async {
            let project = required("project", &project)?;
            let iid = positive("mr_iid", mr_iid)?;
            if let Some(message) = &merge_commit_message {
                at_most("merge_commit_message", message, MAX_COMMIT_MESSAGE_CHARS)?;
            }
            let options = MergeOptions {
                sha: sha.filter(|s| !s.trim().is_empty()),
                squash,
                should_remove_source_branch,
                merge_when_pipeline_succeeds,
                merge_commit_message,
            };
            ToolResult::Ok(self.client.merge_merge_request(project, iid, &options).await?)
        })
        .await
    }

    #[tool(description = "Create a branch from a ref, or from the default branch.")]
    async fn gitlab_create_branch(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Name of the new branch.")]
        branch: String,

        #[tool(param)]
        #[schemars(description = "Branch, tag or commit to start from (optional, default is the project's default branch).")]
        ref_name: Option<String>,
    ) -> Result<String, String> {
        self.run_write("gitlab_create_branch", &project, async {
            let project = required("project", &project)?;
            let branch = required("branch", &branch)?;
            ToolResult::Ok(
                self.client
                    .create_branch(project, branch, ref_name.as_deref())
                    .await?,
            )
        })
        .await
    }

    #[tool(
        description = "Commit up to 20 file changes (create, update, delete) to a branch in one commit. Content is text; base64 content must decode to UTF-8 text. Example: `{\"name\": \"gitlab_create_commit\", \"arguments\": {\"project\": \"group/project\", \"branch\": \"fix-ci\", \"start_branch\": \"main\", \"commit_message\": \"Fix CI\", \"actions\": [{\"action\": \"update\", \"file_path\": \".gitlab-ci.yml\", \"content\": \"...\"}]}}`"
    )]
    async fn gitlab_create_commit(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Branch to commit to.")]
        branch: String,

        #[tool(param)]
        #[schemars(description = "Commit message (at most 10000 characters).")]
        commit_message: String,

        #[tool(param)]
        #[schemars(description = "File changes, 1-20 entries.")]
        actions: Vec<CommitAction>,

        #[tool(param)]
        #[schemars(description = "Existing branch to start from when 'branch' does not exist yet (optional).")]
        start_branch: Option<String>,
    ) -> Result<String, String> {
        self.run_write("gitlab_create_commit", &project, async {
            let project = required("project", &project)?;
            let branch = required("branch", &branch)?;
            let message = at_most(
                "commit_message",
                required("commit_message", &commit_message)?,
                MAX_COMMIT_MESSAGE_CHARS,
            )?;
            let commit = NewCommit {
                branch: branch.to_string(),
                commit_message: message.to_string(),
                start_branch: start_branch.filter(|b| !b.trim().is_empty()),
                actions: commit_actions(actions)?,
            };
            ToolResult::Ok(self.client.create_commit(project, &commit).await?)
        })
        .await
    }

    #[tool(description = "Open a merge request. The target defaults to the project's default branch.")]
    async fn gitlab_create_merge_request(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Branch with the changes.")]
        source_branch: String,

        #[tool(param)]
        #[schemars(description = "Branch to merge into (optional, default is the project's default branch).")]
        target_branch: Option<String>,

        #[tool(param)]
        #[schemars(description = "Merge request title.")]
        title: String,

        #[tool(param)]
        #[schemars(description = "Description in Markdown (optional).")]
        description: Option<String>,

        #[tool(param)]
        #[schemars(description = "Labels to apply (optional).")]
        labels: Option<Vec<String>>,

        #[tool(param)]
        #[schemars(description = "Delete the source branch after merge (optional).")]
        remove_source_branch: Option<bool>,
    ) -> Result<String, String> {
        self.run_write("gitlab_create_merge_request", &project, async {
            let project = required("project", &project)?;
            let request = NewMergeRequest {
                source_branch: required("source_branch", &source_branch)?.to_string(),
                target_branch,
                title: required("title", &title)?.to_string(),
                description,
                labels: join_labels(labels),
                remove_source_branch,
            };
            ToolResult::Ok(self.client.create_merge_request(project, &request).await?)
        })
        .await
    }

    #[tool(description = "Retry a CI job.")]
    async fn gitlab_retry_job(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,
    ) -> Result<String, String> {
        self.run_write("gitlab_retry_job", &project, async {
            let project = required("project", &project)?;
            let job_id = positive("job_id", job_id)?;
            ToolResult::Ok(self.client.retry_job(project, job_id).await?)
        })
        .await
    }

    #[tool(description = "Cancel a running CI job.")]
    async fn gitlab_cancel_job(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,
    ) -> Result<String, String> {
        self.run_write("gitlab_cancel_job", &project, async {
            let project = required("project", &project)?;
            let id = positive("job_id", job_id)?;
            ToolResult::Ok(self.client.cancel_job(project, id).await?)
        })
        .await
    }

    #[tool(description = "Start a manual CI job.")]
    async fn gitlab_play_job(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Job id.")]
        job_id: u64,
    ) -> Result<String, String> {
        self.run_write("gitlab_play_job", &project, async {
            let project = required("project", &project)?;
            let id = positive("job_id", job_id)?;
            ToolResult::Ok(self.client.play_job(project, id).await?)
        })
        .await
    }

    #[tool(description = "Retry the failed and canceled jobs of a pipeline.")]
    async fn gitlab_retry_pipeline(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Pipeline id.")]
        pipeline_id: u64,
    ) -> Result<String, String> {
        self.run_write("gitlab_retry_pipeline", &project, async {
            let project = required("project", &project)?;
            let id = positive("pipeline_id", pipeline_id)?;
            ToolResult::Ok(self.client.retry_pipeline(project, id).await?)
        })
        .await
    }

    #[tool(description = "Cancel a running pipeline.")]
    async fn gitlab_cancel_pipeline(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Pipeline id.")]
        pipeline_id: u64,
    ) -> Result<String, String> {
        self.run_write("gitlab_cancel_pipeline", &project, async {
            let project = required("project", &project)?;
            let id = positive("pipeline_id", pipeline_id)?;
            ToolResult::Ok(self.client.cancel_pipeline(project, id).await?)
        })
        .await
    }

    #[tool(
        description = "Trigger a pipeline with a pipeline trigger token. The token comes from the argument or GITLAB_TRIGGER_TOKEN. Example: `{\"name\": \"gitlab_trigger_pipeline\", \"arguments\": {\"project\": \"group/project\", \"ref_name\": \"main\", \"variables\": [{\"key\": \"DEPLOY\", \"value\": \"staging\"}]}}`"
    )]
    async fn gitlab_trigger_pipeline(
        &self,
        #[tool(param)]
        #[schemars(description = "Project ID or path (e.g. group/project).")]
        project: String,

        #[tool(param)]
        #[schemars(description = "Branch or tag to run the pipeline for.")]
        ref_name: String,

        #[tool(param)]
        #[schemars(description = "Pipeline trigger token (optional, default GITLAB_TRIGGER_TOKEN).")]
        token: Option<String>,

        #[tool(param)]
        #[schemars(description = "CI variables passed to the pipeline (optional).")]
        variables: Option<Vec<PipelineVariable>>,
    ) -> Result<String, String> {
        self.run_write("gitlab_trigger_pipeline", &project, async {
            let project = required("project", &project)?;
            let git_ref = required("ref_name", &ref_name)?;
            ToolResult::Ok(
                self.client
                    .trigger_pipeline(
                        project,
                        git_ref,
                        token.as_deref(),
                        &variables.unwrap_or_default(),
                    )
                    .await?,
            )
        })
        .await
    }
}
