//! Which tools may run, and against which projects
//!
//! [`Policy`] is a pure predicate over a tool name and, for writes, a
//! project. It is consulted at call time by every tool.

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

/// Access class of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolAccess {
    Read,
    Write,
}

/// Every tool the server exposes with its access class
pub const TOOL_CATALOG: &[(&str, ToolAccess)] = &[
    ("gitlab_get_current_user", ToolAccess::Read),
    ("gitlab_list_projects", ToolAccess::Read),
    ("gitlab_get_project", ToolAccess::Read),
    ("gitlab_list_branches", ToolAccess::Read),
    ("gitlab_list_tags", ToolAccess::Read),
    ("gitlab_list_project_labels", ToolAccess::Read),
    ("gitlab_search_issues", ToolAccess::Read),
    ("gitlab_get_issue", ToolAccess::Read),
    ("gitlab_list_issue_notes", ToolAccess::Read),
    ("gitlab_list_merge_requests", ToolAccess::Read),
    ("gitlab_get_merge_request", ToolAccess::Read),
    ("gitlab_list_merge_request_notes", ToolAccess::Read),
    ("gitlab_list_merge_request_discussions", ToolAccess::Read),
    ("gitlab_get_merge_request_changes", ToolAccess::Read),
    ("gitlab_get_file", ToolAccess::Read),
    ("gitlab_list_repo_tree", ToolAccess::Read),
    ("gitlab_search_code", ToolAccess::Read),
    ("gitlab_list_pipelines", ToolAccess::Read),
    ("gitlab_get_pipeline", ToolAccess::Read),
    ("gitlab_list_pipeline_jobs", ToolAccess::Read),
    ("gitlab_get_job_log", ToolAccess::Read),
    ("gitlab_get_job_log_tail", ToolAccess::Read),
    ("gitlab_search_job_log", ToolAccess::Read),
    ("gitlab_get_job_artifacts", ToolAccess::Read),
    ("gitlab_download_job_artifacts", ToolAccess::Read),
    ("gitlab_create_issue", ToolAccess::Write),
    ("gitlab_update_issue", ToolAccess::Write),
    ("gitlab_add_issue_note", ToolAccess::Write),
    ("gitlab_update_merge_request", ToolAccess::Write),
    ("gitlab_add_merge_request_note", ToolAccess::Write),
    ("gitlab_create_merge_request_discussion", ToolAccess::Write),
    ("gitlab_add_merge_request_discussion_note", ToolAccess::Write),
    ("gitlab_update_merge_request_discussion_note", ToolAccess::Write),
    ("gitlab_approve_merge_request", ToolAccess::Write),
    ("gitlab_unapprove_merge_request", ToolAccess::Write),
    ("gitlab_merge_merge_request", ToolAccess::Write),
    ("gitlab_create_branch", ToolAccess::Write),
    ("gitlab_create_commit", ToolAccess::Write),
    ("gitlab_create_merge_request", ToolAccess::Write),
    ("gitlab_retry_job", ToolAccess::Write),
    ("gitlab_cancel_job", ToolAccess::Write),
    ("gitlab_play_job", ToolAccess::Write),
    ("gitlab_retry_pipeline", ToolAccess::Write),
    ("gitlab_cancel_pipeline", ToolAccess::Write),
    ("gitlab_trigger_pipeline", ToolAccess::Write),
];

/// Access class of a catalog tool
pub fn tool_access(name: &str) -> Option<ToolAccess> {
    TOOL_CATALOG
        .iter()
        .find(|(tool, _)| *tool == name)
        .map(|(_, access)| *access)
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Tool '{0}' is not enabled (GITLAB_MCP_ENABLED_TOOLS).")]
    NotEnabled(String),

    #[error("Tool '{0}' is disabled (GITLAB_MCP_DISABLED_TOOLS).")]
    Disabled(String),

    #[error("Write tools are disabled: server is running in read-only mode.")]
    ReadOnly,

    #[error("Write is not permitted for project '{0}': not in GITLAB_MCP_WRITE_PROJECT_ALLOWLIST.")]
    ProjectNotAllowed(String),

    #[error("Invalid arguments: {0}")]
    InvalidPath(String),
}

#[derive(Debug, Clone, Default)]
pub struct Policy {
    read_only: bool,
    enabled: Option<HashSet<String>>,
    disabled: HashSet<String>,
    write_allowlist: Option<HashSet<String>>,
}

fn warn_unknown(source: &str, names: &[String]) {
    for name in names.iter().filter(|n| tool_access(n).is_none()) {
        warn!(tool = %name, source, "Unknown tool name in configuration");
    }
}

impl Policy {
    /// Empty `enabled` or `write_allowlist` means no restriction
    pub fn new(
        read_only: bool,
        enabled: &[String],
        disabled: &[String],
        write_allowlist: &[String],
    ) -> Self {
        warn_unknown("GITLAB_MCP_ENABLED_TOOLS", enabled);
        warn_unknown("GITLAB_MCP_DISABLED_TOOLS", disabled);
        Self {
            read_only,
            enabled: (!enabled.is_empty()).then(|| enabled.iter().cloned().collect()),
            disabled: disabled.iter().cloned().collect(),
            write_allowlist: (!write_allowlist.is_empty())
                .then(|| write_allowlist.iter().cloned().collect()),
        }
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Whether `name` may run at all
    pub fn check_tool(&self, name: &str) -> Result<(), PolicyError> {
        if let Some(enabled) = &self.enabled {
            if !enabled.contains(name) {
                return Err(PolicyError::NotEnabled(name.to_string()));
            }
        }
        if self.disabled.contains(name) {
            return Err(PolicyError::Disabled(name.to_string()));
        }
        if self.read_only && tool_access(name) == Some(ToolAccess::Write) {
            return Err(PolicyError::ReadOnly);
        }
        Ok(())
    }

    /// Whether a write tool may touch `project`
    pub fn check_write(&self, name: &str, project: &str) -> Result<(), PolicyError> {
        self.check_tool(name)?;
        if self.read_only {
            return Err(PolicyError::ReadOnly);
        }
        match &self.write_allowlist {
            Some(allowed) if !allowed.contains(project) => {
                Err(PolicyError::ProjectNotAllowed(project.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Names of the tools that pass [`Policy::check_tool`]
    pub fn visible_tools(&self) -> Vec<&'static str> {
        TOOL_CATALOG
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| self.check_tool(name).is_ok())
            .collect()
    }
}

/// Rejects repository paths that are absolute or try to walk out of the tree
pub fn validate_repo_file_path(path: &str) -> Result<(), PolicyError> {
    let invalid = |reason: &str| Err(PolicyError::InvalidPath(format!("file_path {}", reason)));
    if path.is_empty() {
        return invalid("must not be empty");
    }
    if path.contains('\0') {
        return invalid("must not contain NUL");
    }
    if path.contains('\\') {
        return invalid("must not contain backslashes");
    }
    if path.starts_with('/') {
        return invalid("must be relative");
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return invalid("must not contain empty, '.' or '..' segments");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_policy_allows_everything() {
        let policy = Policy::default();
        assert_eq!(policy.visible_tools().len(), TOOL_CATALOG.len());
        assert!(policy.check_write("gitlab_create_issue", "g/p").is_ok());
    }

    #[test]
    fn read_only_blocks_writes() {
        let policy = Policy::new(true, &[], &[], &[]);
        assert_eq!(policy.check_tool("gitlab_get_issue"), Ok(()));
        assert_eq!(policy.check_tool("gitlab_retry_job"), Err(PolicyError::ReadOnly));
        assert!(!policy.visible_tools().contains(&"gitlab_trigger_pipeline"));
    }

    #[test]
    fn merge_request_review_tools_are_writes() {
        let policy = Policy::new(true, &[], &[], &[]);
        for tool in [
            "gitlab_update_issue",
            "gitlab_add_merge_request_note",
            "gitlab_create_merge_request_discussion",
            "gitlab_update_merge_request_discussion_note",
            "gitlab_approve_merge_request",
            "gitlab_unapprove_merge_request",
            "gitlab_merge_merge_request",
            "gitlab_create_commit",
            "gitlab_play_job",
            "gitlab_retry_pipeline",
        ] {
            assert_eq!(policy.check_tool(tool), Err(PolicyError::ReadOnly), "{}", tool);
        }
        for tool in [
            "gitlab_list_branches",
            "gitlab_list_issue_notes",
            "gitlab_list_merge_request_discussions",
        ] {
            assert_eq!(policy.check_tool(tool), Ok(()), "{}", tool);
        }
        assert_eq!(TOOL_CATALOG.len(), 45);
        assert_eq!(policy.visible_tools().len(), 25);
    }

    #[test]
    fn enabled_and_disabled_sets() {
        let policy = Policy::new(
            false,
            &names(&["gitlab_get_issue", "gitlab_get_file"]),
            &names(&["gitlab_get_file"]),
            &[],
        );
        assert!(policy.check_tool("gitlab_get_issue").is_ok());
        assert_eq!(
            policy.check_tool("gitlab_get_file"),
            Err(PolicyError::Disabled("gitlab_get_file".into()))
        );
        assert_eq!(
            policy.check_tool("gitlab_get_project"),
            Err(PolicyError::NotEnabled("gitlab_get_project".into()))
        );
        assert_eq!(policy.visible_tools(), vec!["gitlab_get_issue"]);
    }

    #[test]
    fn write_allowlist_is_per_project() {
        let policy = Policy::new(false, &[], &[], &names(&["group/allowed"]));
        assert!(policy.check_write("gitlab_create_branch", "group/allowed").is_ok());
        let err = policy
            .check_write("gitlab_create_branch", "group/other")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Write is not permitted for project 'group/other': not in GITLAB_MCP_WRITE_PROJECT_ALLOWLIST."
        );
    }

    #[test]
    fn repo_paths() {
        assert!(validate_repo_file_path("src/main.rs").is_ok());
        assert!(validate_repo_file_path(".gitlab-ci.yml").is_ok());
        for bad in ["", "/etc/passwd", "a//b", "a/./b", "../x", "a\\b", "a\0b", "dir/"] {
            assert!(validate_repo_file_path(bad).is_err(), "{:?}", bad);
        }
    }
}
