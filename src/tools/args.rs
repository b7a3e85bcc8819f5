//! Argument bounds and tool-level errors

use std::fmt::Display;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use thiserror::Error;

use crate::gitlab::client::queries::{
    CommitAction, CommitActionKind, ContentEncoding, DiffPosition, IssueUpdate, ListQuery, Page,
};
use crate::gitlab::{GitlabError, PublicError, to_public_error};
use crate::policy::{PolicyError, validate_repo_file_path};

pub const MAX_PER_PAGE: u32 = 100;
pub const DEFAULT_PER_PAGE: u32 = 20;

pub const DEFAULT_TAIL_LINES: u32 = 200;
pub const MAX_TAIL_LINES: u32 = 5_000;
pub const DEFAULT_TAIL_MAX_BYTES: u64 = 200_000;
pub const MAX_TAIL_MAX_BYTES: u64 = 2_000_000;

pub const DEFAULT_ARTIFACT_MAX_BYTES: u64 = 10_000_000;
pub const MAX_ARTIFACT_MAX_BYTES: u64 = 50_000_000;

pub const DEFAULT_JOB_LOG_MAX_CHARS: u64 = 50_000;
pub const MAX_JOB_LOG_MAX_CHARS: u64 = 200_000;
pub const MAX_FILE_CHARS: usize = 200_000;

pub const MAX_SEARCH_QUERY_CHARS: usize = 200;
pub const DEFAULT_CONTEXT_LINES: u32 = 2;
pub const MAX_CONTEXT_LINES: u32 = 50;
pub const DEFAULT_MAX_MATCHES: u32 = 10;
pub const MAX_MATCHES: u32 = 50;

pub const MAX_NOTE_BODY_CHARS: usize = 50_000;
pub const MAX_MR_DESCRIPTION_CHARS: usize = 100_000;
pub const MAX_COMMIT_MESSAGE_CHARS: usize = 10_000;
pub const MAX_LABELS: usize = 50;
pub const MAX_REVIEWERS: usize = 20;

pub const MAX_COMMIT_ACTIONS: usize = 20;
pub const MAX_ACTION_CONTENT_CHARS: usize = 200_000;
pub const MAX_TOTAL_CONTENT_CHARS: usize = 500_000;
pub const MAX_ACTION_DECODED_BYTES: usize = 200_000;

pub const DEFAULT_MAX_FILES: u32 = 50;
pub const MAX_FILES: u32 = 200;
pub const DEFAULT_DIFF_CHARS_PER_FILE: u32 = 10_000;
pub const MAX_DIFF_CHARS_PER_FILE: u32 = 100_000;
pub const DEFAULT_TOTAL_DIFF_CHARS: u32 = 50_000;
pub const MAX_TOTAL_DIFF_CHARS: u32 = 500_000;

/// Why a tool call failed
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Gitlab(#[from] GitlabError),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ToolError {
    pub fn to_public(&self) -> PublicError {
        match self {
            ToolError::Gitlab(err) => to_public_error(err),
            other => PublicError {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

/// `value` or `default`, rejected unless within `min..=max`
pub fn bounded<T>(name: &str, value: Option<T>, default: T, min: T, max: T) -> ToolResult<T>
where
    T: PartialOrd + Display + Copy,
{
    let value = value.unwrap_or(default);
    if value < min || value > max {
        return Err(ToolError::InvalidArgument(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        )));
    }
    Ok(value)
}

/// Rejects blank required strings
pub fn required<'a>(name: &str, value: &'a str) -> ToolResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::InvalidArgument(format!("{} must not be empty", name)));
    }
    Ok(trimmed)
}

/// Rejects zero ids and iids
pub fn positive(name: &str, value: u64) -> ToolResult<u64> {
    if value == 0 {
        return Err(ToolError::InvalidArgument(format!("{} must be >= 1", name)));
    }
    Ok(value)
}

pub fn page(page: Option<u32>, per_page: Option<u32>) -> ToolResult<Page> {
    Ok(Page::new(
        bounded("page", page, 1, 1, u32::MAX)?,
        bounded("per_page", per_page, DEFAULT_PER_PAGE, 1, MAX_PER_PAGE)?,
    ))
}

/// Labels as GitLab expects them: comma separated, or absent
pub fn join_labels(labels: Option<Vec<String>>) -> Option<String> {
    labels
        .map(|l| {
            l.iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(",")
        })
        .filter(|joined| !joined.is_empty())
}

fn invalid(message: impl Into<String>) -> ToolError {
    ToolError::InvalidArgument(message.into())
}

/// Rejects text longer than `max` characters
pub fn at_most<'a>(name: &str, value: &'a str, max: usize) -> ToolResult<&'a str> {
    let length = value.chars().count();
    if length > max {
        return Err(invalid(format!(
            "{} must be at most {} characters (got {})",
            name, max, length
        )));
    }
    Ok(value)
}

/// Required note or discussion body
pub fn note_body<'a>(value: &'a str) -> ToolResult<&'a str> {
    at_most("body", required("body", value)?, MAX_NOTE_BODY_CHARS)
}

/// Label list for an update; unlike [`join_labels`] an empty list is kept so it can clear labels
pub fn label_set(name: &str, labels: Option<Vec<String>>) -> ToolResult<Option<String>> {
    let Some(labels) = labels else {
        return Ok(None);
    };
    if labels.len() > MAX_LABELS {
        return Err(invalid(format!("{} must have at most {} entries", name, MAX_LABELS)));
    }
    if labels.iter().any(|l| l.trim().is_empty()) {
        return Err(invalid(format!("{} must not contain empty labels", name)));
    }
    Ok(Some(
        labels.iter().map(|l| l.trim()).collect::<Vec<_>>().join(","),
    ))
}

/// `labels` replaces the set, `add_labels`/`remove_labels` patch it; never both
pub fn exclusive_label_modes(
    labels: &Option<Vec<String>>,
    add_labels: &Option<Vec<String>>,
    remove_labels: &Option<Vec<String>>,
) -> ToolResult<()> {
    if labels.is_some() && (add_labels.is_some() || remove_labels.is_some()) {
        return Err(invalid(
            "use either 'labels' (replace) or 'add_labels'/'remove_labels' (patch), not both",
        ));
    }
    Ok(())
}

pub fn state_event(value: Option<String>) -> ToolResult<Option<String>> {
    match value.as_deref().map(str::trim) {
        None => Ok(None),
        Some(event @ ("close" | "reopen")) => Ok(Some(event.to_string())),
        Some(other) => Err(invalid(format!(
            "state_event must be 'close' or 'reopen' (got '{}')",
            other
        ))),
    }
}

/// Shared fields of issue and merge request updates
pub fn issue_update(
    title: Option<String>,
    description: Option<String>,
    state: Option<String>,
    labels: Option<Vec<String>>,
    add_labels: Option<Vec<String>>,
    remove_labels: Option<Vec<String>>,
) -> ToolResult<IssueUpdate> {
    exclusive_label_modes(&labels, &add_labels, &remove_labels)?;
    let title = match title {
        Some(title) => Some(required("title", &title)?.to_string()),
        None => None,
    };
    if let Some(description) = &description {
        at_most("description", description, MAX_MR_DESCRIPTION_CHARS)?;
    }
    Ok(IssueUpdate {
        title,
        description,
        state_event: state_event(state)?,
        labels: label_set("labels", labels)?,
        add_labels: label_set("add_labels", add_labels)?.filter(|l| !l.is_empty()),
        remove_labels: label_set("remove_labels", remove_labels)?.filter(|l| !l.is_empty()),
    })
}

pub fn list_query(
    project: &str,
    search: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
) -> ToolResult<ListQuery> {
    Ok(ListQuery {
        project: required("project", project)?.to_string(),
        search: search.filter(|s| !s.trim().is_empty()),
        page: self::page(page, per_page)?,
    })
}

pub fn require_update(is_empty: bool) -> ToolResult<()> {
    if is_empty {
        return Err(invalid("at least one update field must be provided"));
    }
    Ok(())
}

/// An inline position needs a complete new and/or old side with valid paths
pub fn check_position(position: &DiffPosition) -> ToolResult<()> {
    for (name, sha) in [
        ("base_sha", &position.base_sha),
        ("start_sha", &position.start_sha),
        ("head_sha", &position.head_sha),
    ] {
        required(name, sha)?;
    }
    let sides = [
        ("new", &position.new_path, position.new_line),
        ("old", &position.old_path, position.old_line),
    ];
    let mut complete = 0;
    for (side, path, line) in sides {
        match (path, line) {
            (None, None) => {}
            (Some(path), Some(line)) if line >= 1 => {
                validate_repo_file_path(path)?;
                complete += 1;
            }
            _ => {
                return Err(invalid(format!(
                    "position needs both '{side}_path' and '{side}_line' (line >= 1)"
                )));
            }
        }
    }
    if complete == 0 {
        return Err(invalid(
            "position must include 'new_path'/'new_line' or 'old_path'/'old_line'",
        ));
    }
    Ok(())
}

/// Checks commit actions and trims them to what GitLab needs
///
/// Base64 content must decode to text: binary commits are refused.
pub fn commit_actions(actions: Vec<CommitAction>) -> ToolResult<Vec<CommitAction>> {
    if actions.is_empty() || actions.len() > MAX_COMMIT_ACTIONS {
        return Err(invalid(format!(
            "actions must have between 1 and {} entries",
            MAX_COMMIT_ACTIONS
        )));
    }
    let mut total_chars = 0;
    let mut prepared = Vec::with_capacity(actions.len());
    for mut action in actions {
        validate_repo_file_path(&action.file_path)?;
        let path = action.file_path.clone();
        if action.action == CommitActionKind::Delete {
            action.content = None;
        }
        match action.content.as_deref() {
            None | Some("") if action.action != CommitActionKind::Delete => {
                return Err(invalid(format!("content is required for '{}'", path)));
            }
            Some(content) => {
                let chars = content.chars().count();
                if chars > MAX_ACTION_CONTENT_CHARS {
                    return Err(invalid(format!(
                        "content for '{}' exceeds {} characters",
                        path, MAX_ACTION_CONTENT_CHARS
                    )));
                }
                if content.contains('\0') {
                    return Err(invalid(format!("content for '{}' must not contain NUL", path)));
                }
                if action.encoding == Some(ContentEncoding::Base64) {
                    check_base64_text(&path, content)?;
                }
                total_chars += chars;
            }
            None => {}
        }
        if action.encoding == Some(ContentEncoding::Text) {
            action.encoding = None;
        }
        prepared.push(action);
    }
    if total_chars > MAX_TOTAL_CONTENT_CHARS {
        return Err(invalid(format!(
            "total content exceeds {} characters",
            MAX_TOTAL_CONTENT_CHARS
        )));
    }
    Ok(prepared)
}

fn check_base64_text(path: &str, content: &str) -> ToolResult<()> {
    let compact: String = content.split_whitespace().collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| invalid(format!("content for '{}' is not valid base64: {}", path, e)))?;
    if bytes.len() > MAX_ACTION_DECODED_BYTES {
        return Err(invalid(format!(
            "decoded content for '{}' exceeds {} bytes",
            path, MAX_ACTION_DECODED_BYTES
        )));
    }
    if bytes.contains(&0) || std::str::from_utf8(&bytes).is_err() {
        return Err(invalid(format!(
            "base64 content for '{}' is not UTF-8 text; binary commits are refused",
            path
        )));
    }
    Ok(())
}

/// Pretty JSON for success, `{"error", "status"}` JSON for failure
pub fn render<T: Serialize>(outcome: ToolResult<T>) -> Result<String, String> {
    let encoded = outcome.and_then(|value| Ok(serde_json::to_string_pretty(&value)?));
    encoded.map_err(|err| {
        let public = err.to_public();
        serde_json::json!({ "error": public.message, "status": public.status }).to_string()
    })
}
