//! Response shaping for the GitLab tools
//!
//! Facade records are mostly returned as-is. The types here cover the
//! tools that bound their output: truncated logs, file contents and diffs,
//! log tails cut to a line count and log searches with context.

use serde::Serialize;

use crate::gitlab::client::models::{MergeRequestChanges, RepoFile};
use crate::gitlab::streaming::LogTail;

/// Longest line returned by a log search
pub const MAX_LINE_CHARS: usize = 4_000;

/// Text cut to a character budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub text: String,
    pub truncated: bool,
    pub original_length: usize,
}

/// Keeps the first `max_chars` characters and appends a marker naming the cut
pub fn truncate_text(text: &str, max_chars: usize) -> Truncated {
    let original_length = text.chars().count();
    if original_length <= max_chars {
        return Truncated {
            text: text.to_string(),
            truncated: false,
            original_length,
        };
    }
    let clipped: String = text.chars().take(max_chars).collect();
    Truncated {
        text: format!(
            "{}\n\n[truncated: original_length={} max_chars={}]",
            clipped, original_length, max_chars
        ),
        truncated: true,
        original_length,
    }
}

/// [`truncate_text`] for the head of a log that may continue past what was read
///
/// When only a prefix was read the original length is the byte count the server sent.
pub fn truncate_log_head(head: &str, max_chars: usize, read_whole: bool, bytes_total: u64) -> Truncated {
    if read_whole {
        return truncate_text(head, max_chars);
    }
    let clipped: String = head.chars().take(max_chars).collect();
    Truncated {
        text: format!(
            "{}\n\n[truncated: original_bytes={} max_chars={}]",
            clipped, bytes_total, max_chars
        ),
        truncated: true,
        original_length: usize::try_from(bytes_total).unwrap_or(usize::MAX),
    }
}

fn truncate_line(line: &str) -> String {
    let length = line.chars().count();
    if length <= MAX_LINE_CHARS {
        return line.to_string();
    }
    let clipped: String = line.chars().take(MAX_LINE_CHARS).collect();
    format!("{}...[truncated_line original_length={}]", clipped, length)
}

fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}

/// Last `count` lines of `text`; a trailing newline does not count as a line
pub fn tail_lines(text: &str, count: usize) -> Vec<&str> {
    let mut lines = split_lines(text);
    if lines.last() == Some(&"") {
        lines.pop();
    }
    let start = lines.len().saturating_sub(count);
    lines.split_off(start)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogMatch {
    /// 1-based line number within the searched tail
    pub line_number_in_snippet: usize,
    pub line: String,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
}

/// Substring search over the lines of `text`, stopping after `max_matches`
pub fn search_lines(
    text: &str,
    query: &str,
    case_insensitive: bool,
    context: usize,
    max_matches: usize,
) -> Vec<LogMatch> {
    let lines = split_lines(text);
    let needle = if case_insensitive {
        query.to_lowercase()
    } else {
        query.to_string()
    };

    let mut matches = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        let hit = if case_insensitive {
            line.to_lowercase().contains(&needle)
        } else {
            line.contains(&needle)
        };
        if !hit {
            continue;
        }
        let start = i.saturating_sub(context);
        let end = (i + context + 1).min(lines.len());
        matches.push(LogMatch {
            line_number_in_snippet: i + 1,
            line: truncate_line(line),
            context_before: lines[start..i].iter().map(|l| truncate_line(l)).collect(),
            context_after: lines[i + 1..end].iter().map(|l| truncate_line(l)).collect(),
        });
        if matches.len() >= max_matches {
            break;
        }
    }
    matches
}

#[derive(Debug, Clone, Serialize)]
pub struct JobLogResponse {
    pub job_id: u64,
    pub log: String,
    pub log_truncated: bool,
    /// Characters when the whole log was read, otherwise bytes
    pub log_original_length: usize,
    /// Bytes the server sent, including any not read into memory
    pub log_bytes_total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogTailResponse {
    pub job_id: u64,
    pub lines_requested: u32,
    pub lines_returned: usize,
    pub max_bytes: u64,
    pub is_partial: bool,
    pub bytes_total: Option<u64>,
    pub bytes_start: Option<u64>,
    pub bytes_end: Option<u64>,
    pub log_tail: String,
}

impl LogTailResponse {
    pub fn new(job_id: u64, lines: u32, max_bytes: u64, tail: &LogTail) -> Self {
        let kept = tail_lines(&tail.text, lines as usize);
        Self {
            job_id,
            lines_requested: lines,
            lines_returned: kept.len(),
            max_bytes,
            is_partial: tail.is_partial,
            bytes_total: tail.bytes_total,
            bytes_start: tail.bytes_start,
            bytes_end: tail.bytes_end,
            log_tail: kept.join("\n"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSearchResponse {
    pub job_id: u64,
    pub query: String,
    pub case_insensitive: bool,
    pub context_lines: u32,
    pub max_matches: u32,
    pub searched_tail_bytes: u64,
    pub is_partial: bool,
    pub bytes_total: Option<u64>,
    pub bytes_start: Option<u64>,
    pub bytes_end: Option<u64>,
    pub matches_found: usize,
    pub matches: Vec<LogMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileResponse {
    pub file_path: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub content: String,
    pub size_bytes: usize,
    pub content_truncated: bool,
    pub content_original_length: usize,
}

impl FileResponse {
    pub fn new(file: RepoFile, max_chars: usize) -> Self {
        let content = truncate_text(&file.content, max_chars);
        Self {
            file_path: file.file_path,
            git_ref: file.git_ref,
            content: content.text,
            size_bytes: file.size_bytes,
            content_truncated: content.truncated,
            content_original_length: content.original_length,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    pub old_path: String,
    pub new_path: String,
    pub new_file: bool,
    pub renamed_file: bool,
    pub deleted_file: bool,
    pub diff: String,
    pub diff_truncated: bool,
    pub diff_original_length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangesResponse {
    pub iid: u64,
    pub title: String,
    pub source_branch: String,
    pub target_branch: String,
    pub changes_total: usize,
    pub changes_returned: usize,
    pub diffs_truncated: bool,
    pub changes: Vec<DiffEntry>,
}

/// Diff budgets for [`ChangesResponse::new`]
#[derive(Debug, Clone, Copy)]
pub struct DiffBudget {
    pub max_files: usize,
    pub per_file_chars: usize,
    pub total_chars: usize,
}

impl ChangesResponse {
    /// Caps the number of files, each diff, and the sum of all diffs
    pub fn new(changes: MergeRequestChanges, budget: DiffBudget) -> Self {
        let changes_total = changes.changes.len();
        let mut remaining = budget.total_chars;
        let mut any_truncated = false;
        let mut out = Vec::new();

        for change in changes.changes.into_iter().take(budget.max_files) {
            let allow = budget.per_file_chars.min(remaining);
            let diff = truncate_text(&change.diff, allow);
            any_truncated |= diff.truncated;
            remaining -= diff.original_length.min(allow);
            out.push(DiffEntry {
                old_path: change.old_path,
                new_path: change.new_path,
                new_file: change.new_file,
                renamed_file: change.renamed_file,
                deleted_file: change.deleted_file,
                diff: diff.text,
                diff_truncated: diff.truncated,
                diff_original_length: diff.original_length,
            });
            if remaining == 0 {
                break;
            }
        }

        Self {
            iid: changes.iid,
            title: changes.title,
            source_branch: changes.source_branch,
            target_branch: changes.target_branch,
            changes_total,
            changes_returned: out.len(),
            diffs_truncated: any_truncated || out.len() < changes_total.min(budget.max_files),
            changes: out,
        }
    }
}
