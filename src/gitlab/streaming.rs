//! Size-bounded reads of large GitLab responses
//!
//! - **Tail read**: keeps only the last K bytes of a response in a rolling
//!   window, whether or not the server honoured the `Range: bytes=-K` header.
//! - **Bounded download**: streams a body into a uniquely named part file, aborts as soon
//!   as the byte count passes the ceiling, and renames the part file into
//!   place only on success. A dropped or failed download removes the part file.
//!
//! Both primitives work on any `Stream` of byte chunks so they can be driven
//! by `reqwest::Response::bytes_stream()` or by an in-memory stream in tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use futures::{Stream, TryStreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::errors::{GitlabError, GitlabResult};

/// Longest sanitized path component
pub const MAX_COMPONENT_LEN: usize = 120;

static CONTENT_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*bytes\s+(\d+)-(\d+)/(\d+|\*)\s*$").expect("valid content-range regex")
});

/// Byte range reported by a `Content-Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    /// `None` when the server reported `*`
    pub total: Option<u64>,
}

impl ContentRange {
    /// Whether the range covers less than the whole resource
    pub fn is_partial(&self) -> bool {
        self.start > 0 || self.total.is_some_and(|total| self.end.saturating_add(1) < total)
    }
}

/// Parses `bytes <start>-<end>/<total|*>`
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let caps = CONTENT_RANGE_RE.captures(value)?;
    let start = caps[1].parse().ok()?;
    let end = caps[2].parse().ok()?;
    let total = match &caps[3] {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    (start <= end).then_some(ContentRange { start, end, total })
}

/// Fixed-capacity window over the most recent bytes of a stream
#[derive(Debug)]
pub struct TailWindow {
    capacity: usize,
    buf: VecDeque<u8>,
    seen: u64,
}

impl TailWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
            seen: 0,
        }
    }

    /// Appends a chunk, discarding whatever falls out of the window
    pub fn push(&mut self, chunk: &[u8]) {
        self.seen += chunk.len() as u64;
        if chunk.len() >= self.capacity {
            self.buf.clear();
            self.buf
                .extend(&chunk[chunk.len() - self.capacity..]);
            return;
        }
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.capacity);
        self.buf.drain(..overflow);
        self.buf.extend(chunk);
    }

    /// Total bytes pushed so far
    pub fn bytes_seen(&self) -> u64 {
        self.seen
    }

    /// Bytes currently retained
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Whether bytes were discarded
    pub fn overflowed(&self) -> bool {
        self.seen > self.capacity as u64
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.into()
    }
}

/// Result of a tail read
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogTail {
    pub text: String,
    pub is_partial: bool,
    pub bytes_total: Option<u64>,
    pub bytes_start: Option<u64>,
    pub bytes_end: Option<u64>,
}

impl LogTail {
    /// Tail of an empty log
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            is_partial: false,
            bytes_total: Some(0),
            bytes_start: None,
            bytes_end: None,
        }
    }
}

/// Feeds a chunk stream through a [`TailWindow`]
pub async fn fill_window<S, B, E>(stream: S, capacity: usize) -> GitlabResult<TailWindow>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<GitlabError>,
{
    let mut window = TailWindow::new(capacity);
    let mut stream = std::pin::pin!(stream);
    while let Some(chunk) = stream.try_next().await.map_err(|e| -> GitlabError { e.into() })? {
        window.push(chunk.as_ref());
    }
    Ok(window)
}

/// Keeps the first `capacity` bytes of a stream while counting the rest
///
/// Returns the retained bytes and the total length of the stream.
pub async fn fill_head<S, B, E>(stream: S, capacity: usize) -> GitlabResult<(Vec<u8>, u64)>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<GitlabError>,
{
    let mut head = Vec::with_capacity(capacity.min(64 * 1024));
    let mut total: u64 = 0;
    let mut stream = std::pin::pin!(stream);
    while let Some(chunk) = stream.try_next().await.map_err(|e| -> GitlabError { e.into() })? {
        let chunk = chunk.as_ref();
        total += chunk.len() as u64;
        let room = capacity.saturating_sub(head.len());
        head.extend_from_slice(&chunk[..room.min(chunk.len())]);
    }
    Ok((head, total))
}

/// Drops an incomplete UTF-8 sequence left at the end of a cut buffer
pub fn trim_to_char_boundary(bytes: &[u8]) -> &[u8] {
    match std::str::from_utf8(bytes) {
        Err(err) if err.error_len().is_none() => &bytes[..err.valid_up_to()],
        _ => bytes,
    }
}

/// Skips UTF-8 continuation bytes at the start of a window cut mid-character
fn skip_partial_char(bytes: &[u8]) -> &[u8] {
    let skip = bytes
        .iter()
        .take(3)
        .take_while(|b| (**b & 0xC0) == 0x80)
        .count();
    &bytes[skip..]
}

/// Builds a [`LogTail`] from a trace response
///
/// A `206` keeps the range the server reported. Any other success status is
/// treated as the full body: everything but the last `max_bytes` is
/// discarded and the result is partial iff more than `max_bytes` arrived.
pub async fn read_tail(response: reqwest::Response, max_bytes: usize) -> GitlabResult<LogTail> {
    let range = (response.status() == reqwest::StatusCode::PARTIAL_CONTENT)
        .then(|| {
            response
                .headers()
                .get(reqwest::header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range)
        })
        .flatten();

    let window = fill_window(response.bytes_stream(), max_bytes).await?;
    Ok(tail_from_window(window, range))
}

/// Combines the retained window with an optional server-reported range
pub fn tail_from_window(window: TailWindow, range: Option<ContentRange>) -> LogTail {
    let seen = window.bytes_seen();
    let overflowed = window.overflowed();
    let kept = window.len() as u64;
    debug!(bytes_seen = seen, bytes_kept = kept, "Read log tail");

    let (is_partial, bytes_total, bytes_start, bytes_end) = match range {
        Some(range) => (
            range.is_partial() || overflowed,
            range.total,
            Some(range.start),
            Some(range.end),
        ),
        None if seen == 0 => (false, Some(0), None, None),
        None => (overflowed, Some(seen), Some(seen - kept), Some(seen - 1)),
    };

    let bytes = window.into_bytes();
    let bytes = if is_partial { skip_partial_char(&bytes) } else { &bytes[..] };
    LogTail {
        text: String::from_utf8_lossy(bytes).into_owned(),
        is_partial,
        bytes_total,
        bytes_start,
        bytes_end,
    }
}

/// `<path>.<uuid>.part` next to the destination; removed on drop unless committed
///
/// The random infix keeps concurrent downloads of one destination apart.
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl PartFile {
    fn for_destination(dest: &Path) -> Self {
        let mut name = dest.as_os_str().to_owned();
        name.push(format!(".{}.part", Uuid::new_v4().simple()));
        Self {
            path: PathBuf::from(name),
            committed: false,
        }
    }

    async fn commit(mut self, dest: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, dest).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Streams `stream` into `dest`, failing once more than `max_bytes` arrive
///
/// Returns the number of bytes written. On any error nothing is left at
/// `dest` or at the part file.
pub async fn download_bounded<S, B, E>(stream: S, dest: &Path, max_bytes: u64) -> GitlabResult<u64>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<GitlabError>,
{
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let part = PartFile::for_destination(dest);
    let mut file = tokio::fs::File::create(&part.path).await?;
    let mut stream = std::pin::pin!(stream);
    let mut written: u64 = 0;

    while let Some(chunk) = stream.try_next().await.map_err(|e| -> GitlabError { e.into() })? {
        let chunk = chunk.as_ref();
        written += chunk.len() as u64;
        if written > max_bytes {
            debug!(written, max_bytes, "Download exceeded limit; aborting");
            drop(file);
            return Err(GitlabError::DownloadLimitExceeded { limit: max_bytes });
        }
        file.write_all(chunk).await?;
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    part.commit(dest).await?;
    Ok(written)
}

/// Maps a caller-supplied identifier onto `[A-Za-z0-9._-]`
///
/// Other characters become `_`, leading dots are stripped so the result can
/// never be `.`/`..` or hidden, and the length is capped.
pub fn sanitize_component(raw: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed: String = mapped
        .trim_start_matches('.')
        .chars()
        .take(MAX_COMPONENT_LEN)
        .collect();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed
    }
}

/// `<root>/<project>/<job_id>-<filename>` with every component sanitized
pub fn artifact_destination(root: &Path, project: &str, job_id: u64, filename: &str) -> PathBuf {
    root.join(sanitize_component(project))
        .join(sanitize_component(&format!("{}-{}", job_id, filename)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static [u8]]) -> impl Stream<Item = Result<&'static [u8], std::io::Error>> {
        futures::stream::iter(parts.iter().copied().map(Ok).collect::<Vec<_>>())
    }

    #[test]
    fn content_range_parsing() {
        assert_eq!(
            parse_content_range("bytes 10-20/30"),
            Some(ContentRange { start: 10, end: 20, total: Some(30) })
        );
        assert_eq!(
            parse_content_range("bytes 0-5/*"),
            Some(ContentRange { start: 0, end: 5, total: None })
        );
        assert_eq!(parse_content_range("bytes */30"), None);
        assert_eq!(parse_content_range("bytes 9-3/30"), None);
    }

    #[test]
    fn content_range_partiality() {
        assert!(ContentRange { start: 10, end: 20, total: Some(30) }.is_partial());
        assert!(ContentRange { start: 0, end: 20, total: Some(30) }.is_partial());
        assert!(!ContentRange { start: 0, end: 29, total: Some(30) }.is_partial());
        assert!(!ContentRange { start: 0, end: 29, total: None }.is_partial());
    }

    #[test]
    fn window_keeps_most_recent_bytes() {
        let mut window = TailWindow::new(4);
        window.push(b"ab");
        window.push(b"cde");
        assert_eq!(window.len(), 4);
        window.push(b"fghij");
        assert_eq!(window.len(), 4);
        assert_eq!(window.bytes_seen(), 10);
        assert!(window.overflowed());
        assert_eq!(window.into_bytes(), b"ghij");
    }

    #[tokio::test]
    async fn full_body_tail_is_partial_only_when_truncated() {
        let window = fill_window(chunks(&[b"line1\n", b"line2\n"]), 100).await.unwrap();
        let tail = tail_from_window(window, None);
        assert!(!tail.is_partial);
        assert_eq!(tail.text, "line1\nline2\n");
        assert_eq!((tail.bytes_start, tail.bytes_end, tail.bytes_total), (Some(0), Some(11), Some(12)));

        let window = fill_window(chunks(&[b"line1\n", b"line2\n"]), 6).await.unwrap();
        let tail = tail_from_window(window, None);
        assert!(tail.is_partial);
        assert_eq!(tail.text, "line2\n");
        assert_eq!((tail.bytes_start, tail.bytes_end, tail.bytes_total), (Some(6), Some(11), Some(12)));
    }

    #[tokio::test]
    async fn head_keeps_prefix_and_counts_everything() {
        let (head, total) = fill_head(chunks(&[b"abc", b"defg"]), 5).await.unwrap();
        assert_eq!(head, b"abcde");
        assert_eq!(total, 7);
    }

    #[test]
    fn cut_multibyte_characters_are_dropped() {
        let text = "ab\u{20ac}cd".as_bytes();
        assert_eq!(trim_to_char_boundary(&text[..4]), b"ab");
        assert_eq!(trim_to_char_boundary(&text[..5]), "ab\u{20ac}".as_bytes());
        assert_eq!(trim_to_char_boundary(b"ok\xff"), b"ok\xff");
        assert_eq!(skip_partial_char(&text[3..]), b"cd");
    }

    #[tokio::test]
    async fn partial_tail_starts_on_a_character() {
        let window = fill_window(futures::stream::iter(vec![Ok::<_, std::io::Error>(
            "x\u{20ac}yz".as_bytes().to_vec(),
        )]), 4)
        .await
        .unwrap();
        let tail = tail_from_window(window, None);
        assert!(tail.is_partial);
        assert_eq!(tail.text, "yz");
    }

    #[test]
    fn part_files_are_unique_per_download() {
        let dest = Path::new("/tmp/artifacts/1-a.zip");
        let first = PartFile::for_destination(dest);
        let second = PartFile::for_destination(dest);
        assert_ne!(first.path, second.path);
        assert_eq!(first.path.parent(), dest.parent());
        let name = first.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("1-a.zip.") && name.ends_with(".part"), "{}", name);
    }

    #[tokio::test]
    async fn empty_body_tail() {
        let window = fill_window(chunks(&[]), 10).await.unwrap();
        assert_eq!(tail_from_window(window, None), LogTail::empty());
    }

    #[tokio::test]
    async fn bounded_download_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("1-a.zip");
        let written = download_bounded(chunks(&[b"0123", b"4567"]), &dest, 8).await.unwrap();
        assert_eq!(written, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"01234567");
        let names: Vec<_> = std::fs::read_dir(dest.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, ["1-a.zip"]);
    }

    #[tokio::test]
    async fn bounded_download_removes_partial_file_on_limit() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("1-a.zip");
        let err = download_bounded(chunks(&[b"0123", b"4567", b"89"]), &dest, 6)
            .await
            .unwrap_err();
        assert!(matches!(err, GitlabError::DownloadLimitExceeded { limit: 6 }));
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn sanitization_blocks_traversal() {
        assert_eq!(sanitize_component("group/project"), "group_project");
        assert_eq!(sanitize_component("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_component(".."), "_");
        assert_eq!(sanitize_component("..hidden"), "hidden");
        assert_eq!(sanitize_component("ünï"), "_n_");
        assert_eq!(sanitize_component(&"x".repeat(500)).len(), MAX_COMPONENT_LEN);
    }

    #[test]
    fn artifact_destination_layout() {
        let path = artifact_destination(Path::new("/tmp/root"), "group/project", 1, "a.zip");
        assert_eq!(path, PathBuf::from("/tmp/root/group_project/1-a.zip"));
    }
}
