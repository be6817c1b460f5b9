use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::probe::{DirProbe, ICON_PREFIX};

const DEFAULT_PROGRAM: &str = "yt-dlp";

// stderr signatures yt-dlp prints for items that cannot be fetched *yet*
const NOT_YET_SIGNATURES: &[&str] = &["live event will begin", "premieres in", "premiere will begin"];

/// Options for one downloader invocation. One attempt per item per run;
/// the caller decides fatal-vs-skip from the error classification.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub dest: PathBuf,
    pub format: String,
    pub extract_audio: bool,
    pub proxy: Option<String>,
}

/// Successful invocation: exactly one media file written into `dest`
/// (plus, opportunistically, a thumbnail under the icon prefix).
#[derive(Debug, Clone)]
pub struct Download {
    pub path: PathBuf,
    pub extension: String,
}

#[derive(Debug)]
pub enum DownloadError {
    /// The item is not downloadable yet (unaired live event or premiere).
    NotYetAvailable,
    /// The tool could not be started at all.
    Spawn(std::io::Error),
    /// The tool ran and failed for any other reason.
    Tool { status: Option<i32>, stderr: String },
    /// The tool reported success but its result could not be interpreted.
    UnreadableResult(String),
}

impl DownloadError {
    pub fn is_not_yet_available(&self) -> bool {
        matches!(self, DownloadError::NotYetAvailable)
    }
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadError::NotYetAvailable => write!(f, "item is not downloadable yet"),
            DownloadError::Spawn(err) => write!(f, "could not start downloader: {err}"),
            DownloadError::Tool { status, stderr } => {
                write!(f, "downloader failed (code={status:?}): {}", stderr.trim())
            }
            DownloadError::UnreadableResult(msg) => {
                write!(f, "unreadable downloader result: {msg}")
            }
        }
    }
}

impl std::error::Error for DownloadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DownloadError::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

#[async_trait]
pub trait Downloader: Send + Sync {
    async fn invoke(
        &self,
        video_id: &str,
        source_url: &str,
        opts: &DownloadOptions,
    ) -> Result<Download, DownloadError>;
}

/// Shells out to yt-dlp. No internal retries.
pub struct YtDlp {
    program: String,
}

impl YtDlp {
    pub fn new() -> Self {
        YtDlp { program: DEFAULT_PROGRAM.to_string() }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        YtDlp { program: program.into() }
    }

    fn build_command(&self, source_url: &str, opts: &DownloadOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-o")
            .arg(format!("{}/%(id)s.%(ext)s", opts.dest.display()))
            .arg("-o")
            .arg(format!("thumbnail:{}/{}.%(id)s.%(ext)s", opts.dest.display(), ICON_PREFIX))
            .arg("--write-thumbnail")
            .arg("--no-progress")
            .arg("--no-playlist")
            // guard against live/upcoming items instead of failing on them
            .arg("--match-filter")
            .arg("!is_live & !is_upcoming")
            .arg("-f")
            .arg(&opts.format)
            .arg("-j")
            .arg("--no-simulate");
        if opts.extract_audio {
            cmd.arg("-x");
        }
        if let Some(proxy) = &opts.proxy {
            cmd.arg("--proxy").arg(proxy);
        }
        cmd.arg(source_url);
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }

    fn classify_failure(status: Option<i32>, stderr: String) -> DownloadError {
        let lower = stderr.to_lowercase();
        if NOT_YET_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
            return DownloadError::NotYetAvailable;
        }
        DownloadError::Tool { status, stderr }
    }

    fn resolve_result(
        video_id: &str,
        dest: &Path,
        stdout: &str,
    ) -> Result<Download, DownloadError> {
        let line = stdout.lines().rev().find(|l| l.trim_start().starts_with('{'));
        let Some(line) = line else {
            // success with no info line: the match filter skipped the item
            return Err(DownloadError::NotYetAvailable);
        };
        let info: Value = serde_json::from_str(line)
            .map_err(|e| DownloadError::UnreadableResult(e.to_string()))?;

        // the post-move filepath is authoritative; -x may have changed
        // the extension reported in the info dict
        let filepath = info
            .get("requested_downloads")
            .and_then(|d| d.get(0))
            .and_then(|d| d.get("filepath"))
            .and_then(Value::as_str)
            .map(PathBuf::from);
        if let Some(path) = filepath {
            if path.is_file() {
                let extension = path
                    .extension()
                    .map(|e| e.to_string_lossy().to_string())
                    .unwrap_or_default();
                return Ok(Download { path, extension });
            }
        }

        // fall back to probing the destination for the id
        match DirProbe::new(dest).media(video_id) {
            Some(file) => Ok(Download { path: file.path, extension: file.extension }),
            None => Err(DownloadError::UnreadableResult(format!(
                "no media file for {} in {}",
                video_id,
                dest.display()
            ))),
        }
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for YtDlp {
    async fn invoke(
        &self,
        video_id: &str,
        source_url: &str,
        opts: &DownloadOptions,
    ) -> Result<Download, DownloadError> {
        let output = self
            .build_command(source_url, opts)
            .output()
            .await
            .map_err(DownloadError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(Self::classify_failure(output.status.code(), stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::resolve_result(video_id, &opts.dest, &stdout)
    }
}

/// Test downloader: queued results plus recorded calls. A queued success
/// materializes a stub file so downstream size/probe logic has something
/// real to look at.
#[derive(Default)]
pub struct MockDownloader {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<Download, DownloadError>>>,
    calls: std::sync::Mutex<Vec<String>>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, resp: Result<Download, DownloadError>) {
        self.responses.lock().unwrap().push_back(resp);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn invoke(
        &self,
        video_id: &str,
        _source_url: &str,
        _opts: &DownloadOptions,
    ) -> Result<Download, DownloadError> {
        self.calls.lock().unwrap().push(video_id.to_string());
        let resp = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(DownloadError::UnreadableResult("mock queue empty".to_string())));
        if let Ok(download) = &resp {
            if !download.path.exists() {
                std::fs::write(&download.path, b"stub-media").expect("mock stub file");
            }
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_event_stderr_is_not_yet_available() {
        let err = YtDlp::classify_failure(
            Some(1),
            "ERROR: [youtube] abc: This live event will begin in 3 hours".to_string(),
        );
        assert!(err.is_not_yet_available());

        let err = YtDlp::classify_failure(Some(1), "ERROR: Premieres in 20 minutes".to_string());
        assert!(err.is_not_yet_available());
    }

    #[test]
    fn other_failures_stay_fatal() {
        let err = YtDlp::classify_failure(Some(1), "ERROR: HTTP Error 403".to_string());
        assert!(matches!(err, DownloadError::Tool { status: Some(1), .. }));
    }

    #[test]
    fn empty_stdout_means_filtered_item() {
        let dir = tempfile::tempdir().unwrap();
        let res = YtDlp::resolve_result("abc123def45", dir.path(), "skipping item\n");
        assert!(matches!(res, Err(DownloadError::NotYetAvailable)));
    }

    #[test]
    fn garbage_info_line_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let res = YtDlp::resolve_result("abc123def45", dir.path(), "{not json\n");
        assert!(matches!(res, Err(DownloadError::UnreadableResult(_))));
    }

    #[test]
    fn filepath_from_info_dict_wins() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("abc123def45.m4a");
        std::fs::write(&media, b"data").unwrap();
        let info = serde_json::json!({
            "id": "abc123def45",
            "ext": "webm",
            "requested_downloads": [{ "filepath": media }]
        });
        let res = YtDlp::resolve_result("abc123def45", dir.path(), &info.to_string()).unwrap();
        assert_eq!(res.path, media);
        assert_eq!(res.extension, "m4a");
    }

    #[test]
    fn probes_destination_when_filepath_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("abc123def45.opus"), b"data").unwrap();
        let info = serde_json::json!({ "id": "abc123def45", "ext": "webm" });
        let res = YtDlp::resolve_result("abc123def45", dir.path(), &info.to_string()).unwrap();
        assert_eq!(res.extension, "opus");
    }
}
