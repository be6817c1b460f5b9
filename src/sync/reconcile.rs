use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::downloader::{DownloadError, DownloadOptions, Downloader};
use crate::ledger::Ledger;
use crate::probe::{DirProbe, LocalFile};
use crate::tagger;
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::sync::{Phase as SyncPhase, Sync as SyncOp};

use super::types::{FeedEntry, OutputItem};

/// Ledger/disk agreement for one entry. The fourth state of the table
/// (an item the downloader reports as not airable yet) surfaces as a
/// typed gateway error, not as a disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Never processed: not in the ledger.
    Unseen,
    /// In the ledger and the file is on disk.
    SeenAndPresent(LocalFile),
    /// In the ledger but the file is gone; treated as an intentional
    /// prior removal, never re-downloaded.
    SeenButLost,
}

pub fn classify(video_id: &str, ledger_ids: &HashSet<String>, probe: &DirProbe) -> Disposition {
    if !ledger_ids.contains(video_id) {
        return Disposition::Unseen;
    }
    match probe.media(video_id) {
        Some(file) => Disposition::SeenAndPresent(file),
        None => Disposition::SeenButLost,
    }
}

#[derive(Debug, Default)]
pub struct Reconciled {
    pub items: Vec<OutputItem>,
    /// Ids still owed to the ledger even though they produced no item.
    pub lost_ids: Vec<String>,
    pub downloaded: usize,
    pub kept: usize,
    pub skipped_live: usize,
}

/// Process the retention window sequentially, in feed order. Each entry
/// either skips (already fetched), downloads + tags + appends to the
/// ledger, or is omitted (lost, or not downloadable yet). Any other
/// downloader failure aborts the run so the descriptor is never written
/// against files that don't exist.
pub async fn resolve(
    entries: &[FeedEntry],
    limit: usize,
    channel_title: &str,
    ledger: &Ledger,
    probe: &DirProbe,
    downloader: &dyn Downloader,
    opts: &DownloadOptions,
    log: &LogCtx<SyncOp>,
) -> Result<Reconciled> {
    let ledger_ids = ledger.ids()?;
    let mut out = Reconciled::default();

    for entry in entries.iter().take(limit) {
        let _e = log
            .span_kv(&SyncPhase::Entry, [("video_id", entry.video_id.clone())])
            .entered();

        match classify(&entry.video_id, &ledger_ids, probe) {
            Disposition::SeenAndPresent(file) => {
                out.kept += 1;
                log.info_kv("↩️ already fetched", [("video_id", entry.video_id.clone())]);
                out.items.push(output_item(entry, &file.path, &file.extension, probe));
            }
            Disposition::SeenButLost => {
                out.lost_ids.push(entry.video_id.clone());
                log.warn_kv(
                    "⚠️ in ledger but missing on disk, omitting",
                    [("video_id", entry.video_id.clone())],
                );
            }
            Disposition::Unseen => {
                let download = {
                    let _d = log
                        .span_kv(&SyncPhase::Download, [("url", entry.link.clone())])
                        .entered();
                    downloader.invoke(&entry.video_id, &entry.link, opts).await
                };
                let download = match download {
                    Ok(d) => d,
                    Err(e) if e.is_not_yet_available() => {
                        out.skipped_live += 1;
                        log.info_kv("⏳ not airable yet, skipping", [(
                            "video_id",
                            entry.video_id.clone(),
                        )]);
                        continue;
                    }
                    Err(DownloadError::UnreadableResult(msg)) => {
                        // nothing advanced the ledger for this id, so it
                        // stays eligible for the next run
                        out.skipped_live += 1;
                        log.warn_kv("⚠️ unreadable downloader result, skipping", [
                            ("video_id", entry.video_id.clone()),
                            ("error", msg),
                        ]);
                        continue;
                    }
                    Err(e) => {
                        return Err(anyhow::Error::new(e)
                            .context(format!("downloading {}", entry.video_id)));
                    }
                };

                {
                    let _t = log.span(&SyncPhase::Tag).entered();
                    let cover = probe.item_icon(&entry.video_id).map(|f| f.path);
                    if let Err(e) = tagger::apply(
                        &download.path,
                        channel_title,
                        entry.published_at,
                        cover.as_deref(),
                    ) {
                        // tagging is best-effort, the file stays as-is
                        log.warn_kv("⚠️ tagging failed, keeping file untagged", [
                            ("video_id", entry.video_id.clone()),
                            ("error", format!("{e:#}")),
                        ]);
                    }
                }

                let recorded = download
                    .path
                    .strip_prefix(probe.dir())
                    .unwrap_or(&download.path);
                ledger
                    .append(&entry.video_id, recorded)
                    .with_context(|| format!("recording {}", entry.video_id))?;
                out.downloaded += 1;
                log.info_kv("➕ downloaded", [
                    ("video_id", entry.video_id.clone()),
                    ("file", download.path.display().to_string()),
                ]);
                out.items.push(output_item(entry, &download.path, &download.extension, probe));
            }
        }
    }

    Ok(out)
}

fn output_item(entry: &FeedEntry, path: &Path, extension: &str, probe: &DirProbe) -> OutputItem {
    OutputItem {
        video_id: entry.video_id.clone(),
        path: path.to_path_buf(),
        extension: extension.to_string(),
        title: entry.title.clone(),
        summary: entry.summary.clone(),
        link: entry.link.clone(),
        published_at: entry.published_at,
        item_icon: probe.item_icon(&entry.video_id).map(|f| f.path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::{Download, MockDownloader};
    use crate::telemetry;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn entry(id: &str) -> FeedEntry {
        FeedEntry {
            video_id: id.to_string(),
            title: format!("Video {id}"),
            summary: Some(format!("about {id}")),
            link: format!("https://www.youtube.com/watch?v={id}"),
            published_at: Some(Utc.with_ymd_and_hms(2024, 5, 2, 13, 45, 0).unwrap()),
            thumbnail_url: None,
        }
    }

    fn opts(dir: &Path) -> DownloadOptions {
        DownloadOptions {
            dest: dir.to_path_buf(),
            format: "bestaudio/best".to_string(),
            extract_audio: true,
            proxy: None,
        }
    }

    fn ok_download(dir: &Path, id: &str) -> Result<Download, DownloadError> {
        Ok(Download { path: dir.join(format!("{id}.m4a")), extension: "m4a".to_string() })
    }

    #[tokio::test]
    async fn empty_ledger_downloads_window_only() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        let probe = DirProbe::new(dir.path());
        let mock = MockDownloader::new();
        mock.push_response(ok_download(dir.path(), "vid000000001"));
        mock.push_response(ok_download(dir.path(), "vid000000002"));

        let entries = vec![entry("vid000000001"), entry("vid000000002"), entry("vid000000003")];
        let out = resolve(
            &entries, 2, "Chan", &ledger, &probe, &mock, &opts(dir.path()), &telemetry::sync(),
        )
        .await
        .unwrap();

        // v1 and v2 downloaded in order, v3 untouched
        assert_eq!(mock.calls(), vec!["vid000000001", "vid000000002"]);
        assert_eq!(out.downloaded, 2);
        let ids: Vec<_> = out.items.iter().map(|i| i.video_id.as_str()).collect();
        assert_eq!(ids, vec!["vid000000001", "vid000000002"]);
        assert!(probe.media("vid000000003").is_none());

        let logged = ledger.ids().unwrap();
        assert!(logged.contains("vid000000001") && logged.contains("vid000000002"));
        assert_eq!(logged.len(), 2);
    }

    #[tokio::test]
    async fn present_id_never_reinvokes_downloader() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        let probe = DirProbe::new(dir.path());
        std::fs::write(dir.path().join("vid000000001.m4a"), b"media").unwrap();
        ledger.append("vid000000001", Path::new("vid000000001.m4a")).unwrap();

        let mock = MockDownloader::new(); // nothing queued
        let out = resolve(
            &[entry("vid000000001")], 10, "Chan", &ledger, &probe, &mock,
            &opts(dir.path()), &telemetry::sync(),
        )
        .await
        .unwrap();

        assert!(mock.calls().is_empty());
        assert_eq!(out.kept, 1);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].extension, "m4a");
    }

    #[tokio::test]
    async fn ledger_entry_without_file_is_lost_not_redownloaded() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        let probe = DirProbe::new(dir.path());
        ledger.append("vid000000001", Path::new("vid000000001.m4a")).unwrap();

        let mock = MockDownloader::new();
        let out = resolve(
            &[entry("vid000000001")], 10, "Chan", &ledger, &probe, &mock,
            &opts(dir.path()), &telemetry::sync(),
        )
        .await
        .unwrap();

        assert!(mock.calls().is_empty());
        assert!(out.items.is_empty());
        assert_eq!(out.lost_ids, vec!["vid000000001"]);
        // ledger entry left untouched
        assert!(ledger.ids().unwrap().contains("vid000000001"));
    }

    #[tokio::test]
    async fn live_event_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        let probe = DirProbe::new(dir.path());
        let mock = MockDownloader::new();
        mock.push_response(Err(DownloadError::NotYetAvailable));
        mock.push_response(ok_download(dir.path(), "vid000000002"));

        let entries = vec![entry("vid000000001"), entry("vid000000002")];
        let out = resolve(
            &entries, 10, "Chan", &ledger, &probe, &mock, &opts(dir.path()), &telemetry::sync(),
        )
        .await
        .unwrap();

        assert_eq!(out.skipped_live, 1);
        let ids: Vec<_> = out.items.iter().map(|i| i.video_id.as_str()).collect();
        assert_eq!(ids, vec!["vid000000002"]);
        assert!(!ledger.ids().unwrap().contains("vid000000001"));
    }

    #[tokio::test]
    async fn tool_failure_aborts_but_keeps_prior_commits() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        let probe = DirProbe::new(dir.path());
        let mock = MockDownloader::new();
        mock.push_response(ok_download(dir.path(), "vid000000001"));
        mock.push_response(Err(DownloadError::Tool {
            status: Some(1),
            stderr: "ERROR: HTTP Error 403".to_string(),
        }));

        let entries = vec![entry("vid000000001"), entry("vid000000002")];
        let res = resolve(
            &entries, 10, "Chan", &ledger, &probe, &mock, &opts(dir.path()), &telemetry::sync(),
        )
        .await;

        assert!(res.is_err());
        // the first item was committed item-by-item and survives
        assert!(ledger.ids().unwrap().contains("vid000000001"));
        assert!(!ledger.ids().unwrap().contains("vid000000002"));
    }

    #[tokio::test]
    async fn unreadable_result_skips_unseen_item() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        let probe = DirProbe::new(dir.path());
        let mock = MockDownloader::new();
        mock.push_response(Err(DownloadError::UnreadableResult("bad json".to_string())));

        let out = resolve(
            &[entry("vid000000001")], 10, "Chan", &ledger, &probe, &mock,
            &opts(dir.path()), &telemetry::sync(),
        )
        .await
        .unwrap();

        assert!(out.items.is_empty());
        assert!(ledger.ids().unwrap().is_empty());
    }

    #[test]
    fn classify_table() {
        let dir = tempfile::tempdir().unwrap();
        let probe = DirProbe::new(dir.path());
        std::fs::write(dir.path().join("present0000a.m4a"), b"x").unwrap();

        let ledger_ids: HashSet<String> =
            ["present0000a".to_string(), "lostfile000b".to_string()].into_iter().collect();

        assert!(matches!(
            classify("present0000a", &ledger_ids, &probe),
            Disposition::SeenAndPresent(_)
        ));
        assert_eq!(classify("lostfile000b", &ledger_ids, &probe), Disposition::SeenButLost);
        assert_eq!(classify("newitem0000c", &ledger_ids, &probe), Disposition::Unseen);
    }

    #[test]
    fn output_item_paths() {
        let dir = tempfile::tempdir().unwrap();
        let probe = DirProbe::new(dir.path());
        std::fs::write(dir.path().join("icon.vid000000001.jpg"), b"img").unwrap();

        let item = output_item(
            &entry("vid000000001"),
            &dir.path().join("vid000000001.m4a"),
            "m4a",
            &probe,
        );
        assert_eq!(item.item_icon, Some(PathBuf::from(dir.path().join("icon.vid000000001.jpg"))));
        assert_eq!(item.extension, "m4a");
    }
}
