use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::ledger::Ledger;
use crate::probe::{DirProbe, ICON_PREFIX};
use crate::telemetry;
use crate::telemetry::ops::status::Phase as StatusPhase;

#[derive(Args)]
pub struct StatusCmd {
    /// Destination directory to inspect
    #[arg(short, long, default_value = ".")]
    pub destination: PathBuf,
}

#[derive(Serialize)]
struct RecordStatus {
    video_id: String,
    path: String,
    present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
}

#[derive(Serialize)]
struct StatusReport {
    destination: String,
    records: Vec<RecordStatus>,
    present: usize,
    lost: usize,
    unmanaged: Vec<String>,
}

/// Compare the ledger against the destination directory: which recorded
/// downloads are still on disk, which are lost, and which files nothing
/// in the ledger accounts for.
pub async fn run(args: StatusCmd) -> Result<()> {
    let log = telemetry::status();
    let _g = log
        .root_span_kv([("destination", args.destination.display().to_string())])
        .entered();

    let ledger = Ledger::open(&args.destination);
    let probe = DirProbe::new(&args.destination);

    let records = {
        let _s = log.span(&StatusPhase::Ledger).entered();
        ledger.list()?
    };

    let _s = log.span(&StatusPhase::Probe).entered();
    let mut statuses = Vec::with_capacity(records.len());
    let mut accounted: HashSet<String> = HashSet::new();
    for rec in &records {
        accounted.insert(rec.video_id.clone());
        match probe.media(&rec.video_id) {
            Some(file) => {
                log.info_kv("✅ present", [
                    ("video_id", rec.video_id.clone()),
                    ("file", file.path.display().to_string()),
                    ("bytes", file.len.to_string()),
                ]);
                statuses.push(RecordStatus {
                    video_id: rec.video_id.clone(),
                    path: file.path.display().to_string(),
                    present: true,
                    size: Some(file.len),
                });
            }
            None => {
                log.warn_kv("❌ lost", [
                    ("video_id", rec.video_id.clone()),
                    ("recorded_path", rec.path.display().to_string()),
                ]);
                statuses.push(RecordStatus {
                    video_id: rec.video_id.clone(),
                    path: rec.path.display().to_string(),
                    present: false,
                    size: None,
                });
            }
        }
    }

    // files in the directory the ledger knows nothing about, item icons
    // counted under their owning id
    let mut unmanaged = Vec::new();
    for file in probe.files()? {
        let name = file.path.file_name().map(|n| n.to_string_lossy().to_string());
        let Some(name) = name else { continue };
        let stem = match name.strip_prefix(&format!("{}.", ICON_PREFIX)) {
            Some(rest) => rest.split('.').next().unwrap_or_default(),
            None => name.split('.').next().unwrap_or_default(),
        };
        if !accounted.contains(stem) {
            unmanaged.push(name);
        }
    }
    unmanaged.sort();
    drop(_s);

    let present = statuses.iter().filter(|s| s.present).count();
    let lost = statuses.len() - present;
    log.info_kv("📊 status totals", [
        ("present", present.to_string()),
        ("lost", lost.to_string()),
        ("unmanaged", unmanaged.len().to_string()),
    ]);

    if telemetry::config::json_mode() {
        let report = StatusReport {
            destination: args.destination.display().to_string(),
            records: statuses,
            present,
            lost,
            unmanaged,
        };
        // read-only op, so the envelope carries apply=false
        log.plan(&report)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[tokio::test]
    async fn runs_over_mixed_directory() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        std::fs::write(dir.path().join("vid000000001.m4a"), b"media").unwrap();
        ledger.append("vid000000001", Path::new("vid000000001.m4a")).unwrap();
        ledger.append("vid000000002", Path::new("vid000000002.m4a")).unwrap();
        std::fs::write(dir.path().join("stray00000001.m4a"), b"x").unwrap();

        let args = StatusCmd { destination: dir.path().to_path_buf() };
        run(args).await.unwrap();
    }

    #[test]
    fn icons_count_under_their_owning_id() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(dir.path());
        std::fs::write(dir.path().join("vid000000001.m4a"), b"media").unwrap();
        std::fs::write(dir.path().join("icon.vid000000001.jpg"), b"img").unwrap();
        ledger.append("vid000000001", Path::new("vid000000001.m4a")).unwrap();

        let probe = DirProbe::new(dir.path());
        let accounted: HashSet<String> = ledger.ids().unwrap();
        let unmanaged: Vec<String> = probe
            .files()
            .unwrap()
            .into_iter()
            .filter_map(|f| f.path.file_name().map(|n| n.to_string_lossy().to_string()))
            .filter(|name| {
                let stem = match name.strip_prefix("icon.") {
                    Some(rest) => rest.split('.').next().unwrap_or_default(),
                    None => name.split('.').next().unwrap_or_default(),
                };
                !accounted.contains(stem)
            })
            .collect();
        assert!(unmanaged.is_empty());
    }
}
