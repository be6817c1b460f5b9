use anyhow::{Context, Result};
use std::collections::HashSet;

use crate::ledger::{Ledger, LedgerRecord};
use crate::probe::{DirProbe, valid_id};
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::sync::Sync as SyncOp;

/// Ledger records whose ids fell out of scope: `ledger ids - kept ids`.
pub fn plan(ledger: &Ledger, kept: &HashSet<String>) -> Result<Vec<LedgerRecord>> {
    let mut seen = HashSet::new();
    Ok(ledger
        .list()?
        .into_iter()
        .filter(|rec| !kept.contains(&rec.video_id) && seen.insert(rec.video_id.clone()))
        .collect())
}

/// Delete every file carrying a pruned id (media and icon alike) and
/// rewrite the ledger to the kept set. Runs only after the full window
/// has been resolved and the descriptor written, never interleaved with
/// downloading.
pub fn execute(
    ledger: &Ledger,
    probe: &DirProbe,
    kept: &HashSet<String>,
    log: &LogCtx<SyncOp>,
) -> Result<usize> {
    let doomed = plan(ledger, kept)?;
    if doomed.is_empty() {
        return Ok(0);
    }

    for rec in &doomed {
        if !valid_id(&rec.video_id) {
            log.warn_kv("⚠️ refusing to prune odd-shaped id", [(
                "video_id",
                rec.video_id.clone(),
            )]);
            continue;
        }
        while let Some(file) = probe.media(&rec.video_id) {
            std::fs::remove_file(&file.path)
                .with_context(|| format!("deleting {}", file.path.display()))?;
            log.info_kv("🗑️ pruned", [("file", file.path.display().to_string())]);
        }
        while let Some(icon) = probe.item_icon(&rec.video_id) {
            std::fs::remove_file(&icon.path)
                .with_context(|| format!("deleting {}", icon.path.display()))?;
            log.info_kv("🗑️ pruned icon", [("file", icon.path.display().to_string())]);
        }
    }

    ledger.rewrite(kept)?;
    Ok(doomed.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry;
    use std::path::Path;

    fn setup(dir: &Path, ids: &[&str]) -> (Ledger, DirProbe) {
        let ledger = Ledger::open(dir);
        for id in ids {
            let name = format!("{id}.m4a");
            std::fs::write(dir.join(&name), b"media").unwrap();
            std::fs::write(dir.join(format!("icon.{id}.jpg")), b"img").unwrap();
            ledger.append(id, Path::new(&name)).unwrap();
        }
        (ledger, DirProbe::new(dir))
    }

    #[test]
    fn plan_is_ledger_minus_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, _) = setup(dir.path(), &["vid000000001", "vid000000002"]);
        let kept: HashSet<String> = ["vid000000001".to_string()].into_iter().collect();

        let doomed = plan(&ledger, &kept).unwrap();
        assert_eq!(doomed.len(), 1);
        assert_eq!(doomed[0].video_id, "vid000000002");
    }

    #[test]
    fn execute_deletes_media_icon_and_rewrites_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, probe) = setup(dir.path(), &["vid000000001", "vid000000002"]);
        let kept: HashSet<String> = ["vid000000001".to_string()].into_iter().collect();

        let pruned = execute(&ledger, &probe, &kept, &telemetry::sync()).unwrap();
        assert_eq!(pruned, 1);

        // v2's media and icon are gone, v1 intact
        assert!(probe.media("vid000000002").is_none());
        assert!(probe.item_icon("vid000000002").is_none());
        assert!(probe.media("vid000000001").is_some());
        assert!(probe.item_icon("vid000000001").is_some());

        let ids = ledger.ids().unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("vid000000001"));
    }

    #[test]
    fn nothing_to_prune_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, probe) = setup(dir.path(), &["vid000000001"]);
        let kept: HashSet<String> = ["vid000000001".to_string()].into_iter().collect();

        assert_eq!(execute(&ledger, &probe, &kept, &telemetry::sync()).unwrap(), 0);
        assert!(probe.media("vid000000001").is_some());
    }
}
