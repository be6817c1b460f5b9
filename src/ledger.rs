use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::util::fs::write_atomic;

pub const LEDGER_FILENAME: &str = "download.log";

/// One processed item: the local media path and its feed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    pub video_id: String,
    pub path: PathBuf,
}

/// Append-only record of which items have already been downloaded and
/// tagged. The file is the durable source of truth for "previously
/// processed"; whether a file is still on disk is the prober's call.
///
/// Line format: `<path> <videoId>` — the id is the second
/// whitespace-separated field. Lines that don't parse are skipped.
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn open(dir: &Path) -> Self {
        Ledger { path: dir.join(LEDGER_FILENAME) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durable append. Called only after a download + tag completed, so a
    /// crash mid-run leaves either a fully committed item or none.
    pub fn append(&self, video_id: &str, media_path: &Path) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening ledger {}", self.path.display()))?;
        writeln!(f, "{} {}", media_path.display(), video_id)?;
        f.flush()?;
        Ok(())
    }

    /// Full replay. A missing ledger file is an empty ledger.
    pub fn list(&self) -> Result<Vec<LedgerRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading ledger {}", self.path.display()));
            }
        };
        let mut records = Vec::new();
        for line in content.lines() {
            let mut fields = line.split_whitespace();
            let (Some(path), Some(id)) = (fields.next(), fields.next()) else {
                // malformed line, skip rather than fail the run
                continue;
            };
            records.push(LedgerRecord { video_id: id.to_string(), path: PathBuf::from(path) });
        }
        Ok(records)
    }

    pub fn ids(&self) -> Result<HashSet<String>> {
        Ok(self.list()?.into_iter().map(|r| r.video_id).collect())
    }

    /// Rewrite the ledger keeping only `keep` ids. Used by the pruner
    /// after the retention set is fully resolved.
    pub fn rewrite(&self, keep: &HashSet<String>) -> Result<()> {
        let mut out = String::new();
        for rec in self.list()? {
            if keep.contains(&rec.video_id) {
                out.push_str(&format!("{} {}\n", rec.path.display(), rec.video_id));
            }
        }
        write_atomic(&self.path, out.as_bytes())
    }
}
