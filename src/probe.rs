use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::ledger::LEDGER_FILENAME;

pub const ICON_PREFIX: &str = "icon";
pub const FEED_FILENAME: &str = "rss.xml";

/// A media or icon file found in the destination directory. Derived by
/// probing, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub extension: String,
    pub len: u64,
}

fn id_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{4,}$").unwrap())
}

/// Returns true for identifiers safe to use in filename pattern matching
/// and deletion.
pub fn valid_id(id: &str) -> bool {
    id_shape().is_match(id)
}

/// Resolves whether files matching an identifier actually exist on disk.
/// The ledger and the disk can disagree; this is the disk side.
pub struct DirProbe {
    dir: PathBuf,
}

impl DirProbe {
    pub fn new(dir: &Path) -> Self {
        DirProbe { dir: dir.to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Main media file for an id: `<videoId>.<ext>`. Icon files and the
    /// ledger/descriptor are never media.
    pub fn media(&self, video_id: &str) -> Option<LocalFile> {
        if !valid_id(video_id) {
            return None;
        }
        self.find_by_stem(video_id)
    }

    /// Per-item icon: `icon.<videoId>.<ext>`.
    pub fn item_icon(&self, video_id: &str) -> Option<LocalFile> {
        if !valid_id(video_id) {
            return None;
        }
        self.find_by_stem(&format!("{}.{}", ICON_PREFIX, video_id))
    }

    /// Channel icon: `<channelId>.<ext>`. Same matching scheme as media;
    /// channel ids and video ids don't collide in practice.
    pub fn channel_icon(&self, channel_id: &str) -> Option<LocalFile> {
        if !valid_id(channel_id) {
            return None;
        }
        self.find_by_stem(channel_id)
    }

    /// All regular files in the destination directory, for orphan reports.
    pub fn files(&self) -> Result<Vec<LocalFile>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name == LEDGER_FILENAME || name == FEED_FILENAME {
                continue;
            }
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            out.push(LocalFile { path, extension, len: meta.len() });
        }
        Ok(out)
    }

    fn find_by_stem(&self, stem: &str) -> Option<LocalFile> {
        let prefix = format!("{}.", stem);
        let entries = std::fs::read_dir(&self.dir).ok()?;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == LEDGER_FILENAME || name == FEED_FILENAME {
                continue;
            }
            let Some(rest) = name.strip_prefix(&prefix) else { continue };
            // exactly one trailing extension component
            if rest.is_empty() || rest.contains('.') {
                continue;
            }
            let meta = entry.metadata().ok()?;
            if !meta.is_file() {
                continue;
            }
            return Some(LocalFile {
                path: entry.path(),
                extension: rest.to_string(),
                len: meta.len(),
            });
        }
        None
    }
}
