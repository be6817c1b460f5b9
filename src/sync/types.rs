use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Channel-level metadata plus the entry list, immutable per run.
#[derive(Debug, Clone)]
pub struct ChannelFeed {
    pub channel_id: String,
    pub title: String,
    pub author_name: String,
    pub author_link: String,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// One remote item, in the order delivered by the source
/// (most-recent-first assumed).
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub video_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub thumbnail_url: Option<String>,
}

/// A resolved item backed by a real file on disk. Enclosure URL, byte
/// size, and MIME type are derived by the assembler at assembly time.
#[derive(Debug, Clone)]
pub struct OutputItem {
    pub video_id: String,
    pub path: PathBuf,
    pub extension: String,
    pub title: String,
    pub summary: Option<String>,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub item_icon: Option<PathBuf>,
}

#[derive(Serialize)]
pub struct SyncResult {
    pub channel_id: String,
    pub title: String,
    pub window: usize,
    pub downloaded: usize,
    pub kept: usize,
    pub lost: usize,
    pub skipped_live: usize,
    pub pruned: usize,
    pub feed_path: String,
}
