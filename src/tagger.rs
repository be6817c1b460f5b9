use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::Tag;

/// Stamp channel/episode metadata onto a freshly downloaded file.
///
/// The source feed carries no sequence number, so publish time is
/// repurposed as a coarse ordering key: album = year-month, disc =
/// day-of-month, track = hour-of-day. Collisions for channels publishing
/// several items per hour are a known limitation of that scheme.
///
/// Callers treat any error as non-fatal: the file stays in place and the
/// ledger still advances.
pub fn apply(
    path: &Path,
    channel_title: &str,
    published_at: Option<DateTime<Utc>>,
    cover: Option<&Path>,
) -> Result<()> {
    let mut tagged_file = Probe::open(path)
        .with_context(|| format!("probing {}", path.display()))?
        .read()
        .with_context(|| format!("reading tags from {}", path.display()))?;

    if tagged_file.primary_tag().is_none() {
        let tag_type = tagged_file.primary_tag_type();
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let Some(tag) = tagged_file.primary_tag_mut() else {
        anyhow::bail!("no writable tag slot for {}", path.display());
    };

    tag.set_artist(channel_title.to_string());
    if let Some(ts) = published_at {
        tag.set_album(format!("{:04}-{:02}", ts.year(), ts.month()));
        tag.set_disk(ts.day());
        tag.set_track(ts.hour());
    }

    if let Some(cover_path) = cover {
        if let Ok(data) = std::fs::read(cover_path) {
            let mime = cover_mime(cover_path);
            let picture = Picture::new_unchecked(PictureType::CoverFront, mime, None, data);
            tag.push_picture(picture);
        }
    }

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .with_context(|| format!("writing tags to {}", path.display()))?;
    Ok(())
}

fn cover_mime(path: &Path) -> Option<MimeType> {
    let ext = path.extension()?.to_string_lossy().to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(MimeType::Jpeg),
        "png" => Some(MimeType::Png),
        "gif" => Some(MimeType::Gif),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_file_type_errors_without_touching_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc123def45.zzz");
        std::fs::write(&path, b"not really media").unwrap();

        assert!(apply(&path, "Some Channel", Some(Utc::now()), None).is_err());
        // the file itself is untouched
        assert_eq!(std::fs::read(&path).unwrap(), b"not really media");
    }
}
