use anyhow::{Context, Result};
use rss::extension::itunes::{ITunesChannelExtensionBuilder, ITunesItemExtensionBuilder};
use rss::{Channel, ChannelBuilder, EnclosureBuilder, GuidBuilder, Item, ItemBuilder};
use std::path::{Path, PathBuf};
use url::Url;

use crate::probe::FEED_FILENAME;
use crate::util::fs::write_atomic;
use crate::util::mime;

use super::meta::ChannelIcon;
use super::types::{ChannelFeed, OutputItem};

/// Make a root URL joinable: `Url::join` replaces the last path segment
/// unless the base ends with a slash.
pub fn normalize_root(mut root: Url) -> Url {
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root
}

/// Build the feed descriptor from the reconciler's output. Entries keep
/// the reconciler's order; enclosure sizes are read from the files here,
/// at assembly time.
pub fn build_channel(
    feed: &ChannelFeed,
    description: &str,
    icon: Option<&ChannelIcon>,
    items: &[OutputItem],
    root: &Url,
    block: bool,
) -> Result<Channel> {
    let channel_icon_url = icon.map(|i| icon_url(i, root)).transpose()?;

    let rss_items: Vec<Item> = items
        .iter()
        .map(|item| build_item(item, root, channel_icon_url.as_deref()))
        .collect::<Result<_>>()?;

    let mut itunes = ITunesChannelExtensionBuilder::default();
    itunes.author(Some(feed.author_name.clone()));
    if block {
        itunes.block(Some("Yes".to_string()));
    }
    if let Some(url) = &channel_icon_url {
        itunes.image(Some(url.clone()));
    }

    let self_url = root.join(FEED_FILENAME)?;
    Ok(ChannelBuilder::default()
        .title(feed.title.clone())
        .link(self_url.to_string())
        .description(description.to_string())
        .itunes_ext(itunes.build())
        .items(rss_items)
        .build())
}

fn build_item(item: &OutputItem, root: &Url, channel_icon: Option<&str>) -> Result<Item> {
    let file_name = format!("{}.{}", item.video_id, item.extension);
    let file_url = root.join(&file_name)?.to_string();
    let len = std::fs::metadata(&item.path)
        .with_context(|| format!("sizing enclosure {}", item.path.display()))?
        .len();

    let enclosure = EnclosureBuilder::default()
        .url(file_url.clone())
        .length(len.to_string())
        .mime_type(mime::from_extension(&item.extension).to_string())
        .build();
    let guid = GuidBuilder::default().value(file_url.clone()).permalink(true).build();

    // per-item icon if one was fetched for this item, else the channel icon
    let image = match &item.item_icon {
        Some(path) => Some(local_url(path, root)?),
        None => channel_icon.map(str::to_string),
    };
    let itunes = ITunesItemExtensionBuilder::default().image(image).build();

    Ok(ItemBuilder::default()
        .guid(Some(guid))
        .title(Some(item.title.clone()))
        .link(Some(item.link.clone()))
        .description(item.summary.clone())
        .enclosure(Some(enclosure))
        .itunes_ext(Some(itunes))
        .pub_date(item.published_at.map(|d| d.to_rfc2822()))
        .build())
}

fn icon_url(icon: &ChannelIcon, root: &Url) -> Result<String> {
    match icon {
        ChannelIcon::Local(path) => local_url(path, root),
        ChannelIcon::Remote(url) => Ok(url.clone()),
    }
}

fn local_url(path: &Path, root: &Url) -> Result<String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("icon path has no file name")?;
    Ok(root.join(&name)?.to_string())
}

/// Render `rss.xml` into the destination directory via temp-then-rename.
/// Only called after the whole window resolved, so a failed run never
/// clobbers a previously valid descriptor.
pub fn write(channel: &Channel, dir: &Path) -> Result<PathBuf> {
    let mut buf = Vec::new();
    channel.pretty_write_to(&mut buf, b' ', 2).context("rendering feed descriptor")?;
    buf.push(b'\n');
    let path = dir.join(FEED_FILENAME);
    write_atomic(&path, &buf)?;
    Ok(path)
}
