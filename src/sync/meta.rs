use reqwest::Client;
use scraper::{Html, Selector};
use std::path::{Path, PathBuf};

use crate::probe::DirProbe;
use crate::telemetry::ctx::LogCtx;
use crate::telemetry::ops::sync::Sync as SyncOp;
use crate::util::fs::write_atomic;

use super::fetch;
use super::types::{ChannelFeed, OutputItem};

/// Channel icon as the assembler consumes it: either a file we hold in
/// the destination directory or a remote URL passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelIcon {
    Local(PathBuf),
    Remote(String),
}

/// Ordered fallback: feed-provided text, then the scraped channel/about
/// page, then a synthesized one-liner referencing the channel page.
/// Never fails; scrape problems are warnings.
pub async fn resolve_description(
    client: &Client,
    feed: &ChannelFeed,
    log: &LogCtx<SyncOp>,
) -> String {
    if let Some(desc) = feed.description.as_deref() {
        if !desc.trim().is_empty() {
            return desc.trim().to_string();
        }
    }

    if !feed.author_link.is_empty() {
        let about_url = format!("{}/about", feed.author_link.trim_end_matches('/'));
        match fetch::fetch_page(client, &about_url).await {
            Ok(html) => {
                if let Some(desc) = scrape_description(&html) {
                    return desc;
                }
            }
            Err(e) => log.warn_kv(
                "⚠️ about page fetch failed, falling back",
                [("url", about_url.clone()), ("error", e.to_string())],
            ),
        }
    }

    format!("{} — channel as podcast. {}", feed.title, feed.author_link)
}

/// Ordered fallback for the channel image: an icon file already in the
/// destination directory, then a fetched channel icon (feed-declared or
/// scraped from the channel page) stored as `<channelId>.<ext>`, then the
/// first resolved item's icon, then nothing.
pub async fn resolve_channel_icon(
    client: &Client,
    feed: &ChannelFeed,
    probe: &DirProbe,
    items: &[OutputItem],
    log: &LogCtx<SyncOp>,
) -> Option<ChannelIcon> {
    if let Some(existing) = probe.channel_icon(&feed.channel_id) {
        return Some(ChannelIcon::Local(existing.path));
    }

    if let Some(url) = channel_icon_url(client, feed, log).await {
        match download_icon(client, &url, probe.dir(), &feed.channel_id).await {
            Ok(path) => return Some(ChannelIcon::Local(path)),
            Err(e) => log.warn_kv(
                "⚠️ channel icon download failed, falling back",
                [("url", url.clone()), ("error", e.to_string())],
            ),
        }
    }

    if let Some(icon) = items.iter().find_map(|i| i.item_icon.clone()) {
        return Some(ChannelIcon::Local(icon));
    }
    feed.entries
        .iter()
        .find_map(|e| e.thumbnail_url.clone())
        .map(ChannelIcon::Remote)
}

async fn channel_icon_url(
    client: &Client,
    feed: &ChannelFeed,
    log: &LogCtx<SyncOp>,
) -> Option<String> {
    if let Some(url) = feed.icon_url.as_deref() {
        return Some(url.to_string());
    }
    if feed.author_link.is_empty() {
        return None;
    }
    match fetch::fetch_page(client, &feed.author_link).await {
        Ok(html) => scrape_icon_url(&html),
        Err(e) => {
            log.warn_kv(
                "⚠️ channel page fetch failed, falling back",
                [("url", feed.author_link.clone()), ("error", e.to_string())],
            );
            None
        }
    }
}

async fn download_icon(
    client: &Client,
    url: &str,
    dir: &Path,
    channel_id: &str,
) -> anyhow::Result<PathBuf> {
    let bytes = fetch::fetch_bytes(client, url).await?;
    let path = dir.join(format!("{}.{}", channel_id, extension_from_url(url)));
    write_atomic(&path, &bytes)?;
    Ok(path)
}

pub fn scrape_description(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    if let Some(s) = extract_meta(&doc, "meta[property='og:description']") {
        return Some(s);
    }
    if let Some(s) = extract_meta(&doc, "meta[name='description']") {
        return Some(s);
    }
    None
}

pub fn scrape_icon_url(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);

    if let Some(s) = extract_meta(&doc, "meta[property='og:image']") {
        return Some(s);
    }
    for sel in ["link[rel='image_src']", "link[rel='apple-touch-icon']", "link[rel='icon']"] {
        if let Some(s) = extract_link_href(&doc, sel) {
            return Some(s);
        }
    }
    None
}

fn extract_meta(doc: &Html, sel_str: &str) -> Option<String> {
    let sel = Selector::parse(sel_str).ok()?;
    let node = doc.select(&sel).next()?;
    let content = node.value().attr("content")?.trim();
    if content.is_empty() { None } else { Some(content.to_string()) }
}

fn extract_link_href(doc: &Html, sel_str: &str) -> Option<String> {
    let sel = Selector::parse(sel_str).ok()?;
    let node = doc.select(&sel).next()?;
    let href = node.value().attr("href")?.trim();
    if href.is_empty() { None } else { Some(href.to_string()) }
}

fn extension_from_url(url: &str) -> String {
    let path = url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_default();
    let ext = path.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    if !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        "jpg".to_string()
    }
}
