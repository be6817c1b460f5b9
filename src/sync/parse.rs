use anyhow::{Result, anyhow};
use atom_syndication::Feed;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rss::Channel;

use super::types::{ChannelFeed, FeedEntry};

/// Parse the remote feed payload. Channel feeds from the big video
/// platforms are Atom; plain RSS 2.0 sources are accepted as a fallback.
pub fn parse_feed(xml: &Bytes) -> Result<ChannelFeed> {
    if let Ok(feed) = Feed::read_from(&xml[..]) {
        return from_atom(&feed);
    }
    let channel = Channel::read_from(&xml[..])
        .map_err(|e| anyhow!("feed is neither Atom nor RSS: {e}"))?;
    from_rss(&channel)
}

fn from_atom(feed: &Feed) -> Result<ChannelFeed> {
    let channel_id = tail_of_urn(feed.id())
        .or_else(|| atom_ext_value(feed.extensions(), "yt", "channelId"))
        .ok_or_else(|| anyhow!("feed has no channel identifier"))?;

    let author = feed.authors().first();
    let alternate_link = feed
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| feed.links().first())
        .map(|l| l.href().to_string());
    let author_name = author
        .map(|a| a.name().to_string())
        .unwrap_or_else(|| feed.title().to_string());
    let author_link = author
        .and_then(|a| a.uri().map(str::to_string))
        .or(alternate_link)
        .unwrap_or_default();

    let entries = feed.entries().iter().filter_map(|entry| {
        let video_id = tail_of_urn(entry.id())
            .or_else(|| atom_ext_value(entry.extensions(), "yt", "videoId"))?;
        let link = entry
            .links()
            .iter()
            .find(|l| l.rel() == "alternate")
            .or_else(|| entry.links().first())
            .map(|l| l.href().to_string())
            .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={video_id}"));
        let group = entry
            .extensions()
            .get("media")
            .and_then(|m| m.get("group"))
            .and_then(|g| g.first());
        let thumbnail_url = group
            .and_then(|g| g.children().get("thumbnail"))
            .and_then(|t| t.first())
            .and_then(|t| t.attrs().get("url"))
            .cloned();
        let summary = group
            .and_then(|g| g.children().get("description"))
            .and_then(|d| d.first())
            .and_then(|d| d.value().map(str::to_string))
            .or_else(|| entry.summary().map(|s| s.to_string()));

        Some(FeedEntry {
            video_id,
            title: entry.title().to_string(),
            summary,
            link,
            published_at: entry.published().map(|d| d.with_timezone(&Utc)),
            thumbnail_url,
        })
    });

    Ok(ChannelFeed {
        channel_id,
        title: feed.title().to_string(),
        author_name,
        author_link,
        description: feed.subtitle().map(|s| s.to_string()),
        icon_url: feed.icon().map(str::to_string).or_else(|| feed.logo().map(str::to_string)),
        entries: entries.collect(),
    })
}

fn from_rss(channel: &Channel) -> Result<ChannelFeed> {
    let author_name = channel
        .itunes_ext()
        .and_then(|e| e.author())
        .unwrap_or_else(|| channel.title())
        .to_string();

    let entries = channel.items().iter().filter_map(|item| {
        let link = item.link().map(str::to_string);
        let video_id = item
            .guid()
            .and_then(|g| tail_of_urn(g.value()))
            .or_else(|| link.as_deref().and_then(id_from_link))?;
        let thumbnail_url = item
            .itunes_ext()
            .and_then(|e| e.image())
            .map(str::to_string);

        Some(FeedEntry {
            video_id: video_id.clone(),
            title: item.title().unwrap_or_default().to_string(),
            summary: item.description().map(str::to_string),
            link: link.unwrap_or_default(),
            published_at: item.pub_date().and_then(parse_timestamp),
            thumbnail_url,
        })
    });

    Ok(ChannelFeed {
        // RSS has no channel-level id element; the link hostname+path is
        // the most stable stand-in available
        channel_id: channel
            .link()
            .rsplit('/')
            .find(|s| !s.is_empty())
            .unwrap_or("channel")
            .to_string(),
        title: channel.title().to_string(),
        author_name,
        author_link: channel.link().to_string(),
        description: Some(channel.description().to_string()).filter(|s| !s.is_empty()),
        icon_url: channel.image().map(|i| i.url().to_string()),
        entries: entries.collect(),
    })
}

// "yt:video:abc123" -> "abc123"; plain ids pass through
fn tail_of_urn(id: &str) -> Option<String> {
    let tail = id.rsplit(':').next()?;
    if tail.is_empty() { None } else { Some(tail.to_string()) }
}

fn id_from_link(link: &str) -> Option<String> {
    let url = url::Url::parse(link).ok()?;
    if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
        return Some(v.to_string());
    }
    url.path_segments()?.filter(|s| !s.is_empty()).last().map(str::to_string)
}

fn atom_ext_value(
    map: &atom_syndication::extension::ExtensionMap,
    ns: &str,
    name: &str,
) -> Option<String> {
    map.get(ns)?
        .get(name)?
        .first()?
        .value()
        .map(str::to_string)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    None
}
