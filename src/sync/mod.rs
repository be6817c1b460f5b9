use anyhow::{Context, Result, bail};
use clap::Args;
use reqwest::Client;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::downloader::{DownloadOptions, YtDlp};
use crate::ledger::Ledger;
use crate::probe::DirProbe;
use crate::prune;
use crate::telemetry;
use crate::telemetry::ops::sync::Phase as SyncPhase;

mod assemble;
mod fetch;
mod meta;
mod parse;
mod reconcile;
mod types;

use types::SyncResult;

#[derive(Args)]
pub struct SyncCmd {
    /// Channel feed URL
    pub url: String,
    /// Public root URL the destination directory is served under
    pub root: String,
    /// Where to put output files
    #[arg(short, long, default_value = ".")]
    pub destination: PathBuf,
    /// Number of recent items to keep in the feed
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,
    /// Downloader format selector; defaults to audio-only unless --keep-video
    #[arg(short, long)]
    pub format: Option<String>,
    /// Keep the video stream instead of extracting audio
    #[arg(long, default_value_t = false)]
    pub keep_video: bool,
    /// Leave files and ledger entries that fell out of the window alone
    #[arg(long, default_value_t = false)]
    pub keep_unlisted: bool,
    /// Don't ask podcast directories to hide this feed
    #[arg(long, default_value_t = false)]
    pub public: bool,
    /// HTTP(S) proxy for the downloader (falls back to PODMIRROR_PROXY)
    #[arg(long)]
    pub proxy: Option<String>,
}

pub async fn run(args: SyncCmd) -> Result<()> {
    let log = telemetry::sync();
    let _g = log
        .root_span_kv([
            ("url", args.url.clone()),
            ("root", args.root.clone()),
            ("destination", args.destination.display().to_string()),
            ("limit", args.limit.to_string()),
            ("keep_video", args.keep_video.to_string()),
            ("keep_unlisted", args.keep_unlisted.to_string()),
        ])
        .entered();

    let root = Url::parse(&args.root)
        .map(assemble::normalize_root)
        .with_context(|| format!("Invalid root URL: {}", args.root))?;
    std::fs::create_dir_all(&args.destination)
        .with_context(|| format!("creating {}", args.destination.display()))?;

    let client = Client::builder().timeout(Duration::from_secs(20)).build()?;

    // fetch and parse the remote feed; anything wrong here is fatal
    // before any download work begins
    let xml = {
        let _s = log.span_kv(&SyncPhase::FetchFeed, [("url", args.url.clone())]).entered();
        fetch::fetch_feed(&client, &args.url)
            .await
            .with_context(|| format!("Could not fetch feed from {}", args.url))?
    };
    let feed = {
        let _s = log.span(&SyncPhase::ParseFeed).entered();
        parse::parse_feed(&xml)
            .with_context(|| format!("Could not parse feed from {}", args.url))?
    };
    if feed.entries.is_empty() {
        bail!("Channel appears to contain no videos.");
    }
    if feed.title.trim().is_empty() {
        bail!("Channel appears to contain no feed metadata");
    }

    let format = args.format.clone().unwrap_or_else(|| {
        if args.keep_video { "best".to_string() } else { "bestaudio/best".to_string() }
    });
    let proxy = args.proxy.clone().or_else(|| std::env::var("PODMIRROR_PROXY").ok());
    let opts = DownloadOptions {
        dest: args.destination.clone(),
        format,
        extract_audio: !args.keep_video,
        proxy,
    };

    let ledger = Ledger::open(&args.destination);
    let probe = DirProbe::new(&args.destination);
    let downloader = YtDlp::new();

    let resolved = reconcile::resolve(
        &feed.entries,
        args.limit,
        &feed.title,
        &ledger,
        &probe,
        &downloader,
        &opts,
        &log,
    )
    .await?;

    let (description, icon) = {
        let _s = log.span(&SyncPhase::Meta).entered();
        let description = meta::resolve_description(&client, &feed, &log).await;
        let icon =
            meta::resolve_channel_icon(&client, &feed, &probe, &resolved.items, &log).await;
        (description, icon)
    };

    let channel = {
        let _s = log.span(&SyncPhase::Assemble).entered();
        assemble::build_channel(
            &feed,
            &description,
            icon.as_ref(),
            &resolved.items,
            &root,
            !args.public,
        )?
    };
    let feed_path = {
        let _s = log.span(&SyncPhase::WriteFeed).entered();
        let path = assemble::write(&channel, &args.destination)?;
        log.info_kv("📄 feed written", [("path", path.display().to_string())]);
        path
    };

    // ids still in scope: everything we emitted plus lost entries whose
    // ledger records are deliberately left in place
    let kept: HashSet<String> = resolved
        .items
        .iter()
        .map(|i| i.video_id.clone())
        .chain(resolved.lost_ids.iter().cloned())
        .collect();
    let pruned = if args.keep_unlisted {
        log.info("↩️ keeping unlisted files (--keep-unlisted)");
        0
    } else {
        let _s = log.span(&SyncPhase::Prune).entered();
        prune::execute(&ledger, &probe, &kept, &log)?
    };

    log.totals(
        resolved.downloaded,
        resolved.kept,
        resolved.lost_ids.len(),
        resolved.skipped_live,
        pruned,
    );

    if telemetry::config::json_mode() {
        let result = SyncResult {
            channel_id: feed.channel_id.clone(),
            title: feed.title.clone(),
            window: feed.entries.len().min(args.limit),
            downloaded: resolved.downloaded,
            kept: resolved.kept,
            lost: resolved.lost_ids.len(),
            skipped_live: resolved.skipped_live,
            pruned,
            feed_path: feed_path.display().to_string(),
        };
        log.result(&result)?;
    }
    Ok(())
}
