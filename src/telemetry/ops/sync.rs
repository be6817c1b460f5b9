use tracing::Span;
use tracing::info_span;

use crate::telemetry::ctx::{OpMarker, PhaseSpan};

#[derive(Copy, Clone, Debug)]
pub struct Sync;

#[derive(Copy, Clone, Debug)]
pub enum Phase { FetchFeed, ParseFeed, Meta, Entry, Download, Tag, Assemble, WriteFeed, Prune }

impl PhaseSpan for Phase {
    fn name(&self) -> &'static str { match self {
        Phase::FetchFeed => "fetch_feed",
        Phase::ParseFeed => "parse_feed",
        Phase::Meta => "meta",
        Phase::Entry => "entry",
        Phase::Download => "download",
        Phase::Tag => "tag",
        Phase::Assemble => "assemble",
        Phase::WriteFeed => "write_feed",
        Phase::Prune => "prune",
    }}
    fn span(&self) -> Span { match self {
        Phase::FetchFeed => info_span!("fetch_feed"),
        Phase::ParseFeed => info_span!("parse_feed"),
        Phase::Meta => info_span!("meta"),
        Phase::Entry => info_span!("entry"),
        Phase::Download => info_span!("download"),
        Phase::Tag => info_span!("tag"),
        Phase::Assemble => info_span!("assemble"),
        Phase::WriteFeed => info_span!("write_feed"),
        Phase::Prune => info_span!("prune"),
    }}
}

impl OpMarker for Sync {
    const NAME: &'static str = "sync";
    type Phase = Phase;
    fn root_span() -> Span { info_span!("sync") }
}
