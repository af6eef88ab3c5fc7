pub mod browser;
pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::models::{ItemRef, Movie, SearchTarget};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use self::cleaner::row_to_movie;
use self::http_client::HttpClient;
use self::parsers::DetailParser;

// ── Source traits ─────────────────────────────────────────────────────────────

/// Turns a search target into at most `target.limit` item references.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn discover(&self, target: &SearchTarget) -> Result<Vec<ItemRef>>;
}

/// Fetches one item. Failures are isolated: they log and yield `None`.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch(&self, item: &ItemRef) -> Option<Movie>;
}

// ── HTTP detail fetcher ───────────────────────────────────────────────────────

pub struct DetailFetcher {
    client: HttpClient,
    parser: Arc<dyn DetailParser>,
}

impl DetailFetcher {
    pub fn new(config: &ScraperConfig, parser: Arc<dyn DetailParser>) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            parser,
        })
    }
}

#[async_trait]
impl DetailSource for DetailFetcher {
    async fn fetch(&self, item: &ItemRef) -> Option<Movie> {
        debug!("Fetching detail page: {}", item);

        let html = match self.client.get_text(item.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to fetch {}: {}", item, e);
                return None;
            }
        };

        let row = match self.parser.parse(&html) {
            Ok(row) => row,
            Err(e) => {
                warn!("Failed to parse {}: {:#}", item, e);
                return None;
            }
        };

        row_to_movie(&row, item.as_str())
    }
}
