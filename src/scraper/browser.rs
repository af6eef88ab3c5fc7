//! Listing discovery through a scripted headless browser.
//!
//! Listing pages render progressively on the client, so the page is scrolled
//! until its height stops growing, optionally pressing the "load more" control
//! a bounded number of times, and only then parsed for item links.

use crate::config::{BrowserConfig, ScraperConfig};
use crate::models::{ItemRef, SearchTarget, SearchType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info};
use url::Url;

use super::parsers::parse_listing_links;
use super::ListingSource;

const LOAD_MORE_SELECTOR: &str = ".ipc-see-more__text";

// ── Session abstraction ───────────────────────────────────────────────────────

/// The handful of page operations listing discovery needs.
#[async_trait]
pub trait BrowserSession: Send {
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn scroll_to_bottom(&mut self) -> Result<()>;
    async fn page_height(&mut self) -> Result<i64>;
    /// `Ok(false)` when the control is missing or not clickable in time.
    async fn click_load_more(&mut self) -> Result<bool>;
    async fn content(&mut self) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

/// Opens a fresh browser session per listing crawl.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

#[derive(Debug, Clone)]
pub struct ScrollSettings {
    pub page_size: usize,
    pub settle: Duration,
    pub max_rounds: usize,
}

impl From<&BrowserConfig> for ScrollSettings {
    fn from(cfg: &BrowserConfig) -> Self {
        Self {
            page_size: cfg.page_size.max(1),
            settle: cfg.settle(),
            max_rounds: cfg.max_scroll_rounds,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrollOutcome {
    pub rounds: usize,
    pub load_more_attempts: usize,
    pub final_height: i64,
}

/// Extra "load more" presses allowed once height stops growing.
pub fn load_more_budget(limit: usize, page_size: usize) -> usize {
    if limit <= page_size {
        0
    } else {
        limit.div_ceil(page_size)
    }
}

/// Scroll until the page stops growing and the load-more budget is spent.
pub async fn load_all<S: BrowserSession + ?Sized>(
    session: &mut S,
    limit: usize,
    settings: &ScrollSettings,
) -> Result<ScrollOutcome> {
    let budget = load_more_budget(limit, settings.page_size);
    let mut outcome = ScrollOutcome::default();
    let mut previous_height = 0i64;

    while outcome.rounds < settings.max_rounds {
        outcome.rounds += 1;
        session.scroll_to_bottom().await?;
        sleep(settings.settle).await;

        let height = session.page_height().await?;
        debug!("Scroll round {}: height {} (was {})", outcome.rounds, height, previous_height);

        if height == previous_height {
            if outcome.load_more_attempts >= budget {
                break;
            }
            outcome.load_more_attempts += 1;
            if !session.click_load_more().await? {
                info!("Load-more control not found or not clickable, stopping");
                break;
            }
        }
        previous_height = height;
        outcome.final_height = height;
    }

    Ok(outcome)
}

// ── chromiumoxide session ─────────────────────────────────────────────────────

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    click_timeout: Duration,
    navigation_timeout: Duration,
}

impl ChromiumSession {
    pub async fn launch(cfg: &BrowserConfig, user_agent: &str) -> Result<Self> {
        let mut builder = ChromeConfig::builder()
            .request_timeout(cfg.navigation_timeout())
            .arg(format!("--user-agent={}", user_agent));
        if !cfg.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &cfg.executable {
            builder = builder.chrome_executable(path);
        }
        let chrome_cfg = builder
            .build()
            .map_err(|e| anyhow::anyhow!("browser config: {}", e))?;

        let (browser, mut events) = Browser::launch(chrome_cfg)
            .await
            .context("Failed to launch browser")?;
        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser page")?;

        Ok(Self {
            browser,
            page,
            handler,
            click_timeout: cfg.click_timeout(),
            navigation_timeout: cfg.navigation_timeout(),
        })
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .with_context(|| format!("Timeout while navigating to {}", url))?
            .with_context(|| format!("Navigation to {} failed", url))?;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .context("scroll failed")?;
        Ok(())
    }

    async fn page_height(&mut self) -> Result<i64> {
        let height = self
            .page
            .evaluate("document.body.scrollHeight")
            .await
            .context("height query failed")?
            .into_value::<i64>()?;
        Ok(height)
    }

    async fn click_load_more(&mut self) -> Result<bool> {
        let page = &self.page;
        let clicked = timeout(self.click_timeout, async {
            let el = page.find_element(LOAD_MORE_SELECTOR).await?;
            el.click().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        })
        .await;

        match clicked {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => {
                debug!("Load-more click failed: {}", e);
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }

    async fn content(&mut self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn close(&mut self) -> Result<()> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            debug!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        closed.context("Failed to close browser")?;
        Ok(())
    }
}

pub struct ChromiumLauncher {
    config: BrowserConfig,
    user_agent: String,
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let session = ChromiumSession::launch(&self.config, &self.user_agent).await?;
        Ok(Box::new(session))
    }
}

// ── Discoverer ────────────────────────────────────────────────────────────────

pub struct BrowserDiscoverer {
    base_url: Url,
    scroll: ScrollSettings,
    launcher: Arc<dyn SessionLauncher>,
}

impl BrowserDiscoverer {
    pub fn new(scraper: &ScraperConfig, browser: &BrowserConfig) -> Result<Self> {
        let launcher = ChromiumLauncher {
            config: browser.clone(),
            user_agent: scraper.user_agent.clone(),
        };
        Self::with_launcher(scraper, browser, Arc::new(launcher))
    }

    pub fn with_launcher(
        scraper: &ScraperConfig,
        browser: &BrowserConfig,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(&scraper.base_url)
                .with_context(|| format!("Invalid base URL {}", scraper.base_url))?,
            scroll: ScrollSettings::from(browser),
            launcher,
        })
    }

    async fn render_listing(&self, url: &Url, limit: usize) -> Result<String> {
        let mut session = self.launcher.launch().await?;

        let rendered = async {
            session.goto(url.as_str()).await?;
            let outcome = load_all(session.as_mut(), limit, &self.scroll).await?;
            info!(
                "Listing loaded: {} scroll rounds, {} load-more attempts",
                outcome.rounds, outcome.load_more_attempts
            );
            session.content().await
        }
        .await;

        if let Err(e) = session.close().await {
            debug!("{:#}", e);
        }
        rendered
    }
}

/// Listing page for a search target.
pub fn listing_url(base: &Url, target: &SearchTarget) -> Result<Url> {
    let mut url = base.join("/search/title/").context("Invalid listing path")?;
    let value = target.normalised_value();
    match target.search_type {
        SearchType::Category => {
            url.query_pairs_mut().append_pair("genres", &value);
        }
        SearchType::Keyword => {
            url.query_pairs_mut()
                .append_pair("keywords", &value)
                .append_pair("explore", "keywords");
        }
    }
    Ok(url)
}

#[async_trait]
impl ListingSource for BrowserDiscoverer {
    /// Browser and navigation failures are logged and yield no items.
    async fn discover(&self, target: &SearchTarget) -> Result<Vec<ItemRef>> {
        let url = listing_url(&self.base_url, target)?;
        info!("Discovering {} from {}", target, url);

        match self.render_listing(&url, target.limit).await {
            Ok(html) => {
                let links = parse_listing_links(&html, &self.base_url, target.limit)?;
                info!("{} item links on listing", links.len());
                Ok(links)
            }
            Err(e) => {
                error!("Listing crawl of {} failed: {:#}", url, e);
                Ok(Vec::new())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
