//! Job coordinator: listing discovery → concurrent detail fetches → upserts.
//!
//! ## Phases
//!
//!   1. Resolve the search target and discover item links in the browser.
//!      A thrown discovery error or an empty result ends the job in `error`
//!      before anything is fetched or written.
//!   2. Fan the links out to a bounded pool of HTTP fetches. Results are
//!      drained as they complete; per-item failures are logged and skipped.
//!   3. Flush parsed movies to the upsert writer every `flush_size` records,
//!      and once more for the remainder. Storage errors fail the job.
//!
//! Only the coordinating flow touches the job status or the writer.

pub mod job;
pub mod writer;

use crate::config::AppConfig;
use crate::models::{Movie, SearchTarget};
use crate::scraper::browser::BrowserDiscoverer;
use crate::scraper::parsers::{DetailRules, ImdbDetailParser};
use crate::scraper::{DetailFetcher, DetailSource, ListingSource};
use crate::storage::MovieStore;
use crate::utils::Timer;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use self::job::{JobContext, JobError};
use self::writer::{UpsertWriter, WriteStats};

pub struct JobCoordinator {
    listing: Arc<dyn ListingSource>,
    details: Arc<dyn DetailSource>,
    writer: UpsertWriter,
    concurrency: usize,
    flush_size: usize,
}

impl JobCoordinator {
    pub fn new(
        listing: Arc<dyn ListingSource>,
        details: Arc<dyn DetailSource>,
        store: Arc<dyn MovieStore>,
        concurrency: usize,
        flush_size: usize,
    ) -> Self {
        Self {
            listing,
            details,
            writer: UpsertWriter::new(store),
            concurrency: concurrency.max(1),
            flush_size: flush_size.max(1),
        }
    }

    /// Browser discovery + HTTP detail fetching against the configured site.
    pub fn from_config(config: &AppConfig, store: Arc<dyn MovieStore>) -> Result<Self> {
        let listing = BrowserDiscoverer::new(&config.scraper, &config.browser)
            .context("Failed to build listing discoverer")?;
        let parser = ImdbDetailParser::new(DetailRules::default());
        let details = DetailFetcher::new(&config.scraper, Arc::new(parser))
            .context("Failed to build detail fetcher")?;

        Ok(Self::new(
            Arc::new(listing),
            Arc::new(details),
            store,
            config.scraper.concurrency,
            config.pipeline.flush_size,
        ))
    }

    /// Drive one job to a terminal state. Failures are recorded on the job
    /// before being returned.
    pub async fn run(&self, ctx: &mut JobContext, target: &SearchTarget) -> Result<JobSummary> {
        let _t = Timer::start(format!("Job {} ({})", ctx.job_id(), target));
        let result = self.execute(ctx, target).await;

        if let Err(e) = &result {
            if !ctx.status().state.is_terminal() {
                if let Err(save_err) = ctx.fail(format!("{:#}", e)) {
                    error!("Job {}: could not record failure: {:#}", ctx.job_id(), save_err);
                }
            }
        }
        result
    }

    async fn execute(&self, ctx: &mut JobContext, target: &SearchTarget) -> Result<JobSummary> {
        if let Err(reason) = validate(target) {
            let err = JobError::InvalidTarget(reason);
            ctx.fail(err.to_string())?;
            return Err(err.into());
        }

        ctx.start()?;

        // ── 1. Discover item links ────────────────────────────────────────────
        let items = match self.listing.discover(target).await {
            Ok(items) => items,
            Err(e) => {
                let err = JobError::Discovery(format!("{:#}", e));
                ctx.fail(err.to_string())?;
                return Err(err.into());
            }
        };
        if items.is_empty() {
            let err = JobError::NoItemsFound { target: target.to_string() };
            ctx.fail(err.to_string())?;
            return Err(err.into());
        }
        info!("Job {}: {} items discovered", ctx.job_id(), items.len());

        // ── 2. Fan out detail fetches ─────────────────────────────────────────
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for item in items.iter().cloned() {
            let details = Arc::clone(&self.details);
            let sem = Arc::clone(&sem);
            tasks.spawn(async move {
                let movie = match sem.acquire().await {
                    Ok(_permit) => details.fetch(&item).await,
                    Err(_) => None,
                };
                (item, movie)
            });
        }

        // ── 3. Drain and flush in batches ─────────────────────────────────────
        let mut summary = JobSummary {
            discovered: items.len(),
            ..Default::default()
        };
        let mut batch: Vec<Movie> = Vec::with_capacity(self.flush_size);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Some(movie))) => {
                    summary.parsed += 1;
                    batch.push(movie);
                    if batch.len() >= self.flush_size {
                        summary.written += self.writer.write(&batch)?;
                        batch.clear();
                    }
                }
                Ok((item, None)) => {
                    debug!("{}: skipped", item);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Fetch task panicked: {}", e);
                    summary.failed += 1;
                }
            }
        }
        if !batch.is_empty() {
            summary.written += self.writer.write(&batch)?;
        }

        ctx.complete(summary.discovered)?;
        info!(
            "Job {}: {} discovered | {} parsed | {} failed | {} inserted | {} updated",
            ctx.job_id(),
            summary.discovered,
            summary.parsed,
            summary.failed,
            summary.written.inserted,
            summary.written.updated,
        );
        Ok(summary)
    }
}

fn validate(target: &SearchTarget) -> std::result::Result<(), String> {
    if target.value.trim().is_empty() {
        return Err("search value is empty".to_string());
    }
    if target.limit == 0 {
        return Err("limit must be at least 1".to_string());
    }
    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub discovered: usize,
    pub parsed: usize,
    pub failed: usize,
    pub written: WriteStats,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemRef, JobState, JobStatus, MovieRecord, SearchType};
    use crate::storage::{JobStore, Repository};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    enum FakeListing {
        Items(Vec<ItemRef>),
        Fails(&'static str),
    }

    #[async_trait]
    impl ListingSource for FakeListing {
        async fn discover(&self, _target: &SearchTarget) -> Result<Vec<ItemRef>> {
            match self {
                FakeListing::Items(items) => Ok(items.clone()),
                FakeListing::Fails(msg) => Err(anyhow::anyhow!(*msg)),
            }
        }
    }

    /// Serves canned movies by URL; unknown URLs fail. Tracks peak concurrency.
    #[derive(Default)]
    struct FakeDetails {
        movies: HashMap<String, Movie>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl DetailSource for FakeDetails {
        async fn fetch(&self, item: &ItemRef) -> Option<Movie> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.movies.get(item.as_str()).cloned()
        }
    }

    /// Repository wrapper counting writes, optionally failing them.
    struct CountingStore {
        repo: Arc<Repository>,
        writes: AtomicUsize,
        fail_writes: bool,
    }

    impl MovieStore for CountingStore {
        fn existing_titles(&self, titles: &[String]) -> Result<HashSet<String>> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                anyhow::bail!("disk full");
            }
            self.repo.existing_titles(titles)
        }
        fn insert_ignoring_conflicts(&self, movies: &[Movie]) -> Result<usize> {
            self.repo.insert_ignoring_conflicts(movies)
        }
        fn movies_by_title(&self, titles: &[String]) -> Result<Vec<MovieRecord>> {
            self.repo.movies_by_title(titles)
        }
        fn update_movies(&self, records: &[MovieRecord]) -> Result<usize> {
            self.repo.update_movies(records)
        }
    }

    struct Harness {
        repo: Arc<Repository>,
        store: Arc<CountingStore>,
        ctx: JobContext,
    }

    fn harness(limit: usize, fail_writes: bool) -> Harness {
        let repo = Arc::new(Repository::open_in_memory().unwrap());
        repo.run_migrations().unwrap();
        let status = JobStatus::new_pending(limit);
        repo.insert_job(&status).unwrap();
        let store = Arc::new(CountingStore {
            repo: repo.clone(),
            writes: AtomicUsize::new(0),
            fail_writes,
        });
        let ctx = JobContext::new(status, repo.clone());
        Harness { repo, store, ctx }
    }

    fn coordinator(listing: FakeListing, details: Arc<FakeDetails>, store: Arc<CountingStore>) -> JobCoordinator {
        JobCoordinator::new(Arc::new(listing), details, store, 10, 2)
    }

    fn refs(n: usize) -> Vec<ItemRef> {
        (1..=n)
            .map(|i| ItemRef(format!("https://www.imdb.com/title/tt{:07}/", i)))
            .collect()
    }

    fn details_for(items: &[ItemRef]) -> FakeDetails {
        let movies = items
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let movie = Movie {
                    title: format!("Movie {}", i + 1),
                    year: Some(2000 + i as i32),
                    rating: Some(7.0),
                    directors: None,
                    cast: None,
                    plot: None,
                };
                (r.0.clone(), movie)
            })
            .collect();
        FakeDetails { movies, ..Default::default() }
    }

    fn keyword(limit: usize) -> SearchTarget {
        SearchTarget::new(SearchType::Keyword, "time travel", limit)
    }

    #[tokio::test]
    async fn test_time_travel_end_to_end() {
        let mut h = harness(5, false);
        let items = refs(5);
        let mut details = details_for(&items);
        details.movies.remove(items[2].as_str());

        let coord = coordinator(FakeListing::Items(items), Arc::new(details), h.store.clone());
        let summary = coord.run(&mut h.ctx, &keyword(5)).await.unwrap();

        assert_eq!(summary.discovered, 5);
        assert_eq!(summary.parsed, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.written.inserted, 4);

        let status = h.repo.get_job(h.ctx.job_id()).unwrap().unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.scraped_count, 5);
        assert_eq!(status.error_message, None);
        assert_eq!(h.repo.movie_count().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_empty_discovery_fails_with_no_items_found() {
        let mut h = harness(5, false);
        let coord = coordinator(
            FakeListing::Items(vec![]),
            Arc::new(FakeDetails::default()),
            h.store.clone(),
        );

        let err = coord.run(&mut h.ctx, &keyword(5)).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<JobError>(), Some(JobError::NoItemsFound { .. })));

        let status = h.repo.get_job(h.ctx.job_id()).unwrap().unwrap();
        assert_eq!(status.state, JobState::Error);
        assert!(status.error_message.unwrap().contains("no items found"));
        assert_eq!(status.scraped_count, 0);
        assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_discovery_error_skips_writer() {
        let mut h = harness(5, false);
        let coord = coordinator(
            FakeListing::Fails("browser crashed"),
            Arc::new(FakeDetails::default()),
            h.store.clone(),
        );

        let err = coord.run(&mut h.ctx, &keyword(5)).await.unwrap_err();
        assert!(err.to_string().contains("browser crashed"));

        let status = h.repo.get_job(h.ctx.job_id()).unwrap().unwrap();
        assert_eq!(status.state, JobState::Error);
        assert!(status.error_message.unwrap().contains("browser crashed"));
        assert_eq!(h.store.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_job() {
        let mut h = harness(3, true);
        let items = refs(3);
        let details = details_for(&items);
        let coord = coordinator(FakeListing::Items(items), Arc::new(details), h.store.clone());

        let err = coord.run(&mut h.ctx, &keyword(3)).await.unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));

        let status = h.repo.get_job(h.ctx.job_id()).unwrap().unwrap();
        assert_eq!(status.state, JobState::Error);
        assert!(status.error_message.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_invalid_target_fails_from_pending() {
        let mut h = harness(5, false);
        let coord = coordinator(
            FakeListing::Items(refs(1)),
            Arc::new(FakeDetails::default()),
            h.store.clone(),
        );

        let target = SearchTarget::new(SearchType::Category, "   ", 5);
        assert!(coord.run(&mut h.ctx, &target).await.is_err());
        let status = h.repo.get_job(h.ctx.job_id()).unwrap().unwrap();
        assert_eq!(status.state, JobState::Error);
        assert!(status.error_message.unwrap().contains("search value is empty"));
    }

    #[tokio::test]
    async fn test_batches_flush_every_two_records() {
        let mut h = harness(5, false);
        let items = refs(5);
        let details = details_for(&items);
        let coord = coordinator(FakeListing::Items(items), Arc::new(details), h.store.clone());

        coord.run(&mut h.ctx, &keyword(5)).await.unwrap();
        // 2 + 2 + remainder of 1
        assert_eq!(h.store.writes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_pool_is_bounded() {
        let mut h = harness(30, false);
        let items = refs(30);
        let mut details = details_for(&items);
        details.delay = Duration::from_millis(5);
        let details = Arc::new(details);

        let coord = JobCoordinator::new(
            Arc::new(FakeListing::Items(items)),
            details.clone(),
            h.store.clone(),
            4,
            2,
        );
        coord.run(&mut h.ctx, &keyword(30)).await.unwrap();

        let peak = details.peak.load(Ordering::SeqCst);
        assert!(peak <= 4, "peak concurrency {}", peak);
        assert_eq!(h.repo.movie_count().unwrap(), 30);
    }
}
