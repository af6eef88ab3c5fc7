mod api;
mod config;
mod export;
mod jobs;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use crate::api::AppState;
use crate::config::AppConfig;
use crate::jobs::{run_worker, JobQueue};
use crate::models::{JobStatus, SearchTarget, SearchType};
use crate::pipeline::job::JobContext;
use crate::pipeline::JobCoordinator;
use crate::storage::{JobStore, Repository};

#[derive(Parser)]
#[command(name = "movie-scraper", about = "Movie metadata scraper with job tracking", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the background job worker
    Serve,

    /// Run one scrape job in the foreground
    Scrape {
        /// Search by category (genre) or keyword
        #[arg(long = "type", value_parser = parse_search_type)]
        search_type: SearchType,

        /// The category or keyword to search
        #[arg(long)]
        value: String,

        /// Maximum number of movies to scrape
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show the status of a job
    Status { job_id: Uuid },

    /// List stored movies
    Movies {
        #[arg(short, long, default_value = "")]
        search: String,

        #[arg(long, default_value_t = 10)]
        per_page: usize,

        #[arg(long, default_value_t = 1)]
        page: usize,
    },

    /// Export all stored movies to CSV
    Export {
        #[arg(short, long, default_value = "data/movies.csv")]
        out: PathBuf,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations
    Migrate,
}

fn parse_search_type(s: &str) -> Result<SearchType, String> {
    s.parse()
}

fn open_repository(config: &AppConfig) -> Result<Arc<Repository>> {
    let repo = Repository::open(&config.storage.db_path)?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(Arc::new(repo))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "movie_scraper=info,warn",
        1 => "movie_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Serve => {
            let repo = open_repository(&config)?;
            let coordinator = Arc::new(JobCoordinator::from_config(&config, repo.clone())?);
            let (queue, rx) = JobQueue::new(config.pipeline.queue_capacity, repo.clone());
            let worker = tokio::spawn(run_worker(rx, coordinator, repo.clone()));

            let state = AppState {
                queue,
                repo,
                default_limit: config.pipeline.default_limit,
                default_per_page: config.api.default_per_page,
            };
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            };
            api::serve(&config.api, state, shutdown).await?;
            worker.abort();
        }

        Command::Scrape { search_type, value, limit } => {
            let _t = utils::Timer::start("Scrape");
            let repo = open_repository(&config)?;
            let target = SearchTarget::new(
                search_type,
                value,
                limit.unwrap_or(config.pipeline.default_limit),
            );
            info!("Scraping {}", target);

            let status = JobStatus::new_pending(target.limit);
            repo.insert_job(&status)?;
            let mut ctx = JobContext::new(status, repo.clone());

            let coordinator = JobCoordinator::from_config(&config, repo.clone())?;
            let summary = coordinator.run(&mut ctx, &target).await?;
            println!(
                "Job {}: {} found, {} scraped, {} inserted, {} updated, {} failed",
                ctx.job_id(),
                summary.discovered,
                summary.parsed,
                summary.written.inserted,
                summary.written.updated,
                summary.failed,
            );
        }

        Command::Status { job_id } => {
            let repo = open_repository(&config)?;
            let status = repo
                .get_job(job_id)?
                .with_context(|| format!("Job with id {} does not exist", job_id))?;
            println!("{}", serde_json::to_string_pretty(&api::ProgressResponse::from(status))?);
        }

        Command::Movies { search, per_page, page } => {
            let repo = open_repository(&config)?;
            let (total, movies) = repo.list_movies(&search, page, per_page)?;
            if movies.is_empty() {
                println!("No movies — run `movie-scraper scrape` first.");
            } else {
                println!("{} movies (page {}):", utils::fmt_number(total), page);
                for r in &movies {
                    let m = &r.movie;
                    println!(
                        "  {:>5}  {} ({})  ★ {}  {}",
                        r.id,
                        m.title,
                        m.year.map(|y| y.to_string()).unwrap_or("—".into()),
                        m.rating.map(|x| format!("{:.1}", x)).unwrap_or("—".into()),
                        utils::truncate(m.directors.as_deref().unwrap_or(""), 40),
                    );
                }
            }
        }

        Command::Export { out } => {
            let repo = open_repository(&config)?;
            let movies = repo.all_movies()?;
            export::export_csv(&out, &movies)?;
            println!("{} movies exported to {}", movies.len(), out.display());
        }

        Command::Stats => {
            let repo = open_repository(&config)?;
            let movies = repo.movie_count()?;
            let jobs = repo.job_counts()?;
            println!("─────────────────────────────────");
            println!("  Movie Scraper — Database Stats");
            println!("─────────────────────────────────");
            println!("  Movies   : {}", utils::fmt_number(movies));
            if jobs.is_empty() {
                println!("  Jobs     : —");
            }
            for (status, n) in &jobs {
                println!("  Jobs {:<9}: {}", status, utils::fmt_number(*n));
            }
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
