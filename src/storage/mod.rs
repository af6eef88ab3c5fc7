use crate::models::{JobState, JobStatus, Movie, MovieRecord};
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{params, params_from_iter, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS movie_id_seq START 1;

CREATE TABLE IF NOT EXISTS movies (
    id          BIGINT PRIMARY KEY DEFAULT nextval('movie_id_seq'),
    title       VARCHAR NOT NULL UNIQUE,
    year        INTEGER,
    rating      DOUBLE,
    directors   VARCHAR,
    "cast"      VARCHAR,
    plot        VARCHAR,
    created_at  TIMESTAMP NOT NULL,
    updated_at  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS scrape_jobs (
    job_id         VARCHAR PRIMARY KEY,
    status         VARCHAR NOT NULL DEFAULT 'pending',
    total_count    BIGINT NOT NULL DEFAULT 0,
    scraped_count  BIGINT NOT NULL DEFAULT 0,
    error_message  VARCHAR,
    created_at     TIMESTAMP NOT NULL,
    updated_at     TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const MOVIE_COLUMNS: &str =
    r#"id, title, year, rating, directors, "cast", plot, created_at, updated_at"#;

const SEARCH_FILTER: &str = r#"
    (? = '' OR title ILIKE ? OR directors ILIKE ? OR "cast" ILIKE ?
        OR CAST(year AS VARCHAR) ILIKE ?)
"#;

// ── Storage boundaries ────────────────────────────────────────────────────────

/// Unique-title movie storage used by the upsert writer.
pub trait MovieStore: Send + Sync {
    fn existing_titles(&self, titles: &[String]) -> Result<HashSet<String>>;
    /// Bulk insert; rows whose title already exists are skipped.
    fn insert_ignoring_conflicts(&self, movies: &[Movie]) -> Result<usize>;
    fn movies_by_title(&self, titles: &[String]) -> Result<Vec<MovieRecord>>;
    /// Bulk update of every non-key field, matched by id.
    fn update_movies(&self, records: &[MovieRecord]) -> Result<usize>;
}

pub trait JobStore: Send + Sync {
    fn insert_job(&self, job: &JobStatus) -> Result<()>;
    fn save_job(&self, job: &JobStatus) -> Result<()>;
    fn get_job(&self, job_id: Uuid) -> Result<Option<JobStatus>>;
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Mutex<Connection>,
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn movie_from_row(r: &duckdb::Row<'_>) -> duckdb::Result<MovieRecord> {
    Ok(MovieRecord {
        id: r.get(0)?,
        movie: Movie {
            title: r.get(1)?,
            year: r.get(2)?,
            rating: r.get(3)?,
            directors: r.get(4)?,
            cast: r.get(5)?,
            plot: r.get(6)?,
        },
        created_at: r.get(7)?,
        updated_at: r.get(8)?,
    })
}

type JobRow = (String, String, i64, i64, Option<String>, NaiveDateTime, NaiveDateTime);

fn job_from_row(row: JobRow) -> Result<JobStatus> {
    let (job_id, status, total_count, scraped_count, error_message, created_at, updated_at) = row;
    Ok(JobStatus {
        job_id: Uuid::parse_str(&job_id).with_context(|| format!("bad job id {}", job_id))?,
        state: status.parse::<JobState>().map_err(anyhow::Error::msg)?,
        total_count,
        scraped_count,
        error_message,
        created_at,
        updated_at,
    })
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Mutex::new(Connection::open_in_memory()?) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("DuckDB connection lock poisoned"))
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        let conn = self.conn()?;
        conn.execute_batch(DDL).context("DDL failed")?;
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Movie queries ─────────────────────────────────────────────────────────

    /// Newest first; `search` matches title, directors, cast or year.
    pub fn list_movies(
        &self,
        search: &str,
        page: usize,
        per_page: usize,
    ) -> Result<(i64, Vec<MovieRecord>)> {
        let search = search.trim();
        let pattern = format!("%{}%", search);
        let conn = self.conn()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM movies WHERE {}", SEARCH_FILTER),
            params![search, pattern, pattern, pattern, pattern],
            |r| r.get(0),
        )?;

        let per_page = per_page.max(1);
        let offset = page.saturating_sub(1) * per_page;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM movies WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            MOVIE_COLUMNS, SEARCH_FILTER
        ))?;
        let movies = stmt
            .query_map(
                params![search, pattern, pattern, pattern, pattern, per_page as i64, offset as i64],
                movie_from_row,
            )?
            .collect::<duckdb::Result<Vec<_>>>()?;

        Ok((total, movies))
    }

    pub fn all_movies(&self) -> Result<Vec<MovieRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {} FROM movies ORDER BY id", MOVIE_COLUMNS))?;
        let movies = stmt
            .query_map([], movie_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(movies)
    }

    pub fn movie_count(&self) -> Result<i64> {
        let conn = self.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM movies", [], |r| r.get(0))?)
    }

    /// Job counts per status, e.g. [("completed", 3), ("error", 1)].
    pub fn job_counts(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM scrape_jobs GROUP BY status ORDER BY status",
        )?;
        let counts = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(counts)
    }
}

impl MovieStore for Repository {
    fn existing_titles(&self, titles: &[String]) -> Result<HashSet<String>> {
        if titles.is_empty() {
            return Ok(HashSet::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT title FROM movies WHERE title IN ({})",
            placeholders(titles.len())
        ))?;
        let found = stmt
            .query_map(params_from_iter(titles.iter()), |r| r.get::<_, String>(0))?
            .collect::<duckdb::Result<HashSet<_>>>()?;
        Ok(found)
    }

    fn insert_ignoring_conflicts(&self, movies: &[Movie]) -> Result<usize> {
        if movies.is_empty() {
            return Ok(0);
        }
        let now = Utc::now().naive_utc();
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let sql = r#"
            INSERT OR IGNORE INTO movies
                (title, year, rating, directors, "cast", plot, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let mut inserted = 0;
        for m in movies {
            inserted += tx
                .execute(
                    sql,
                    params![m.title, m.year, m.rating, m.directors, m.cast, m.plot, now, now],
                )
                .with_context(|| format!("insert movie {}", m.title))?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    fn movies_by_title(&self, titles: &[String]) -> Result<Vec<MovieRecord>> {
        if titles.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM movies WHERE title IN ({})",
            MOVIE_COLUMNS,
            placeholders(titles.len())
        ))?;
        let movies = stmt
            .query_map(params_from_iter(titles.iter()), movie_from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(movies)
    }

    fn update_movies(&self, records: &[MovieRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let sql = r#"
            UPDATE movies SET
                year = ?, rating = ?, directors = ?, "cast" = ?, plot = ?, updated_at = ?
            WHERE id = ?
        "#;

        let mut updated = 0;
        for r in records {
            let m = &r.movie;
            updated += tx
                .execute(
                    sql,
                    params![m.year, m.rating, m.directors, m.cast, m.plot, r.updated_at, r.id],
                )
                .with_context(|| format!("update movie {}", m.title))?;
        }
        tx.commit()?;
        Ok(updated)
    }
}

impl JobStore for Repository {
    fn insert_job(&self, job: &JobStatus) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"INSERT INTO scrape_jobs
               (job_id, status, total_count, scraped_count, error_message, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                job.job_id.to_string(),
                job.state.as_str(),
                job.total_count,
                job.scraped_count,
                job.error_message,
                job.created_at,
                job.updated_at,
            ],
        )
        .with_context(|| format!("insert job {}", job.job_id))?;
        Ok(())
    }

    fn save_job(&self, job: &JobStatus) -> Result<()> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                r#"UPDATE scrape_jobs SET
                   status = ?, total_count = ?, scraped_count = ?,
                   error_message = ?, updated_at = ?
                   WHERE job_id = ?"#,
                params![
                    job.state.as_str(),
                    job.total_count,
                    job.scraped_count,
                    job.error_message,
                    job.updated_at,
                    job.job_id.to_string(),
                ],
            )
            .with_context(|| format!("save job {}", job.job_id))?;
        if changed == 0 {
            anyhow::bail!("job {} does not exist", job.job_id);
        }
        Ok(())
    }

    fn get_job(&self, job_id: Uuid) -> Result<Option<JobStatus>> {
        let row: Option<JobRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(
                r#"SELECT job_id, status, total_count, scraped_count, error_message,
                          created_at, updated_at
                   FROM scrape_jobs WHERE job_id = ?"#,
            )?;
            let mut rows = stmt.query_map(params![job_id.to_string()], |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            })?;
            let first = rows.next().transpose()?;
            first
        };
        row.map(job_from_row).transpose()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
