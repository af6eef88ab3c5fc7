//! HTTP API: start scrape jobs, poll their progress, browse stored movies.

use crate::config::ApiConfig;
use crate::jobs::JobQueue;
use crate::models::{JobStatus, MovieRecord, SearchTarget, SearchType};
use crate::storage::{JobStore, Repository};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub queue: JobQueue,
    pub repo: Arc<Repository>,
    pub default_limit: usize,
    pub default_per_page: usize,
}

// ── Request / response types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub value: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: String,
    pub job_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub job_id: Uuid,
    pub status: String,
    pub scraped: i64,
    pub total: i64,
    pub error: Option<String>,
    pub updated_at: NaiveDateTime,
}

impl From<JobStatus> for ProgressResponse {
    fn from(s: JobStatus) -> Self {
        Self {
            job_id: s.job_id,
            status: s.state.to_string(),
            scraped: s.scraped_count,
            total: s.total_count,
            error: s.error_message,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MovieQuery {
    #[serde(default)]
    pub search: String,
    pub per_page: Option<usize>,
    pub page: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoviePage {
    pub count: i64,
    pub page: usize,
    pub per_page: usize,
    pub results: Vec<MovieRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

// ── Handlers ──────────────────────────────────────────────────────────────────

pub async fn start_scrape(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Response {
    let target = SearchTarget::new(
        request.search_type,
        request.value,
        request.limit.unwrap_or(state.default_limit),
    );

    match state.queue.submit(target) {
        Ok(job_id) => Json(StartResponse {
            status: "started".to_string(),
            job_id,
        })
        .into_response(),
        Err(e) => {
            error!("Failed to queue job: {:#}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e))
        }
    }
}

pub async fn job_progress(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    let Ok(job_id) = Uuid::parse_str(&job_id) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid job id");
    };

    match state.repo.get_job(job_id) {
        Ok(Some(status)) => Json(ProgressResponse::from(status)).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("job {} not found", job_id)),
        Err(e) => {
            error!("Job lookup failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "job lookup failed")
        }
    }
}

pub async fn list_movies(State(state): State<AppState>, Query(q): Query<MovieQuery>) -> Response {
    let per_page = q.per_page.unwrap_or(state.default_per_page).max(1);
    let page = q.page.unwrap_or(1).max(1);

    match state.repo.list_movies(&q.search, page, per_page) {
        Ok((count, results)) => Json(MoviePage {
            count,
            page,
            per_page,
            results,
        })
        .into_response(),
        Err(e) => {
            error!("Movie listing failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "movie listing failed")
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let scraper = Router::new()
        .route("/start", post(start_scrape))
        .route("/progress/:job_id", get(job_progress))
        .route("/movies", get(list_movies))
        .with_state(state);

    Router::new()
        .nest("/api/scraper", scraper)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    config: &ApiConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("API listening on http://{}", config.listen_addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Movie;
    use crate::storage::MovieStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> (AppState, tokio::sync::mpsc::Receiver<crate::jobs::JobRequest>) {
        let repo = Arc::new(Repository::open_in_memory().unwrap());
        repo.run_migrations().unwrap();
        let (queue, rx) = JobQueue::new(8, repo.clone());
        let state = AppState {
            queue,
            repo,
            default_limit: 50,
            default_per_page: 10,
        };
        (state, rx)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(resp: Response) -> T {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_start_then_progress() {
        let (state, mut rx) = state();
        let app = create_router(state.clone());

        let resp = app
            .clone()
            .oneshot(
                Request::post("/api/scraper/start")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"genre","value":"horror"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let started: StartResponse = body_json(resp).await;
        assert_eq!(started.status, "started");

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.job_id, started.job_id);
        assert_eq!(queued.target.search_type, SearchType::Category);
        assert_eq!(queued.target.limit, 50);

        let resp = app
            .oneshot(
                Request::get(format!("/api/scraper/progress/{}", started.job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let progress: ProgressResponse = body_json(resp).await;
        assert_eq!(progress.status, "pending");
        assert_eq!(progress.total, 50);
        assert_eq!(progress.scraped, 0);
    }

    #[tokio::test]
    async fn test_start_answers_503_when_queue_is_full() {
        let repo = Arc::new(Repository::open_in_memory().unwrap());
        repo.run_migrations().unwrap();
        let (queue, _rx) = JobQueue::new(1, repo.clone());
        let app = create_router(AppState {
            queue,
            repo,
            default_limit: 50,
            default_per_page: 10,
        });

        let start = || {
            Request::post("/api/scraper/start")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"type":"keyword","value":"time travel","limit":5}"#))
                .unwrap()
        };

        let resp = app.clone().oneshot(start()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.oneshot(start()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorResponse = body_json(resp).await;
        assert!(body.error.contains("job queue is full"));
    }

    #[tokio::test]
    async fn test_progress_errors() {
        let (state, _rx) = state();
        let app = create_router(state);

        let resp = app
            .clone()
            .oneshot(Request::get("/api/scraper/progress/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(
                Request::get(format!("/api/scraper/progress/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_movie_listing_search() {
        let (state, _rx) = state();
        state
            .repo
            .insert_ignoring_conflicts(&[
                Movie {
                    title: "Primer".into(),
                    year: Some(2004),
                    rating: Some(6.8),
                    directors: Some("Shane Carruth".into()),
                    cast: None,
                    plot: None,
                },
                Movie {
                    title: "Looper".into(),
                    year: Some(2012),
                    rating: Some(7.4),
                    directors: Some("Rian Johnson".into()),
                    cast: None,
                    plot: None,
                },
            ])
            .unwrap();

        let resp = create_router(state)
            .oneshot(
                Request::get("/api/scraper/movies?search=rian&per_page=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let page: MoviePage = body_json(resp).await;
        assert_eq!(page.count, 1);
        assert_eq!(page.per_page, 5);
        assert_eq!(page.results[0].movie.title, "Looper");
    }
}
