use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ── Movie ─────────────────────────────────────────────────────────────────────

/// A scraped movie. `title` is the natural key; everything else may be absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub title: String,
    pub year: Option<i32>,
    pub rating: Option<f64>, // 0.0–10.0, one decimal
    pub directors: Option<String>,
    pub cast: Option<String>,
    pub plot: Option<String>,
}

/// A movie row as stored, with its surrogate id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRecord {
    pub id: i64,
    #[serde(flatten)]
    pub movie: Movie,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ── Raw detail page fields ────────────────────────────────────────────────────

/// Strings pulled off a detail page before cleaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMovieRow {
    pub title: Option<String>,
    pub year: Option<String>,
    pub rating: Option<String>,
    pub directors: Option<String>,
    pub cast: Option<String>,
    pub plot: Option<String>,
}

// ── Item reference ────────────────────────────────────────────────────────────

/// Locator for one item's detail page. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef(pub String);

impl ItemRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Search target ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[serde(alias = "genre")]
    Category,
    Keyword,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::Category => f.write_str("category"),
            SearchType::Keyword => f.write_str("keyword"),
        }
    }
}

impl FromStr for SearchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "category" | "genre" => Ok(SearchType::Category),
            "keyword" => Ok(SearchType::Keyword),
            other => Err(format!("invalid search type '{}': choose category or keyword", other)),
        }
    }
}

/// What one job scrapes: a category or keyword, bounded by `limit`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchTarget {
    pub search_type: SearchType,
    pub value: String,
    pub limit: usize,
}

impl SearchTarget {
    pub fn new(search_type: SearchType, value: impl Into<String>, limit: usize) -> Self {
        Self {
            search_type,
            value: value.into(),
            limit,
        }
    }

    /// "time travel " → "time-travel"
    pub fn normalised_value(&self) -> String {
        self.value.split_whitespace().collect::<Vec<_>>().join("-")
    }
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' (limit {})", self.search_type, self.value.trim(), self.limit)
    }
}

// ── Job status ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Error,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }

    /// pending → running → {completed | error}, or pending → error.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Pending, JobState::Running)
                | (JobState::Pending, JobState::Error)
                | (JobState::Running, JobState::Completed)
                | (JobState::Running, JobState::Error)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "running" => Ok(JobState::Running),
            "completed" => Ok(JobState::Completed),
            "error" => Ok(JobState::Error),
            other => Err(format!("unknown job state '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub job_id: Uuid,
    pub state: JobState,
    pub total_count: i64,
    pub scraped_count: i64,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl JobStatus {
    pub fn new_pending(total_count: usize) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            job_id: Uuid::new_v4(),
            state: JobState::Pending,
            total_count: total_count as i64,
            scraped_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions_are_monotonic() {
        use JobState::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Error));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Error));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Error));
        assert!(!Error.can_transition_to(Running));
    }

    #[test]
    fn test_search_type_accepts_genre_alias() {
        assert_eq!("genre".parse::<SearchType>(), Ok(SearchType::Category));
        assert_eq!("Keyword".parse::<SearchType>(), Ok(SearchType::Keyword));
        assert!("title".parse::<SearchType>().is_err());

        let t: SearchType = serde_json::from_str("\"genre\"").unwrap();
        assert_eq!(t, SearchType::Category);
    }

    #[test]
    fn test_normalised_value() {
        let t = SearchTarget::new(SearchType::Keyword, "  time   travel ", 5);
        assert_eq!(t.normalised_value(), "time-travel");
    }
}
