use crate::models::Movie;
use crate::storage::MovieStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    pub inserted: usize,
    pub updated: usize,
}

impl std::ops::AddAssign for WriteStats {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
    }
}

/// Insert-or-update by title, one existence query per batch.
pub struct UpsertWriter {
    store: Arc<dyn MovieStore>,
}

impl UpsertWriter {
    pub fn new(store: Arc<dyn MovieStore>) -> Self {
        Self { store }
    }

    pub fn write(&self, batch: &[Movie]) -> Result<WriteStats> {
        if batch.is_empty() {
            return Ok(WriteStats::default());
        }

        // Later entries for the same title win.
        let mut latest: HashMap<&str, &Movie> = HashMap::new();
        let mut titles: Vec<String> = Vec::new();
        for m in batch {
            if latest.insert(m.title.as_str(), m).is_none() {
                titles.push(m.title.clone());
            }
        }

        let existing = self
            .store
            .existing_titles(&titles)
            .context("existing title lookup failed")?;
        let (to_update, to_create): (Vec<String>, Vec<String>) =
            titles.into_iter().partition(|t| existing.contains(t));

        let new_movies: Vec<Movie> = to_create
            .iter()
            .filter_map(|t| latest.get(t.as_str()).map(|m| (*m).clone()))
            .collect();
        let inserted = self.store.insert_ignoring_conflicts(&new_movies)?;

        let mut updated = 0;
        if !to_update.is_empty() {
            let now = Utc::now().naive_utc();
            let mut records = self.store.movies_by_title(&to_update)?;
            for record in &mut records {
                if let Some(m) = latest.get(record.movie.title.as_str()) {
                    record.movie.year = m.year;
                    record.movie.rating = m.rating;
                    record.movie.directors = m.directors.clone();
                    record.movie.cast = m.cast.clone();
                    record.movie.plot = m.plot.clone();
                    record.updated_at = now;
                }
            }
            updated = self.store.update_movies(&records)?;
        }

        debug!("Batch of {}: {} inserted, {} updated", batch.len(), inserted, updated);
        Ok(WriteStats { inserted, updated })
    }
}
