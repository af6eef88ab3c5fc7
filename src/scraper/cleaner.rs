use crate::models::{Movie, RawMovieRow};
use tracing::warn;

// ── Field parsers ─────────────────────────────────────────────────────────────

fn is_placeholder(s: &str) -> bool {
    s.is_empty() || s == "N/A" || s == "-" || s == "—"
}

/// Collapse whitespace; placeholders become `None`.
pub fn clean_text(s: &str) -> Option<String> {
    let s = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if is_placeholder(&s) { None } else { Some(s) }
}

/// First run of exactly four digits.
/// "2015–2019" → 2015 | "TV Series 1999" → 1999 | "12345" → None
pub fn parse_year(s: &str) -> Option<i32> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i - start == 4 {
            return s[start..i].parse().ok();
        }
    }
    None
}

/// Rating on a ten-point scale, one decimal.
/// "7.8" → 7.8 | "7,84" → 7.8 | "11" → None
pub fn parse_rating(s: &str) -> Option<f64> {
    let s = s.trim().replace(',', ".");
    if is_placeholder(&s) {
        return None;
    }
    let cleaned: String = s
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '/')
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    if !(0.0..=10.0).contains(&value) {
        return None;
    }
    Some((value * 10.0).round() / 10.0)
}

// ── Raw row → Movie ───────────────────────────────────────────────────────────

/// `None` when the page had no usable title.
pub fn row_to_movie(row: &RawMovieRow, source: &str) -> Option<Movie> {
    let Some(title) = row.title.as_deref().and_then(clean_text) else {
        warn!("No title on {}, skipping", source);
        return None;
    };

    Some(Movie {
        title,
        year: row.year.as_deref().and_then(parse_year),
        rating: row.rating.as_deref().and_then(parse_rating),
        directors: row.directors.as_deref().and_then(clean_text),
        cast: row.cast.as_deref().and_then(clean_text),
        plot: row.plot.as_deref().and_then(clean_text),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
