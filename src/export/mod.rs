//! CSV export of stored movies.

use crate::models::MovieRecord;
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

const HEADER: [&str; 9] = [
    "id", "title", "year", "rating", "directors", "cast", "plot", "created_at", "updated_at",
];

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map(|x| x.to_string()).unwrap_or_default()
}

pub fn write_movies<W: Write>(out: W, movies: &[MovieRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(HEADER)?;
    for r in movies {
        let m = &r.movie;
        writer
            .write_record([
                r.id.to_string(),
                m.title.clone(),
                opt(&m.year),
                opt(&m.rating),
                opt(&m.directors),
                opt(&m.cast),
                opt(&m.plot),
                r.created_at.to_string(),
                r.updated_at.to_string(),
            ])
            .with_context(|| format!("write row for {}", m.title))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv(path: &Path, movies: &[MovieRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("Could not create {:?}", path))?;
    write_movies(file, movies)?;
    info!("{} movies written to {:?}", movies.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Movie;
    use chrono::NaiveDate;

    #[test]
    fn test_csv_quotes_and_blanks() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let record = MovieRecord {
            id: 7,
            movie: Movie {
                title: "Primer".into(),
                year: Some(2004),
                rating: Some(6.8),
                directors: Some("Shane Carruth".into()),
                cast: Some("Shane Carruth, David Sullivan".into()),
                plot: None,
            },
            created_at: ts,
            updated_at: ts,
        };

        let mut buf = Vec::new();
        write_movies(&mut buf, &[record]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,title,year,rating,directors,cast,plot,created_at,updated_at")
        );
        assert_eq!(
            lines.next(),
            Some(
                "7,Primer,2004,6.8,Shane Carruth,\"Shane Carruth, David Sullivan\",,2024-01-02 03:04:05,2024-01-02 03:04:05"
            )
        );
    }
}
