use crate::models::{ItemRef, RawMovieRow};
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use url::Url;

fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("selector {:?}: {:?}", s, e))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Listing page ──────────────────────────────────────────────────────────────

/// Item links on a fully loaded listing page, in document order, at most `limit`.
pub fn parse_listing_links(html: &str, base: &Url, limit: usize) -> Result<Vec<ItemRef>> {
    let doc = Html::parse_document(html);
    let item_sel = selector("ul.ipc-metadata-list > li")?;
    let link_sel = selector("a.ipc-title-link-wrapper")?;

    let mut links = Vec::new();
    if limit == 0 {
        return Ok(links);
    }

    for li in doc.select(&item_sel) {
        let href = li
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"));
        let Some(href) = href else { continue };
        let Ok(url) = base.join(href) else { continue };

        links.push(ItemRef(url.to_string()));
        if links.len() == limit {
            break;
        }
    }

    Ok(links)
}

// ── Detail page ───────────────────────────────────────────────────────────────

/// Site-specific extraction of one detail page. The core only sees `RawMovieRow`.
pub trait DetailParser: Send + Sync {
    fn parse(&self, html: &str) -> Result<RawMovieRow>;
}

/// Extraction rules for IMDb title pages.
#[derive(Debug, Clone)]
pub struct DetailRules {
    pub title: &'static str,
    pub year_list: &'static str,
    pub rating: &'static str,
    pub plot: &'static str,
    pub credit_item: &'static str,
    pub credit_label: &'static str,
    pub credit_names: &'static str,
    pub director_labels: &'static [&'static str],
    pub creator_labels: &'static [&'static str],
    pub cast_labels: &'static [&'static str],
}

impl Default for DetailRules {
    fn default() -> Self {
        Self {
            title: r#"h1[data-testid="hero__pageTitle"]"#,
            year_list: "ul.ipc-inline-list.baseAlt",
            rating: r#"[data-testid="hero-rating-bar__aggregate-rating__score"] span"#,
            plot: r#"[data-testid="plot-xl"]"#,
            credit_item: r#"li[data-testid="title-pn-principal-credit"]"#,
            credit_label: ".ipc-metadata-list-item__label",
            credit_names: "ul li a",
            director_labels: &["Director", "Directors"],
            creator_labels: &["Creator", "Creators"],
            cast_labels: &["Stars", "Star"],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImdbDetailParser {
    rules: DetailRules,
}

impl ImdbDetailParser {
    pub fn new(rules: DetailRules) -> Self {
        Self { rules }
    }

    fn first_text(&self, doc: &Html, sel: &str) -> Result<Option<String>> {
        let sel = selector(sel)?;
        Ok(doc
            .select(&sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty()))
    }

    /// Year sits in one of the first two entries of the hero metadata list.
    fn year(&self, doc: &Html) -> Result<Option<String>> {
        let list_sel = selector(self.rules.year_list)?;
        let li_sel = selector("li")?;
        let Some(list) = doc.select(&list_sel).next() else {
            return Ok(None);
        };
        Ok(list
            .select(&li_sel)
            .take(2)
            .map(element_text)
            .find(|t| super::cleaner::parse_year(t).is_some()))
    }

    /// Names under the first principal credit whose label is one of `labels`.
    fn credit(&self, doc: &Html, labels: &[&str]) -> Result<Option<String>> {
        let item_sel = selector(self.rules.credit_item)?;
        let label_sel = selector(self.rules.credit_label)?;
        let names_sel = selector(self.rules.credit_names)?;

        for item in doc.select(&item_sel) {
            let Some(label_el) = item.select(&label_sel).next() else {
                continue;
            };
            let label = element_text(label_el);
            if !labels.iter().any(|l| *l == label) {
                continue;
            }

            // The label itself can be an anchor inside the credits list.
            let mut names: Vec<String> = Vec::new();
            for name in item
                .select(&names_sel)
                .filter(|a| a.id() != label_el.id())
                .map(element_text)
            {
                if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
            if !names.is_empty() {
                return Ok(Some(names.join(", ")));
            }
        }
        Ok(None)
    }
}

impl DetailParser for ImdbDetailParser {
    fn parse(&self, html: &str) -> Result<RawMovieRow> {
        let doc = Html::parse_document(html);

        let directors = match self.credit(&doc, self.rules.director_labels)? {
            Some(d) => Some(d),
            None => self.credit(&doc, self.rules.creator_labels)?,
        };

        Ok(RawMovieRow {
            title: self.first_text(&doc, self.rules.title)?,
            year: self.year(&doc)?,
            rating: self.first_text(&doc, self.rules.rating)?,
            directors,
            cast: self.credit(&doc, self.rules.cast_labels)?,
            plot: self.first_text(&doc, self.rules.plot)?,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
