//! Response normalization
//!
//! Reconciles the provider's response dialects into the canonical model. A
//! single malformed field never fails a document; it is left empty. Only a
//! payload that is neither JSON nor recognisable text is rejected.

mod aliases;
mod dialect;
mod episodes;

use crate::models::{EpisodeRecord, ImageSet, MovieRecord};
use crate::upstream::RawPayload;
use chrono::Utc;
use dialect::Dialect;
use serde_json::Value;
use tracing::{debug, warn};
use vod_catalog_core::Pagination;

#[derive(Debug, thiserror::Error)]
pub enum NormalizationError {
    #[error("payload is not parseable: {0}")]
    Unparseable(String),

    #[error("document has no slug")]
    MissingSlug,

    #[error("unexpected document shape: {0}")]
    UnexpectedShape(String),
}

type Result<T> = std::result::Result<T, NormalizationError>;

/// A normalized page of listing results
#[derive(Debug, Clone)]
pub struct MovieListing {
    pub items: Vec<MovieRecord>,
    pub pagination: Pagination,
}

/// A normalized detail document
#[derive(Debug, Clone)]
pub struct MovieDetail {
    pub movie: MovieRecord,
    pub episodes: Vec<EpisodeRecord>,
}

/// Converts raw upstream payloads into canonical records
#[derive(Debug, Clone, Default)]
pub struct ResponseNormalizer {
    image_base: Option<String>,
}

impl ResponseNormalizer {
    /// `image_base` is used for relative artwork when the payload declares none
    pub fn new(image_base: Option<String>) -> Self {
        Self { image_base }
    }

    pub fn normalize_listing(
        &self,
        payload: &RawPayload,
        page: u32,
        limit: u32,
    ) -> Result<MovieListing> {
        let root = parse_json(&payload.body)?;
        let items = dialect::listing_items(&root).ok_or_else(|| {
            NormalizationError::UnexpectedShape("no listing items found".to_string())
        })?;
        let base = dialect::payload_image_base(&root).or(self.image_base.as_deref());

        let mut skipped = 0usize;
        let movies: Vec<MovieRecord> = items
            .iter()
            .filter_map(|item| match self.movie_from(item, None, base) {
                Ok(movie) => Some(movie),
                Err(e) => {
                    skipped += 1;
                    debug!(error = %e, "Skipping listing item");
                    None
                }
            })
            .collect();

        if skipped > 0 {
            warn!(skipped, kept = movies.len(), version = %payload.version, "Dropped listing items without a slug");
        }

        let pagination = dialect::pagination(&root)
            .map(|p| pagination_from(p, page, limit))
            .unwrap_or_else(|| Pagination::from_page_len(page, limit, movies.len()));

        Ok(MovieListing {
            items: movies,
            pagination,
        })
    }

    /// Normalize a detail or episodes document
    ///
    /// `fallback_slug` is used when the document itself carries none.
    pub fn normalize_detail(&self, payload: &RawPayload, fallback_slug: &str) -> Result<MovieDetail> {
        let root = parse_json(&payload.body)?;
        let shape = Dialect::detect(&root).ok_or_else(|| {
            NormalizationError::UnexpectedShape("no movie object in detail document".to_string())
        })?;

        let base = shape.image_base().or(self.image_base.as_deref());
        let movie = self.movie_from(shape.movie(), Some(fallback_slug), base)?;
        let episodes = shape
            .episodes()
            .map(|value| episodes::parse(&movie.slug, value))
            .unwrap_or_default();

        debug!(
            slug = %movie.slug,
            version = %payload.version,
            episodes = episodes.len(),
            "Normalized movie detail"
        );

        Ok(MovieDetail { movie, episodes })
    }

    /// Episodes only, accepting any detail dialect, a bare list or free text
    pub fn normalize_episodes(&self, payload: &RawPayload, slug: &str) -> Result<Vec<EpisodeRecord>> {
        match serde_json::from_str::<Value>(&payload.body) {
            Ok(root) => {
                if let Some(shape) = Dialect::detect(&root) {
                    return Ok(shape
                        .episodes()
                        .map(|value| episodes::parse(slug, value))
                        .unwrap_or_default());
                }
                Ok(episodes::parse(slug, &root))
            }
            Err(e) => {
                let parsed = episodes::parse_free_text(slug, &payload.body);
                if parsed.is_empty() {
                    Err(NormalizationError::Unparseable(e.to_string()))
                } else {
                    Ok(parsed)
                }
            }
        }
    }

    /// Poster and thumbnail from the image-resolution endpoint
    pub fn normalize_images(&self, payload: &RawPayload) -> Result<ImageSet> {
        let root = parse_json(&payload.body)?;
        let base = dialect::payload_image_base(&root).or(self.image_base.as_deref());

        let data = root.get("data");
        let holder = [
            data.and_then(|d| d.get("item")),
            data.and_then(|d| d.get("images")).filter(|v| v.is_object()),
            data.filter(|v| v.is_object()),
            root.get("images").filter(|v| v.is_object()),
            root.get("movie"),
            Some(&root),
        ]
        .into_iter()
        .flatten()
        .find(|candidate| {
            aliases::lookup(candidate, aliases::POSTER).is_some()
                || aliases::lookup(candidate, aliases::THUMB).is_some()
        });

        let mut images = match holder {
            Some(obj) => ImageSet {
                poster_url: aliases::optional_text(obj, aliases::POSTER),
                thumb_url: aliases::optional_text(obj, aliases::THUMB),
            },
            None => ImageSet::default(),
        };

        if images.is_empty() {
            images = typed_image_list(&root);
        }

        Ok(ImageSet {
            poster_url: images.poster_url.map(|p| resolve_image(&p, base)),
            thumb_url: images.thumb_url.map(|t| resolve_image(&t, base)),
        })
    }

    fn movie_from(
        &self,
        obj: &Value,
        fallback_slug: Option<&str>,
        base: Option<&str>,
    ) -> Result<MovieRecord> {
        let slug = aliases::optional_text(obj, aliases::SLUG)
            .or_else(|| fallback_slug.map(str::to_string))
            .filter(|s| !s.is_empty())
            .ok_or(NormalizationError::MissingSlug)?;

        let mut movie = MovieRecord::new(slug);
        movie.title = aliases::text(obj, aliases::TITLE);
        movie.original_title = aliases::text(obj, aliases::ORIGINAL_TITLE);
        movie.description = aliases::text(obj, aliases::DESCRIPTION);
        movie.poster_url = resolve_image(&aliases::text(obj, aliases::POSTER), base);
        movie.thumb_url = resolve_image(&aliases::text(obj, aliases::THUMB), base);
        movie.year = aliases::integer(obj, aliases::YEAR).and_then(|y| i32::try_from(y).ok());
        movie.director = aliases::text(obj, aliases::DIRECTOR);
        movie.duration = aliases::text(obj, aliases::DURATION);
        movie.language = aliases::text(obj, aliases::LANGUAGE);
        movie.rating = aliases::float(obj, aliases::RATING).map(|r| r as f32);
        movie.trailer_url = aliases::text(obj, aliases::TRAILER);
        movie.genres = aliases::tokens(obj, aliases::GENRES);
        movie.countries = aliases::tokens(obj, aliases::COUNTRY);
        movie.views = aliases::integer(obj, aliases::VIEWS)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(0);
        movie.last_updated = Utc::now();
        movie.raw_payload = Some(obj.clone());
        Ok(movie)
    }
}

fn parse_json(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| NormalizationError::Unparseable(e.to_string()))
}

fn pagination_from(value: &Value, page: u32, limit: u32) -> Pagination {
    let as_u32 = |keys: &[&str]| {
        aliases::integer(value, keys)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
    };

    let current_page = as_u32(dialect::CURRENT_PAGE).unwrap_or(page);
    let limit = as_u32(dialect::PAGE_SIZE).unwrap_or(limit);
    let total_items = aliases::integer(value, dialect::TOTAL_ITEMS)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);

    let mut pagination = Pagination::from_totals(current_page, limit, total_items);
    if let Some(total_pages) = as_u32(dialect::TOTAL_PAGES) {
        pagination.total_pages = total_pages;
    }
    pagination
}

/// `{ "images": [{ "type": "poster", "file_path": .. }, ..] }`
fn typed_image_list(root: &Value) -> ImageSet {
    let list = aliases::lookup(root, &["data.images", "images"]).and_then(Value::as_array);
    let mut images = ImageSet::default();

    for entry in list.into_iter().flatten() {
        let kind = aliases::text(entry, &["type"]).to_ascii_lowercase();
        let Some(file) = aliases::optional_text(entry, &["file_path", "url", "path"]) else {
            continue;
        };
        match kind.as_str() {
            "poster" if images.poster_url.is_none() => images.poster_url = Some(file),
            "backdrop" | "thumb" | "thumbnail" if images.thumb_url.is_none() => {
                images.thumb_url = Some(file)
            }
            _ => {}
        }
    }
    images
}

/// Join a relative artwork path onto a CDN base
fn resolve_image(url: &str, base: Option<&str>) -> String {
    let url = url.trim();
    if url.is_empty() || url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }
    if let Some(rest) = url.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    match base {
        Some(base) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        ),
        None => url.to_string(),
    }
}
