//! Known upstream document shapes

use serde_json::Value;

/// Shape of a detail document
///
/// - `Envelope`: `{ "status": .., "movie": {..}, "episodes": [..] }`
/// - `Nested`: `{ "data": { "item": { .., "episodes": [..] } } }`
/// - `Flat`: the movie object itself, episodes under `episodes` or `items`
#[derive(Debug, Clone, Copy)]
pub(crate) enum Dialect<'a> {
    Envelope { root: &'a Value, movie: &'a Value },
    Nested { root: &'a Value, item: &'a Value },
    Flat { root: &'a Value },
}

impl<'a> Dialect<'a> {
    pub(crate) fn detect(root: &'a Value) -> Option<Self> {
        if let Some(item) = root
            .get("data")
            .and_then(|d| d.get("item"))
            .filter(|i| i.is_object())
        {
            return Some(Self::Nested { root, item });
        }

        if let Some(movie) = root.get("movie").filter(|m| m.is_object()) {
            return Some(Self::Envelope { root, movie });
        }

        let looks_like_movie = root.is_object()
            && ["slug", "name", "title"]
                .iter()
                .any(|key| root.get(key).is_some_and(|v| v.is_string()));
        looks_like_movie.then_some(Self::Flat { root })
    }

    pub(crate) fn movie(&self) -> &'a Value {
        match *self {
            Self::Envelope { movie, .. } => movie,
            Self::Nested { item, .. } => item,
            Self::Flat { root } => root,
        }
    }

    pub(crate) fn episodes(&self) -> Option<&'a Value> {
        let episodes = match *self {
            Self::Envelope { root, movie } => root.get("episodes").or_else(|| movie.get("episodes")),
            Self::Nested { item, .. } => item.get("episodes"),
            Self::Flat { root } => root.get("episodes").or_else(|| root.get("items")),
        };
        episodes.filter(|v| !v.is_null())
    }

    pub(crate) fn image_base(&self) -> Option<&'a str> {
        let root = match *self {
            Self::Envelope { root, .. } | Self::Nested { root, .. } | Self::Flat { root } => root,
        };
        payload_image_base(root)
    }
}

/// CDN prefix a payload declares for its relative artwork paths
pub(crate) fn payload_image_base(root: &Value) -> Option<&str> {
    let data = root.get("data");
    [
        root.get("pathImage"),
        data.and_then(|d| d.get("pathImage")),
        root.get("APP_DOMAIN_CDN_IMAGE"),
        data.and_then(|d| d.get("APP_DOMAIN_CDN_IMAGE")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|s| !s.trim().is_empty())
}

/// Array of listing items in any of the known locations
pub(crate) fn listing_items(root: &Value) -> Option<&Vec<Value>> {
    let data = root.get("data");
    [
        root.get("items"),
        data.and_then(|d| d.get("items")),
        data,
        root.get("movies"),
        Some(root),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_array)
}

/// Pagination object in any of the known locations
pub(crate) fn pagination(root: &Value) -> Option<&Value> {
    let data = root.get("data");
    [
        root.get("pagination"),
        data.and_then(|d| d.get("params")).and_then(|p| p.get("pagination")),
        data.and_then(|d| d.get("pagination")),
        root.get("paginate"),
    ]
    .into_iter()
    .flatten()
    .find(|v| v.is_object())
}

/// Pagination keys, camel and snake spellings
pub(crate) const TOTAL_ITEMS: &[&str] = &["totalItems", "total_items", "total"];
pub(crate) const TOTAL_PAGES: &[&str] = &["totalPages", "total_pages", "last_page"];
pub(crate) const CURRENT_PAGE: &[&str] = &["currentPage", "current_page", "page"];
pub(crate) const PAGE_SIZE: &[&str] = &["totalItemsPerPage", "per_page", "limit"];
