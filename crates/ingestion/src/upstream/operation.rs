//! Logical upstream operations and their version orderings

use crate::models::MovieFilter;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default listing kind used by the filter operation
pub const DEFAULT_FILTER_KIND: &str = "phim-le";

/// Dialect version offered by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1,
    V2,
    V3,
}

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
            Self::V3 => "v3",
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`UpstreamOperation`], carried on payloads and errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    LatestMovies,
    MovieDetail,
    Search,
    Filter,
    Episodes,
    Images,
}

/// One logical call against the provider
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamOperation {
    LatestMovies {
        page: u32,
        limit: u32,
    },
    MovieDetail {
        slug: String,
    },
    Search {
        keyword: String,
        page: u32,
        limit: u32,
    },
    Filter {
        filter: MovieFilter,
        page: u32,
        limit: u32,
    },
    Episodes {
        slug: String,
    },
    Images {
        slug: String,
    },
}

const NEWEST_FIRST: &[ApiVersion] = &[ApiVersion::V3, ApiVersion::V2, ApiVersion::V1];
const QUERY_ORDER: &[ApiVersion] = &[ApiVersion::V1, ApiVersion::V2];
const IMAGE_ORDER: &[ApiVersion] = &[ApiVersion::V1, ApiVersion::V3];

impl UpstreamOperation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::LatestMovies { .. } => OperationKind::LatestMovies,
            Self::MovieDetail { .. } => OperationKind::MovieDetail,
            Self::Search { .. } => OperationKind::Search,
            Self::Filter { .. } => OperationKind::Filter,
            Self::Episodes { .. } => OperationKind::Episodes,
            Self::Images { .. } => OperationKind::Images,
        }
    }

    /// Fixed fallback order used when the caller supplies none
    pub fn default_versions(&self) -> &'static [ApiVersion] {
        match self.kind() {
            OperationKind::LatestMovies | OperationKind::MovieDetail | OperationKind::Episodes => {
                NEWEST_FIRST
            }
            OperationKind::Search | OperationKind::Filter => QUERY_ORDER,
            OperationKind::Images => IMAGE_ORDER,
        }
    }

    /// Path below the version segment, slug already percent-encoded
    pub fn path(&self) -> String {
        match self {
            Self::LatestMovies { .. } => "danh-sach/phim-moi-cap-nhat".to_string(),
            Self::MovieDetail { slug } => format!("phim/{}", urlencoding::encode(slug)),
            Self::Search { .. } => "tim-kiem".to_string(),
            Self::Filter { filter, .. } => format!(
                "danh-sach/{}",
                urlencoding::encode(filter.kind.as_deref().unwrap_or(DEFAULT_FILTER_KIND))
            ),
            Self::Episodes { slug } => format!("phim/{}/tap-phim", urlencoding::encode(slug)),
            Self::Images { slug } => format!("phim/{}/images", urlencoding::encode(slug)),
        }
    }

    pub fn query(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::LatestMovies { page, limit } => {
                vec![("page", page.to_string()), ("limit", limit.to_string())]
            }
            Self::Search {
                keyword,
                page,
                limit,
            } => vec![
                ("keyword", keyword.clone()),
                ("page", page.to_string()),
                ("limit", limit.to_string()),
            ],
            Self::Filter {
                filter,
                page,
                limit,
            } => {
                let mut params = Vec::with_capacity(5);
                if let Some(genre) = &filter.genre {
                    params.push(("category", genre.clone()));
                }
                if let Some(country) = &filter.country {
                    params.push(("country", country.clone()));
                }
                if let Some(year) = filter.year {
                    params.push(("year", year.to_string()));
                }
                params.push(("page", page.to_string()));
                params.push(("limit", limit.to_string()));
                params
            }
            Self::MovieDetail { .. } | Self::Episodes { .. } | Self::Images { .. } => Vec::new(),
        }
    }
}
