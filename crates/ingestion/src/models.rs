//! Canonical catalog model shared by every stage of the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vod_catalog_core::Pagination;

/// Description carried by the placeholder returned when every source fails
///
/// Matched by exact comparison; do not localise or reword.
pub const NOT_FOUND_DESCRIPTION: &str = "Movie not found: no upstream source returned this title.";

/// Canonical movie record
///
/// Text fields use an empty string for "absent" so a record is always
/// renderable; `slug` is never empty once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub slug: String,
    pub title: String,
    pub original_title: String,
    pub description: String,
    pub poster_url: String,
    pub thumb_url: String,
    pub year: Option<i32>,
    pub director: String,
    pub duration: String,
    pub language: String,
    /// Average rating (0-10 scale)
    pub rating: Option<f32>,
    pub trailer_url: String,
    pub genres: Vec<String>,
    pub countries: Vec<String>,
    /// Monotonic view counter
    pub views: u64,
    pub last_updated: DateTime<Utc>,
    /// Last normalized upstream document for this movie
    pub raw_payload: Option<serde_json::Value>,
}

impl MovieRecord {
    /// Empty record for a slug, stamped now
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: String::new(),
            original_title: String::new(),
            description: String::new(),
            poster_url: String::new(),
            thumb_url: String::new(),
            year: None,
            director: String::new(),
            duration: String::new(),
            language: String::new(),
            rating: None,
            trailer_url: String::new(),
            genres: Vec::new(),
            countries: Vec::new(),
            views: 0,
            last_updated: Utc::now(),
            raw_payload: None,
        }
    }

    /// Placeholder returned when no source produced the movie
    pub fn not_found(slug: &str) -> Self {
        let mut record = Self::new(slug);
        record.title = slug.to_string();
        record.description = NOT_FOUND_DESCRIPTION.to_string();
        record
    }

    /// Whether this record is the not-found placeholder
    pub fn is_placeholder(&self) -> bool {
        self.description == NOT_FOUND_DESCRIPTION
    }

    /// Whether poster or thumbnail is still empty
    pub fn missing_artwork(&self) -> bool {
        self.poster_url.is_empty() || self.thumb_url.is_empty()
    }

    /// Fill empty artwork fields from a resolved image set
    ///
    /// Non-empty fields are never overwritten. Returns true if anything changed.
    pub fn apply_images(&mut self, images: &ImageSet) -> bool {
        let mut changed = false;
        if self.poster_url.is_empty() {
            if let Some(poster) = images.poster_url.as_deref().filter(|p| !p.is_empty()) {
                self.poster_url = poster.to_string();
                changed = true;
            }
        }
        if self.thumb_url.is_empty() {
            if let Some(thumb) = images.thumb_url.as_deref().filter(|t| !t.is_empty()) {
                self.thumb_url = thumb.to_string();
                changed = true;
            }
        }
        changed
    }

    /// Substitute a placeholder path for any artwork still missing
    pub fn with_placeholder_images(mut self, placeholder: &str) -> Self {
        if self.poster_url.is_empty() {
            self.poster_url = placeholder.to_string();
        }
        if self.thumb_url.is_empty() {
            self.thumb_url = placeholder.to_string();
        }
        self
    }
}

/// Poster/thumbnail pair resolved by the image endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    pub poster_url: Option<String>,
    pub thumb_url: Option<String>,
}

impl ImageSet {
    pub fn is_empty(&self) -> bool {
        self.poster_url.is_none() && self.thumb_url.is_none()
    }
}

/// Transport type of a playback URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamType {
    /// Playlist manifest referencing media segments (m3u8, mpd)
    SegmentedStream,
    /// HTML player page meant for an iframe
    Embed,
    /// Single media file
    DirectFile,
    Unknown,
}

impl StreamType {
    /// Ranking priority, lower is better
    pub fn priority(self) -> u8 {
        match self {
            Self::SegmentedStream => 0,
            Self::DirectFile => 1,
            Self::Embed => 2,
            Self::Unknown => 3,
        }
    }
}

/// Quality label inferred from URL tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    SD,
    HD,
    FHD,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SD => "SD",
            Self::HD => "HD",
            Self::FHD => "FHD",
        };
        f.write_str(label)
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SD" => Ok(Self::SD),
            "HD" => Ok(Self::HD),
            "FHD" | "FULLHD" | "FULL HD" => Ok(Self::FHD),
            other => Err(format!("unknown quality '{}'", other)),
        }
    }
}

/// One playback option for an episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCandidate {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub quality: Quality,
    /// Result of the last reachability probe
    pub is_working: bool,
    /// Derived from the stream type, lower is better
    pub priority: u8,
}

impl ServerCandidate {
    /// Candidate as extracted from upstream, before analysis
    ///
    /// Unprobed candidates count as working until a probe says otherwise.
    pub fn unanalyzed(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            stream_type: StreamType::Unknown,
            quality: Quality::HD,
            is_working: true,
            priority: StreamType::Unknown.priority(),
        }
    }
}

/// Identity of an episode: movie slug plus 1-based episode number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId {
    pub movie_slug: String,
    pub episode_number: u32,
}

impl EpisodeId {
    pub fn new(movie_slug: impl Into<String>, episode_number: u32) -> Self {
        Self {
            movie_slug: movie_slug.into(),
            episode_number,
        }
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.movie_slug, self.episode_number)
    }
}

impl FromStr for EpisodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (slug, number) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("episode id '{}' must look like slug:number", s))?;
        if slug.is_empty() {
            return Err(format!("episode id '{}' has an empty slug", s));
        }
        let episode_number = number
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("episode id '{}' has an invalid episode number", s))?;
        Ok(Self::new(slug, episode_number))
    }
}

/// Episode of a movie with its playback servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub movie_slug: String,
    /// 1-based, unique within the movie
    pub episode_number: u32,
    pub title: String,
    /// Primary playback URL
    pub url: String,
    pub servers: Vec<ServerCandidate>,
}

impl EpisodeRecord {
    pub fn id(&self) -> EpisodeId {
        EpisodeId::new(self.movie_slug.clone(), self.episode_number)
    }
}

/// Listing filter for the filter operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MovieFilter {
    /// Listing kind, e.g. `phim-le`, `phim-bo`
    pub kind: Option<String>,
    pub genre: Option<String>,
    pub country: Option<String>,
    pub year: Option<i32>,
}

/// One page of movies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoviePage {
    pub items: Vec<MovieRecord>,
    pub pagination: Pagination,
}

impl MoviePage {
    pub fn empty(limit: u32) -> Self {
        Self {
            items: Vec::new(),
            pagination: Pagination::empty(limit),
        }
    }
}
