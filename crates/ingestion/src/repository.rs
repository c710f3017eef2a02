//! Catalog persistence
//!
//! Movies are keyed by slug and episodes by `(movie_slug, episode_number)`.
//! Nothing is ever deleted here. A refresh never lowers `views` and always
//! moves `last_updated` strictly forward.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::models::{EpisodeId, EpisodeRecord, MovieRecord, ServerCandidate};

/// Durable store contract used by the catalog and the sync orchestrator
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_movie(&self, slug: &str) -> Result<Option<MovieRecord>>;

    /// Insert or refresh a movie, returning the stored record
    async fn upsert_movie(&self, movie: &MovieRecord) -> Result<MovieRecord>;

    /// Insert only when absent; returns true if a row was created
    async fn ensure_movie(&self, movie: &MovieRecord) -> Result<bool>;

    /// Most recently refreshed movies first
    async fn recent_movies(&self, limit: usize) -> Result<Vec<MovieRecord>>;

    /// Episodes of a movie ordered by number
    async fn get_episodes(&self, movie_slug: &str) -> Result<Vec<EpisodeRecord>>;

    async fn get_episode(&self, id: &EpisodeId) -> Result<Option<EpisodeRecord>>;

    /// Fails if the episode already exists
    async fn insert_episode(&self, episode: &EpisodeRecord) -> Result<()>;

    /// Replace title, URL and the whole server list of an existing episode
    async fn replace_episode(&self, episode: &EpisodeRecord) -> Result<()>;

    /// Returns the new count, `None` for an unknown slug
    async fn increment_views(&self, slug: &str) -> Result<Option<u64>>;
}

/// Smallest step `last_updated` moves on a refresh
fn min_step() -> Duration {
    Duration::microseconds(1)
}

fn next_timestamp(previous: DateTime<Utc>, incoming: DateTime<Utc>) -> DateTime<Utc> {
    incoming.max(previous + min_step())
}

#[derive(sqlx::FromRow)]
struct MovieRow {
    slug: String,
    title: String,
    original_title: String,
    description: String,
    poster_url: String,
    thumb_url: String,
    year: Option<i32>,
    director: String,
    duration: String,
    language: String,
    rating: Option<f32>,
    trailer_url: String,
    genres: Json<Vec<String>>,
    countries: Json<Vec<String>>,
    views: i64,
    last_updated: DateTime<Utc>,
    raw_payload: Option<Json<Value>>,
}

impl From<MovieRow> for MovieRecord {
    fn from(row: MovieRow) -> Self {
        Self {
            slug: row.slug,
            title: row.title,
            original_title: row.original_title,
            description: row.description,
            poster_url: row.poster_url,
            thumb_url: row.thumb_url,
            year: row.year,
            director: row.director,
            duration: row.duration,
            language: row.language,
            rating: row.rating,
            trailer_url: row.trailer_url,
            genres: row.genres.0,
            countries: row.countries.0,
            views: u64::try_from(row.views).unwrap_or(0),
            last_updated: row.last_updated,
            raw_payload: row.raw_payload.map(|Json(v)| v),
        }
    }
}

#[derive(sqlx::FromRow)]
struct EpisodeRow {
    movie_slug: String,
    episode_number: i32,
    title: String,
    url: String,
    servers: Json<Vec<ServerCandidate>>,
}

impl From<EpisodeRow> for EpisodeRecord {
    fn from(row: EpisodeRow) -> Self {
        Self {
            movie_slug: row.movie_slug,
            episode_number: u32::try_from(row.episode_number).unwrap_or(0),
            title: row.title,
            url: row.url,
            servers: row.servers.0,
        }
    }
}

const MOVIE_COLUMNS: &str = "slug, title, original_title, description, poster_url, thumb_url, \
     year, director, duration, language, rating, trailer_url, genres, countries, views, \
     last_updated, raw_payload";

/// PostgreSQL implementation of [`CatalogStore`]
pub struct PostgresCatalogStore {
    pool: PgPool,
}

impl PostgresCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn views_param(movie: &MovieRecord) -> i64 {
        i64::try_from(movie.views).unwrap_or(i64::MAX)
    }

    fn episode_number_param(number: u32) -> Result<i32> {
        i32::try_from(number).context("Episode number out of range")
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalogStore {
    async fn get_movie(&self, slug: &str) -> Result<Option<MovieRecord>> {
        let row: Option<MovieRow> =
            sqlx::query_as(&format!("SELECT {} FROM movies WHERE slug = $1", MOVIE_COLUMNS))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .context("Failed to load movie")?;

        Ok(row.map(MovieRecord::from))
    }

    async fn upsert_movie(&self, movie: &MovieRecord) -> Result<MovieRecord> {
        if movie.slug.is_empty() {
            bail!("Refusing to persist a movie without a slug");
        }

        let row: MovieRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO movies ({columns})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (slug) DO UPDATE SET
                title = EXCLUDED.title,
                original_title = EXCLUDED.original_title,
                description = EXCLUDED.description,
                poster_url = COALESCE(NULLIF(EXCLUDED.poster_url, ''), movies.poster_url),
                thumb_url = COALESCE(NULLIF(EXCLUDED.thumb_url, ''), movies.thumb_url),
                year = EXCLUDED.year,
                director = EXCLUDED.director,
                duration = EXCLUDED.duration,
                language = EXCLUDED.language,
                rating = EXCLUDED.rating,
                trailer_url = EXCLUDED.trailer_url,
                genres = EXCLUDED.genres,
                countries = EXCLUDED.countries,
                views = GREATEST(movies.views, EXCLUDED.views),
                last_updated = GREATEST(
                    EXCLUDED.last_updated,
                    movies.last_updated + INTERVAL '1 microsecond'
                ),
                raw_payload = COALESCE(EXCLUDED.raw_payload, movies.raw_payload)
            RETURNING {columns}
            "#,
            columns = MOVIE_COLUMNS
        ))
        .bind(&movie.slug)
        .bind(&movie.title)
        .bind(&movie.original_title)
        .bind(&movie.description)
        .bind(&movie.poster_url)
        .bind(&movie.thumb_url)
        .bind(movie.year)
        .bind(&movie.director)
        .bind(&movie.duration)
        .bind(&movie.language)
        .bind(movie.rating)
        .bind(&movie.trailer_url)
        .bind(Json(&movie.genres))
        .bind(Json(&movie.countries))
        .bind(Self::views_param(movie))
        .bind(movie.last_updated)
        .bind(movie.raw_payload.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert movie")?;

        Ok(row.into())
    }

    async fn ensure_movie(&self, movie: &MovieRecord) -> Result<bool> {
        if movie.slug.is_empty() {
            bail!("Refusing to persist a movie without a slug");
        }

        let result = sqlx::query(
            r#"
            INSERT INTO movies (slug, title, original_title, description, poster_url, thumb_url,
                                year, genres, countries, last_updated, raw_payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(&movie.slug)
        .bind(&movie.title)
        .bind(&movie.original_title)
        .bind(&movie.description)
        .bind(&movie.poster_url)
        .bind(&movie.thumb_url)
        .bind(movie.year)
        .bind(Json(&movie.genres))
        .bind(Json(&movie.countries))
        .bind(movie.last_updated)
        .bind(movie.raw_payload.as_ref().map(Json))
        .execute(&self.pool)
        .await
        .context("Failed to insert movie")?;

        Ok(result.rows_affected() == 1)
    }

    async fn recent_movies(&self, limit: usize) -> Result<Vec<MovieRecord>> {
        let rows: Vec<MovieRow> = sqlx::query_as(&format!(
            "SELECT {} FROM movies ORDER BY last_updated DESC LIMIT $1",
            MOVIE_COLUMNS
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to load recent movies")?;

        Ok(rows.into_iter().map(MovieRecord::from).collect())
    }

    async fn get_episodes(&self, movie_slug: &str) -> Result<Vec<EpisodeRecord>> {
        let rows: Vec<EpisodeRow> = sqlx::query_as(
            r#"
            SELECT movie_slug, episode_number, title, url, servers
            FROM episodes
            WHERE movie_slug = $1
            ORDER BY episode_number
            "#,
        )
        .bind(movie_slug)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load episodes")?;

        Ok(rows.into_iter().map(EpisodeRecord::from).collect())
    }

    async fn get_episode(&self, id: &EpisodeId) -> Result<Option<EpisodeRecord>> {
        let row: Option<EpisodeRow> = sqlx::query_as(
            r#"
            SELECT movie_slug, episode_number, title, url, servers
            FROM episodes
            WHERE movie_slug = $1 AND episode_number = $2
            "#,
        )
        .bind(&id.movie_slug)
        .bind(Self::episode_number_param(id.episode_number)?)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load episode")?;

        Ok(row.map(EpisodeRecord::from))
    }

    async fn insert_episode(&self, episode: &EpisodeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO episodes (movie_slug, episode_number, title, url, servers, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            "#,
        )
        .bind(&episode.movie_slug)
        .bind(Self::episode_number_param(episode.episode_number)?)
        .bind(&episode.title)
        .bind(&episode.url)
        .bind(Json(&episode.servers))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert episode {}", episode.id()))?;

        Ok(())
    }

    async fn replace_episode(&self, episode: &EpisodeRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE episodes
            SET title = $3, url = $4, servers = $5, updated_at = NOW()
            WHERE movie_slug = $1 AND episode_number = $2
            "#,
        )
        .bind(&episode.movie_slug)
        .bind(Self::episode_number_param(episode.episode_number)?)
        .bind(&episode.title)
        .bind(&episode.url)
        .bind(Json(&episode.servers))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to replace episode {}", episode.id()))?;

        if result.rows_affected() == 0 {
            bail!("Episode {} does not exist", episode.id());
        }
        Ok(())
    }

    async fn increment_views(&self, slug: &str) -> Result<Option<u64>> {
        let views: Option<i64> = sqlx::query_scalar(
            "UPDATE movies SET views = views + 1 WHERE slug = $1 RETURNING views",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to increment views")?;

        Ok(views.map(|v| u64::try_from(v).unwrap_or(0)))
    }
}

/// Process-local [`CatalogStore`] used when no database is configured
#[derive(Default)]
pub struct InMemoryCatalogStore {
    movies: RwLock<HashMap<String, MovieRecord>>,
    episodes: RwLock<BTreeMap<(String, u32), EpisodeRecord>>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn get_movie(&self, slug: &str) -> Result<Option<MovieRecord>> {
        Ok(self.movies.read().await.get(slug).cloned())
    }

    async fn upsert_movie(&self, movie: &MovieRecord) -> Result<MovieRecord> {
        if movie.slug.is_empty() {
            bail!("Refusing to persist a movie without a slug");
        }

        let mut movies = self.movies.write().await;
        let mut stored = movie.clone();
        if let Some(existing) = movies.get(&movie.slug) {
            stored.views = existing.views.max(movie.views);
            stored.last_updated = next_timestamp(existing.last_updated, movie.last_updated);
            if stored.raw_payload.is_none() {
                stored.raw_payload = existing.raw_payload.clone();
            }
            if stored.poster_url.is_empty() {
                stored.poster_url = existing.poster_url.clone();
            }
            if stored.thumb_url.is_empty() {
                stored.thumb_url = existing.thumb_url.clone();
            }
        }
        movies.insert(stored.slug.clone(), stored.clone());
        Ok(stored)
    }

    async fn ensure_movie(&self, movie: &MovieRecord) -> Result<bool> {
        if movie.slug.is_empty() {
            bail!("Refusing to persist a movie without a slug");
        }

        let mut movies = self.movies.write().await;
        if movies.contains_key(&movie.slug) {
            return Ok(false);
        }
        movies.insert(movie.slug.clone(), movie.clone());
        Ok(true)
    }

    async fn recent_movies(&self, limit: usize) -> Result<Vec<MovieRecord>> {
        let mut movies: Vec<MovieRecord> = self.movies.read().await.values().cloned().collect();
        movies.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        movies.truncate(limit);
        Ok(movies)
    }

    async fn get_episodes(&self, movie_slug: &str) -> Result<Vec<EpisodeRecord>> {
        Ok(self
            .episodes
            .read()
            .await
            .values()
            .filter(|e| e.movie_slug == movie_slug)
            .cloned()
            .collect())
    }

    async fn get_episode(&self, id: &EpisodeId) -> Result<Option<EpisodeRecord>> {
        Ok(self
            .episodes
            .read()
            .await
            .get(&(id.movie_slug.clone(), id.episode_number))
            .cloned())
    }

    async fn insert_episode(&self, episode: &EpisodeRecord) -> Result<()> {
        let mut episodes = self.episodes.write().await;
        let key = (episode.movie_slug.clone(), episode.episode_number);
        if episodes.contains_key(&key) {
            bail!("Episode {} already exists", episode.id());
        }
        episodes.insert(key, episode.clone());
        Ok(())
    }

    async fn replace_episode(&self, episode: &EpisodeRecord) -> Result<()> {
        let mut episodes = self.episodes.write().await;
        match episodes.get_mut(&(episode.movie_slug.clone(), episode.episode_number)) {
            Some(existing) => {
                *existing = episode.clone();
                Ok(())
            }
            None => bail!("Episode {} does not exist", episode.id()),
        }
    }

    async fn increment_views(&self, slug: &str) -> Result<Option<u64>> {
        let mut movies = self.movies.write().await;
        Ok(movies.get_mut(slug).map(|movie| {
            movie.views = movie.views.saturating_add(1);
            movie.views
        }))
    }
}
