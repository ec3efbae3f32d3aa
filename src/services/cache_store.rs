use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::news::{NewsEvent, Persisted, SearchQuery, SocialPost};

/// A query record is reused for this long after its last refresh.
pub fn query_freshness() -> Duration {
    Duration::hours(6)
}

/// Events older than this are never surfaced from the cache.
pub fn event_max_age() -> Duration {
    Duration::days(7)
}

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Most recent fresh record for `key`, with its recent events newest first.
    async fn lookup(&self, key: &str) -> Result<Option<SearchQuery>>;

    /// Associate events with a record (idempotent) and bump its refresh time.
    async fn link_events(&self, query_id: Uuid, event_ids: &[Uuid]) -> Result<()>;

    /// Link events to the record for `key`, creating it when missing.
    async fn upsert_query_for_key(
        &self,
        key: &str,
        original_query: &str,
        event_ids: &[Uuid],
    ) -> Result<Uuid>;

    /// Persist an event with its posts. A duplicate headline+location returns
    /// the stored event as `Persisted::Existing`.
    async fn create_event(&self, event: &NewsEvent) -> Result<Persisted>;
}

#[derive(FromRow)]
struct QueryRow {
    id: Uuid,
    normalized_key: String,
    original_query: String,
    last_refresh: DateTime<Utc>,
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    headline: String,
    location: String,
    summary: String,
    category: String,
    longitude: f64,
    latitude: f64,
    event_time: DateTime<Utc>,
}

#[derive(FromRow)]
struct PostRow {
    event_id: Uuid,
    post_id: String,
    author: String,
    name: String,
    body: String,
    url: String,
    posted_at: String,
    likes: i64,
    replies: i64,
    reposts: i64,
    profile_pic: String,
}

impl EventRow {
    fn into_event(self, top_tweets: Vec<SocialPost>) -> NewsEvent {
        NewsEvent {
            id: self.id,
            headline: self.headline,
            location: self.location,
            summary: self.summary,
            category: self.category,
            coordinates: [self.longitude, self.latitude],
            timestamp: self.event_time,
            top_tweets,
        }
    }
}

impl From<PostRow> for SocialPost {
    fn from(row: PostRow) -> Self {
        SocialPost {
            id: row.post_id,
            author: row.author,
            name: row.name,
            text: row.body,
            url: row.url,
            timestamp: row.posted_at,
            likes: row.likes,
            replies: row.replies,
            reposts: row.reposts,
            profile_pic: row.profile_pic,
        }
    }
}

const EVENT_COLUMNS: &str =
    "e.id, e.headline, e.location, e.summary, e.category, e.longitude, e.latitude, e.event_time";

pub struct PgNewsStore {
    pool: PgPool,
}

impl PgNewsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_posts(&self, rows: Vec<EventRow>) -> Result<Vec<NewsEvent>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let posts = sqlx::query_as::<_, PostRow>(
            "SELECT event_id, post_id, author, name, body, url, posted_at,
                    likes, replies, reposts, profile_pic
             FROM social_posts
             WHERE event_id = ANY($1)
             ORDER BY event_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_event: HashMap<Uuid, Vec<SocialPost>> = HashMap::new();
        for post in posts {
            by_event.entry(post.event_id).or_default().push(post.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let posts = by_event.remove(&row.id).unwrap_or_default();
                row.into_event(posts)
            })
            .collect())
    }

    async fn find_by_pair(&self, headline: &str, location: &str) -> Result<Option<NewsEvent>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM news_events e WHERE e.headline = $1 AND e.location = $2"
        ))
        .bind(headline)
        .bind(location)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_posts(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }
}

async fn link_in(conn: &mut PgConnection, query_id: Uuid, event_ids: &[Uuid]) -> Result<()> {
    sqlx::query(
        "INSERT INTO search_query_events (query_id, event_id)
         SELECT $1, UNNEST($2::uuid[])
         ON CONFLICT DO NOTHING",
    )
    .bind(query_id)
    .bind(event_ids)
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE search_queries SET last_refresh = now() WHERE id = $1")
        .bind(query_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl NewsStore for PgNewsStore {
    async fn lookup(&self, key: &str) -> Result<Option<SearchQuery>> {
        let now = Utc::now();
        let Some(query) = sqlx::query_as::<_, QueryRow>(
            "SELECT id, normalized_key, original_query, last_refresh
             FROM search_queries
             WHERE normalized_key = $1 AND last_refresh > $2
             ORDER BY last_refresh DESC
             LIMIT 1",
        )
        .bind(key)
        .bind(now - query_freshness())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS}
             FROM news_events e
             JOIN search_query_events l ON l.event_id = e.id
             WHERE l.query_id = $1 AND e.event_time > $2
             ORDER BY e.event_time DESC"
        ))
        .bind(query.id)
        .bind(now - event_max_age())
        .fetch_all(&self.pool)
        .await?;

        let events = self.attach_posts(rows).await?;
        debug!(key, count = events.len(), "Cache hit");

        Ok(Some(SearchQuery {
            id: query.id,
            normalized_key: query.normalized_key,
            original_query: query.original_query,
            last_refresh: query.last_refresh,
            events,
        }))
    }

    async fn link_events(&self, query_id: Uuid, event_ids: &[Uuid]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        link_in(&mut tx, query_id, event_ids).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_query_for_key(
        &self,
        key: &str,
        original_query: &str,
        event_ids: &[Uuid],
    ) -> Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        // the unique key serializes racing first discoveries onto one row
        let (query_id, created): (Uuid, bool) = sqlx::query_as(
            "INSERT INTO search_queries (id, normalized_key, original_query, last_refresh)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (normalized_key) DO UPDATE SET last_refresh = now()
             RETURNING id, (xmax = 0) AS created",
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(original_query)
        .fetch_one(&mut *tx)
        .await?;
        link_in(&mut tx, query_id, event_ids).await?;
        tx.commit().await?;

        if created {
            info!(key, %query_id, "Created search query record");
        }
        Ok(query_id)
    }

    async fn create_event(&self, event: &NewsEvent) -> Result<Persisted> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO news_events
                (id, headline, location, summary, category, longitude, latitude, event_time)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.id)
        .bind(&event.headline)
        .bind(&event.location)
        .bind(&event.summary)
        .bind(&event.category)
        .bind(event.coordinates[0])
        .bind(event.coordinates[1])
        .bind(event.timestamp)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                drop(tx);
                debug!(headline = %event.headline, "Event already stored, reusing it");
                return match self.find_by_pair(&event.headline, &event.location).await? {
                    Some(existing) => Ok(Persisted::Existing(existing)),
                    None => Err(anyhow::anyhow!(
                        "unique conflict for '{}' but no stored row found",
                        event.headline
                    )),
                };
            }
            Err(e) => return Err(e.into()),
        }

        for (position, post) in event.top_tweets.iter().enumerate() {
            sqlx::query(
                "INSERT INTO social_posts
                    (event_id, post_id, author, name, body, url, posted_at,
                     likes, replies, reposts, profile_pic, position)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 ON CONFLICT DO NOTHING",
            )
            .bind(event.id)
            .bind(&post.id)
            .bind(&post.author)
            .bind(&post.name)
            .bind(&post.text)
            .bind(&post.url)
            .bind(&post.timestamp)
            .bind(post.likes)
            .bind(post.replies)
            .bind(post.reposts)
            .bind(&post.profile_pic)
            .bind(position as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Persisted::Created(event.clone()))
    }
}

struct QueryRecord {
    id: Uuid,
    key: String,
    original_query: String,
    last_refresh: DateTime<Utc>,
    event_ids: Vec<Uuid>,
}

#[derive(Default)]
struct MemoryInner {
    events: HashMap<Uuid, NewsEvent>,
    by_pair: HashMap<(String, String), Uuid>,
    queries: Vec<QueryRecord>,
}

impl MemoryInner {
    fn link(&mut self, query_id: Uuid, event_ids: &[Uuid]) -> Result<()> {
        let record = self
            .queries
            .iter_mut()
            .find(|q| q.id == query_id)
            .ok_or_else(|| anyhow::anyhow!("unknown search query {query_id}"))?;
        for id in event_ids {
            if !record.event_ids.contains(id) {
                record.event_ids.push(*id);
            }
        }
        record.last_refresh = Utc::now();
        Ok(())
    }
}

/// In-process store with the same semantics as the Postgres one.
#[derive(Default)]
pub struct MemoryNewsStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryNewsStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn backdate_query(&self, query_id: Uuid, last_refresh: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(q) = inner.queries.iter_mut().find(|q| q.id == query_id) {
            q.last_refresh = last_refresh;
        }
    }

    #[cfg(test)]
    pub async fn event_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }
}

#[async_trait]
impl NewsStore for MemoryNewsStore {
    async fn lookup(&self, key: &str) -> Result<Option<SearchQuery>> {
        let now = Utc::now();
        let inner = self.inner.lock().await;
        let Some(record) = inner
            .queries
            .iter()
            .filter(|q| q.key == key && q.last_refresh > now - query_freshness())
            .max_by_key(|q| q.last_refresh)
        else {
            return Ok(None);
        };

        let cutoff = now - event_max_age();
        let mut events: Vec<NewsEvent> = record
            .event_ids
            .iter()
            .filter_map(|id| inner.events.get(id))
            .filter(|e| e.timestamp > cutoff)
            .cloned()
            .collect();
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        Ok(Some(SearchQuery {
            id: record.id,
            normalized_key: record.key.clone(),
            original_query: record.original_query.clone(),
            last_refresh: record.last_refresh,
            events,
        }))
    }

    async fn link_events(&self, query_id: Uuid, event_ids: &[Uuid]) -> Result<()> {
        self.inner.lock().await.link(query_id, event_ids)
    }

    async fn upsert_query_for_key(
        &self,
        key: &str,
        original_query: &str,
        event_ids: &[Uuid],
    ) -> Result<Uuid> {
        let mut inner = self.inner.lock().await;
        let existing = inner
            .queries
            .iter()
            .filter(|q| q.key == key)
            .max_by_key(|q| q.last_refresh)
            .map(|q| q.id);

        let query_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                inner.queries.push(QueryRecord {
                    id,
                    key: key.to_string(),
                    original_query: original_query.to_string(),
                    last_refresh: Utc::now(),
                    event_ids: Vec::new(),
                });
                id
            }
        };

        inner.link(query_id, event_ids)?;
        Ok(query_id)
    }

    async fn create_event(&self, event: &NewsEvent) -> Result<Persisted> {
        let mut inner = self.inner.lock().await;
        let pair = (event.headline.clone(), event.location.clone());
        if let Some(id) = inner.by_pair.get(&pair) {
            if let Some(existing) = inner.events.get(id) {
                return Ok(Persisted::Existing(existing.clone()));
            }
        }
        inner.by_pair.insert(pair, event.id);
        inner.events.insert(event.id, event.clone());
        Ok(Persisted::Created(event.clone()))
    }
}
