use crate::models::{Event, EventFilter, StatsQuery, ViewStat};
use crate::storage::trait_def::{like_pattern, to_unix};
use crate::storage::{EventStore, HitStore, InsertOutcome, NewEvent, StorageResult, StoredHit};
use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::sync::Arc;

const EVENT_COLUMNS: &str =
    "id, title, annotation, description, paid, event_date, created_at, published_at, state";

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Create tables and indexes
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS hits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app TEXT NOT NULL,
                uri TEXT NOT NULL,
                ip TEXT NOT NULL,
                ts INTEGER NOT NULL,
                UNIQUE (app, uri, ip, ts)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_hits_ts ON hits(ts)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_hits_uri_ts ON hits(uri, ts)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                annotation TEXT NOT NULL,
                description TEXT,
                paid INTEGER NOT NULL DEFAULT 0,
                event_date INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                published_at INTEGER,
                state TEXT NOT NULL DEFAULT 'PENDING'
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_state_date ON events(state, event_date)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get_event(&self, id: i64) -> StorageResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(event)
    }
}

#[async_trait]
impl HitStore for SqliteStorage {
    async fn insert_hit(&self, hit: &StoredHit) -> StorageResult<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO hits (app, uri, ip, ts)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (app, uri, ip, ts) DO NOTHING
            "#,
        )
        .bind(&hit.app)
        .bind(&hit.uri)
        .bind(&hit.ip)
        .bind(to_unix(&hit.timestamp))
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(InsertOutcome::Duplicate);
        }

        Ok(InsertOutcome::Inserted)
    }

    async fn get_stats(&self, query: &StatsQuery) -> StorageResult<Vec<ViewStat>> {
        let count_expr = if query.unique {
            "COUNT(DISTINCT ip)"
        } else {
            "COUNT(ip)"
        };

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT app, uri, {count_expr} AS hits FROM hits WHERE ts BETWEEN "
        ));
        builder
            .push_bind(to_unix(&query.start))
            .push(" AND ")
            .push_bind(to_unix(&query.end));

        if let Some(uris) = query.uri_filter() {
            builder.push(" AND uri IN (");
            let mut separated = builder.separated(", ");
            for uri in uris {
                separated.push_bind(uri.as_str());
            }
            separated.push_unseparated(")");
        }

        builder.push(" GROUP BY app, uri ORDER BY hits DESC, app, uri");

        let stats = builder
            .build_query_as::<ViewStat>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(stats)
    }

    async fn count_hits(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
        unique: bool,
    ) -> StorageResult<i64> {
        let sql = if unique {
            "SELECT COUNT(DISTINCT ip) FROM hits WHERE ts BETWEEN ? AND ?"
        } else {
            "SELECT COUNT(*) FROM hits WHERE ts BETWEEN ? AND ?"
        };

        let count = sqlx::query_scalar::<_, i64>(sql)
            .bind(to_unix(&start))
            .bind(to_unix(&end))
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn delete_before(&self, cutoff: NaiveDateTime) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM hits WHERE ts < ?")
            .bind(to_unix(&cutoff))
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EventStore for SqliteStorage {
    async fn create_event(&self, event: &NewEvent) -> StorageResult<Event> {
        let created = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (title, annotation, description, paid, event_date, created_at, state)
            VALUES (?, ?, ?, ?, ?, ?, 'PENDING')
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(&event.title)
        .bind(&event.annotation)
        .bind(&event.description)
        .bind(event.paid)
        .bind(event.event_date)
        .bind(event.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(created)
    }

    async fn publish_event(&self, id: i64, published_at: i64) -> StorageResult<Option<Event>> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET state = 'PUBLISHED', published_at = COALESCE(published_at, ?)
            WHERE id = ?
            "#,
        )
        .bind(published_at)
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_event(id).await
    }

    async fn get_published_event(&self, id: i64) -> StorageResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = ? AND state = 'PUBLISHED'"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(event)
    }

    async fn list_published_events(&self, filter: &EventFilter) -> StorageResult<Vec<Event>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE state = 'PUBLISHED'"
        ));

        if let Some(text) = filter.text.as_deref() {
            let pattern = like_pattern(text);
            builder
                .push(" AND (LOWER(title) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(annotation) LIKE ")
                .push_bind(pattern)
                .push(")");
        }

        if let Some(paid) = filter.paid {
            builder.push(" AND paid = ").push_bind(paid);
        }

        builder
            .push(" ORDER BY event_date ASC, id ASC LIMIT ")
            .push_bind(filter.size)
            .push(" OFFSET ")
            .push_bind(filter.from);

        let events = builder
            .build_query_as::<Event>()
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(events)
    }
}
