use super::ArticleStore;
use crate::error::StoreError;
use crate::models::{Article, Market, Summary};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info, instrument};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        headline TEXT NOT NULL,
        url TEXT NOT NULL UNIQUE,
        publish_time TEXT NOT NULL,
        publish_ts INTEGER NOT NULL,
        content TEXT NOT NULL,
        market TEXT NOT NULL,
        scraped_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_articles_market_publish
        ON articles (market, publish_ts DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS summaries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        summary_text TEXT NOT NULL,
        source_article_count INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        market TEXT NOT NULL
    )
    "#,
];

/// SQLite-backed [`ArticleStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and bring its schema up to date.
    ///
    /// Missing parent directories are created first. Every migration is
    /// idempotent, so reopening an existing dataset is safe.
    ///
    /// # Errors
    ///
    /// [`StoreError::Io`] when the directory cannot be created, and
    /// [`StoreError::Database`] when connecting or migrating fails.
    #[instrument(level = "info", skip_all, fields(path = %db_path.as_ref().display()))]
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration).execute(&pool).await?;
            debug!(migration = i, "Applied migration");
        }

        info!("Database ready");
        Ok(Self { pool })
    }
}

fn corrupt(key: &str, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_market(key: &str, raw: &str) -> Result<Market, StoreError> {
    raw.parse().map_err(|e| corrupt(key, e))
}

fn parse_utc(key: &str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(key, e))
}

fn article_from_row(row: &SqliteRow) -> Result<Article, StoreError> {
    let url: String = row.try_get("url")?;
    let publish_time: String = row.try_get("publish_time")?;
    let market: String = row.try_get("market")?;
    let scraped_at: String = row.try_get("scraped_at")?;

    Ok(Article {
        headline: row.try_get("headline")?,
        publish_time: DateTime::parse_from_rfc3339(&publish_time).map_err(|e| corrupt(&url, e))?,
        content: row.try_get("content")?,
        market: parse_market(&url, &market)?,
        scraped_at: parse_utc(&url, &scraped_at)?,
        url,
    })
}

fn summary_from_row(row: &SqliteRow) -> Result<Summary, StoreError> {
    let id: i64 = row.try_get("id")?;
    let key = format!("summary {id}");
    let market: String = row.try_get("market")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Summary {
        id,
        market: parse_market(&key, &market)?,
        text: row.try_get("summary_text")?,
        source_article_count: row.try_get("source_article_count")?,
        created_at: parse_utc(&key, &created_at)?,
    })
}

impl ArticleStore for SqliteStore {
    #[instrument(level = "info", skip(self))]
    async fn clear(&self, market: Market) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let articles = sqlx::query("DELETE FROM articles WHERE market = ?")
            .bind(market.code())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let summaries = sqlx::query("DELETE FROM summaries WHERE market = ?")
            .bind(market.code())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        info!(articles, summaries, "Cleared market dataset");
        Ok(())
    }

    async fn insert_if_absent(&self, article: &Article) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO articles
            (headline, url, publish_time, publish_ts, content, market, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.headline)
        .bind(&article.url)
        .bind(article.publish_time.to_rfc3339())
        .bind(article.publish_time.timestamp())
        .bind(&article.content)
        .bind(article.market.code())
        .bind(article.scraped_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_market(&self, market: Market) -> Result<Vec<Article>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT headline, url, publish_time, content, market, scraped_at
            FROM articles
            WHERE market = ?
            ORDER BY publish_ts DESC, id ASC
            "#,
        )
        .bind(market.code())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(article_from_row).collect()
    }

    async fn add_summary(
        &self,
        market: Market,
        text: &str,
        source_article_count: i64,
    ) -> Result<Summary, StoreError> {
        let created_at = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO summaries (summary_text, source_article_count, created_at, market)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(text)
        .bind(source_article_count)
        .bind(created_at.to_rfc3339())
        .bind(market.code())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        info!(id, %market, source_article_count, "Stored summary");
        Ok(Summary {
            id,
            market,
            text: text.to_string(),
            source_article_count,
            created_at,
        })
    }

    async fn latest_summary(&self, market: Market) -> Result<Option<Summary>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, summary_text, source_article_count, created_at, market
            FROM summaries
            WHERE market = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(market.code())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(summary_from_row).transpose()
    }
}
