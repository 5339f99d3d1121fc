use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{debug, info};

/// Scoped handle on the candle database.
///
/// The pool holds a single connection. [`Database::with_scope`] runs work
/// against it and closes it afterwards, whether the work failed or not.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("Invalid database URL: {}", db_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        debug!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Create the candles table if the database is fresh
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS candles (
                asset TEXT NOT NULL,
                open_time TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                close_time TEXT,
                volume REAL NOT NULL,
                trade_count INTEGER,
                PRIMARY KEY (asset, open_time)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candles table")?;

        // Index for faster time-range queries on candles
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_candles_asset_time
            ON candles (asset, open_time);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create candle index")?;

        Ok(())
    }

    /// Close every connection of the pool and wait for them to shut down
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed.");
    }

    /// Run `work` on the pool, then close the pool and return the work's result
    pub async fn with_scope<T, F, Fut>(self, work: F) -> Result<T>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let result = work(self.pool.clone()).await;
        self.close().await;
        result
    }
}
