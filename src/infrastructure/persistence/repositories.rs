use crate::domain::repositories::CandleRepository;
use crate::domain::types::{Candle, Pair};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

const FETCH_RECENT: &str = r#"
    SELECT open_time, open, high, low, close, volume
    FROM candles
    WHERE asset = ?
    AND volume > 0
    ORDER BY open_time DESC
    LIMIT ?
"#;

const FETCH_RECENT_UNTIL: &str = r#"
    SELECT open_time, open, high, low, close, volume
    FROM candles
    WHERE asset = ?
    AND volume > 0
    AND open_time <= ?
    ORDER BY open_time DESC
    LIMIT ?
"#;

pub struct SqliteCandleRepository {
    pool: SqlitePool,
}

impl SqliteCandleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CandleRepository for SqliteCandleRepository {
    async fn fetch_recent(
        &self,
        pair: &Pair,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let candles = match until {
            Some(until) => {
                sqlx::query_as::<_, Candle>(FETCH_RECENT_UNTIL)
                    .bind(pair.as_str())
                    .bind(until)
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as::<_, Candle>(FETCH_RECENT)
                    .bind(pair.as_str())
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .with_context(|| format!("Failed to fetch candles for {}", pair))?;

        debug!("Fetched {} candles for {}", candles.len(), pair);
        Ok(candles)
    }

    async fn save_candles(&self, pair: &Pair, candles: &[Candle]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for candle in candles {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO candles (asset, open_time, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(pair.as_str())
            .bind(candle.open_time)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .execute(&mut *tx)
            .await
            .context("Failed to save candle")?;
        }
        tx.commit().await?;

        debug!("Persisted {} candles for {}", candles.len(), pair);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::database::Database;
    use chrono::{Duration, TimeZone};

    fn candle(minute: i64, volume: f64) -> Candle {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Candle {
            open_time: base + Duration::minutes(minute),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume,
        }
    }

    async fn repository() -> (Database, SqliteCandleRepository) {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let repo = SqliteCandleRepository::new(db.pool.clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_fewer_rows_than_limit_is_not_an_error() {
        let (_db, repo) = repository().await;
        let pair: Pair = "BTCUSDT".parse().unwrap();
        let candles: Vec<Candle> = (0..10).map(|m| candle(m, 5.0)).collect();
        repo.save_candles(&pair, &candles).await.unwrap();

        let fetched = repo.fetch_recent(&pair, None, 50).await.unwrap();
        assert_eq!(fetched.len(), 10);
    }

    #[tokio::test]
    async fn test_limit_and_descending_order() {
        let (_db, repo) = repository().await;
        let pair: Pair = "BTCUSDT".parse().unwrap();
        let candles: Vec<Candle> = (0..80).map(|m| candle(m, 5.0)).collect();
        repo.save_candles(&pair, &candles).await.unwrap();

        let fetched = repo.fetch_recent(&pair, None, 50).await.unwrap();
        assert_eq!(fetched.len(), 50);
        assert_eq!(fetched[0].open_time, candle(79, 5.0).open_time);
        assert!(fetched.windows(2).all(|w| w[0].open_time > w[1].open_time));
    }

    #[tokio::test]
    async fn test_zero_volume_and_other_pairs_are_skipped() {
        let (_db, repo) = repository().await;
        let btc: Pair = "BTCUSDT".parse().unwrap();
        let eth: Pair = "ETHUSDT".parse().unwrap();
        repo.save_candles(&btc, &[candle(0, 5.0), candle(1, 0.0), candle(2, 3.0)])
            .await
            .unwrap();
        repo.save_candles(&eth, &[candle(3, 7.0)]).await.unwrap();

        let fetched = repo.fetch_recent(&btc, None, 50).await.unwrap();
        assert_eq!(fetched.len(), 2);
        assert!(fetched.iter().all(|c| c.volume > 0.0));
    }

    #[tokio::test]
    async fn test_upper_bound_timestamp_is_inclusive() {
        let (_db, repo) = repository().await;
        let pair: Pair = "BTCUSDT".parse().unwrap();
        let candles: Vec<Candle> = (0..20).map(|m| candle(m, 5.0)).collect();
        repo.save_candles(&pair, &candles).await.unwrap();

        let until = candle(9, 5.0).open_time;
        let fetched = repo.fetch_recent(&pair, Some(until), 50).await.unwrap();
        assert_eq!(fetched.len(), 10);
        assert_eq!(fetched[0].open_time, until);
    }

    #[tokio::test]
    async fn test_unknown_pair_returns_empty() {
        let (_db, repo) = repository().await;
        let pair: Pair = "DOGEUSDT".parse().unwrap();
        assert!(repo.fetch_recent(&pair, None, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_is_an_upsert() {
        let (_db, repo) = repository().await;
        let pair: Pair = "BTCUSDT".parse().unwrap();
        repo.save_candles(&pair, &[candle(0, 5.0)]).await.unwrap();
        let mut updated = candle(0, 9.0);
        updated.close = 105.0;
        repo.save_candles(&pair, &[updated.clone()]).await.unwrap();

        let fetched = repo.fetch_recent(&pair, None, 50).await.unwrap();
        assert_eq!(fetched, vec![updated]);
    }
}
