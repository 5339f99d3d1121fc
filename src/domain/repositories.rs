//! Repository traits for candle persistence.
//!
//! Business logic talks to [`CandleRepository`]; the SQLite implementation
//! lives in `infrastructure::persistence`.

use crate::domain::types::{Candle, Pair};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait CandleRepository: Send + Sync {
    /// Most recent candles with positive volume for `pair`, newest first.
    ///
    /// Returns at most `limit` rows; fewer rows is not an error.
    async fn fetch_recent(
        &self,
        pair: &Pair,
        until: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// Upsert candles for `pair` in a single transaction
    async fn save_candles(&self, pair: &Pair, candles: &[Candle]) -> Result<()>;
}
