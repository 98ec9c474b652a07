use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Days, Duration, Utc};
use serde_json::json;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{CacheEntry, DateWindow, LatestTweet};

/// Read/write surface the service needs from the backing store.
///
/// Cache entries are written by the tweet collector, never by this service.
#[async_trait]
pub trait SentimentStore: Send + Sync {
    /// Entries for `phrase` whose date falls in `window`, most recent first.
    async fn find_by_phrase_and_date_range(
        &self,
        phrase: &str,
        window: DateWindow,
    ) -> StoreResult<Vec<CacheEntry>>;

    /// Every watched phrase, ascending.
    async fn find_all_phrases_sorted(&self) -> StoreResult<Vec<String>>;

    /// Tweet count summed over the whole cache, 0 when empty.
    async fn sum_tweets_across_all_entries(&self) -> StoreResult<i64>;

    /// Returns false when the phrase was already present.
    async fn insert_phrase(&self, phrase: &str) -> StoreResult<bool>;

    /// Returns false when there was nothing to delete.
    async fn delete_phrase_by_name(&self, phrase: &str) -> StoreResult<bool>;

    async fn phrase_exists(&self, phrase: &str) -> StoreResult<bool>;
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { pool })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn seed(&self) -> anyhow::Result<()> {
        for phrase in ["apple", "ibm"] {
            self.insert_phrase(phrase).await?;
        }

        let today = Utc::now().date_naive();
        let yesterday = today
            .checked_sub_days(Days::new(1))
            .context("invalid date")?;
        let noon = |day: chrono::NaiveDate| day.and_time(chrono::NaiveTime::MIN).and_utc() + Duration::hours(12);

        let entries = vec![
            (
                "ibm",
                noon(today),
                10_i64,
                5.0_f64,
                json!([
                    {"text": "IBM quarterly numbers look strong", "user": "marketwatcher", "sentiment": 2.0},
                    {"text": "Not convinced by the new IBM roadmap", "user": "skeptic42", "sentiment": -1.0}
                ]),
            ),
            (
                "ibm",
                noon(yesterday),
                24,
                -3.5,
                json!([
                    {"text": "IBM outage again?", "user": "opsdaily", "sentiment": -3.0}
                ]),
            ),
            (
                "apple",
                noon(today),
                40,
                31.0,
                json!([
                    {"text": "Loving the new Apple keynote", "user": "fanboy", "sentiment": 4.0},
                    {"text": "Apple prices are absurd", "user": "budgetbuyer", "sentiment": -6.5}
                ]),
            ),
        ];

        for (phrase, date, tweets, totalsentiment, latest_tweets) in entries {
            sqlx::query(
                r#"
                INSERT INTO tweet_sentiment.cache_entries
                (id, phrase, date, tweets, totalsentiment, latest_tweets)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (phrase, date) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(phrase)
            .bind(date)
            .bind(tweets)
            .bind(totalsentiment)
            .bind(Json(latest_tweets))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }
}

fn cache_entry_from_row(row: PgRow) -> StoreResult<CacheEntry> {
    let latest_tweets: Json<Vec<LatestTweet>> = row.try_get("latest_tweets")?;
    let date: DateTime<Utc> = row.try_get("date")?;

    checked_entry(CacheEntry {
        phrase: row.try_get("phrase")?,
        date,
        tweets: row.try_get("tweets")?,
        totalsentiment: row.try_get("totalsentiment")?,
        latest_tweets: latest_tweets.0,
    })
}

/// Reject rows the aggregator cannot turn into a finite score.
pub fn checked_entry(entry: CacheEntry) -> StoreResult<CacheEntry> {
    if entry.tweets < 0 {
        return Err(StoreError::Decode(format!(
            "negative tweet count {} for {}",
            entry.tweets, entry.phrase
        )));
    }
    if !entry.totalsentiment.is_finite() {
        return Err(StoreError::Decode(format!(
            "non-finite total sentiment for {} on {}",
            entry.phrase, entry.date
        )));
    }
    if let Some(tweet) = entry.latest_tweets.iter().find(|t| !t.sentiment.is_finite()) {
        return Err(StoreError::Decode(format!(
            "non-finite sample sentiment {} for {}",
            tweet.sentiment, entry.phrase
        )));
    }
    Ok(entry)
}

#[async_trait]
impl SentimentStore for PgStore {
    async fn find_by_phrase_and_date_range(
        &self,
        phrase: &str,
        window: DateWindow,
    ) -> StoreResult<Vec<CacheEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT phrase, date, tweets, totalsentiment, latest_tweets
            FROM tweet_sentiment.cache_entries
            WHERE phrase = $1 AND date >= $2 AND date < $3
            ORDER BY date DESC
            "#,
        )
        .bind(phrase)
        .bind(window.start)
        .bind(window.end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(cache_entry_from_row).collect()
    }

    async fn find_all_phrases_sorted(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query(
            r#"SELECT phrase FROM tweet_sentiment.phrases ORDER BY phrase COLLATE "C" ASC"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut phrases = Vec::with_capacity(rows.len());
        for row in rows {
            phrases.push(row.try_get("phrase")?);
        }
        Ok(phrases)
    }

    async fn sum_tweets_across_all_entries(&self) -> StoreResult<i64> {
        let total: i64 = sqlx::query(
            "SELECT LEAST(COALESCE(SUM(tweets), 0), 9223372036854775807)::BIGINT AS tweets \
             FROM tweet_sentiment.cache_entries",
        )
        .fetch_one(&self.pool)
        .await?
        .try_get("tweets")?;
        Ok(total)
    }

    async fn insert_phrase(&self, phrase: &str) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO tweet_sentiment.phrases (phrase) VALUES ($1) ON CONFLICT (phrase) DO NOTHING",
        )
        .bind(phrase)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_phrase_by_name(&self, phrase: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM tweet_sentiment.phrases WHERE phrase = $1")
            .bind(phrase)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn phrase_exists(&self, phrase: &str) -> StoreResult<bool> {
        let present: bool = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM tweet_sentiment.phrases WHERE phrase = $1) AS present",
        )
        .bind(phrase)
        .fetch_one(&self.pool)
        .await?
        .try_get("present")?;
        Ok(present)
    }
}
