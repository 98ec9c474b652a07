use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single raw tweet sample kept on a cache entry. Fields other than
/// `sentiment` are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestTweet {
    pub sentiment: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One day of pre-aggregated tweet sentiment for a phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub phrase: String,
    pub date: DateTime<Utc>,
    pub tweets: i64,
    pub totalsentiment: f64,
    #[serde(rename = "latestTweets", default)]
    pub latest_tweets: Vec<LatestTweet>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayScore {
    #[serde(flatten)]
    pub entry: CacheEntry,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhraseSentiment {
    pub phrase: String,
    pub tweets: i64,
    pub totalsentiment: f64,
    pub average: f64,
    pub score: f64,
    #[serde(rename = "latestTweets")]
    pub latest_tweets: Vec<LatestTweet>,
    pub history: Vec<DayScore>,
}

/// The view served by `GET /sentiment`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
    pub tweets: i64,
    pub sentiments: Vec<PhraseSentiment>,
}

/// Half-open UTC range `[start, end)` used for cache lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// The whole calendar day `day`.
    pub fn day(day: NaiveDate) -> Self {
        Self {
            start: start_of(day),
            end: start_of(day.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX)),
        }
    }

    /// Every calendar day from `first` through `last`, both included.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Option<Self> {
        if last < first {
            return None;
        }
        let end = last.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        Some(Self {
            start: start_of(first),
            end: start_of(end),
        })
    }

    #[cfg(test)]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}
