use crate::db::SentimentStore;
use crate::error::StoreResult;
use crate::models::{CacheEntry, DateWindow, DayScore, LatestTweet, PhraseSentiment};

pub const AVG_LOW: f64 = -1.3;
pub const AVG_HIGH: f64 = 1.3;
pub const SINGLE_LOW: f64 = -5.0;
pub const SINGLE_HIGH: f64 = 5.0;
pub const SCORE_LOW: f64 = 0.0;
pub const SCORE_HIGH: f64 = 1.0;

/// Bound `value` to `[low, high]`, then rescale it onto `[SCORE_LOW, SCORE_HIGH]`.
pub fn clamp_and_map(value: f64, low: f64, high: f64) -> f64 {
    let bounded = if value.is_nan() {
        (low + high) / 2.0
    } else {
        value.clamp(low, high)
    };
    (bounded - low) / (high - low) * (SCORE_HIGH - SCORE_LOW) + SCORE_LOW
}

/// Mean sentiment per tweet; an empty count averages to 0.
pub fn average(totalsentiment: f64, tweets: i64) -> f64 {
    if tweets == 0 {
        0.0
    } else {
        totalsentiment / tweets as f64
    }
}

pub fn day_score(totalsentiment: f64, tweets: i64) -> f64 {
    clamp_and_map(average(totalsentiment, tweets), AVG_LOW, AVG_HIGH)
}

pub fn sample_score(sentiment: f64) -> f64 {
    clamp_and_map(sentiment, SINGLE_LOW, SINGLE_HIGH)
}

fn scored_samples(samples: Vec<LatestTweet>) -> Vec<LatestTweet> {
    samples
        .into_iter()
        .map(|mut tweet| {
            tweet.score = Some(sample_score(tweet.sentiment));
            tweet
        })
        .collect()
}

/// Fold the cache entries of one phrase into its sentiment summary.
///
/// `entries` must already be ordered most recent first; only the first
/// entry contributes `latest_tweets`.
pub fn aggregate(phrase: &str, entries: Vec<CacheEntry>) -> PhraseSentiment {
    let mut tweets = 0_i64;
    let mut totalsentiment = 0.0_f64;
    let mut latest_tweets = Vec::new();
    let mut history = Vec::with_capacity(entries.len());

    for (index, mut entry) in entries.into_iter().enumerate() {
        tweets = tweets.saturating_add(entry.tweets);
        totalsentiment += entry.totalsentiment;

        if index == 0 {
            latest_tweets = scored_samples(std::mem::take(&mut entry.latest_tweets));
            entry.latest_tweets = latest_tweets.clone();
        }

        let score = day_score(entry.totalsentiment, entry.tweets);
        history.push(DayScore { entry, score });
    }

    // finite days can still sum past f64::MAX
    let totalsentiment = totalsentiment.clamp(f64::MIN, f64::MAX);
    let average = average(totalsentiment, tweets).clamp(AVG_LOW, AVG_HIGH);

    PhraseSentiment {
        phrase: phrase.to_string(),
        tweets,
        totalsentiment,
        average,
        score: clamp_and_map(average, AVG_LOW, AVG_HIGH),
        latest_tweets,
        history,
    }
}

pub async fn compute_sentiment(
    store: &dyn SentimentStore,
    phrase: &str,
    window: DateWindow,
) -> StoreResult<PhraseSentiment> {
    let entries = store.find_by_phrase_and_date_range(phrase, window).await?;
    Ok(aggregate(phrase, entries))
}
