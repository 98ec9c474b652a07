use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{checked_entry, SentimentStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{CacheEntry, DateWindow};

/// In-memory store with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    phrases: Mutex<BTreeSet<String>>,
    entries: Mutex<Vec<CacheEntry>>,
    pub fail_phrase_listing: AtomicBool,
    pub fail_entry_reads: AtomicBool,
    pub entry_reads: AtomicUsize,
}

impl MemoryStore {
    pub fn with_phrases(phrases: &[&str]) -> Self {
        let store = Self::default();
        store
            .phrases
            .lock()
            .unwrap()
            .extend(phrases.iter().map(|p| p.to_string()));
        store
    }

    pub fn push_entry(&self, entry: CacheEntry) {
        self.entries.lock().unwrap().push(entry);
    }

    pub fn phrases(&self) -> Vec<String> {
        self.phrases.lock().unwrap().iter().cloned().collect()
    }

    fn injected(flag: &AtomicBool) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SentimentStore for MemoryStore {
    async fn find_by_phrase_and_date_range(
        &self,
        phrase: &str,
        window: DateWindow,
    ) -> StoreResult<Vec<CacheEntry>> {
        self.entry_reads.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_entry_reads)?;
        let mut matched: Vec<CacheEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.phrase == phrase && window.contains(e.date))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.date.cmp(&a.date));
        matched.into_iter().map(checked_entry).collect()
    }

    async fn find_all_phrases_sorted(&self) -> StoreResult<Vec<String>> {
        Self::injected(&self.fail_phrase_listing)?;
        Ok(self.phrases())
    }

    async fn sum_tweets_across_all_entries(&self) -> StoreResult<i64> {
        Ok(self.entries.lock().unwrap().iter().fold(0_i64, |sum, e| sum.saturating_add(e.tweets)))
    }

    async fn insert_phrase(&self, phrase: &str) -> StoreResult<bool> {
        Ok(self.phrases.lock().unwrap().insert(phrase.to_string()))
    }

    async fn delete_phrase_by_name(&self, phrase: &str) -> StoreResult<bool> {
        Ok(self.phrases.lock().unwrap().remove(phrase))
    }

    async fn phrase_exists(&self, phrase: &str) -> StoreResult<bool> {
        Ok(self.phrases.lock().unwrap().contains(phrase))
    }
}
