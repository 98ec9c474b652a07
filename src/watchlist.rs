use std::io::Read;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::SentimentStore;
use crate::error::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhraseChange {
    Added,
    Exists,
    Removed,
    NotFound,
}

pub async fn add_phrase(store: &dyn SentimentStore, phrase: &str) -> StoreResult<PhraseChange> {
    if store.phrase_exists(phrase).await? {
        warn!("phrase {} already exists", phrase);
        return Ok(PhraseChange::Exists);
    }

    // a concurrent add can still win between the check and the insert
    if store.insert_phrase(phrase).await? {
        info!("added phrase {}", phrase);
        Ok(PhraseChange::Added)
    } else {
        warn!("phrase {} already exists", phrase);
        Ok(PhraseChange::Exists)
    }
}

pub async fn remove_phrase(store: &dyn SentimentStore, phrase: &str) -> StoreResult<PhraseChange> {
    if store.delete_phrase_by_name(phrase).await? {
        info!("removed phrase {}", phrase);
        Ok(PhraseChange::Removed)
    } else {
        warn!("phrase {} not found", phrase);
        Ok(PhraseChange::NotFound)
    }
}

/// Add every phrase from a CSV with a `phrase` header. Returns how many were new.
pub async fn import_phrases<R: Read>(
    store: &dyn SentimentStore,
    source: R,
) -> anyhow::Result<usize> {
    #[derive(Deserialize)]
    struct CsvRow {
        phrase: String,
    }

    let mut phrases = Vec::new();
    {
        let mut reader = csv::Reader::from_reader(source);
        for result in reader.deserialize::<CsvRow>() {
            let row = result?;
            let phrase = row.phrase.trim();
            if !phrase.is_empty() {
                phrases.push(phrase.to_string());
            }
        }
    }

    let mut inserted = 0usize;
    for phrase in phrases {
        if add_phrase(store, &phrase).await? == PhraseChange::Added {
            inserted += 1;
        }
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    #[tokio::test]
    async fn adding_twice_reports_existing() {
        let store = MemoryStore::default();
        assert_eq!(add_phrase(&store, "ibm").await.unwrap(), PhraseChange::Added);
        assert_eq!(add_phrase(&store, "ibm").await.unwrap(), PhraseChange::Exists);
        assert_eq!(store.phrases(), ["ibm"]);
    }

    #[tokio::test]
    async fn removing_unknown_phrase_is_a_no_op() {
        let store = MemoryStore::with_phrases(&["ibm"]);
        assert_eq!(remove_phrase(&store, "unknown").await.unwrap(), PhraseChange::NotFound);
        assert_eq!(store.phrases(), ["ibm"]);
        assert_eq!(remove_phrase(&store, "ibm").await.unwrap(), PhraseChange::Removed);
        assert!(store.phrases().is_empty());
    }

    #[tokio::test]
    async fn import_skips_blank_and_known_phrases() {
        let store = MemoryStore::with_phrases(&["ibm"]);
        let csv = "phrase\nibm\n  apple \n\"\"\nmicrosoft\n";
        let inserted = import_phrases(&store, csv.as_bytes()).await.unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.phrases(), ["apple", "ibm", "microsoft"]);
    }
}
