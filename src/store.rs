use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::article::Article;
use crate::storage::{KeyValueStorage, StorageError};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to read saved articles: {0}")]
    Read(#[source] StorageError),

    #[error("failed to write saved articles: {0}")]
    Write(#[source] StorageError),

    #[error("saved articles are corrupt: {0}")]
    Corrupt(#[source] serde_json::Error),

    #[error("failed to encode saved articles: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Bookmarked articles, written through to storage on every change.
///
/// Mutations are committed to memory only after the write succeeds, so the
/// in-memory list never runs ahead of what is persisted.
pub struct SavedArticlesStore {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
    articles: Mutex<Option<Vec<Article>>>,
}

impl SavedArticlesStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            articles: Mutex::new(None),
        }
    }

    /// Replace in-memory state with what storage holds.
    ///
    /// A corrupt payload leaves the collection empty and is reported.
    pub async fn load(&self) -> Result<Vec<Article>, PersistenceError> {
        let mut articles = self.articles.lock().await;
        let loaded = self.read().await;
        match &loaded {
            Ok(list) => *articles = Some(list.clone()),
            Err(PersistenceError::Corrupt(_)) => *articles = Some(Vec::new()),
            // Unreadable storage keeps whatever was last known
            Err(_) => {}
        }
        loaded
    }

    pub async fn articles(&self) -> Result<Vec<Article>, PersistenceError> {
        let mut articles = self.articles.lock().await;
        Ok(self.ensure_loaded(&mut articles).await?.clone())
    }

    pub async fn contains_url(&self, url: &str) -> Result<bool, PersistenceError> {
        let mut articles = self.articles.lock().await;
        let current = self.ensure_loaded(&mut articles).await?;
        Ok(current.iter().any(|a| a.url.as_deref() == Some(url)))
    }

    /// Append without any uniqueness check.
    pub async fn add(&self, article: Article) -> Result<(), PersistenceError> {
        let mut articles = self.articles.lock().await;
        let mut updated = self.ensure_loaded(&mut articles).await?.clone();
        updated.push(article);

        self.write(&updated).await?;
        *articles = Some(updated);
        Ok(())
    }

    /// Remove every article with this title. Returns how many were removed.
    pub async fn remove(&self, title: &str) -> Result<usize, PersistenceError> {
        self.remove_where(|a| a.title == title).await
    }

    /// Remove every article with this url. Returns how many were removed.
    pub async fn remove_by_url(&self, url: &str) -> Result<usize, PersistenceError> {
        self.remove_where(|a| a.url.as_deref() == Some(url)).await
    }

    async fn remove_where<F>(&self, matches: F) -> Result<usize, PersistenceError>
    where
        F: Fn(&Article) -> bool,
    {
        let mut articles = self.articles.lock().await;
        let current = self.ensure_loaded(&mut articles).await?;
        let updated: Vec<Article> = current.iter().filter(|a| !matches(a)).cloned().collect();
        let removed = current.len() - updated.len();
        if removed == 0 {
            return Ok(0);
        }

        self.write(&updated).await?;
        *articles = Some(updated);
        Ok(removed)
    }

    /// Loads on first access. A corrupt payload is treated as empty here so
    /// bookmarking keeps working; `load` is where corruption is reported.
    async fn ensure_loaded<'a>(
        &self,
        articles: &'a mut Option<Vec<Article>>,
    ) -> Result<&'a Vec<Article>, PersistenceError> {
        if articles.is_none() {
            let loaded = match self.read().await {
                Ok(list) => list,
                Err(PersistenceError::Corrupt(_)) => Vec::new(),
                Err(e) => return Err(e),
            };
            *articles = Some(loaded);
        }
        Ok(articles.get_or_insert_with(Vec::new))
    }

    async fn read(&self) -> Result<Vec<Article>, PersistenceError> {
        let raw = self.storage.get(&self.key).await.map_err(|e| {
            warn!("Failed to read '{}': {}", self.key, e);
            PersistenceError::Read(e)
        })?;

        let articles = match raw.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => serde_json::from_str(raw).map_err(|e| {
                warn!("Saved articles under '{}' could not be parsed: {}", self.key, e);
                PersistenceError::Corrupt(e)
            })?,
        };

        info!("Loaded {} saved articles", articles.len());
        Ok(articles)
    }

    async fn write(&self, articles: &[Article]) -> Result<(), PersistenceError> {
        let payload = serde_json::to_string(articles).map_err(PersistenceError::Encode)?;
        self.storage.set(&self.key, &payload).await.map_err(|e| {
            warn!("Failed to write '{}': {}", self.key, e);
            PersistenceError::Write(e)
        })
    }
}
