use std::path::{Path, PathBuf};

use autolms::{MemoryArticleStore, store::KnownArticle};
use serde::{Deserialize, Serialize};

/// Known-article ids persisted between runs as one JSON file.
pub(crate) struct ArticleCache {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    articles: Vec<KnownArticle>,
}

impl ArticleCache {
    const FILE_NAME: &'static str = "known_articles.json";

    pub(crate) fn new(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            path: cache_dir.as_ref().join(Self::FILE_NAME),
        }
    }

    /// Loads the cache. A missing file is an empty cache; an unreadable
    /// one is reported and also treated as empty.
    pub(crate) async fn load(&self) -> MemoryArticleStore {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No article cache yet");
                return MemoryArticleStore::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to read article cache: {e}");
                return MemoryArticleStore::new();
            }
        };
        match serde_json::from_str::<CacheFile>(&contents) {
            Ok(file) => {
                tracing::info!(count = file.articles.len(), "Loaded article cache");
                file.articles.into_iter().collect()
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Article cache is corrupted, starting over: {e}");
                MemoryArticleStore::new()
            }
        }
    }

    pub(crate) async fn save(&self, store: &MemoryArticleStore) -> eyre::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = CacheFile {
            articles: store.snapshot(),
        };
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&file)?).await?;
        tracing::info!(count = file.articles.len(), "Saved article cache");
        Ok(())
    }
}
