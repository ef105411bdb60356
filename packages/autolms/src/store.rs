use std::{
    collections::HashSet,
    future::Future,
    sync::{Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};

use crate::{
    crawl::CourseCrawl,
    error::{Error, Result},
    model::BoardKind,
};

/// Answers "has this article been collected before?".
///
/// A crawl only asks; remembering what it returned is up to the caller, so
/// an article that is never persisted is offered again next time.
pub trait ArticleStore: Send + Sync {
    fn exists(
        &self,
        board: BoardKind,
        course_id: &str,
        article_id: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}

/// One remembered article.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnownArticle {
    pub board: BoardKind,
    pub course_id: String,
    pub article_id: String,
}

#[derive(Debug, Default)]
pub struct MemoryArticleStore {
    known: Mutex<HashSet<KnownArticle>>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<KnownArticle>> {
        self.known.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn remember(&self, board: BoardKind, course_id: &str, article_id: &str) {
        self.lock().insert(KnownArticle {
            board,
            course_id: course_id.to_string(),
            article_id: article_id.to_string(),
        });
    }

    /// Records every article a crawl returned. Returns how many were new.
    pub fn remember_crawl(&self, crawl: &CourseCrawl) -> usize {
        let mut known = self.lock();
        crawl
            .boards
            .iter()
            .flat_map(|board| {
                board.articles.iter().map(|article| KnownArticle {
                    board: board.kind,
                    course_id: crawl.course.id.clone(),
                    article_id: article.entry.article_id.clone(),
                })
            })
            .filter(|article| known.insert(article.clone()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Sorted copy of the contents, for persisting.
    pub fn snapshot(&self) -> Vec<KnownArticle> {
        let mut articles = self.lock().iter().cloned().collect::<Vec<_>>();
        articles.sort_by(|a, b| {
            (&a.course_id, a.board, &a.article_id).cmp(&(&b.course_id, b.board, &b.article_id))
        });
        articles
    }
}

impl FromIterator<KnownArticle> for MemoryArticleStore {
    fn from_iter<I: IntoIterator<Item = KnownArticle>>(iter: I) -> Self {
        Self {
            known: Mutex::new(iter.into_iter().collect()),
        }
    }
}

impl ArticleStore for MemoryArticleStore {
    async fn exists(&self, board: BoardKind, course_id: &str, article_id: &str) -> Result<bool> {
        if article_id.is_empty() {
            return Err(Error::Store("empty article id".to_string()));
        }
        Ok(self.lock().contains(&KnownArticle {
            board,
            course_id: course_id.to_string(),
            article_id: article_id.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyed_by_board_course_and_article() {
        let store = MemoryArticleStore::new();
        store.remember(BoardKind::Notice, "A2024CS301", "123");

        assert!(store.exists(BoardKind::Notice, "A2024CS301", "123").await.unwrap());
        assert!(!store.exists(BoardKind::Material, "A2024CS301", "123").await.unwrap());
        assert!(!store.exists(BoardKind::Notice, "A2024CS302", "123").await.unwrap());
        assert!(store.exists(BoardKind::Notice, "A2024CS301", "").await.is_err());
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let store = MemoryArticleStore::new();
        store.remember(BoardKind::Assignment, "B", "2");
        store.remember(BoardKind::Notice, "A", "1");
        store.remember(BoardKind::Notice, "A", "1");

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].course_id, "A");

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: MemoryArticleStore = serde_json::from_str::<Vec<KnownArticle>>(&json)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.snapshot(), snapshot);
    }
}
