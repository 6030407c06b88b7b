use super::ArticleStore;
use crate::error::StoreError;
use crate::models::{Article, Market, Summary};
use chrono::Utc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Inner {
    articles: Vec<Article>,
    summaries: Vec<Summary>,
    next_summary_id: i64,
}

/// In-process [`ArticleStore`]; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArticleStore for MemoryStore {
    async fn clear(&self, market: Market) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.articles.retain(|a| a.market != market);
        inner.summaries.retain(|s| s.market != market);
        Ok(())
    }

    async fn insert_if_absent(&self, article: &Article) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.articles.iter().any(|a| a.url == article.url) {
            return Ok(false);
        }
        inner.articles.push(article.clone());
        Ok(true)
    }

    async fn list_by_market(&self, market: Market) -> Result<Vec<Article>, StoreError> {
        let inner = self.inner.read().await;
        let mut articles: Vec<Article> = inner
            .articles
            .iter()
            .filter(|a| a.market == market)
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.publish_time.cmp(&a.publish_time));
        Ok(articles)
    }

    async fn add_summary(
        &self,
        market: Market,
        text: &str,
        source_article_count: i64,
    ) -> Result<Summary, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_summary_id += 1;
        let summary = Summary {
            id: inner.next_summary_id,
            market,
            text: text.to_string(),
            source_article_count,
            created_at: Utc::now(),
        };
        inner.summaries.push(summary.clone());
        Ok(summary)
    }

    async fn latest_summary(&self, market: Market) -> Result<Option<Summary>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.summaries.iter().rev().find(|s| s.market == market).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::article;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::new();
        let a = article(Market::Tw, "https://x/a", 3);
        let b = article(Market::Tw, "https://x/b", 1);

        assert!(store.insert_if_absent(&a).await.unwrap());
        assert!(!store.insert_if_absent(&a).await.unwrap());
        assert!(store.insert_if_absent(&b).await.unwrap());

        let listed = store.list_by_market(Market::Tw).await.unwrap();
        assert_eq!(listed, vec![b, a]);

        store.add_summary(Market::Tw, "report", 2).await.unwrap();
        assert_eq!(store.latest_summary(Market::Tw).await.unwrap().unwrap().id, 1);

        store.clear(Market::Tw).await.unwrap();
        assert!(store.list_by_market(Market::Tw).await.unwrap().is_empty());
        assert!(store.latest_summary(Market::Tw).await.unwrap().is_none());
    }
}
