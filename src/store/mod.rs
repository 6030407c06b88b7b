//! Persistence for verified articles and downstream summaries.
//!
//! The store is the hand-off point to the downstream stages: the
//! analysis stage reads articles with [`ArticleStore::list_by_market`] and
//! writes a [`Summary`]; the voice stage reads that summary back.
//!
//! # Contract
//!
//! - URL is the only dedup key. Inserting a URL that is already present is a
//!   no-op that reports `false`, never an error.
//! - Data is scoped per market and treated as a session dataset:
//!   [`ArticleStore::clear`] wipes a market's articles *and* summaries at the
//!   start of every run.
//! - Single writer per market. `clear` followed by inserts is not
//!   transactional; a crashed run leaves a partial dataset for the next
//!   run's `clear` to erase.
//!
//! # Backends
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | SQLite | [`sqlite`] | The real dataset on disk |
//! | Memory | `memory` | Unit tests only |

#[cfg(test)]
pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::models::{Article, Market, Summary};

pub trait ArticleStore {
    /// Delete every article and summary belonging to `market`.
    async fn clear(&self, market: Market) -> Result<(), StoreError>;

    /// Insert `article` unless its URL is already stored. Returns whether it was inserted.
    async fn insert_if_absent(&self, article: &Article) -> Result<bool, StoreError>;

    /// Articles of `market`, newest publish time first.
    async fn list_by_market(&self, market: Market) -> Result<Vec<Article>, StoreError>;

    async fn add_summary(
        &self,
        market: Market,
        text: &str,
        source_article_count: i64,
    ) -> Result<Summary, StoreError>;

    /// The most recently written summary for `market`.
    async fn latest_summary(&self, market: Market) -> Result<Option<Summary>, StoreError>;
}
