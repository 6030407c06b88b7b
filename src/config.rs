//! Settings for a collection run.
//!
//! Everything the engine needs (thresholds, URLs, selectors, delays) lives in
//! one immutable [`Settings`] value that is built once in `main` and passed
//! down explicitly. Nothing reads process-wide state, so tests can hand the
//! controller and verifier synthetic thresholds.
//!
//! Settings come from an optional YAML file. Every field has a default, and
//! both markets ship with a working configuration, so an empty file (or no
//! file at all) is valid.
//!
//! ```yaml
//! database_path: news.db
//! webdriver_url: http://localhost:9515
//! min_new_articles: 1
//! settle:
//!   mode: poll
//!   timeout_secs: 10
//! markets:
//!   US:
//!     window_hours: 24
//!     min_items: 20
//! stages:
//!   - name: analyzer
//!     command: ["python", "analyzer.py"]
//! ```

use crate::error::ConfigError;
use crate::models::Market;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Longest accepted look-back window: one year.
pub const MAX_WINDOW_HOURS: u32 = 24 * 366;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// Top-level settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite file holding articles and summaries.
    pub database_path: String,
    /// WebDriver endpoint (chromedriver, geckodriver, selenium).
    pub webdriver_url: String,
    pub user_agent: String,
    /// Per-request timeout for detail pages.
    pub fetch_timeout_secs: u64,
    /// Upper bound on detail pages fetched at the same time.
    pub verify_concurrency: usize,
    /// A run that inserts this many articles or fewer is a fatal run.
    pub min_new_articles: usize,
    pub settle: SettleConfig,
    /// Effective per-market configuration.
    #[serde(skip)]
    pub markets: BTreeMap<Market, MarketConfig>,
    /// Partial per-market documents, merged over [`MarketConfig::defaults`].
    #[serde(rename = "markets")]
    market_overrides: BTreeMap<Market, serde_yaml::Value>,
    /// Downstream commands run after a successful hunt, in order.
    pub stages: Vec<StageConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: "news.db".to_string(),
            webdriver_url: "http://localhost:9515".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: 15,
            verify_concurrency: 4,
            min_new_articles: 1,
            settle: SettleConfig::default(),
            markets: Market::ALL
                .into_iter()
                .map(|m| (m, MarketConfig::defaults(m)))
                .collect(),
            market_overrides: BTreeMap::new(),
            stages: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No settings file given; using built-in defaults");
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let settings = Self::from_yaml(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        settings.validate()?;
        info!(path, markets = settings.markets.len(), stages = settings.stages.len(), "Loaded settings");
        Ok(settings)
    }

    /// Parse settings. A market section only needs the fields it changes.
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        let mut settings: Settings = if raw.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        let overrides = std::mem::take(&mut settings.market_overrides);
        for (market, overlay) in overrides {
            let mut merged = serde_yaml::to_value(MarketConfig::defaults(market))?;
            merge_yaml(&mut merged, overlay);
            settings.markets.insert(market, serde_yaml::from_value(merged)?);
        }
        for market in Market::ALL {
            settings
                .markets
                .entry(market)
                .or_insert_with(|| MarketConfig::defaults(market));
        }
        debug!(?settings, "Parsed settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_concurrency == 0 {
            return Err(ConfigError::Invalid {
                field: "verify_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        for (market, config) in &self.markets {
            if config.window_hours == 0 {
                return Err(ConfigError::Invalid {
                    field: "window_hours",
                    reason: format!("{market}: must be at least 1"),
                });
            }
            if config.window_hours > MAX_WINDOW_HOURS {
                return Err(ConfigError::Invalid {
                    field: "window_hours",
                    reason: format!("{market}: must be at most {MAX_WINDOW_HOURS}"),
                });
            }
            if config.max_scrolls == 0 {
                return Err(ConfigError::Invalid {
                    field: "max_scrolls",
                    reason: format!("{market}: must be at least 1"),
                });
            }
            if config.max_retries == 0 {
                return Err(ConfigError::Invalid {
                    field: "max_retries",
                    reason: format!("{market}: must be at least 1"),
                });
            }
            url::Url::parse(&config.base_url).map_err(|e| ConfigError::Invalid {
                field: "base_url",
                reason: format!("{market}: {e}"),
            })?;
        }
        Ok(())
    }

    pub fn market(&self, market: Market) -> Result<&MarketConfig, ConfigError> {
        self.markets.get(&market).ok_or(ConfigError::MissingMarket(market))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_yaml(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// How one market's feed is crawled and judged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub display_name: String,
    pub listing_url: String,
    /// Origin that relative listing links are resolved against.
    pub base_url: String,
    pub window_hours: u32,
    /// Minimum visible items for the bottom-of-page acceptance rule.
    pub min_items: usize,
    /// Minimum newest-to-oldest span for the bottom-of-page acceptance rule.
    /// Half the window when unset.
    pub min_span_hours: Option<u32>,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Scroll iterations allowed in one attempt before it counts as failed.
    pub max_scrolls: u32,
    pub selectors: Selectors,
}

impl MarketConfig {
    pub fn defaults(market: Market) -> Self {
        let (display_name, listing_url) = match market {
            Market::Tw => ("台灣", "https://tw.stock.yahoo.com/tw-market"),
            Market::Us => ("美國", "https://tw.stock.yahoo.com/us-market-news"),
        };
        Self {
            display_name: display_name.to_string(),
            listing_url: listing_url.to_string(),
            base_url: "https://tw.stock.yahoo.com".to_string(),
            window_hours: 24,
            min_items: 20,
            min_span_hours: None,
            max_retries: 3,
            retry_delay_secs: 60,
            max_scrolls: 200,
            selectors: Selectors::default(),
        }
    }

    pub fn min_span(&self) -> chrono::Duration {
        match self.min_span_hours {
            Some(hours) => chrono::Duration::hours(i64::from(hours)),
            None => chrono::Duration::minutes(i64::from(self.window_hours) * 30),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// CSS selectors for the listing feed and the article pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// One element per feed entry.
    pub item: String,
    /// Headline anchor inside an entry.
    pub headline: String,
    /// Elements inside an entry that may carry a relative time label.
    pub time_label: String,
    /// Exact publish instant on an article page; read from its `datetime` attribute.
    pub publish_time: String,
    /// Main article container on an article page; only the first match is read.
    pub article: String,
    /// Body paragraphs inside the article container.
    pub paragraph: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            item: "#YDC-Stream-Proxy li".to_string(),
            headline: "h3 a".to_string(),
            time_label: "div span".to_string(),
            publish_time: "time[datetime]".to_string(),
            article: "article".to_string(),
            paragraph: "p".to_string(),
        }
    }
}

/// How the controller waits for freshly loaded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    /// Poll the page height until it stops changing.
    #[default]
    Poll,
    /// Sleep for `fallback_delay_secs` and trust the page.
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub mode: SettleMode,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    /// Consecutive identical height readings that count as settled.
    pub stable_polls: u32,
    pub timeout_secs: u64,
    pub fallback_delay_secs: u64,
    /// Grace period after the first navigation, before the first scroll.
    pub initial_delay_secs: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            mode: SettleMode::Poll,
            poll_interval_ms: 500,
            max_poll_interval_ms: 2_000,
            stable_polls: 3,
            timeout_secs: 10,
            fallback_delay_secs: 10,
            initial_delay_secs: 3,
        }
    }
}

/// An external collaborator run after collection, e.g. the analyzer.
#[derive(Debug, Clone, Deserialize)]
pub struct StageConfig {
    pub name: String,
    /// Program followed by its arguments; `--market <CODE>` is appended.
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_both_markets() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        let tw = settings.market(Market::Tw).unwrap();
        let us = settings.market(Market::Us).unwrap();
        assert_eq!(tw.listing_url, "https://tw.stock.yahoo.com/tw-market");
        assert_eq!(us.listing_url, "https://tw.stock.yahoo.com/us-market-news");
        assert_eq!(tw.min_items, 20);
        assert_eq!(tw.max_retries, 3);
        assert_eq!(tw.retry_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_min_span_defaults_to_half_window() {
        let mut config = MarketConfig::defaults(Market::Us);
        assert_eq!(config.min_span(), chrono::Duration::hours(12));
        config.window_hours = 9;
        assert_eq!(config.min_span(), chrono::Duration::minutes(270));
        config.min_span_hours = Some(6);
        assert_eq!(config.min_span(), chrono::Duration::hours(6));
    }

    #[test]
    fn test_partial_yaml_merges_with_defaults() {
        let raw = r#"
database_path: /tmp/news.db
min_new_articles: 3
settle:
  mode: fixed
markets:
  US:
    window_hours: 12
    min_items: 10
stages:
  - name: analyzer
    command: ["python", "analyzer.py"]
"#;
        let settings = Settings::from_yaml(raw).unwrap();
        assert_eq!(settings.database_path, "/tmp/news.db");
        assert_eq!(settings.min_new_articles, 3);
        assert_eq!(settings.settle.mode, SettleMode::Fixed);
        assert_eq!(settings.settle.stable_polls, 3);

        let us = settings.market(Market::Us).unwrap();
        assert_eq!(us.window_hours, 12);
        assert_eq!(us.min_items, 10);
        assert_eq!(us.listing_url, "https://tw.stock.yahoo.com/us-market-news");
        assert_eq!(us.selectors.item, "#YDC-Stream-Proxy li");

        let tw = settings.market(Market::Tw).unwrap();
        assert_eq!(tw.window_hours, 24);
        assert_eq!(settings.stages.len(), 1);
        assert_eq!(settings.stages[0].command, vec!["python", "analyzer.py"]);
    }

    #[test]
    fn test_nested_selector_override() {
        let raw = r#"
markets:
  TW:
    min_span_hours: 6
    selectors:
      article: "div.caas-body"
"#;
        let settings = Settings::from_yaml(raw).unwrap();
        let tw = settings.market(Market::Tw).unwrap();
        assert_eq!(tw.min_span(), chrono::Duration::hours(6));
        assert_eq!(tw.selectors.article, "div.caas-body");
        assert_eq!(tw.selectors.paragraph, "p");
        assert_eq!(tw.selectors.headline, "h3 a");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let settings = Settings::from_yaml("").unwrap();
        assert_eq!(settings.webdriver_url, "http://localhost:9515");
        assert_eq!(settings.markets.len(), 2);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let settings = Settings {
            verify_concurrency: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { field: "verify_concurrency", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_market_values() {
        let settings = Settings::from_yaml("markets:\n  TW:\n    window_hours: 4000000000\n").unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { field: "window_hours", .. })
        ));

        let settings = Settings::from_yaml("markets:\n  US:\n    max_scrolls: 0\n").unwrap();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { field: "max_scrolls", .. })
        ));

        let settings = Settings::from_yaml(&format!("markets:\n  TW:\n    window_hours: {MAX_WINDOW_HOURS}\n")).unwrap();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_unbounded_window() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "markets:\n  TW:\n    window_hours: 4000000000\n").unwrap();
        let err = Settings::load(path.to_str()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "window_hours", .. }));
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let err = Settings::load(Some("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
