//! Fakes shared by unit tests: synthetic feed markup, a scripted browser,
//! and an in-memory page fetcher.

use crate::error::{FetchError, RenderError};
use crate::models::{Article, Market};
use crate::render::{RenderSession, Renderer};
use crate::verify::PageFetcher;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Anchor instant used by fixtures that need a fixed "now".
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 16, 12, 0, 0).unwrap()
}

/// A verified article published `hours_ago` hours before [`fixed_now`].
pub fn article(market: Market, url: &str, hours_ago: i64) -> Article {
    Article {
        headline: format!("headline for {url}"),
        url: url.to_string(),
        publish_time: (fixed_now() - ChronoDuration::hours(hours_ago)).fixed_offset(),
        content: "body".to_string(),
        market,
        scraped_at: fixed_now(),
    }
}

/// One entry of a synthetic listing feed.
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub href: String,
    pub headline: String,
    pub label: String,
}

impl FeedItem {
    pub fn new(href: &str, headline: &str, label: &str) -> Self {
        Self {
            href: href.to_string(),
            headline: headline.to_string(),
            label: label.to_string(),
        }
    }

    /// Entry `i`, labelled as published `minutes` ago.
    pub fn aged(i: usize, minutes: i64) -> Self {
        Self::new(&format!("/news/{i}.html"), &format!("Story {i}"), &format!("{minutes}分鐘前"))
    }
}

/// Render items the way the live feed nests them.
pub fn feed_markup(items: &[FeedItem]) -> String {
    let entries: String = items
        .iter()
        .map(|item| {
            format!(
                r#"<li><div><span>Source</span><span>{}</span></div><h3><a href="{}">{}</a></h3></li>"#,
                item.label, item.href, item.headline
            )
        })
        .collect();
    format!(r#"<html><body><div id="YDC-Stream-Proxy"><ul>{entries}</ul></div></body></html>"#)
}

/// An article page with a `time[datetime]` and body paragraphs.
pub fn detail_page(datetime: &str, paragraphs: &[&str]) -> String {
    let body: String = paragraphs.iter().map(|p| format!("<p>{p}</p>")).collect();
    format!(
        r#"<html><head><title>t</title></head><body><header><time datetime="{datetime}">t</time></header><article>{body}</article></body></html>"#
    )
}

/// A session that replays a fixed sequence of page heights.
///
/// Each read consumes one height; the last one repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedSession {
    heights: VecDeque<u64>,
    failing_reads: usize,
}

impl ScriptedSession {
    pub fn with_heights(heights: Vec<u64>) -> Self {
        Self {
            heights: heights.into(),
            failing_reads: 0,
        }
    }

    /// Make the next `n` height reads fail without consuming a height.
    pub fn fail_height_reads(&mut self, n: usize) {
        self.failing_reads = n;
    }
}

impl RenderSession for ScriptedSession {
    async fn navigate(&mut self, _url: &str) -> Result<(), RenderError> {
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    async fn scroll_height(&mut self) -> Result<u64, RenderError> {
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(RenderError::Script("height unavailable".into()));
        }
        let height = if self.heights.len() > 1 {
            self.heights.pop_front()
        } else {
            self.heights.front().copied()
        };
        height.ok_or_else(|| RenderError::Script("no heights scripted".into()))
    }

    async fn page_source(&mut self) -> Result<String, RenderError> {
        Ok(String::new())
    }

    async fn close(self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Counters observed across every session a [`FeedRenderer`] hands out.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FeedStats {
    pub open_calls: usize,
    pub opened: usize,
    pub closed: usize,
    pub scrolls: usize,
}

/// A lazy-loading feed: `initial` items show up on load and each scroll
/// reveals `per_scroll` more until the list runs out. Height is 100px per
/// visible item.
#[derive(Debug, Clone)]
pub struct FeedRenderer {
    items: Arc<Vec<FeedItem>>,
    initial: usize,
    per_scroll: usize,
    fail_open: bool,
    failing_sessions: usize,
    stats: Arc<Mutex<FeedStats>>,
}

impl FeedRenderer {
    pub fn new(items: Vec<FeedItem>, initial: usize, per_scroll: usize) -> Self {
        Self {
            items: Arc::new(items),
            initial,
            per_scroll,
            fail_open: false,
            failing_sessions: 0,
            stats: Arc::default(),
        }
    }

    /// No session can be opened at all.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// The first `n` sessions error on their first scroll.
    pub fn fail_sessions(mut self, n: usize) -> Self {
        self.failing_sessions = n;
        self
    }

    pub fn stats(&self) -> FeedStats {
        self.stats.lock().unwrap().clone()
    }
}

impl Renderer for FeedRenderer {
    type Session = FeedSession;

    async fn open(&self) -> Result<FeedSession, RenderError> {
        let mut stats = self.stats.lock().unwrap();
        stats.open_calls += 1;
        if self.fail_open {
            return Err(RenderError::Protocol {
                status: 500,
                error: "session not created".into(),
                message: "no browser".into(),
            });
        }
        stats.opened += 1;
        Ok(FeedSession {
            items: Arc::clone(&self.items),
            visible: 0,
            loaded: false,
            initial: self.initial,
            per_scroll: self.per_scroll,
            broken: stats.opened <= self.failing_sessions,
            stats: Arc::clone(&self.stats),
        })
    }
}

#[derive(Debug)]
pub struct FeedSession {
    items: Arc<Vec<FeedItem>>,
    visible: usize,
    loaded: bool,
    initial: usize,
    per_scroll: usize,
    broken: bool,
    stats: Arc<Mutex<FeedStats>>,
}

impl RenderSession for FeedSession {
    async fn navigate(&mut self, _url: &str) -> Result<(), RenderError> {
        self.loaded = true;
        self.visible = self.initial.min(self.items.len());
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError> {
        self.stats.lock().unwrap().scrolls += 1;
        if self.broken {
            return Err(RenderError::Script("javascript error: renderer crashed".into()));
        }
        self.visible = (self.visible + self.per_scroll).min(self.items.len());
        Ok(())
    }

    async fn scroll_height(&mut self) -> Result<u64, RenderError> {
        if !self.loaded {
            return Err(RenderError::Script("no document".into()));
        }
        Ok(self.visible as u64 * 100)
    }

    async fn page_source(&mut self) -> Result<String, RenderError> {
        Ok(feed_markup(&self.items[..self.visible]))
    }

    async fn close(self) -> Result<(), RenderError> {
        self.stats.lock().unwrap().closed += 1;
        Ok(())
    }
}

/// [`PageFetcher`] serving canned pages, tracking how many fetches overlap.
#[derive(Debug, Default)]
pub struct FakeFetcher {
    pages: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeFetcher {
    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(status) = self.statuses.get(url) {
            return Err(FetchError::Status(*status));
        }
        self.pages.get(url).cloned().ok_or(FetchError::Status(404))
    }
}
