//! Per-candidate detail verification.
//!
//! The listing only knows roughly how old an entry is. Verification fetches
//! the candidate's own page and requires two things from it: an exact,
//! machine-readable publish instant and a non-empty body. With both in hand
//! the window check is an exact instant comparison; this is the only place
//! where an article is admitted to (or kept out of) the window.
//!
//! A candidate that fails verification is a local miss. It becomes a
//! [`Verdict::Skipped`] and never interrupts its siblings. Fetches are not
//! retried.

use crate::error::FetchError;
use crate::listing::ParsedSelectors;
use crate::models::{Article, Candidate, RunContext};
use chrono::{DateTime, FixedOffset, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use scraper::Html;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Fetches a page body by URL.
pub trait PageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// [`PageFetcher`] over HTTP with a browser User-Agent and a hard timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Why a candidate produced no article.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SkipReason {
    Fetch(String),
    MissingTimestamp,
    MissingBody,
}

impl SkipReason {
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Fetch(_) => "fetch",
            SkipReason::MissingTimestamp => "missing_timestamp",
            SkipReason::MissingBody => "missing_body",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Fetch(e) => write!(f, "fetch failed: {e}"),
            SkipReason::MissingTimestamp => f.write_str("no publish timestamp"),
            SkipReason::MissingBody => f.write_str("no article body"),
        }
    }
}

/// Outcome of verifying one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Inside the window; ready to store.
    Fresh(Article),
    /// Published before the window. Expected: scrolling over-collects.
    Stale {
        url: String,
        published: DateTime<FixedOffset>,
    },
    Skipped { url: String, reason: SkipReason },
}

/// What an article page yielded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DetailPage {
    pub published: Option<DateTime<FixedOffset>>,
    pub body: Option<String>,
}

/// Pull the exact publish instant and the body text out of an article page.
///
/// The body is read from the paragraphs of the **first** element matching
/// the article selector only. Pages often embed related-story teasers as
/// further `<article>` elements; their text never counts as the body, so a
/// main article without paragraphs yields no body at all.
///
/// # Arguments
///
/// * `html` - The raw article page
/// * `selectors` - Parsed selectors of the candidate's market
///
/// # Returns
///
/// A [`DetailPage`] whose `published` is the first `datetime` attribute that
/// parses as RFC 3339, and whose `body` is the trimmed, non-empty paragraphs
/// joined by newlines. Either is `None` when missing.
pub fn parse_detail(html: &str, selectors: &ParsedSelectors) -> DetailPage {
    let document = Html::parse_document(html);

    let published = document
        .select(&selectors.publish_time)
        .filter_map(|el| el.value().attr("datetime"))
        .find_map(|raw| DateTime::parse_from_rfc3339(raw.trim()).ok());

    let body = document
        .select(&selectors.article)
        .next()
        .map(|article| {
            article
                .select(&selectors.paragraph)
                .map(|p| p.text().collect::<String>())
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    DetailPage {
        published,
        body: (!body.is_empty()).then_some(body),
    }
}

/// Verifies candidates against one run's window.
pub struct DetailVerifier<'a, F> {
    fetcher: &'a F,
    selectors: &'a ParsedSelectors,
    ctx: RunContext,
}

impl<'a, F: PageFetcher> DetailVerifier<'a, F> {
    pub fn new(fetcher: &'a F, selectors: &'a ParsedSelectors, ctx: RunContext) -> Self {
        Self { fetcher, selectors, ctx }
    }

    #[instrument(level = "debug", skip_all, fields(url = %candidate.url))]
    pub async fn verify(&self, candidate: &Candidate) -> Verdict {
        let html = match self.fetcher.fetch(&candidate.url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "Detail fetch failed; skipping candidate");
                return Verdict::Skipped {
                    url: candidate.url.clone(),
                    reason: SkipReason::Fetch(e.to_string()),
                };
            }
        };

        self.judge(candidate, parse_detail(&html, self.selectors))
    }

    fn judge(&self, candidate: &Candidate, page: DetailPage) -> Verdict {
        let skipped = |reason: SkipReason| {
            warn!(url = %candidate.url, %reason, "Incomplete article page; skipping candidate");
            Verdict::Skipped {
                url: candidate.url.clone(),
                reason,
            }
        };
        let Some(published) = page.published else {
            return skipped(SkipReason::MissingTimestamp);
        };
        let Some(content) = page.body else {
            return skipped(SkipReason::MissingBody);
        };

        if published.with_timezone(&Utc) < self.ctx.window_start {
            debug!(url = %candidate.url, %published, "Published before window");
            return Verdict::Stale {
                url: candidate.url.clone(),
                published,
            };
        }

        info!(time = %published.format("%Y-%m-%d %H:%M"), headline = %candidate.headline, "Verified article");
        Verdict::Fresh(Article {
            headline: candidate.headline.clone(),
            url: candidate.url.clone(),
            publish_time: published,
            content,
            market: self.ctx.market,
            scraped_at: self.ctx.now,
        })
    }

    /// Verify every candidate with at most `concurrency` fetches in flight.
    ///
    /// Verdicts come back in candidate order regardless of which fetch
    /// finishes first.
    #[instrument(level = "info", skip_all, fields(candidates = candidates.len(), concurrency = concurrency))]
    pub async fn verify_all(&self, candidates: &[Candidate], concurrency: usize) -> Vec<Verdict> {
        stream::iter(candidates)
            .map(|candidate| self.verify(candidate))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }
}
