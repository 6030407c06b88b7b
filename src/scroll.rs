//! Adaptive scrolling of a lazy-loading listing feed.
//!
//! The feed does not say how far back it goes, so the controller keeps
//! scrolling until the visible list is known to cover the whole window, or
//! until the page stops growing. Each iteration is:
//!
//! ```text
//! scroll to bottom -> settle -> snapshot -> check
//!   Covered   oldest visible item is older than window_start   -> success
//!   Bottom    height did not grow
//!               items >= min_items and span >= min_span        -> success
//!               otherwise                                      -> attempt fails
//!   Continue  anything else                                    -> next iteration
//! ```
//!
//! A failed attempt closes its session, waits `retry_delay` (not after the
//! last attempt) and starts again from a fresh session. Failing to open a
//! session at all is fatal straight away: no browser means retrying cannot
//! help.

use crate::config::MarketConfig;
use crate::error::{HuntError, RenderError};
use crate::listing::{self, FeedSnapshot, ParsedSelectors};
use crate::models::RunContext;
use crate::render::{RenderSession, Renderer, Settler};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Result of checking one growth step against the stop conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCheck {
    /// Keep scrolling.
    Continue,
    /// The oldest visible entry predates the window.
    Covered,
    /// Bottom reached with enough entries spanning enough time.
    Accepted,
    /// Bottom reached without enough to go on.
    Short,
}

/// Thresholds for [`check_bottom`].
#[derive(Debug, Clone, Copy)]
pub struct StopRule {
    pub window_start: DateTime<Utc>,
    pub min_items: usize,
    pub min_span: Duration,
}

impl StopRule {
    pub fn new(ctx: &RunContext, market: &MarketConfig) -> Self {
        Self {
            window_start: ctx.window_start,
            min_items: market.min_items,
            min_span: market.min_span(),
        }
    }
}

/// Apply the stop conditions, in order, to the feed after one scroll.
///
/// # Arguments
///
/// * `snapshot` - Entry count and label range of the feed as rendered now
/// * `grew` - Whether the page height increased during this scroll
/// * `rule` - Window start and the minimums a bottomed-out feed must meet
///
/// # Returns
///
/// [`StopCheck::Covered`] as soon as the oldest entry predates the window,
/// [`StopCheck::Continue`] while the page still grows, and at the bottom
/// either [`StopCheck::Accepted`] or [`StopCheck::Short`].
pub fn check_bottom(snapshot: &FeedSnapshot, grew: bool, rule: &StopRule) -> StopCheck {
    if snapshot.oldest.is_some_and(|oldest| oldest < rule.window_start) {
        return StopCheck::Covered;
    }
    if grew {
        return StopCheck::Continue;
    }
    if snapshot.item_count >= rule.min_items && snapshot.span() >= rule.min_span {
        StopCheck::Accepted
    } else {
        StopCheck::Short
    }
}

/// Progress of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollState {
    pub last_height: u64,
    pub oldest_seen: Option<DateTime<Utc>>,
    pub iterations: u32,
}

impl ScrollState {
    fn observe(&mut self, height: u64, snapshot: &FeedSnapshot) -> bool {
        let grew = height > self.last_height;
        self.last_height = height;
        self.iterations += 1;
        if let Some(oldest) = snapshot.oldest {
            self.oldest_seen = Some(self.oldest_seen.map_or(oldest, |seen| seen.min(oldest)));
        }
        grew
    }
}

/// Why one attempt ended without success. Never escapes this module.
#[derive(Error, Debug)]
enum AttemptFailure {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("feed stopped growing with {items} items spanning {span_minutes} minutes")]
    Short { items: usize, span_minutes: i64 },

    #[error("no stop condition after {0} scrolls")]
    Capped(u32),
}

/// Drives rendering sessions until the feed covers the run's window.
pub struct ScrollController<'a, R> {
    renderer: &'a R,
    market: &'a MarketConfig,
    selectors: &'a ParsedSelectors,
    settler: Settler,
    ctx: RunContext,
}

impl<'a, R: Renderer> ScrollController<'a, R> {
    pub fn new(
        renderer: &'a R,
        market: &'a MarketConfig,
        selectors: &'a ParsedSelectors,
        settler: Settler,
        ctx: RunContext,
    ) -> Self {
        Self {
            renderer,
            market,
            selectors,
            settler,
            ctx,
        }
    }

    /// Scroll the listing until a stop condition succeeds and return the
    /// rendered markup.
    #[instrument(level = "info", skip_all, fields(market = %self.ctx.market, url = %self.market.listing_url))]
    pub async fn collect(&self) -> Result<String, HuntError> {
        let attempts = self.market.max_retries.max(1);
        let rule = StopRule::new(&self.ctx, self.market);

        for attempt in 1..=attempts {
            let mut session = self.renderer.open().await.map_err(|e| {
                warn!(error = %e, "Rendering session could not be opened");
                HuntError::SessionSetup(e)
            })?;

            let outcome = self.attempt(&mut session, &rule).await;
            if let Err(e) = session.close().await {
                warn!(attempt, error = %e, "Failed to close rendering session");
            }

            match outcome {
                Ok(markup) => {
                    info!(attempt, bytes = markup.len(), "Listing loaded");
                    return Ok(markup);
                }
                Err(failure) => {
                    warn!(attempt, attempts, reason = %failure, "Scroll attempt failed");
                }
            }

            if attempt < attempts {
                let delay = self.market.retry_delay();
                info!(delay_s = delay.as_secs(), "Retrying with a fresh session");
                sleep(delay).await;
            }
        }

        Err(HuntError::ScrollExhausted { attempts })
    }

    async fn attempt<S: RenderSession>(&self, session: &mut S, rule: &StopRule) -> Result<String, AttemptFailure> {
        session.navigate(&self.market.listing_url).await?;
        self.settler.initial().await;

        let mut state = ScrollState {
            last_height: session.scroll_height().await?,
            ..ScrollState::default()
        };

        loop {
            if state.iterations >= self.market.max_scrolls {
                return Err(AttemptFailure::Capped(state.iterations));
            }

            session.scroll_to_bottom().await?;
            let height = self.settler.wait(session, state.last_height).await?;
            let markup = session.page_source().await?;
            let snapshot = listing::snapshot(&markup, self.selectors, self.ctx.now);
            let grew = state.observe(height, &snapshot);

            debug!(
                iteration = state.iterations,
                height,
                grew,
                items = snapshot.item_count,
                oldest = ?snapshot.oldest,
                "Scrolled"
            );

            match check_bottom(&snapshot, grew, rule) {
                StopCheck::Continue => continue,
                StopCheck::Covered => {
                    info!(
                        iterations = state.iterations,
                        items = snapshot.item_count,
                        oldest = ?state.oldest_seen,
                        "Feed covers the window"
                    );
                    return Ok(markup);
                }
                StopCheck::Accepted => {
                    info!(
                        iterations = state.iterations,
                        items = snapshot.item_count,
                        span_minutes = snapshot.span().num_minutes(),
                        "Bottom reached with enough coverage"
                    );
                    return Ok(markup);
                }
                StopCheck::Short => {
                    return Err(AttemptFailure::Short {
                        items: snapshot.item_count,
                        span_minutes: snapshot.span().num_minutes(),
                    });
                }
            }
        }
    }
}
