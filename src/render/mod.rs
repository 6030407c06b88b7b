//! Rendering sessions for lazy-loading feeds.
//!
//! The scroll controller never talks to a browser directly. It opens a
//! [`RenderSession`] through a [`Renderer`], and every browser capability it
//! needs (load a URL, scroll to the bottom, measure the page, serialize the
//! DOM) is one method on that session. [`webdriver`] provides the real
//! implementation; tests substitute a synthetic feed.
//!
//! [`Settler`] implements "wait for content to settle": it polls the page
//! height with a growing, jittered interval and only falls back to a fixed
//! sleep when the height cannot be observed.

pub mod webdriver;

use crate::config::{SettleConfig, SettleMode};
use crate::error::RenderError;
use rand::{rng, Rng};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

/// Something that can start browser sessions.
pub trait Renderer {
    type Session: RenderSession;

    /// Start a fresh session. Failing here means no browser is available.
    async fn open(&self) -> Result<Self::Session, RenderError>;
}

/// One open browser session.
///
/// Sessions are scoped resources: whoever opens one must call
/// [`RenderSession::close`] on every exit path.
pub trait RenderSession {
    async fn navigate(&mut self, url: &str) -> Result<(), RenderError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), RenderError>;

    /// Current scrollable height of the document, in CSS pixels.
    async fn scroll_height(&mut self) -> Result<u64, RenderError>;

    /// Serialized DOM as currently rendered.
    async fn page_source(&mut self) -> Result<String, RenderError>;

    async fn close(self) -> Result<(), RenderError>;
}

/// Waits for newly requested content to finish loading.
#[derive(Debug, Clone)]
pub struct Settler {
    config: SettleConfig,
}

impl Settler {
    pub fn new(config: SettleConfig) -> Self {
        Self { config }
    }

    /// Grace period after the first navigation.
    pub async fn initial(&self) {
        sleep(Duration::from_secs(self.config.initial_delay_secs)).await;
    }

    /// Wait until the page has grown past `previous` and stopped changing,
    /// or until the timeout passes. Returns the last observed height.
    ///
    /// A page that never grows is only reported after the full timeout, so
    /// a slow network is not mistaken for the bottom of the feed.
    #[instrument(level = "debug", skip_all, fields(previous = previous))]
    pub async fn wait<S: RenderSession>(&self, session: &mut S, previous: u64) -> Result<u64, RenderError> {
        match self.config.mode {
            SettleMode::Fixed => self.fixed(session).await,
            SettleMode::Poll => self.poll(session, previous).await,
        }
    }

    async fn fixed<S: RenderSession>(&self, session: &mut S) -> Result<u64, RenderError> {
        sleep(Duration::from_secs(self.config.fallback_delay_secs)).await;
        session.scroll_height().await
    }

    async fn poll<S: RenderSession>(&self, session: &mut S, previous: u64) -> Result<u64, RenderError> {
        let deadline = Instant::now() + Duration::from_secs(self.config.timeout_secs);
        let max_interval = Duration::from_millis(self.config.max_poll_interval_ms);
        let mut interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut last = previous;
        let mut stable = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!(height = last, "Settle timeout reached");
                return Ok(last);
            }
            sleep(interval.min(deadline - now)).await;

            let height = match session.scroll_height().await {
                Ok(height) => height,
                Err(e) => {
                    warn!(error = %e, "Page height not observable; falling back to fixed delay");
                    return self.fixed(session).await;
                }
            };

            if height != last {
                stable = 0;
                last = height;
            } else if height != previous {
                stable += 1;
                if stable >= self.config.stable_polls {
                    debug!(height, "Content settled");
                    return Ok(height);
                }
            }
            interval = next_interval(interval, max_interval);
        }
    }
}

fn next_interval(current: Duration, max: Duration) -> Duration {
    let jitter = Duration::from_millis(rng().random_range(0..=50));
    current.saturating_mul(2).min(max) + jitter
}
