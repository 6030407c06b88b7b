//! One collection run for one market.
//!
//! ```text
//! clear(market) -> scroll listing -> extract candidates -> verify details
//!               -> insert fresh articles in order -> yield check
//! ```
//!
//! The market's previous dataset is cleared first, so every run stores
//! exactly the articles of its own window. Inserts that happened before a
//! fatal error stay in the store; nothing is rolled back and `clear` is not
//! repeated.

use crate::config::{MarketConfig, Settings};
use crate::error::{ConfigError, HuntError};
use crate::listing::{self, ParsedSelectors};
use crate::models::{RunContext, RunReport};
use crate::render::{Renderer, Settler};
use crate::scroll::ScrollController;
use crate::store::ArticleStore;
use crate::verify::{DetailVerifier, PageFetcher, Verdict};
use itertools::Itertools;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Everything a run talks to besides its configuration.
pub struct Collaborators<'a, R, F, S> {
    pub renderer: &'a R,
    pub fetcher: &'a F,
    pub store: &'a S,
}

/// Run the whole pipeline for `ctx.market`.
///
/// Returns the tallies when at least `min_new_articles + 1` articles were
/// newly stored, and [`HuntError::InsufficientYield`] otherwise.
#[instrument(level = "info", skip_all, fields(market = %ctx.market, window_start = %ctx.window_start))]
pub async fn run<R, F, S>(
    ctx: RunContext,
    market: &MarketConfig,
    settings: &Settings,
    with: Collaborators<'_, R, F, S>,
) -> Result<RunReport, HuntError>
where
    R: Renderer,
    F: PageFetcher,
    S: ArticleStore,
{
    let started = Instant::now();
    let selectors = ParsedSelectors::parse(&market.selectors)?;
    let base = Url::parse(&market.base_url).map_err(|e| ConfigError::Invalid {
        field: "base_url",
        reason: e.to_string(),
    })?;

    with.store.clear(ctx.market).await?;

    let settler = Settler::new(settings.settle.clone());
    let markup = ScrollController::new(with.renderer, market, &selectors, settler, ctx)
        .collect()
        .await?;

    let candidates = listing::extract(&markup, &base, &selectors);
    info!(candidates = candidates.len(), "Verifying candidates");

    let verdicts = DetailVerifier::new(with.fetcher, &selectors, ctx)
        .verify_all(&candidates, settings.verify_concurrency)
        .await;

    let mut report = RunReport {
        market: Some(ctx.market),
        candidates: candidates.len(),
        ..RunReport::default()
    };
    let mut skip_kinds = Vec::new();

    for verdict in verdicts {
        match verdict {
            Verdict::Fresh(article) => {
                if with.store.insert_if_absent(&article).await? {
                    report.inserted += 1;
                } else {
                    debug!(url = %article.url, "Already stored");
                    report.duplicates += 1;
                }
            }
            Verdict::Stale { .. } => report.stale += 1,
            Verdict::Skipped { reason, .. } => {
                report.skipped += 1;
                skip_kinds.push(reason.kind());
            }
        }
    }

    for (kind, count) in skip_kinds.into_iter().counts().into_iter().sorted() {
        warn!(reason = kind, count, "Candidates skipped");
    }

    info!(
        inserted = report.inserted,
        duplicates = report.duplicates,
        stale = report.stale,
        skipped = report.skipped,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Run finished"
    );

    if report.inserted <= settings.min_new_articles {
        return Err(HuntError::InsufficientYield {
            report,
            threshold: settings.min_new_articles,
        });
    }
    Ok(report)
}
