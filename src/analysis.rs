//! This module contains the core MA60 crossing logic and the pass pipeline.

use crate::errors::{MonitorError, Result};
use crate::indicators::simple_moving_average;
use crate::market::{Candle, CandleSource, SymbolLister};
use crate::report::{self, Notifier};
use crate::storage_utils::StateStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Length of the moving average window.
pub const MA_PERIOD: usize = 60;
/// The MA window plus today's candle.
pub const REQUIRED_CANDLES: usize = MA_PERIOD + 1;

// --- Data Model ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Breakout,
    Breakdown,
}

/// Last directional crossing recorded for a symbol.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedAsset {
    pub symbol: String,
    pub status: Status,
    pub event_price: f64,
    pub event_date: NaiveDate,
}

/// Symbol -> last crossing. Owned by a single pass.
pub type StateMap = BTreeMap<String, TrackedAsset>;

/// Outcome of evaluating one symbol for one day.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Not enough history; nothing reported or stored.
    Skipped,
    NewBreakout { price: f64, ma: f64 },
    NewBreakdown { price: f64, ma: f64 },
    TrackedGain { event_price: f64, price: f64, pct: f64 },
    TrackedLoss { event_price: f64, price: f64, pct: f64 },
    NoEvent,
}

/// The four report sections, each in symbol scan order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyReport {
    pub breakouts: Vec<String>,
    pub breakdowns: Vec<String>,
    pub tracked_gains: Vec<String>,
    pub tracked_losses: Vec<String>,
}

impl DailyReport {
    pub fn is_empty(&self) -> bool {
        self.breakouts.is_empty()
            && self.breakdowns.is_empty()
            && self.tracked_gains.is_empty()
            && self.tracked_losses.is_empty()
    }
}

// --- Domain Logic ---

/// Classifies a symbol from its most recent candles (oldest first) and its
/// tracked entry, if any. Only the last `REQUIRED_CANDLES` candles are used.
pub fn classify(candles: &[Candle], tracked: Option<&TrackedAsset>) -> Classification {
    if candles.len() < REQUIRED_CANDLES {
        return Classification::Skipped;
    }
    let window = &candles[candles.len() - REQUIRED_CANDLES..];

    // MA60 excludes today's close
    let Some(ma) = simple_moving_average(&window[..MA_PERIOD], MA_PERIOD) else {
        return Classification::Skipped;
    };
    let previous = window[MA_PERIOD - 1].close;
    let latest = window[MA_PERIOD].close;

    if latest > ma && previous <= ma {
        return Classification::NewBreakout { price: latest, ma };
    }
    if latest < ma && previous >= ma {
        return Classification::NewBreakdown { price: latest, ma };
    }

    match tracked {
        Some(asset) if asset.status == Status::Breakout && latest > ma => Classification::TrackedGain {
            event_price: asset.event_price,
            price: latest,
            pct: (latest - asset.event_price) / asset.event_price * 100.0,
        },
        Some(asset) if asset.status == Status::Breakdown && latest < ma => Classification::TrackedLoss {
            event_price: asset.event_price,
            price: latest,
            pct: (asset.event_price - latest) / asset.event_price * 100.0,
        },
        _ => Classification::NoEvent,
    }
}

/// Folds one classification into the report and the state map.
pub fn apply(
    symbol: &str,
    classification: &Classification,
    today: NaiveDate,
    state: &mut StateMap,
    daily: &mut DailyReport,
) {
    let mut record = |status: Status, price: f64| {
        state.insert(
            symbol.to_string(),
            TrackedAsset {
                symbol: symbol.to_string(),
                status,
                event_price: price,
                event_date: today,
            },
        );
    };

    match *classification {
        Classification::NewBreakout { price, ma } => {
            info!(%symbol, price, ma, "New breakout");
            daily.breakouts.push(report::breakout_line(symbol, price));
            record(Status::Breakout, price);
        }
        Classification::NewBreakdown { price, ma } => {
            info!(%symbol, price, ma, "New breakdown");
            daily.breakdowns.push(report::breakdown_line(symbol, price));
            record(Status::Breakdown, price);
        }
        Classification::TrackedGain { event_price, price, pct } => {
            debug!(%symbol, event_price, price, pct, "Tracked gain");
            daily.tracked_gains.push(report::gain_line(symbol, event_price, pct));
        }
        Classification::TrackedLoss { event_price, price, pct } => {
            debug!(%symbol, event_price, price, pct, "Tracked loss");
            daily.tracked_losses.push(report::loss_line(symbol, event_price, pct));
        }
        Classification::Skipped | Classification::NoEvent => {}
    }
}

/// Evaluates every symbol in order. Fetch failures skip the symbol; an
/// exchange ban ends the scan and keeps what was gathered so far.
pub async fn analyze<S>(
    source: &S,
    symbols: &[String],
    state: &mut StateMap,
    today: NaiveDate,
) -> DailyReport
where
    S: CandleSource + ?Sized,
{
    let mut daily = DailyReport::default();

    for symbol in symbols {
        let classification = match source.daily_candles(symbol, REQUIRED_CANDLES).await {
            Ok(candles) => classify(&candles, state.get(symbol)),
            Err(MonitorError::Banned { retry_after }) => {
                warn!(%symbol, ?retry_after, "Banned by exchange, stopping scan for this pass");
                break;
            }
            Err(e) => {
                debug!(%symbol, error = %e, "Skipping symbol");
                continue;
            }
        };
        if classification == Classification::Skipped {
            debug!(%symbol, "Insufficient history");
        }
        apply(symbol, &classification, today, state, &mut daily);
    }

    daily
}

/// Result of one completed pass.
#[derive(Debug)]
pub struct PassOutcome {
    pub report: DailyReport,
    pub delivered: bool,
    pub state_saved: bool,
}

/// Runs one full pass: load state, analyze, send the report, persist state.
///
/// Only a malformed state file aborts the pass (nothing is sent or written).
/// Symbol listing, delivery and save failures are logged and the pass completes.
pub async fn run_pass<M, N>(
    market: &M,
    notifier: &N,
    store: &StateStore,
    today: NaiveDate,
) -> Result<PassOutcome>
where
    M: CandleSource + SymbolLister + ?Sized,
    N: Notifier + ?Sized,
{
    info!(%today, "Starting analysis pass");

    let mut state = store.load().await.inspect_err(|e| {
        error!(error = %e, "Failed to load state, aborting pass");
    })?;

    let daily = match market.eligible_symbols().await {
        Ok(symbols) => {
            info!(symbols = symbols.len(), tracked = state.len(), "Analyzing symbols");
            analyze(market, &symbols, &mut state, today).await
        }
        Err(e) => {
            error!(error = %e, "Failed to list symbols");
            DailyReport::default()
        }
    };

    if daily.is_empty() {
        info!("No crossings or tracked assets to report");
    }
    info!(
        breakouts = daily.breakouts.len(),
        breakdowns = daily.breakdowns.len(),
        gains = daily.tracked_gains.len(),
        losses = daily.tracked_losses.len(),
        "Analysis complete"
    );

    let document = report::format_report(today, &daily);
    let delivered = match notifier.send(report::REPORT_TITLE, &document).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Failed to deliver report");
            false
        }
    };

    let state_saved = match store.save(&state).await {
        Ok(()) => true,
        Err(e) => {
            error!(error = %e, "Failed to save state");
            false
        }
    };

    info!(delivered, state_saved, "Analysis pass finished");
    Ok(PassOutcome {
        report: daily,
        delivered,
        state_saved,
    })
}
