//! MA60 crossing monitor for Binance USDT spot pairs.
//!
//! Runs one pass at startup and then once a day at `REPORT_TIME`, posting a
//! four-section report to a DingTalk webhook.

mod analysis;
mod config;
mod errors;
mod find_tickers;
mod indicators;
mod klines;
mod market;
mod report;
mod scheduler;
mod storage_utils;

use crate::config::Config;
use crate::klines::BinanceClient;
use crate::report::DingTalkNotifier;
use crate::scheduler::DailySchedule;
use crate::storage_utils::StateStore;
use chrono::Local;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

struct Monitor {
    market: BinanceClient,
    notifier: DingTalkNotifier,
    store: StateStore,
}

impl Monitor {
    async fn check(&self) {
        let today = Local::now().date_naive();
        match analysis::run_pass(&self.market, &self.notifier, &self.store, today).await {
            Ok(outcome) => {
                let daily = &outcome.report;
                let summary = format!(
                    "{} up, {} down, {} gaining, {} losing",
                    daily.breakouts.len(),
                    daily.breakdowns.len(),
                    daily.tracked_gains.len(),
                    daily.tracked_losses.len()
                );
                if outcome.delivered && outcome.state_saved {
                    info!(%summary, "Check finished");
                } else {
                    warn!(
                        %summary,
                        delivered = outcome.delivered,
                        state_saved = outcome.state_saved,
                        "Check finished with errors"
                    );
                }
            }
            Err(e) => error!(error = %e, "Analysis pass failed"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    init_tracing(&config.log_level);

    info!("Starting MA60 monitor");
    info!(
        rest_url = %config.exchange.rest_url,
        report_time = %config.report_time.format("%H:%M"),
        timeout = ?config.request_timeout,
        "Configuration loaded"
    );

    let monitor = Monitor {
        market: BinanceClient::new(&config.exchange, config.request_timeout)?,
        notifier: DingTalkNotifier::new(config.webhook_url.clone(), config.request_timeout)?,
        store: StateStore::new(&config.state_file),
    };

    info!(state_file = ?monitor.store.path(), "Running initial check");
    monitor.check().await;

    let schedule = DailySchedule::new(config.report_time);
    schedule
        .run(
            || monitor.check(),
            async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
                info!("Shutdown signal received");
            },
        )
        .await;

    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
