use crate::analysis::DailyReport;
use crate::errors::{MonitorError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::Duration;
use tracing::info;

pub const REPORT_TITLE: &str = "MA60 Monitor";

const SECTION_BREAKOUTS: &str = "🚀 New breakouts (MA60)";
const SECTION_BREAKDOWNS: &str = "🚨 New breakdowns (MA60)";
const SECTION_GAINS: &str = "📈 Breakout tracking";
const SECTION_LOSSES: &str = "📉 Breakdown tracking";
const EMPTY_PLACEHOLDER: &str = "none";

// --- Report lines ---

pub fn breakout_line(symbol: &str, price: f64) -> String {
    format!("{} (breakout price: {:.6})", symbol, price)
}

pub fn breakdown_line(symbol: &str, price: f64) -> String {
    format!("{} (breakdown price: {:.6})", symbol, price)
}

pub fn gain_line(symbol: &str, event_price: f64, pct: f64) -> String {
    format!("{} (gain since {:.6}: {:.2}%)", symbol, event_price, pct)
}

pub fn loss_line(symbol: &str, event_price: f64, pct: f64) -> String {
    format!("{} (loss since {:.6}: {:.2}%)", symbol, event_price, pct)
}

/// Renders the four sections as markdown. Sections are always present, in
/// fixed order; an empty one gets a single placeholder item.
pub fn format_report(date: NaiveDate, daily: &DailyReport) -> String {
    let mut out = String::new();
    let _ = write!(out, "### MA60 Daily Report ({})\n\n", date.format("%Y-%m-%d"));

    let sections = [
        (SECTION_BREAKOUTS, &daily.breakouts),
        (SECTION_BREAKDOWNS, &daily.breakdowns),
        (SECTION_GAINS, &daily.tracked_gains),
        (SECTION_LOSSES, &daily.tracked_losses),
    ];

    for (title, items) in sections {
        let _ = write!(out, "**{}**\n\n", title);
        if items.is_empty() {
            let _ = writeln!(out, "- {}", EMPTY_PLACEHOLDER);
        }
        for item in items {
            let _ = writeln!(out, "- {}", item);
        }
        out.push('\n');
    }

    out
}

// --- Delivery ---

/// Delivers a rendered report.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, title: &str, markdown: &str) -> Result<()>;
}

#[derive(Serialize, Debug)]
struct DingTalkMessage<'a> {
    msgtype: &'static str,
    markdown: DingTalkMarkdown<'a>,
}

#[derive(Serialize, Debug)]
struct DingTalkMarkdown<'a> {
    title: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct DingTalkResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// DingTalk custom robot webhook.
pub struct DingTalkNotifier {
    client: Client,
    webhook_url: String,
}

impl DingTalkNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

fn check_response(status: reqwest::StatusCode, body: &str) -> Result<()> {
    if !status.is_success() {
        return Err(MonitorError::delivery(format!("HTTP {}: {}", status, body)));
    }
    // Some proxies answer with an empty body; only a parsed non-zero errcode is a rejection
    match serde_json::from_str::<DingTalkResponse>(body) {
        Ok(resp) if resp.errcode != 0 => Err(MonitorError::delivery(format!(
            "errcode {}: {}",
            resp.errcode, resp.errmsg
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl Notifier for DingTalkNotifier {
    async fn send(&self, title: &str, markdown: &str) -> Result<()> {
        let message = DingTalkMessage {
            msgtype: "markdown",
            markdown: DingTalkMarkdown {
                title,
                text: markdown,
            },
        };

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&message)
            .send()
            .await
            .map_err(|e| MonitorError::delivery(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MonitorError::delivery(e.to_string()))?;

        check_response(status, &body)?;
        info!(response = %body, "Report delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn test_empty_report_has_four_placeholder_sections() {
        let text = format_report(date(), &DailyReport::default());
        assert_eq!(
            text,
            "### MA60 Daily Report (2024-03-01)\n\n\
             **🚀 New breakouts (MA60)**\n\n- none\n\n\
             **🚨 New breakdowns (MA60)**\n\n- none\n\n\
             **📈 Breakout tracking**\n\n- none\n\n\
             **📉 Breakdown tracking**\n\n- none\n\n"
        );
    }

    #[test]
    fn test_sections_keep_order_and_items() {
        let daily = DailyReport {
            breakouts: vec![breakout_line("ABCUSDT", 51.0), breakout_line("XYZUSDT", 0.5)],
            breakdowns: vec![],
            tracked_gains: vec![gain_line("ABCUSDT", 51.0, (55.0 - 51.0) / 51.0 * 100.0)],
            tracked_losses: vec![loss_line("DEFUSDT", 100.0, 10.0)],
        };
        let text = format_report(date(), &daily);

        let breakouts = text.find("New breakouts").unwrap();
        let breakdowns = text.find("New breakdowns").unwrap();
        let gains = text.find("Breakout tracking").unwrap();
        let losses = text.find("Breakdown tracking").unwrap();
        assert!(breakouts < breakdowns && breakdowns < gains && gains < losses);

        assert!(text.contains("- ABCUSDT (breakout price: 51.000000)\n- XYZUSDT (breakout price: 0.500000)\n"));
        assert_eq!(text.matches("- none").count(), 1);
        assert!(text.contains("- ABCUSDT (gain since 51.000000: 7.84%)"));
        assert!(text.contains("- DEFUSDT (loss since 100.000000: 10.00%)"));
    }

    #[test]
    fn test_negative_percentages_are_not_clamped() {
        assert_eq!(gain_line("ABCUSDT", 100.0, -2.5), "ABCUSDT (gain since 100.000000: -2.50%)");
    }

    #[test]
    fn test_message_payload() {
        let message = DingTalkMessage {
            msgtype: "markdown",
            markdown: DingTalkMarkdown {
                title: REPORT_TITLE,
                text: "### hi",
            },
        };
        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "msgtype": "markdown",
                "markdown": {"title": "MA60 Monitor", "text": "### hi"}
            })
        );
    }

    #[test]
    fn test_check_response() {
        assert!(check_response(StatusCode::OK, r#"{"errcode":0,"errmsg":"ok"}"#).is_ok());
        assert!(check_response(StatusCode::OK, "").is_ok());
        assert!(matches!(
            check_response(StatusCode::OK, r#"{"errcode":310000,"errmsg":"keywords not in content"}"#),
            Err(MonitorError::Delivery(_))
        ));
        assert!(check_response(StatusCode::BAD_GATEWAY, "bad gateway").is_err());
    }
}
