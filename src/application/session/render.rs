use crate::domain::market::AnnotatedBar;
use crate::domain::market::symbol::base_asset;
use crate::domain::trading::SignalInfo;
use chrono::DateTime;
use rust_decimal::Decimal;

fn price(d: Decimal) -> String {
    d.round_dp(6).normalize().to_string()
}

pub fn render_signal(info: &SignalInfo) -> String {
    format!(
        "Signal for {}:\nSignal: {}\nEntry range: {} - {}\nTake Profit: {}\nStop Loss: {}\nCurrent price: {}",
        info.symbol,
        info.signal,
        price(info.entry_range.0),
        price(info.entry_range.1),
        price(info.take_profit),
        price(info.stop_loss),
        price(info.current_price),
    )
}

/// The tracked list as a menu. Stands in for inline buttons on plain-text transports.
pub fn render_menu(tracked: &[String]) -> String {
    if tracked.is_empty() {
        return "No tokens tracked. Send a token symbol (e.g. BTC) to add one.".to_string();
    }
    let mut lines = vec!["Choose a token:".to_string()];
    lines.extend(
        tracked
            .iter()
            .map(|s| format!("  /signal {}  ({})", base_asset(s), s)),
    );
    lines.push("  /clear".to_string());
    lines.join("\n")
}

/// First `rows` bars as a `timestamp open close` table.
pub fn render_data(symbol: &str, bars: &[AnnotatedBar], rows: usize) -> String {
    let mut out = format!("Data for {}:\n{:<20} {:>14} {:>14}", symbol, "timestamp", "open", "close");
    for b in bars.iter().take(rows) {
        let ts = DateTime::from_timestamp_millis(b.bar.timestamp)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| b.bar.timestamp.to_string());
        out.push_str(&format!("\n{:<20} {:>14.4} {:>14.4}", ts, b.bar.open, b.bar.close));
    }
    out
}
