/// Turns user input such as `btc`, ` eth/usdt ` or `SOL` into `BASE/QUOTE` form.
///
/// Returns `None` for empty input or input containing anything but ASCII
/// alphanumerics and a single slash.
pub fn normalize_user_symbol(input: &str, quote: &str) -> Option<String> {
    let upper = input.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }

    let (base, quote) = match upper.split_once('/') {
        Some((base, q)) => (base.to_string(), q.to_string()),
        None => (upper.clone(), quote.to_uppercase()),
    };

    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid(&base) || !valid(&quote) {
        return None;
    }

    Some(format!("{}/{}", base, quote))
}

/// Exchange wire format drops the slash: `BTC/USDT` -> `BTCUSDT`.
pub fn to_exchange_symbol(symbol: &str) -> String {
    symbol.replace('/', "")
}

/// Base asset of a normalized symbol, used as the short label in chat keyboards.
pub fn base_asset(symbol: &str) -> &str {
    symbol.split('/').next().unwrap_or(symbol)
}
