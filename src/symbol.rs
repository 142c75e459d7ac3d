use std::fmt::{Display, Formatter, Result as FmtResult};
use url::form_urlencoded::byte_serialize;

pub const CHART_URL_BASE: &str = "https://www.tradingview.com/chart/";

/// Broker suffixes, checked in this order; at most one is removed.
const BROKER_SUFFIXES: [&str; 3] = ["M", "R", "PRO"];

const CRYPTO_TICKERS: [&str; 6] = ["BTC", "ETH", "DOGE", "SOL", "BNB", "XRP"];
const OANDA_COMMODITIES: [&str; 4] = ["XAUUSD", "XAGUSD", "WTI", "BRENT"];
const TVC_INDICES: [&str; 6] = ["SPX", "NDX", "DJI", "DAX", "UK100", "USOIL"];

/// Data feed prefix used in the chart's `symbol` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedPrefix {
    Index,
    Oanda,
    Tvc,
    Fxcm,
}

impl Display for FeedPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            FeedPrefix::Index => "INDEX",
            FeedPrefix::Oanda => "OANDA",
            FeedPrefix::Tvc => "TVC",
            FeedPrefix::Fxcm => "FXCM",
        };
        write!(f, "{s}")
    }
}

/// Uppercase, keep only `A-Z`, then drop one trailing broker suffix.
pub fn clean_symbol(raw: &str) -> String {
    let letters: String = raw
        .to_uppercase()
        .chars()
        .filter(char::is_ascii_uppercase)
        .collect();
    BROKER_SUFFIXES
        .iter()
        .find_map(|suffix| letters.strip_suffix(suffix))
        .map(str::to_string)
        .unwrap_or(letters)
}

/// First matching rule wins: crypto, commodities, six-letter forex, indices,
/// then the FXCM fallback.
pub fn classify_symbol(symbol: &str) -> (FeedPrefix, String) {
    let symbol = symbol.to_uppercase();
    if CRYPTO_TICKERS.iter().any(|t| symbol.contains(t)) {
        return (FeedPrefix::Index, format!("{symbol}USD"));
    }
    if OANDA_COMMODITIES.contains(&symbol.as_str()) {
        return (FeedPrefix::Oanda, symbol);
    }
    if symbol.len() == 6 && symbol.chars().all(|c| c.is_ascii_uppercase()) {
        return (FeedPrefix::Oanda, symbol);
    }
    if TVC_INDICES.contains(&symbol.as_str()) {
        return (FeedPrefix::Tvc, symbol);
    }
    (FeedPrefix::Fxcm, symbol)
}

pub fn build_chart_url(prefix: FeedPrefix, symbol: &str) -> String {
    let combined = format!("{prefix}:{symbol}");
    let encoded: String = byte_serialize(combined.as_bytes()).collect();
    format!("{CHART_URL_BASE}?symbol={encoded}")
}

/// Raw broker symbol straight to the chart URL.
pub fn chart_url_for(raw: &str) -> String {
    let (prefix, symbol) = classify_symbol(&clean_symbol(raw));
    build_chart_url(prefix, &symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_symbol_strips_one_suffix() {
        assert_eq!(clean_symbol("EURUSDM"), "EURUSD");
        assert_eq!(clean_symbol("eurusd.m"), "EURUSD");
        assert_eq!(clean_symbol("GBPJPYr"), "GBPJPY");
        assert_eq!(clean_symbol("USDJPY.pro"), "USDJPY");
        assert_eq!(clean_symbol("XAUUSD#"), "XAUUSD");
        assert_eq!(clean_symbol("UK100"), "UK");
        assert_eq!(clean_symbol(""), "");
        assert_eq!(clean_symbol("123"), "");
    }

    #[test]
    fn test_clean_symbol_is_idempotent_on_broker_symbols() {
        for raw in ["EURUSDm", "XAUUSD.r", "BTCUSD-pro", "SPX500", "GER40", "usdcad"] {
            let once = clean_symbol(raw);
            assert_eq!(clean_symbol(&once), once, "{raw}");
        }
    }

    #[test]
    fn test_classify_rules() {
        assert_eq!(classify_symbol("EURUSD"), (FeedPrefix::Oanda, "EURUSD".into()));
        assert_eq!(classify_symbol("BTC"), (FeedPrefix::Index, "BTCUSD".into()));
        assert_eq!(classify_symbol("xauusd"), (FeedPrefix::Oanda, "XAUUSD".into()));
        assert_eq!(classify_symbol("WTI"), (FeedPrefix::Oanda, "WTI".into()));
        assert_eq!(classify_symbol("SPX"), (FeedPrefix::Tvc, "SPX".into()));
        assert_eq!(classify_symbol("USOIL"), (FeedPrefix::Tvc, "USOIL".into()));
        assert_eq!(classify_symbol("GER"), (FeedPrefix::Fxcm, "GER".into()));
    }

    #[test]
    fn test_classify_crypto_beats_six_letter_forex() {
        assert_eq!(
            classify_symbol("BTCEUR"),
            (FeedPrefix::Index, "BTCEURUSD".into())
        );
        assert_eq!(
            classify_symbol("SOLUSD"),
            (FeedPrefix::Index, "SOLUSDUSD".into())
        );
    }

    #[test]
    fn test_classify_is_pure() {
        for s in ["EURUSD", "ETH", "NDX", "FOO"] {
            assert_eq!(classify_symbol(s), classify_symbol(s));
        }
    }

    #[test]
    fn test_build_chart_url_encodes_colon() {
        let url = build_chart_url(FeedPrefix::Oanda, "EURUSD");
        assert_eq!(url, "https://www.tradingview.com/chart/?symbol=OANDA%3AEURUSD");
        assert!(chart_url_for("EURUSDm").contains("symbol=OANDA%3AEURUSD"));
        assert!(chart_url_for("DJI").contains("symbol=TVC%3ADJI"));
    }
}
