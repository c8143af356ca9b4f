//! Exchange symbol format translation.
//!
//! Canonical pairs are compact upper-case strings (`BTCUSDT`). Exchanges that
//! expect a dashed product id (`BTC-USDT`) go through [`to_dashed_pair`].

use crate::ValidationError;

/// Quote currencies recognised when splitting a compact pair, longest first.
const KNOWN_QUOTES: [&str; 2] = ["USDT", "USD"];

/// Fallback quote length when no known quote currency matches.
const FALLBACK_QUOTE_LEN: usize = 3;

/// Normalize user input into a canonical compact pair.
pub fn normalize_pair(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySymbol);
    }

    let normalized = trimmed.to_ascii_uppercase();
    for (index, ch) in normalized.chars().enumerate() {
        let valid = ch.is_ascii_alphanumeric() || ch == '-' || ch == '/';
        if !valid {
            return Err(ValidationError::SymbolInvalidChar { ch, index });
        }
    }

    Ok(to_compact_pair(&normalized))
}

/// Split a pair into `(base, quote)`.
///
/// Dashed or slashed input splits on the separator. Compact input strips a
/// known quote suffix, otherwise the last three characters are the quote.
pub fn split_pair(symbol: &str) -> (String, String) {
    let upper = symbol.trim().to_ascii_uppercase();

    if let Some((base, quote)) = upper.split_once(|ch| ch == '-' || ch == '/') {
        return (base.to_owned(), quote.to_owned());
    }

    for quote in KNOWN_QUOTES {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return (base.to_owned(), quote.to_owned());
            }
        }
    }

    if upper.len() > FALLBACK_QUOTE_LEN && upper.is_ascii() {
        let split = upper.len() - FALLBACK_QUOTE_LEN;
        return (upper[..split].to_owned(), upper[split..].to_owned());
    }

    (upper, String::new())
}

/// `BTCUSDT` -> `BTC-USDT`.
pub fn to_dashed_pair(symbol: &str) -> String {
    let (base, quote) = split_pair(symbol);
    if quote.is_empty() {
        return base;
    }
    format!("{base}-{quote}")
}

/// `BTC-USDT` / `BTC/USDT` -> `BTCUSDT`.
pub fn to_compact_pair(symbol: &str) -> String {
    symbol
        .trim()
        .chars()
        .filter(|ch| *ch != '-' && *ch != '/')
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}
