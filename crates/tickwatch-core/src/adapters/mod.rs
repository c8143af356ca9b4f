mod binance;
mod coinbase;

pub use binance::BinanceClient;
pub use coinbase::CoinbaseClient;

use serde_json::Value;

use crate::data_source::SourceError;
use crate::http_client::HttpResponse;
use crate::ExchangeId;

/// Maps a final (post-retry) response onto the adapter error taxonomy.
fn ensure_success(exchange: ExchangeId, response: HttpResponse) -> Result<HttpResponse, SourceError> {
    if response.is_success() {
        return Ok(response);
    }

    let snippet = response.body_snippet(200);
    if response.is_server_error() {
        Err(SourceError::data_fetch(format!(
            "{exchange} returned status {} after retries: {snippet}",
            response.status
        )))
    } else {
        Err(SourceError::invalid_request(format!(
            "{exchange} returned status {}: {snippet}",
            response.status
        )))
    }
}

/// Exchanges encode prices either as JSON numbers or as decimal strings.
fn number_at(row: &[Value], index: usize) -> Option<f64> {
    match row.get(index)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

fn integer_at(row: &[Value], index: usize) -> Option<i64> {
    match row.get(index)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_numbers_and_numeric_strings() {
        let row: Vec<Value> =
            serde_json::from_str(r#"[1700000000000, "42.5", 7, null, "abc"]"#).expect("json");

        assert_eq!(integer_at(&row, 0), Some(1_700_000_000_000));
        assert_eq!(number_at(&row, 1), Some(42.5));
        assert_eq!(number_at(&row, 2), Some(7.0));
        assert_eq!(number_at(&row, 3), None);
        assert_eq!(number_at(&row, 4), None);
        assert_eq!(number_at(&row, 9), None);
    }

    #[test]
    fn status_classes_map_to_error_kinds() {
        use crate::data_source::SourceErrorKind;

        let server = ensure_success(ExchangeId::Binance, HttpResponse::new(503, "busy"))
            .expect_err("5xx fails");
        assert_eq!(server.kind(), SourceErrorKind::DataFetch);

        let client = ensure_success(ExchangeId::Coinbase, HttpResponse::new(404, "missing"))
            .expect_err("4xx fails");
        assert_eq!(client.kind(), SourceErrorKind::InvalidRequest);
        assert!(client.message().contains("coinbase"));
    }
}
