//! Synthesizing coarse klines from finer ones.
//!
//! Buckets merge as first-open / last-close / max-high / min-low / sum-volume,
//! with the bucket spanning the first bar's open time to the last bar's close
//! time. A trailing partial bucket is always emitted, so buckets are not
//! guaranteed to have uniform length.

use std::collections::HashMap;

use time::{Duration, Weekday};

use crate::{Kline, Timeframe, UtcDateTime, ValidationError};

/// Aggregate `bars` into `target`.
///
/// Calendar timeframes (`1w`, `1M`) expect daily input; every other timeframe
/// uses fixed-width buckets aligned to the Unix epoch.
pub fn aggregate(bars: &[Kline], target: Timeframe) -> Result<Vec<Kline>, ValidationError> {
    match target {
        Timeframe::OneWeek => aggregate_weekly(bars),
        Timeframe::OneMonth => aggregate_monthly(bars),
        other => aggregate_fixed(bars, other.duration()),
    }
}

/// Weekly buckets from daily bars.
///
/// A Monday bar opens a new bucket when it is more than six days after the
/// Monday that anchors the current bucket (the Monday on or before the
/// bucket's first bar). Duplicate or out-of-order Mondays never split a week.
pub fn aggregate_weekly(daily: &[Kline]) -> Result<Vec<Kline>, ValidationError> {
    let sorted = sorted_by_open(daily);
    let mut buckets: Vec<Vec<Kline>> = Vec::new();
    let mut anchor: Option<UtcDateTime> = None;

    for bar in sorted {
        let opens_bucket = match anchor {
            None => true,
            Some(anchor) => {
                let open = bar.open_time.into_inner();
                open.weekday() == Weekday::Monday && bar.open_time - anchor > Duration::days(6)
            }
        };

        if opens_bucket {
            anchor = Some(week_anchor(bar.open_time));
            buckets.push(Vec::new());
        }
        if let Some(bucket) = buckets.last_mut() {
            bucket.push(bar);
        }
    }

    buckets.iter().map(|bucket| merge_bucket(bucket)).collect()
}

/// Monthly buckets from daily bars: a bar on day 1 of a different
/// `(year, month)` than the current bucket opens a new bucket.
pub fn aggregate_monthly(daily: &[Kline]) -> Result<Vec<Kline>, ValidationError> {
    let sorted = sorted_by_open(daily);
    let mut buckets: Vec<Vec<Kline>> = Vec::new();
    let mut bucket_month: Option<(i32, time::Month)> = None;

    for bar in sorted {
        let open = bar.open_time.into_inner();
        let month = (open.year(), open.month());
        let opens_bucket = match bucket_month {
            None => true,
            Some(current) => open.day() == 1 && month != current,
        };

        if opens_bucket {
            bucket_month = Some(month);
            buckets.push(Vec::new());
        }
        if let Some(bucket) = buckets.last_mut() {
            bucket.push(bar);
        }
    }

    buckets.iter().map(|bucket| merge_bucket(bucket)).collect()
}

/// Fixed-width buckets keyed by `floor(open_time / width)` in UTC seconds.
pub fn aggregate_fixed(bars: &[Kline], width: Duration) -> Result<Vec<Kline>, ValidationError> {
    let width_secs = width.whole_seconds().max(1);
    let sorted = sorted_by_open(bars);
    let mut buckets: Vec<Vec<Kline>> = Vec::new();
    let mut current_key: Option<i64> = None;

    for bar in sorted {
        let key = bar.open_time.unix_seconds().div_euclid(width_secs);
        if current_key != Some(key) {
            current_key = Some(key);
            buckets.push(Vec::new());
        }
        if let Some(bucket) = buckets.last_mut() {
            bucket.push(bar);
        }
    }

    buckets.iter().map(|bucket| merge_bucket(bucket)).collect()
}

/// Price of `base_leg` quoted in `quote_leg`, joined on open time.
///
/// Both legs must share a quote currency (e.g. `ETHUSDT` / `BTCUSDT` yields
/// `ETHBTC`). Bars present in only one leg are dropped. Volume is the base
/// leg's volume.
pub fn derive_cross_klines(
    base_leg: &[Kline],
    quote_leg: &[Kline],
    symbol: &str,
) -> Result<Vec<Kline>, ValidationError> {
    let quotes: HashMap<UtcDateTime, &Kline> = quote_leg
        .iter()
        .map(|kline| (kline.open_time, kline))
        .collect();

    let mut derived = Vec::with_capacity(base_leg.len().min(quote_leg.len()));
    for base in sorted_by_open(base_leg) {
        let Some(quote) = quotes.get(&base.open_time) else {
            continue;
        };

        let open = base.open / quote.open;
        let close = base.close / quote.close;
        let high = (base.high / quote.high).max(open).max(close);
        let low = (base.low / quote.low).min(open).min(close);

        derived.push(Kline::new(
            symbol,
            base.open_time,
            base.close_time.max(quote.close_time),
            open,
            high,
            low,
            close,
            base.volume,
        )?);
    }

    Ok(derived)
}

fn merge_bucket(bucket: &[Kline]) -> Result<Kline, ValidationError> {
    let (Some(first), Some(last)) = (bucket.first(), bucket.last()) else {
        return Err(ValidationError::InvalidKlineTimes);
    };

    let high = bucket.iter().map(|kline| kline.high).fold(f64::MIN, f64::max);
    let low = bucket.iter().map(|kline| kline.low).fold(f64::MAX, f64::min);
    let volume = bucket.iter().map(|kline| kline.volume).sum();

    Kline::new(
        first.symbol.clone(),
        first.open_time,
        last.close_time,
        first.open,
        high,
        low,
        last.close,
        volume,
    )
}

fn sorted_by_open(bars: &[Kline]) -> Vec<Kline> {
    let mut sorted = bars.to_vec();
    sorted.sort_by_key(|kline| kline.open_time);
    sorted
}

/// Midnight UTC of the Monday on or before `ts`.
fn week_anchor(ts: UtcDateTime) -> UtcDateTime {
    let inner = ts.into_inner();
    let days_from_monday = i64::from(inner.weekday().number_days_from_monday());
    let midnight = inner.replace_time(time::Time::MIDNIGHT);
    UtcDateTime::from_offset_datetime(midnight - Duration::days(days_from_monday)).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily(date: &str, open: f64, close: f64, volume: f64) -> Kline {
        let open_time = UtcDateTime::parse(&format!("{date}T00:00:00Z")).expect("timestamp");
        let close_time = open_time.saturating_add(Duration::days(1) - Duration::milliseconds(1));
        let high = open.max(close) + 1.0;
        let low = open.min(close) - 1.0;
        Kline::new("BTCUSDT", open_time, close_time, open, high, low, close, volume)
            .expect("valid kline")
    }

    #[test]
    fn leading_partial_week_is_its_own_bucket() {
        // 2024-01-03 is a Wednesday; 2024-01-08 is the next Monday.
        let bars = vec![
            daily("2024-01-03", 10.0, 11.0, 1.0),
            daily("2024-01-04", 11.0, 12.0, 1.0),
            daily("2024-01-08", 12.0, 13.0, 1.0),
            daily("2024-01-09", 13.0, 14.0, 1.0),
        ];

        let weeks = aggregate_weekly(&bars).expect("aggregates");

        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].volume, 2.0);
        assert_eq!(weeks[1].open, 12.0);
        assert_eq!(weeks[1].close, 14.0);
    }

    #[test]
    fn duplicate_monday_does_not_split_week() {
        let bars = vec![
            daily("2024-01-08", 10.0, 11.0, 1.0),
            daily("2024-01-08", 10.0, 11.0, 1.0),
            daily("2024-01-09", 11.0, 12.0, 1.0),
        ];

        let weeks = aggregate_weekly(&bars).expect("aggregates");
        assert_eq!(weeks.len(), 1);
    }

    #[test]
    fn month_boundary_across_years() {
        let bars = vec![
            daily("2023-12-30", 10.0, 11.0, 1.0),
            daily("2023-12-31", 11.0, 12.0, 1.0),
            daily("2024-01-01", 12.0, 13.0, 1.0),
        ];

        let months = aggregate_monthly(&bars).expect("aggregates");

        assert_eq!(months.len(), 2);
        assert_eq!(months[0].close, 12.0);
        assert_eq!(months[1].open, 12.0);
    }

    #[test]
    fn fixed_buckets_align_to_epoch() {
        let bars = vec![
            daily("2024-01-01", 10.0, 11.0, 1.0),
            daily("2024-01-02", 11.0, 12.0, 2.0),
            daily("2024-01-03", 12.0, 13.0, 3.0),
            daily("2024-01-04", 13.0, 14.0, 4.0),
        ];

        let buckets = aggregate_fixed(&bars, Duration::days(3)).expect("aggregates");

        // 2024-01-01 is day 19723 since the epoch; 19723 % 3 == 1 so the
        // first bucket ends after 2024-01-02.
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].volume, 3.0);
        assert_eq!(buckets[1].volume, 7.0);
    }

    #[test]
    fn cross_pair_divides_legs_and_drops_unmatched_bars() {
        let eth = vec![
            daily("2024-01-01", 2000.0, 2200.0, 5.0),
            daily("2024-01-02", 2200.0, 2100.0, 6.0),
        ];
        let btc = vec![daily("2024-01-01", 40000.0, 44000.0, 1.0)];

        let cross = derive_cross_klines(&eth, &btc, "ETHBTC").expect("derives");

        assert_eq!(cross.len(), 1);
        assert_eq!(cross[0].symbol, "ETHBTC");
        assert!((cross[0].open - 0.05).abs() < 1e-12);
        assert!((cross[0].close - 0.05).abs() < 1e-12);
        assert!(cross[0].high >= cross[0].open.max(cross[0].close));
        assert!(cross[0].low <= cross[0].open.min(cross[0].close));
        assert_eq!(cross[0].volume, 5.0);
    }
}
