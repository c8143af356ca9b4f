//! Calendar and fixed-width aggregation over daily and intraday bars.

mod support;

use support::{daily, ts};
use tickwatch_core::aggregation::{aggregate, aggregate_monthly, aggregate_weekly, derive_cross_klines};
use tickwatch_core::{Kline, Timeframe};

fn days(symbol: &str, first: u8, last: u8, month: u8) -> Vec<Kline> {
    (first..=last)
        .map(|day| {
            daily(
                symbol,
                &format!("2024-{month:02}-{day:02}T00:00:00Z"),
                100.0 + f64::from(day),
                1000.0,
            )
        })
        .collect()
}

#[test]
fn when_two_full_weeks_are_aggregated_each_week_sums_seven_days() {
    // Given: 2024-01-01 is a Monday; 14 daily bars of volume 1000
    let bars = days("BTCUSDT", 1, 14, 1);

    // When
    let weeks = aggregate_weekly(&bars).expect("aggregates");

    // Then
    assert_eq!(weeks.len(), 2);
    assert!(weeks.iter().all(|week| week.volume == 7000.0));
    assert_eq!(weeks[0].open_time, ts("2024-01-01T00:00:00Z"));
    assert_eq!(weeks[0].open, 101.0);
    assert_eq!(weeks[0].close, 107.0);
    assert_eq!(weeks[0].high, 108.0);
    assert_eq!(weeks[0].low, 100.0);
    assert_eq!(weeks[1].open_time, ts("2024-01-08T00:00:00Z"));
    assert_eq!(weeks[1].close_time, bars[13].close_time);
}

#[test]
fn when_a_month_is_aggregated_it_becomes_one_bar() {
    let may = days("ETHUSDT", 1, 31, 5);

    let months = aggregate_monthly(&may).expect("aggregates");

    assert_eq!(months.len(), 1);
    assert_eq!(months[0].open_time, ts("2024-05-01T00:00:00Z"));
    assert_eq!(months[0].close_time, may[30].close_time);
    assert_eq!(months[0].volume, 31_000.0);
    assert_eq!(months[0].close, 131.0);
}

#[test]
fn when_days_span_a_month_boundary_a_new_bucket_starts_on_the_first() {
    let mut bars = days("ETHUSDT", 28, 30, 4);
    bars.extend(days("ETHUSDT", 1, 2, 5));

    let months = aggregate(&bars, Timeframe::OneMonth).expect("aggregates");

    assert_eq!(months.len(), 2);
    assert_eq!(months[0].volume, 3000.0);
    assert_eq!(months[1].open_time, ts("2024-05-01T00:00:00Z"));
}

#[test]
fn empty_input_yields_empty_output_and_a_single_bar_maps_to_itself() {
    assert!(aggregate(&[], Timeframe::OneWeek).expect("aggregates").is_empty());
    assert!(aggregate(&[], Timeframe::OneMonth).expect("aggregates").is_empty());
    assert!(aggregate(&[], Timeframe::FourHours).expect("aggregates").is_empty());

    let single = days("BTCUSDT", 3, 3, 1);
    for target in [Timeframe::OneWeek, Timeframe::OneMonth, Timeframe::ThreeDays] {
        let out = aggregate(&single, target).expect("aggregates");
        assert_eq!(out, single, "{target}");
    }
}

#[test]
fn unsorted_input_is_aggregated_in_time_order() {
    let mut bars = days("BTCUSDT", 1, 7, 1);
    bars.reverse();

    let weeks = aggregate(&bars, Timeframe::OneWeek).expect("aggregates");

    assert_eq!(weeks.len(), 1);
    assert_eq!(weeks[0].open, 101.0);
    assert_eq!(weeks[0].close, 107.0);
}

#[test]
fn intraday_bars_fold_into_epoch_aligned_fixed_buckets() {
    // 1h bars from 00:00 to 07:00 -> two 4h buckets
    let hours: Vec<Kline> = (0..8)
        .map(|hour| {
            let open = ts(&format!("2024-01-01T{hour:02}:00:00Z"));
            let close = open.saturating_add(time::Duration::hours(1) - time::Duration::milliseconds(1));
            Kline::new("BTCUSDT", open, close, 10.0, 12.0, 9.0, 11.0, 1.5).expect("valid kline")
        })
        .collect();

    let buckets = aggregate(&hours, Timeframe::FourHours).expect("aggregates");

    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[1].open_time, ts("2024-01-01T04:00:00Z"));
    assert_eq!(buckets[0].volume, 6.0);
}

#[test]
fn cross_rates_join_two_legs_on_open_time() {
    let eth = days("ETHUSDT", 1, 3, 1);
    let btc: Vec<Kline> = days("BTCUSDT", 2, 4, 1);

    let cross = derive_cross_klines(&eth, &btc, "ETHBTC").expect("derives");

    assert_eq!(cross.len(), 2);
    assert_eq!(cross[0].symbol, "ETHBTC");
    assert_eq!(cross[0].open_time, ts("2024-01-02T00:00:00Z"));
    assert_eq!(cross[0].close, 1.0);
    assert!(cross.iter().all(|bar| bar.high >= bar.low));
}
