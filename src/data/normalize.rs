use super::ingestion::RawBar;
use crate::error::PipelineError;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One calendar day of price data with readable field names.
///
/// Every price field is optional: provider bars may omit fields, and days
/// synthesized by the backfill engine start out with no values at all.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub num_transactions: Option<f64>,
    pub volume_weighted_price: Option<f64>,
}

impl PriceRecord {
    /// Names of the numeric fields, in the order used by [`PriceRecord::fields`].
    pub const FIELD_NAMES: [&'static str; 7] = [
        "open",
        "high",
        "low",
        "close",
        "volume",
        "num_transactions",
        "volume_weighted_price",
    ];

    /// A placeholder for a day the provider had no bar for.
    pub fn missing(date: NaiveDate) -> Self {
        Self {
            date,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            num_transactions: None,
            volume_weighted_price: None,
        }
    }

    pub fn fields(&self) -> [Option<f64>; 7] {
        [
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.num_transactions,
            self.volume_weighted_price,
        ]
    }

    pub fn fields_mut(&mut self) -> [&mut Option<f64>; 7] {
        [
            &mut self.open,
            &mut self.high,
            &mut self.low,
            &mut self.close,
            &mut self.volume,
            &mut self.num_transactions,
            &mut self.volume_weighted_price,
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.fields().iter().all(Option::is_some)
    }
}

/// A sequence of daily price records.
///
/// Fresh from the normalizer the series may have date gaps and arbitrary
/// order; after calendar backfill it is sorted, gap-free and complete.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PriceSeries {
    records: Vec<PriceRecord>,
}

impl PriceSeries {
    pub fn new(records: Vec<PriceRecord>) -> Self {
        Self { records }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PriceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keeps only records with `start <= date < end`.
    pub fn restrict_to_range(&self, start: NaiveDate, end: NaiveDate) -> Self {
        let records: Vec<PriceRecord> = self
            .records
            .iter()
            .filter(|r| r.date >= start && r.date < end)
            .cloned()
            .collect();

        let dropped = self.records.len() - records.len();
        if dropped > 0 {
            debug!(dropped, %start, %end, "discarded bars outside the requested range");
        }

        Self { records }
    }
}

/// Converts provider bars into a [`PriceSeries`].
///
/// The millisecond timestamp is truncated to its UTC calendar date. An empty
/// input is not an error: it produces an empty series and a warning.
///
/// # Errors
/// Returns [`PipelineError::InvalidTimestamp`] if a timestamp is outside the
/// representable date range.
pub fn normalize_bars(bars: &[RawBar]) -> Result<PriceSeries, PipelineError> {
    if bars.is_empty() {
        warn!("No data available: provider returned zero bars");
        return Ok(PriceSeries::empty());
    }

    let records = bars
        .iter()
        .map(|bar| {
            let date = DateTime::from_timestamp_millis(bar.t)
                .ok_or(PipelineError::InvalidTimestamp(bar.t))?
                .date_naive();

            Ok(PriceRecord {
                date,
                open: bar.o,
                high: bar.h,
                low: bar.l,
                close: bar.c,
                volume: bar.v,
                num_transactions: bar.n,
                volume_weighted_price: bar.vw,
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    debug!(count = records.len(), "normalized provider bars");
    Ok(PriceSeries::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(t: i64, close: f64) -> RawBar {
        RawBar {
            t,
            o: Some(close - 1.0),
            h: Some(close + 2.0),
            l: Some(close - 2.0),
            c: Some(close),
            v: Some(1_000.0),
            n: Some(42.0),
            vw: Some(close + 0.5),
        }
    }

    #[test]
    fn test_timestamp_truncated_to_date() {
        // 2023-01-09T05:00:00Z and 2023-01-10T23:59:59.999Z
        let bars = vec![bar(1673240400000, 130.15), bar(1673395199999, 130.73)];
        let series = normalize_bars(&bars).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.records()[0].date, date(2023, 1, 9));
        assert_eq!(series.records()[1].date, date(2023, 1, 10));
        assert_eq!(series.records()[0].close, Some(130.15));
        assert_eq!(series.records()[0].open, Some(130.15 - 1.0));
        assert_eq!(series.records()[0].volume_weighted_price, Some(130.15 + 0.5));
        assert_eq!(series.records()[0].num_transactions, Some(42.0));
    }

    #[test]
    fn test_empty_input_yields_empty_series() {
        let series = normalize_bars(&[]).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn test_invalid_timestamp() {
        let result = normalize_bars(&[bar(i64::MAX, 1.0)]);
        assert!(matches!(result, Err(PipelineError::InvalidTimestamp(_))));
    }

    #[test]
    fn test_restrict_to_range_is_half_open() {
        let series = PriceSeries::new(
            (1..=5)
                .map(|d| PriceRecord::missing(date(2024, 3, d)))
                .collect(),
        );
        let restricted = series.restrict_to_range(date(2024, 3, 2), date(2024, 3, 4));

        let dates: Vec<NaiveDate> = restricted.records().iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(2024, 3, 2), date(2024, 3, 3)]);
    }

    #[test]
    fn test_missing_record_is_incomplete() {
        let mut record = PriceRecord::missing(date(2024, 3, 1));
        assert!(!record.is_complete());
        for field in record.fields_mut() {
            *field = Some(1.0);
        }
        assert!(record.is_complete());
    }
}
