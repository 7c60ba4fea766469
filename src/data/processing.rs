use super::backfill::{fill_column, MissingPolicy};
use super::normalize::{PriceRecord, PriceSeries};
use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// A gap-free day of price data extended with derived indicators.
///
/// All values are known: raw fields were imputed by the backfill engine and
/// derived fields by the second fill pass of [`FeatureProcessor`].
///
/// # Fields
/// * `sma_5`, `sma_20`: trailing simple moving averages of `close`
/// * `ema_5`, `ema_20`: exponential moving averages of `close`, seeded with
///   the first close
/// * `vol_5`: trailing 5-day sample standard deviation of `close`
/// * `daily_return`: `close / previous close - 1`
/// * `price_diff`: `close - previous close`
/// * `volume_sma_5`: trailing 5-day simple moving average of `volume`
/// * `volume_change`: `volume / previous volume - 1`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub num_transactions: f64,
    pub volume_weighted_price: f64,
    pub sma_5: f64,
    pub sma_20: f64,
    pub ema_5: f64,
    pub ema_20: f64,
    pub vol_5: f64,
    pub daily_return: f64,
    pub price_diff: f64,
    pub volume_sma_5: f64,
    pub volume_change: f64,
}

impl FeatureRow {
    pub const NUM_COLUMNS: usize = 16;

    /// Position of `close` within [`FeatureRow::values`].
    pub const CLOSE_COLUMN: usize = 3;

    pub const COLUMN_NAMES: [&'static str; Self::NUM_COLUMNS] = [
        "open",
        "high",
        "low",
        "close",
        "volume",
        "num_transactions",
        "volume_weighted_price",
        "sma_5",
        "sma_20",
        "ema_5",
        "ema_20",
        "vol_5",
        "daily_return",
        "price_diff",
        "volume_sma_5",
        "volume_change",
    ];

    /// Numeric columns in [`FeatureRow::COLUMN_NAMES`] order.
    pub fn values(&self) -> [f64; Self::NUM_COLUMNS] {
        [
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.num_transactions,
            self.volume_weighted_price,
            self.sma_5,
            self.sma_20,
            self.ema_5,
            self.ema_20,
            self.vol_5,
            self.daily_return,
            self.price_diff,
            self.volume_sma_5,
            self.volume_change,
        ]
    }

    fn from_values(date: NaiveDate, v: [f64; Self::NUM_COLUMNS]) -> Self {
        Self {
            date,
            open: v[0],
            high: v[1],
            low: v[2],
            close: v[3],
            volume: v[4],
            num_transactions: v[5],
            volume_weighted_price: v[6],
            sma_5: v[7],
            sma_20: v[8],
            ema_5: v[9],
            ema_20: v[10],
            vol_5: v[11],
            daily_return: v[12],
            price_diff: v[13],
            volume_sma_5: v[14],
            volume_change: v[15],
        }
    }
}

/// Feature rows ordered ascending by date, one per calendar day.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}

/// Indicators derived for a single day, before imputation.
///
/// `None` marks a value that is undefined for that day, either because the
/// look-back window is not full yet or because there is no previous day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFeatures {
    pub sma_5: Option<f64>,
    pub sma_20: Option<f64>,
    pub ema_5: Option<f64>,
    pub ema_20: Option<f64>,
    pub vol_5: Option<f64>,
    pub daily_return: Option<f64>,
    pub price_diff: Option<f64>,
    pub volume_sma_5: Option<f64>,
    pub volume_change: Option<f64>,
}

impl DerivedFeatures {
    /// Number of derived columns, which follow the raw price fields in a
    /// [`FeatureRow`].
    pub const NUM_COLUMNS: usize = FeatureRow::NUM_COLUMNS - PriceRecord::FIELD_NAMES.len();

    fn values(&self) -> [Option<f64>; Self::NUM_COLUMNS] {
        [
            self.sma_5,
            self.sma_20,
            self.ema_5,
            self.ema_20,
            self.vol_5,
            self.daily_return,
            self.price_diff,
            self.volume_sma_5,
            self.volume_change,
        ]
    }
}

/// Computes technical indicators over a gap-free daily series.
///
/// `FeatureProcessor` keeps a rolling window of closes and volumes, so each
/// day only sees itself and the days before it.
///
/// # Key Features
/// * Simple and exponential moving averages of the close
/// * 5-day close volatility
/// * Day-over-day return, price difference and volume change
/// * Imputation of the values the look-back windows leave undefined
pub struct FeatureProcessor {
    price_history: VecDeque<f64>,
    volume_history: VecDeque<f64>,
    max_history_size: usize,
    ema_5: Option<f64>,
    ema_20: Option<f64>,
}

impl Default for FeatureProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureProcessor {
    /// Creates a processor whose history covers the longest look-back window.
    pub fn new() -> Self {
        let max_history_size = 20;
        Self {
            price_history: VecDeque::with_capacity(max_history_size + 1),
            volume_history: VecDeque::with_capacity(max_history_size + 1),
            max_history_size,
            ema_5: None,
            ema_20: None,
        }
    }

    pub fn reset(&mut self) {
        self.price_history.clear();
        self.volume_history.clear();
        self.ema_5 = None;
        self.ema_20 = None;
    }

    /// Processes the next day and computes its indicators.
    ///
    /// Days must be fed in ascending date order.
    ///
    /// # Errors
    /// Returns [`PipelineError::MissingValue`] if `close` or `volume` is missing,
    /// which means the series was not backfilled first.
    pub fn process_record(&mut self, record: &PriceRecord) -> Result<DerivedFeatures, PipelineError> {
        let close = record.close.ok_or(PipelineError::MissingValue {
            column: "close",
            date: record.date,
        })?;
        let volume = record.volume.ok_or(PipelineError::MissingValue {
            column: "volume",
            date: record.date,
        })?;

        let previous_close = self.price_history.back().copied();
        let previous_volume = self.volume_history.back().copied();

        push_bounded(&mut self.price_history, close, self.max_history_size);
        push_bounded(&mut self.volume_history, volume, self.max_history_size);

        let ema_5 = update_ema(self.ema_5, close, 5);
        let ema_20 = update_ema(self.ema_20, close, 20);
        self.ema_5 = Some(ema_5);
        self.ema_20 = Some(ema_20);

        Ok(DerivedFeatures {
            sma_5: calculate_moving_average(&self.price_history, 5),
            sma_20: calculate_moving_average(&self.price_history, 20),
            ema_5: Some(ema_5),
            ema_20: Some(ema_20),
            vol_5: calculate_volatility(&self.price_history, 5),
            daily_return: previous_close.and_then(|prev| percent_change(prev, close)),
            price_diff: previous_close.map(|prev| close - prev),
            volume_sma_5: calculate_moving_average(&self.volume_history, 5),
            volume_change: previous_volume.and_then(|prev| percent_change(prev, volume)),
        })
    }

    /// Builds the feature table for a whole gap-free series.
    ///
    /// The processor state is reset first, so the same processor can be reused
    /// across series. After the indicators are computed every column is run
    /// through the fill step again; derived columns that are undefined for the
    /// whole series (e.g. `sma_20` on fewer than 20 days) become zeros.
    pub fn process_series(&mut self, series: &PriceSeries) -> Result<FeatureTable, PipelineError> {
        self.reset();

        let mut records = series.records().to_vec();
        records.sort_by_key(|r| r.date);

        let mut derived = Vec::with_capacity(records.len());
        for record in &records {
            derived.push(self.process_record(record)?);
        }

        let mut columns: Vec<Vec<Option<f64>>> = Vec::with_capacity(FeatureRow::NUM_COLUMNS);
        for idx in 0..PriceRecord::FIELD_NAMES.len() {
            columns.push(records.iter().map(|r| r.fields()[idx]).collect());
        }
        for idx in 0..DerivedFeatures::NUM_COLUMNS {
            columns.push(derived.iter().map(|d| d.values()[idx]).collect());
        }

        for (idx, column) in columns.iter_mut().enumerate() {
            let policy = if idx < PriceRecord::FIELD_NAMES.len() {
                MissingPolicy::Fail
            } else {
                MissingPolicy::Zero
            };
            fill_column(FeatureRow::COLUMN_NAMES[idx], column, policy)?;
        }

        let rows = records
            .iter()
            .enumerate()
            .map(|(row_idx, record)| {
                let mut values = [0.0; FeatureRow::NUM_COLUMNS];
                for (col_idx, value) in values.iter_mut().enumerate() {
                    *value = columns[col_idx][row_idx].unwrap_or_default();
                }
                FeatureRow::from_values(record.date, values)
            })
            .collect::<Vec<_>>();

        debug!(rows = rows.len(), "computed feature table");
        Ok(FeatureTable::new(rows))
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64, max_size: usize) {
    history.push_back(value);
    if history.len() > max_size {
        history.pop_front();
    }
}

/// Simple moving average of the last `period` values, `None` until the
/// window is full.
fn calculate_moving_average(history: &VecDeque<f64>, period: usize) -> Option<f64> {
    if history.len() < period {
        return None;
    }

    let sum: f64 = history.iter().rev().take(period).sum();

    Some(sum / period as f64)
}

/// Sample standard deviation of the last `period` values.
fn calculate_volatility(history: &VecDeque<f64>, period: usize) -> Option<f64> {
    if period < 2 || history.len() < period {
        return None;
    }

    let values: Vec<f64> = history.iter().rev().take(period).copied().collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    let variance = values
        .iter()
        .map(|&value| {
            let diff = value - mean;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;

    Some(variance.sqrt())
}

/// One step of the EMA recurrence with `alpha = 2 / (span + 1)`, seeded with
/// the first value and without bias adjustment.
fn update_ema(previous: Option<f64>, value: f64, span: usize) -> f64 {
    let alpha = 2.0 / (span as f64 + 1.0);
    match previous {
        Some(prev) => alpha * value + (1.0 - alpha) * prev,
        None => value,
    }
}

/// Relative change, undefined when it would not be finite.
fn percent_change(previous: f64, current: f64) -> Option<f64> {
    let change = current / previous - 1.0;
    change.is_finite().then_some(change)
}
