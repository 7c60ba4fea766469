pub mod evaluation;

pub use evaluation::{evaluate, EvaluationReport};

use crate::data::{
    fill_records, Examples, FeatureProcessor, FeatureRow, MissingPolicy, PriceRecord, PriceSeries,
    WindowAssembler,
};
use crate::error::PipelineError;
use chrono::NaiveDate;
use ndarray::ArrayView1;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A model mapping one flattened window to a next-day close.
pub trait Regressor {
    fn name(&self) -> &str;

    fn predict(&self, window: ArrayView1<f32>) -> f32;
}

/// Baseline that predicts tomorrow's close as the last close in the window.
#[derive(Debug, Clone, Copy)]
pub struct LastCloseRegressor {
    close_offset: usize,
}

impl LastCloseRegressor {
    pub fn new(window_len: usize) -> Self {
        Self {
            close_offset: window_len.saturating_sub(1) * FeatureRow::NUM_COLUMNS
                + FeatureRow::CLOSE_COLUMN,
        }
    }
}

impl Regressor for LastCloseRegressor {
    fn name(&self) -> &str {
        "last_close"
    }

    fn predict(&self, window: ArrayView1<f32>) -> f32 {
        window.get(self.close_offset).copied().unwrap_or_default()
    }
}

/// A model output for a day whose actual close is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPrediction {
    pub date: NaiveDate,
    pub predicted: f32,
    pub actual: f32,
}

/// A model output for a day after the end of the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FuturePrediction {
    pub date: NaiveDate,
    pub predicted_close: f32,
}

/// Runs `model` over every example and pairs each output with its target.
pub fn predict_examples<M: Regressor + ?Sized>(
    model: &M,
    examples: &Examples,
) -> Vec<HistoricalPrediction> {
    examples
        .features
        .outer_iter()
        .zip(examples.targets.iter())
        .zip(examples.target_dates.iter())
        .map(|((window, &actual), &date)| HistoricalPrediction {
            date,
            predicted: model.predict(window),
            actual,
        })
        .collect()
}

/// Forecasts `horizon` days past the end of a gap-free series, one day at a
/// time.
///
/// Each day is predicted from the window of rows strictly before it. The
/// prediction becomes that day's close, the remaining price fields are
/// carried forward by the fill step, and the features are recomputed before
/// the next day is predicted.
///
/// Returns fewer than `horizon` predictions only when the series is too short
/// for a single window.
pub fn forecast_future<M: Regressor + ?Sized>(
    model: &M,
    series: &PriceSeries,
    assembler: &WindowAssembler,
    horizon: usize,
) -> Result<Vec<FuturePrediction>, PipelineError> {
    let mut processor = FeatureProcessor::new();
    let mut records = series.records().to_vec();
    records.sort_by_key(|r| r.date);

    let mut table = processor.process_series(&PriceSeries::new(records.clone()))?;
    let mut predictions = Vec::with_capacity(horizon);

    for _ in 0..horizon {
        let Some(window) = assembler.latest_window(&table) else {
            warn!(
                rows = table.len(),
                window_len = assembler.window_len(),
                "Not enough history to forecast"
            );
            break;
        };
        let Some(date) = table.last_date().and_then(|d| d.succ_opt()) else {
            break;
        };

        let predicted_close = model.predict(window.view());
        debug!(%date, predicted_close, model = model.name(), "forecast step");

        let mut record = PriceRecord::missing(date);
        record.close = Some(f64::from(predicted_close));
        records.push(record);
        fill_records(&mut records, MissingPolicy::Fail)?;

        table = processor.process_series(&PriceSeries::new(records.clone()))?;
        predictions.push(FuturePrediction {
            date,
            predicted_close,
        });
    }

    Ok(predictions)
}

/// Splits examples into `(train, test)` after a seeded shuffle.
///
/// The test set holds `ceil(len * test_size)` examples.
///
/// # Errors
/// Returns [`PipelineError::Config`] unless `0 < test_size < 1`.
pub fn train_test_split(
    examples: &Examples,
    test_size: f64,
    seed: u64,
) -> Result<(Examples, Examples), PipelineError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::Config(format!(
            "test_size must be between 0 and 1, got {test_size}"
        )));
    }

    let mut indices: Vec<usize> = (0..examples.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = (examples.len() as f64 * test_size).ceil() as usize;
    let (test_idx, train_idx) = indices.split_at(n_test.min(indices.len()));

    Ok((examples.select(train_idx), examples.select(test_idx)))
}
