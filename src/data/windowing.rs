//! Sliding windows of feature rows for next-day close prediction.

use super::processing::{FeatureRow, FeatureTable};
use crate::error::PipelineError;
use chrono::NaiveDate;
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, info};

/// Supervised-learning examples built from a feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct Examples {
    /// Flattened windows `[num_examples, window_len * num_columns]`
    pub features: Array2<f32>,
    /// Next-day close for each window `[num_examples]`
    pub targets: Array1<f32>,
    /// Date of the row each target was taken from
    pub target_dates: Vec<NaiveDate>,
}

impl Examples {
    pub fn empty(width: usize) -> Self {
        Self {
            features: Array2::zeros((0, width)),
            targets: Array1::zeros(0),
            target_dates: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Keeps the examples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            target_dates: indices.iter().map(|&i| self.target_dates[i]).collect(),
        }
    }
}

/// `(first, last)` index pairs of every window.
///
/// `first..last` are the feature rows and `last` is the target row. The first
/// pair is `(0, n_previous_days + 1)` and both ends advance by `step_size`
/// while `last <= len - 1`.
pub fn cutoff_indices(len: usize, n_previous_days: usize, step_size: usize) -> Vec<(usize, usize)> {
    let mut indices = Vec::new();
    let Some(stop) = len.checked_sub(1) else {
        return indices;
    };
    if step_size == 0 {
        return indices;
    }

    let mut first = 0;
    let mut last = n_previous_days + 1;
    while last <= stop {
        indices.push((first, last));
        first += step_size;
        last += step_size;
    }

    indices
}

/// Flattens rows day-major: all columns of the first row, then the second, ...
pub fn flatten_window<R: AsRef<[f64]>>(rows: &[R]) -> Vec<f32> {
    rows.iter()
        .flat_map(|row| row.as_ref().iter().map(|&v| v as f32))
        .collect()
}

/// Slices a feature table into fixed-length, fixed-stride examples.
///
/// A window spans `n_previous_days + 1` rows and its target is the close of
/// the row right after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAssembler {
    n_previous_days: usize,
    step_size: usize,
}

impl WindowAssembler {
    /// # Errors
    /// Returns [`PipelineError::InvalidWindow`] if either parameter is zero.
    pub fn new(n_previous_days: usize, step_size: usize) -> Result<Self, PipelineError> {
        if n_previous_days == 0 || step_size == 0 {
            return Err(PipelineError::InvalidWindow {
                n_previous_days,
                step_size,
            });
        }
        Ok(Self {
            n_previous_days,
            step_size,
        })
    }

    /// Number of rows in one window.
    pub fn window_len(&self) -> usize {
        self.n_previous_days + 1
    }

    /// Length of one flattened feature vector.
    pub fn feature_width(&self) -> usize {
        self.window_len() * FeatureRow::NUM_COLUMNS
    }

    /// Number of examples a table of `len` rows yields.
    pub fn example_count(&self, len: usize) -> usize {
        match len.checked_sub(1 + self.window_len()) {
            Some(span) => span / self.step_size + 1,
            None => 0,
        }
    }

    /// Builds all examples of `table`.
    ///
    /// A table with `n_previous_days + 1` rows or fewer produces an empty set.
    pub fn assemble(&self, table: &FeatureTable) -> Result<Examples, PipelineError> {
        let rows = table.rows();
        let indices = cutoff_indices(rows.len(), self.n_previous_days, self.step_size);
        debug_assert_eq!(indices.len(), self.example_count(rows.len()));

        if indices.is_empty() {
            info!(
                rows = rows.len(),
                window_len = self.window_len(),
                "Feature table too short for a single example"
            );
            return Ok(Examples::empty(self.feature_width()));
        }

        let mut data = Vec::with_capacity(indices.len() * self.feature_width());
        let mut targets = Vec::with_capacity(indices.len());
        let mut target_dates = Vec::with_capacity(indices.len());

        for &(first, last) in &indices {
            let window: Vec<[f64; FeatureRow::NUM_COLUMNS]> =
                rows[first..last].iter().map(FeatureRow::values).collect();
            data.extend(flatten_window(&window));

            targets.push(rows[last].close as f32);
            target_dates.push(rows[last].date);
        }

        let features = Array2::from_shape_vec((indices.len(), self.feature_width()), data)?;
        debug!(examples = indices.len(), width = self.feature_width(), "assembled examples");

        Ok(Examples {
            features,
            targets: Array1::from_vec(targets),
            target_dates,
        })
    }

    /// The most recent full window of `table`, flattened, i.e. the input for
    /// predicting the day after the table's last row.
    pub fn latest_window(&self, table: &FeatureTable) -> Option<Array1<f32>> {
        let rows = table.rows();
        let first = rows.len().checked_sub(self.window_len())?;
        let window: Vec<[f64; FeatureRow::NUM_COLUMNS]> =
            rows[first..].iter().map(FeatureRow::values).collect();
        Some(Array1::from_vec(flatten_window(&window)))
    }
}
