use super::normalize::{PriceRecord, PriceSeries};
use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{debug, warn};

/// What to do with a column that has no known value anywhere in the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingPolicy {
    /// Stop with [`PipelineError::AllValuesMissing`] naming the column.
    Fail,
    /// Replace every value of the column with `0.0`.
    Zero,
}

impl FromStr for MissingPolicy {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "zero" => Ok(Self::Zero),
            other => Err(PipelineError::Config(format!(
                "unknown missing column policy {other:?} (expected `fail` or `zero`)"
            ))),
        }
    }
}

/// Imputes every missing value of one column in place.
///
/// Runs three stages in order: linear interpolation between the nearest known
/// neighbours, forward fill, then backward fill. After that no value is
/// missing unless the column had no known value at all, which is resolved by
/// `policy`. A column without gaps is left untouched.
pub fn fill_column(
    name: &str,
    values: &mut [Option<f64>],
    policy: MissingPolicy,
) -> Result<(), PipelineError> {
    if values.iter().all(Option::is_some) {
        return Ok(());
    }

    interpolate_linear(values);
    forward_fill(values);
    backward_fill(values);

    if values.iter().any(Option::is_none) {
        match policy {
            MissingPolicy::Fail => {
                return Err(PipelineError::AllValuesMissing {
                    column: name.to_string(),
                });
            }
            MissingPolicy::Zero => {
                warn!(column = name, "column has no known values, filling with zeros");
                values.iter_mut().for_each(|v| *v = Some(0.0));
            }
        }
    }

    Ok(())
}

/// Linear interpolation over positions, only between two known values.
fn interpolate_linear(values: &mut [Option<f64>]) {
    let mut previous: Option<(usize, f64)> = None;

    for idx in 0..values.len() {
        let Some(current) = values[idx] else {
            continue;
        };

        if let Some((prev_idx, prev)) = previous {
            let span = (idx - prev_idx) as f64;
            for gap_idx in prev_idx + 1..idx {
                let offset = (gap_idx - prev_idx) as f64;
                values[gap_idx] = Some(prev + (current - prev) * offset / span);
            }
        }
        previous = Some((idx, current));
    }
}

fn forward_fill(values: &mut [Option<f64>]) {
    let mut last = None;
    for value in values.iter_mut() {
        if value.is_some() {
            last = *value;
        } else {
            *value = last;
        }
    }
}

fn backward_fill(values: &mut [Option<f64>]) {
    let mut next = None;
    for value in values.iter_mut().rev() {
        if value.is_some() {
            next = *value;
        } else {
            *value = next;
        }
    }
}

/// Fills every price field of an already sorted record slice.
pub fn fill_records(
    records: &mut [PriceRecord],
    policy: MissingPolicy,
) -> Result<(), PipelineError> {
    for (idx, name) in PriceRecord::FIELD_NAMES.iter().enumerate() {
        let mut column: Vec<Option<f64>> = records.iter().map(|r| r.fields()[idx]).collect();
        fill_column(name, &mut column, policy)?;

        for (record, value) in records.iter_mut().zip(column) {
            *record.fields_mut()[idx] = value;
        }
    }
    Ok(())
}

/// Expands a series to one record per calendar day of `[start, end]` and
/// imputes every missing price field.
///
/// Records outside the range are discarded. When the input holds several
/// records for the same date the first one wins, and provider data always
/// wins over synthesized placeholders. The output is sorted ascending by date.
///
/// An input with no record inside the range yields an empty output rather
/// than a calendar of placeholders with nothing to impute from.
///
/// # Errors
/// Returns [`PipelineError::AllValuesMissing`] when a field has no known value
/// in the whole range and `policy` is [`MissingPolicy::Fail`].
pub fn backfill_calendar(
    series: &PriceSeries,
    start: NaiveDate,
    end: NaiveDate,
    policy: MissingPolicy,
) -> Result<PriceSeries, PipelineError> {
    let in_range: Vec<&PriceRecord> = series
        .records()
        .iter()
        .filter(|r| r.date >= start && r.date <= end)
        .collect();
    if in_range.is_empty() {
        warn!(%start, %end, total = series.len(), "No data to backfill");
        return Ok(PriceSeries::empty());
    }

    let calendar: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
    let existing: HashSet<NaiveDate> = in_range.iter().map(|r| r.date).collect();

    let synthesized: Vec<PriceRecord> = calendar
        .iter()
        .filter(|d| !existing.contains(d))
        .map(|d| PriceRecord::missing(*d))
        .collect();
    debug!(
        missing_days = synthesized.len(),
        total_days = calendar.len(),
        "synthesizing placeholder records"
    );

    // Provider records come first so that deduplication keeps them.
    let mut seen = HashSet::with_capacity(calendar.len());
    let mut records: Vec<PriceRecord> = in_range
        .into_iter()
        .cloned()
        .chain(synthesized)
        .filter(|r| seen.insert(r.date))
        .collect();
    records.sort_by_key(|r| r.date);

    fill_records(&mut records, policy)?;
    Ok(PriceSeries::new(records))
}
