use super::normalize::{PriceRecord, PriceSeries};
use super::processing::{FeatureRow, FeatureTable};
use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the normalized provider data for a date range.
pub fn raw_prices_path(dir: &Path, start: NaiveDate, end: NaiveDate) -> PathBuf {
    dir.join(format!("prices_{}-{}.csv", start, end))
}

/// File name of the gap-free feature table for a symbol and date range.
pub fn feature_table_path(dir: &Path, symbol: &str, start: NaiveDate, end: NaiveDate) -> PathBuf {
    dir.join(format!("features_{}_{}-{}.csv", symbol, start, end))
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    info!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(())
}

/// Writes a price series with one CSV row per record. Missing values are
/// written as empty cells.
pub fn write_price_series(path: &Path, series: &PriceSeries) -> Result<(), PipelineError> {
    write_rows(path, series.records())
}

pub fn read_price_series(path: &Path) -> Result<PriceSeries, PipelineError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let records = rdr
        .deserialize::<PriceRecord>()
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PriceSeries::new(records))
}

/// Persists a feature table so it can be reused without recomputation.
pub fn write_feature_table(path: &Path, table: &FeatureTable) -> Result<(), PipelineError> {
    write_rows(path, table.rows())
}

pub fn read_feature_table(path: &Path) -> Result<FeatureTable, PipelineError> {
    let mut rdr = csv::Reader::from_path(path)?;
    let mut rows = rdr
        .deserialize::<FeatureRow>()
        .collect::<Result<Vec<_>, _>>()?;
    rows.sort_by_key(|r| r.date);
    Ok(FeatureTable::new(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::processing::FeatureProcessor;
    use chrono::Duration;

    fn series_with_gap() -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut records: Vec<PriceRecord> = (0..6)
            .map(|i| PriceRecord {
                date: start + Duration::days(i),
                open: Some(10.0 + i as f64),
                high: Some(11.0 + i as f64),
                low: Some(9.0 + i as f64),
                close: Some(10.5 + i as f64),
                volume: Some(500.0),
                num_transactions: Some(7.0),
                volume_weighted_price: Some(10.25 + i as f64),
            })
            .collect();
        records[2].num_transactions = None;
        PriceSeries::new(records)
    }

    #[test]
    fn test_price_series_keeps_missing_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = raw_prices_path(
            dir.path(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 7).unwrap(),
        );
        let series = series_with_gap();

        write_price_series(&path, &series).unwrap();
        let loaded = read_price_series(&path).unwrap();

        assert_eq!(loaded, series);
        assert_eq!(loaded.records()[2].num_transactions, None);
    }

    #[test]
    fn test_feature_table_reload() {
        let dir = tempfile::tempdir().unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 6).unwrap();
        let path = feature_table_path(&dir.path().join("nested"), "AAPL", start, end);

        let mut records = series_with_gap().into_records();
        records[2].num_transactions = Some(7.0);
        let table = FeatureProcessor::new()
            .process_series(&PriceSeries::new(records))
            .unwrap();

        write_feature_table(&path, &table).unwrap();
        let loaded = read_feature_table(&path).unwrap();

        assert!(path.ends_with("features_AAPL_2024-02-01-2024-02-06.csv"));
        assert_eq!(loaded.len(), table.len());
        assert_eq!(loaded.rows()[0].date, start);
        for (a, b) in loaded.rows().iter().zip(table.rows()) {
            for (x, y) in a.values().iter().zip(b.values().iter()) {
                assert!((x - y).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_feature_table(&dir.path().join("absent.csv"));
        assert!(matches!(result, Err(PipelineError::Csv(_))));
    }
}
