use crate::config::PipelineConfig;
use crate::data::storage::{
    feature_table_path, raw_prices_path, write_feature_table, write_price_series,
};
use crate::data::{
    backfill_calendar, normalize_bars, Examples, FeatureProcessor, FeatureTable, MarketDataSource,
    PriceSeries, WindowAssembler,
};
use anyhow::{Context, Result};
use tracing::{info, warn};

/// Everything one pipeline run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Gap-free, fully imputed daily series
    pub series: PriceSeries,
    pub table: FeatureTable,
    pub examples: Examples,
}

/// Runs download, normalization, backfill, feature synthesis and windowing
/// for one symbol and date range.
pub struct FeaturePipeline<S> {
    source: S,
    config: PipelineConfig,
    assembler: WindowAssembler,
}

impl<S: MarketDataSource> FeaturePipeline<S> {
    pub fn new(source: S, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let assembler = WindowAssembler::new(config.n_previous_days, config.step_size)?;
        Ok(Self {
            source,
            config,
            assembler,
        })
    }

    pub fn assembler(&self) -> &WindowAssembler {
        &self.assembler
    }

    /// Executes the pipeline.
    ///
    /// When the provider has no data for the range, every output is empty and
    /// nothing is persisted.
    ///
    /// # Errors
    /// Returns an error if the fetch fails, a timestamp is invalid, a price
    /// field has no value anywhere in the range (under the `fail` policy), or
    /// a table cannot be written.
    pub async fn run(&self) -> Result<PipelineOutput> {
        let config = &self.config;

        let bars = self
            .source
            .fetch_daily_bars(&config.symbol, config.start_date, config.end_date)
            .await
            .with_context(|| format!("Failed to fetch daily bars for {}", config.symbol))?;

        let normalized =
            normalize_bars(&bars)?.restrict_to_range(config.start_date, config.end_date);
        if normalized.is_empty() {
            warn!(
                symbol = %config.symbol,
                start = %config.start_date,
                end = %config.end_date,
                "No data available, producing empty outputs"
            );
            return Ok(PipelineOutput {
                series: PriceSeries::empty(),
                table: FeatureTable::default(),
                examples: Examples::empty(self.assembler.feature_width()),
            });
        }

        if let Some(dir) = &config.data_dir {
            let path = raw_prices_path(dir, config.start_date, config.end_date);
            write_price_series(&path, &normalized)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let series = backfill_calendar(
            &normalized,
            config.start_date,
            config.end_date,
            config.missing_policy,
        )?;
        info!(
            provider_days = normalized.len(),
            calendar_days = series.len(),
            "backfilled calendar"
        );

        let table = FeatureProcessor::new().process_series(&series)?;

        if let Some(dir) = &config.data_dir {
            let path = feature_table_path(dir, &config.symbol, config.start_date, config.end_date);
            write_feature_table(&path, &table)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        let examples = self.assembler.assemble(&table)?;
        info!(
            examples = examples.len(),
            width = self.assembler.feature_width(),
            "Number of sequences/examples"
        );

        Ok(PipelineOutput {
            series,
            table,
            examples,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{MissingPolicy, RawBar};
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, NaiveTime};

    struct StaticSource(Vec<RawBar>);

    #[async_trait]
    impl MarketDataSource for StaticSource {
        async fn fetch_daily_bars(
            &self,
            _symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<RawBar>> {
            Ok(self.0.clone())
        }
    }

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()
    }

    fn config(days: i64, data_dir: Option<std::path::PathBuf>) -> PipelineConfig {
        PipelineConfig {
            symbol: "TEST".to_string(),
            start_date: start(),
            end_date: start() + Duration::days(days),
            n_previous_days: 3,
            step_size: 1,
            forecast_days: 2,
            data_dir,
            missing_policy: MissingPolicy::Fail,
        }
    }

    fn bars(closes: &[(i64, f64)]) -> Vec<RawBar> {
        closes
            .iter()
            .map(|&(offset, close)| {
                let day = start() + Duration::days(offset);
                let t = day
                    .and_time(NaiveTime::from_hms_opt(4, 0, 0).unwrap())
                    .and_utc()
                    .timestamp_millis();
                RawBar {
                    t,
                    o: Some(close),
                    h: Some(close + 1.0),
                    l: Some(close - 1.0),
                    c: Some(close),
                    v: Some(10_000.0),
                    n: Some(100.0),
                    vw: Some(close),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_produces_gap_free_table_and_examples() {
        // Ten real days; the inclusive end day is imputed, giving 11 rows.
        let closes: Vec<(i64, f64)> = (0..10).map(|i| (i, 100.0 + i as f64)).collect();
        let pipeline = FeaturePipeline::new(StaticSource(bars(&closes)), config(10, None)).unwrap();

        let output = pipeline.run().await.unwrap();

        assert_eq!(output.series.len(), 11);
        assert_eq!(output.table.len(), 11);
        assert_eq!(output.table.rows()[10].close, 109.0);
        // stop = 10, (10 - 4) / 1 + 1 = 7
        assert_eq!(output.examples.len(), 7);
        for i in 0..output.examples.len() {
            assert_eq!(output.examples.targets[i], output.table.rows()[i + 4].close as f32);
        }
    }

    #[tokio::test]
    async fn test_run_fills_gaps_and_ignores_out_of_range_bars() {
        let pipeline = FeaturePipeline::new(
            StaticSource(bars(&[(-3, 1.0), (0, 10.0), (4, 14.0), (6, 16.0), (9, 99.0)])),
            config(6, None),
        )
        .unwrap();

        let output = pipeline.run().await.unwrap();
        let closes: Vec<f64> = output.table.rows().iter().map(|r| r.close).collect();
        // The bar on the exclusive end day is dropped, so the tail is carried
        // forward from the 5th.
        assert_eq!(closes, vec![10.0, 11.0, 12.0, 13.0, 14.0, 14.0, 14.0]);
    }

    #[tokio::test]
    async fn test_run_with_no_data_yields_empty_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline =
            FeaturePipeline::new(StaticSource(Vec::new()), config(30, Some(dir.path().into())))
                .unwrap();

        let output = pipeline.run().await.unwrap();
        assert!(output.series.is_empty());
        assert!(output.table.is_empty());
        assert!(output.examples.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_run_persists_tables() {
        let dir = tempfile::tempdir().unwrap();
        let closes: Vec<(i64, f64)> = (0..8).map(|i| (i, 50.0 + i as f64)).collect();
        let config = config(8, Some(dir.path().into()));
        let pipeline = FeaturePipeline::new(StaticSource(bars(&closes)), config.clone()).unwrap();

        let output = pipeline.run().await.unwrap();

        let raw = raw_prices_path(dir.path(), config.start_date, config.end_date);
        let features = feature_table_path(dir.path(), "TEST", config.start_date, config.end_date);
        assert!(raw.exists());
        let reloaded = crate::data::storage::read_feature_table(&features).unwrap();
        assert_eq!(reloaded.len(), output.table.len());
    }
}
