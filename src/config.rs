use crate::data::MissingPolicy;
use crate::error::PipelineError;
use chrono::{Duration, NaiveDate, Utc};
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration for a single pipeline run.
///
/// Values are read from the process environment (a `.env` file is loaded by
/// `main` beforehand). Every key has a default so a bare run fetches the last
/// two years of `AAPL`.
///
/// # Keys
/// * `SYMBOL`: ticker to download (default `AAPL`)
/// * `START_DATE` / `END_DATE`: `YYYY-MM-DD`, end defaults to today and start to
///   730 days before the end
/// * `N_PREVIOUS_DAYS`: window length parameter (default 12)
/// * `STEP_SIZE`: stride between windows (default 1)
/// * `FORECAST_DAYS`: recursive forecast horizon (default 7)
/// * `DATA_DIR`: where normalized and feature tables are written (default `data`)
/// * `MISSING_COLUMN_POLICY`: `fail` or `zero` (default `fail`)
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub n_previous_days: usize,
    pub step_size: usize,
    pub forecast_days: usize,
    pub data_dir: Option<PathBuf>,
    pub missing_policy: MissingPolicy,
}

impl PipelineConfig {
    /// Builds the configuration from environment variables.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// `from_env` delegates here; tests pass a map-backed closure instead of
    /// mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let symbol = lookup("SYMBOL")
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "AAPL".to_string());

        let end_date = match lookup("END_DATE") {
            Some(raw) => parse_date("END_DATE", &raw)?,
            None => Utc::now().date_naive(),
        };
        let start_date = match lookup("START_DATE") {
            Some(raw) => parse_date("START_DATE", &raw)?,
            None => end_date - Duration::days(2 * 365),
        };

        let missing_policy = match lookup("MISSING_COLUMN_POLICY") {
            Some(raw) => raw.parse()?,
            None => MissingPolicy::Fail,
        };

        // An explicitly empty DATA_DIR disables persistence.
        let data_dir = match lookup("DATA_DIR") {
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(PathBuf::from(raw)),
            None => Some(PathBuf::from("data")),
        };

        let config = Self {
            symbol,
            start_date,
            end_date,
            n_previous_days: parse_or(&lookup, "N_PREVIOUS_DAYS", 12)?,
            step_size: parse_or(&lookup, "STEP_SIZE", 1)?,
            forecast_days: parse_or(&lookup, "FORECAST_DAYS", 7)?,
            data_dir,
            missing_policy,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the cross-field constraints the pipeline relies on.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.start_date >= self.end_date {
            return Err(PipelineError::Config(format!(
                "START_DATE ({}) must be before END_DATE ({})",
                self.start_date, self.end_date
            )));
        }
        if self.n_previous_days == 0 || self.step_size == 0 {
            return Err(PipelineError::InvalidWindow {
                n_previous_days: self.n_previous_days,
                step_size: self.step_size,
            });
        }
        Ok(())
    }
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| PipelineError::Config(format!("{key}={raw:?} is not a YYYY-MM-DD date: {e}")))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PipelineError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<PipelineConfig, PipelineError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.symbol, "AAPL");
        assert_eq!(config.n_previous_days, 12);
        assert_eq!(config.step_size, 1);
        assert_eq!(config.forecast_days, 7);
        assert_eq!(config.missing_policy, MissingPolicy::Fail);
        assert_eq!(config.data_dir, Some(PathBuf::from("data")));
        assert_eq!(config.end_date - config.start_date, Duration::days(730));
    }

    #[test]
    fn test_explicit_values() {
        let config = config_from(&[
            ("SYMBOL", " msft "),
            ("START_DATE", "2022-08-02"),
            ("END_DATE", "2024-08-02"),
            ("N_PREVIOUS_DAYS", "5"),
            ("STEP_SIZE", "2"),
            ("DATA_DIR", ""),
            ("MISSING_COLUMN_POLICY", "zero"),
        ])
        .unwrap();

        assert_eq!(config.symbol, "MSFT");
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2022, 8, 2).unwrap());
        assert_eq!(config.end_date, NaiveDate::from_ymd_opt(2024, 8, 2).unwrap());
        assert_eq!(config.n_previous_days, 5);
        assert_eq!(config.step_size, 2);
        assert_eq!(config.data_dir, None);
        assert_eq!(config.missing_policy, MissingPolicy::Zero);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let result = config_from(&[("START_DATE", "2024-08-02"), ("END_DATE", "2024-08-01")]);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_step() {
        let result = config_from(&[("STEP_SIZE", "0")]);
        assert!(matches!(result, Err(PipelineError::InvalidWindow { .. })));
    }

    #[test]
    fn test_rejects_malformed_values() {
        assert!(config_from(&[("START_DATE", "08/02/2024")]).is_err());
        assert!(config_from(&[("N_PREVIOUS_DAYS", "twelve")]).is_err());
        assert!(config_from(&[("MISSING_COLUMN_POLICY", "guess")]).is_err());
    }
}
