use super::HistoricalPrediction;
use serde::{Deserialize, Serialize};

/// Error statistics of a model over historical predictions.
///
/// Key metrics include:
/// - Mean absolute error
/// - Root mean squared error
/// - Mean absolute percentage error (days with a zero close are skipped)
/// - Largest absolute error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub count: usize,
    pub mae: f64,
    pub rmse: f64,
    pub mape: Option<f64>,
    pub max_abs_error: f64,
}

/// Summarizes prediction errors. An empty slice yields an all-zero report.
pub fn evaluate(predictions: &[HistoricalPrediction]) -> EvaluationReport {
    if predictions.is_empty() {
        return EvaluationReport::default();
    }

    let count = predictions.len();
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut max_abs_error: f64 = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_count = 0usize;

    for p in predictions {
        let actual = f64::from(p.actual);
        let error = f64::from(p.predicted) - actual;

        abs_sum += error.abs();
        sq_sum += error * error;
        max_abs_error = max_abs_error.max(error.abs());

        if actual != 0.0 {
            pct_sum += (error / actual).abs();
            pct_count += 1;
        }
    }

    EvaluationReport {
        count,
        mae: abs_sum / count as f64,
        rmse: (sq_sum / count as f64).sqrt(),
        mape: (pct_count > 0).then(|| pct_sum / pct_count as f64),
        max_abs_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn prediction(predicted: f32, actual: f32) -> HistoricalPrediction {
        HistoricalPrediction {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            predicted,
            actual,
        }
    }

    #[test]
    fn test_error_metrics() {
        let report = evaluate(&[prediction(11.0, 10.0), prediction(17.0, 20.0), prediction(0.5, 0.0)]);

        assert_eq!(report.count, 3);
        assert!((report.mae - 4.5 / 3.0).abs() < 1e-9);
        assert!((report.rmse - (10.25f64 / 3.0).sqrt()).abs() < 1e-9);
        assert_eq!(report.max_abs_error, 3.0);
        // 10% and 15%; the zero close is skipped.
        assert!((report.mape.unwrap() - 0.125).abs() < 1e-9);
    }

    #[test]
    fn test_empty_predictions() {
        let report = evaluate(&[]);
        assert_eq!(report, EvaluationReport::default());
        assert_eq!(report.mape, None);
    }
}
