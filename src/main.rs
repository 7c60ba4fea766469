use dotenv::dotenv;
use price_forecast::config::PipelineConfig;
use price_forecast::data::PolygonClient;
use price_forecast::forecast::{
    evaluate, forecast_future, predict_examples, train_test_split, EvaluationReport,
    FuturePrediction, LastCloseRegressor, Regressor,
};
use price_forecast::pipeline::FeaturePipeline;
use tracing_subscriber::EnvFilter;

/// Prints error statistics of a model over historical examples.
///
/// # Arguments
/// * `report`: Metrics computed by `evaluate`
/// * `label`: Name of the model and the example subset
fn print_evaluation(report: &EvaluationReport, label: &str) {
    println!("\n{} Results:", label);
    println!("Examples: {}", report.count);
    println!("MAE: ${:.4}", report.mae);
    println!("RMSE: ${:.4}", report.rmse);
    match report.mape {
        Some(mape) => println!("MAPE: {:.2}%", mape * 100.0),
        None => println!("MAPE: n/a"),
    }
    println!("Largest Error: ${:.4}", report.max_abs_error);
}

fn print_forecast(symbol: &str, predictions: &[FuturePrediction]) {
    println!("\n{} Forecast:", symbol);
    for p in predictions {
        println!("{}: ${:.4}", p.date, p.predicted_close);
    }
}

/// Main entry point of the price forecasting pipeline.
///
/// # Workflow Steps
/// - Load environment variables from .env file
/// - Download daily bars for the configured symbol and date range
/// - Backfill the calendar, compute features and build training windows
/// - Evaluate the baseline model on a held-out split of the windows
/// - Forecast the configured number of days past the end of the data
///
/// # Returns
/// Returns `Ok(())` if all operations complete successfully,
/// otherwise returns an error
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env()?;
    let client = PolygonClient::from_env()?;

    let pipeline = FeaturePipeline::new(client, config.clone())?;
    let output = pipeline.run().await?;

    if output.examples.is_empty() {
        println!(
            "No training examples for {} between {} and {}",
            config.symbol, config.start_date, config.end_date
        );
        return Ok(());
    }

    let assembler = pipeline.assembler();
    let model = LastCloseRegressor::new(assembler.window_len());

    let all = predict_examples(&model, &output.examples);
    print_evaluation(&evaluate(&all), &format!("{} (all examples)", model.name()));

    if output.examples.len() >= 2 {
        let (_, test) = train_test_split(&output.examples, 0.2, 42)?;
        let held_out = predict_examples(&model, &test);
        print_evaluation(&evaluate(&held_out), &format!("{} (test split)", model.name()));
    }

    let future = forecast_future(&model, &output.series, assembler, config.forecast_days)?;
    print_forecast(&config.symbol, &future);

    Ok(())
}
