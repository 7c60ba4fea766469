//! Daily stock price pipeline: download bars, backfill the calendar, derive
//! technical features and slice them into next-day close training windows.

pub mod config;
pub mod data;
pub mod error;
pub mod forecast;
pub mod pipeline;

pub use error::PipelineError;
