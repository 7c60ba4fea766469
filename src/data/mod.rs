pub mod backfill;
pub mod ingestion;
pub mod normalize;
pub mod processing;
pub mod storage;
pub mod windowing;

pub use backfill::{backfill_calendar, fill_records, MissingPolicy};
pub use ingestion::{MarketDataSource, PolygonClient, RawBar};
pub use normalize::{normalize_bars, PriceRecord, PriceSeries};
pub use processing::{FeatureProcessor, FeatureRow, FeatureTable};
pub use windowing::{Examples, WindowAssembler};
