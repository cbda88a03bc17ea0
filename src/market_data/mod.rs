// Market data: immutable per-ticker bar series and CSV ingestion

pub mod csv_loader;
pub mod series;

pub use csv_loader::{load_price_series, load_universe, Universe};
pub use series::{Bar, PriceSeries};
