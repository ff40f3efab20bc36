//! Bar source: CSV ingestion and the validated dataset.

pub mod dataset;
pub mod loader;

pub use dataset::{BarRef, Dataset};
pub use loader::{load_dataset, parse_timestamp};
