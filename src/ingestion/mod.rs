//! Data ingestion module - functional pipeline from open-data sources to a
//! per-ZIP regression table

pub mod aggregate;
pub mod error;
pub mod fetch;
pub mod geocode;
pub mod parse;
pub mod types;
pub mod utils;
pub mod write;

pub use error::{FetchError, ParseError};
pub use types::*;
