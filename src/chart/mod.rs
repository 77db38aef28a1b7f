//! Chart specification types for the query engine
//!
//! This module contains the types describing a chart recommendation and its
//! query, plus the two front-door operations applied to them before any SQL is
//! generated.
//!
//! # Architecture
//!
//! - `types` - FieldSpec, ChartQuery, ChartFilter, ChartRecommendation and their enums
//! - `filter` - the textual filter language (`column|operator|values[|logic]`)
//! - `resolve` - override application and schema validation

pub mod filter;
pub mod resolve;
mod types;

pub use filter::{parse_filters, ParsedFilters};
pub use resolve::{ChartOverrides, QueryResolver};
pub use types::*;
