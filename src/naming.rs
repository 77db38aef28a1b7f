//! Centralized naming conventions for engine-generated identifiers.
//!
//! All synthetic view and column names use a double-underscore prefix/suffix
//! pattern to avoid collision with column names coming from uploaded CSVs.
//!
//! # Categories
//!
//! - **Dataset view**: per-connection view over the CSV (`__insight_dataset__`)
//! - **Row number**: stable insertion-order column used as a sort tiebreaker (`__insight_row__`)
//! - **Chart columns**: aliases for compiled chart projections (`__insight_x__`, ...)

use const_format::concatcp;

// ============================================================================
// Base Building Blocks
// ============================================================================

/// Base prefix for all engine SQL-level identifiers
const INSIGHT_PREFIX: &str = "__insight_";

/// Suffix for all engine identifiers (double underscore)
const INSIGHT_SUFFIX: &str = "__";

// ============================================================================
// Derived Constants
// ============================================================================

/// View registered on every engine connection, reading the dataset CSV
pub const DATASET_VIEW: &str = concatcp!(INSIGHT_PREFIX, "dataset", INSIGHT_SUFFIX);

/// Synthetic row number appended to every ORDER BY for total ordering
pub const ROW_NUMBER_COLUMN: &str = concatcp!(INSIGHT_PREFIX, "row", INSIGHT_SUFFIX);

/// Chart X projection alias
pub const X_COLUMN: &str = concatcp!(INSIGHT_PREFIX, "x", INSIGHT_SUFFIX);

/// Chart series (group-by) projection alias
pub const SERIES_COLUMN: &str = concatcp!(INSIGHT_PREFIX, "series", INSIGHT_SUFFIX);

/// Chart Y projection alias
pub const Y_COLUMN: &str = concatcp!(INSIGHT_PREFIX, "y", INSIGHT_SUFFIX);

/// Raw numeric sample alias (percentiles, range binning)
pub const VALUE_COLUMN: &str = concatcp!(INSIGHT_PREFIX, "value", INSIGHT_SUFFIX);

/// Count alias for statistics queries
pub const COUNT_COLUMN: &str = concatcp!(INSIGHT_PREFIX, "count", INSIGHT_SUFFIX);

/// Bucket index alias for range binning
pub const BUCKET_COLUMN: &str = concatcp!(INSIGHT_PREFIX, "bucket", INSIGHT_SUFFIX);

/// Check whether a column name was generated by the engine
pub fn is_synthetic_column(name: &str) -> bool {
    name.starts_with(INSIGHT_PREFIX) && name.ends_with(INSIGHT_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(DATASET_VIEW, "__insight_dataset__");
        assert_eq!(ROW_NUMBER_COLUMN, "__insight_row__");
        assert_eq!(X_COLUMN, "__insight_x__");
    }

    #[test]
    fn test_is_synthetic_column() {
        assert!(is_synthetic_column(ROW_NUMBER_COLUMN));
        assert!(is_synthetic_column(SERIES_COLUMN));
        assert!(!is_synthetic_column("sales"));
        assert!(!is_synthetic_column("__insight_partial"));
    }
}
