//! Dataset column schema, as produced by the profiling subsystem.

use serde::{Deserialize, Serialize};

/// Type inferred for a CSV column during profiling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferredType {
    Number,
    Date,
    Boolean,
    Category,
    String,
}

impl InferredType {
    /// Types that support min-max range binning
    pub fn is_rangeable(&self) -> bool {
        matches!(self, InferredType::Number | InferredType::Date)
    }
}

/// Profile of a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: InferredType,
    #[serde(default)]
    pub null_rate: f64,
    pub distinct_count: u64,
    #[serde(default)]
    pub sample_size: u64,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>, inferred_type: InferredType, distinct_count: u64) -> Self {
        Self {
            name: name.into(),
            inferred_type,
            null_rate: 0.0,
            distinct_count,
            sample_size: 0,
        }
    }

    pub fn with_sample_size(mut self, sample_size: u64) -> Self {
        self.sample_size = sample_size;
        self
    }
}

/// Column schema of one uploaded dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSchema {
    pub dataset_id: String,
    pub columns: Vec<ColumnProfile>,
}

impl DatasetSchema {
    pub fn new(dataset_id: impl Into<String>, columns: Vec<ColumnProfile>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            columns,
        }
    }

    /// Look up a column by name, case-insensitively.
    ///
    /// An exact match wins over a case-folded one, so CSVs carrying both
    /// `Region` and `region` still resolve each name to itself.
    pub fn find(&self, name: &str) -> Option<&ColumnProfile> {
        let name = name.trim();
        self.columns.iter().find(|c| c.name == name).or_else(|| {
            let folded = name.to_lowercase();
            self.columns.iter().find(|c| c.name.to_lowercase() == folded)
        })
    }

    /// Rows sampled during profiling (largest sample across columns)
    pub fn sample_size(&self) -> u64 {
        self.columns.iter().map(|c| c.sample_size).max().unwrap_or(0)
    }
}
