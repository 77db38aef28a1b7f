//! Dataset lookup
//!
//! Uploads, profiling and recommendation scoring live elsewhere. The engine
//! only needs, per dataset id, the CSV path, its schema and its
//! recommendations, through [`DatasetCatalog`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::chart::ChartRecommendation;
use crate::schema::DatasetSchema;
use crate::{InsightError, Result};

/// Source of dataset files and metadata
pub trait DatasetCatalog: Send + Sync {
    fn schema(&self, dataset_id: &str) -> Result<DatasetSchema>;

    fn recommendations(&self, dataset_id: &str) -> Result<Vec<ChartRecommendation>>;

    /// Path of the dataset CSV
    fn dataset_path(&self, dataset_id: &str) -> Result<PathBuf>;

    fn recommendation(&self, dataset_id: &str, recommendation_id: &str) -> Result<ChartRecommendation> {
        self.recommendations(dataset_id)?
            .into_iter()
            .find(|r| r.id == recommendation_id)
            .ok_or_else(|| {
                InsightError::NotFound(format!(
                    "recommendation '{}' in dataset '{}'",
                    recommendation_id, dataset_id
                ))
            })
    }
}

static DATASET_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid dataset id pattern"));

/// Reject ids that could escape the catalog root
pub fn validate_dataset_id(dataset_id: &str) -> Result<()> {
    if DATASET_ID.is_match(dataset_id) {
        Ok(())
    } else {
        Err(InsightError::invalid(format!(
            "invalid dataset id '{}': only letters, digits, '_' and '-' are allowed",
            dataset_id
        )))
    }
}

/// Catalog over a directory tree:
///
/// ```text
/// <root>/<dataset_id>/data.csv
/// <root>/<dataset_id>/schema.json
/// <root>/<dataset_id>/recommendations.json
/// ```
#[derive(Debug, Clone)]
pub struct FsCatalog {
    root: PathBuf,
}

impl FsCatalog {
    pub const DATA_FILE: &'static str = "data.csv";
    pub const SCHEMA_FILE: &'static str = "schema.json";
    pub const RECOMMENDATIONS_FILE: &'static str = "recommendations.json";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dataset_dir(&self, dataset_id: &str) -> Result<PathBuf> {
        validate_dataset_id(dataset_id)?;
        let dir = self.root.join(dataset_id);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(InsightError::NotFound(format!("dataset '{}'", dataset_id)))
        }
    }

    fn read_json<T: DeserializeOwned>(&self, dataset_id: &str, file: &str) -> Result<T> {
        let path = self.dataset_dir(dataset_id)?.join(file);
        let text = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                InsightError::NotFound(format!("{} for dataset '{}'", file, dataset_id))
            } else {
                InsightError::InternalError(format!("failed to read {}: {}", path.display(), e))
            }
        })?;
        serde_json::from_str(&text).map_err(|e| {
            InsightError::InternalError(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

impl DatasetCatalog for FsCatalog {
    fn schema(&self, dataset_id: &str) -> Result<DatasetSchema> {
        self.read_json(dataset_id, Self::SCHEMA_FILE)
    }

    fn recommendations(&self, dataset_id: &str) -> Result<Vec<ChartRecommendation>> {
        self.read_json(dataset_id, Self::RECOMMENDATIONS_FILE)
    }

    fn dataset_path(&self, dataset_id: &str) -> Result<PathBuf> {
        let path = self.dataset_dir(dataset_id)?.join(Self::DATA_FILE);
        if path.is_file() {
            Ok(path)
        } else {
            Err(InsightError::NotFound(format!(
                "data file for dataset '{}'",
                dataset_id
            )))
        }
    }
}
