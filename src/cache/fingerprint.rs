//! Content-addressable fingerprint of a resolved chart request

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::chart::{ChartFilter, ChartRecommendation, ChartType, FieldSpec};
use crate::percentile::ViewMeta;

/// Everything that changes a chart's result, and nothing else.
///
/// Title, reason and the option template are presentation only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    dataset_id: &'a str,
    chart_type: ChartType,
    x: &'a FieldSpec,
    y: &'a FieldSpec,
    series: Option<&'a FieldSpec>,
    top_n: Option<usize>,
    filters: &'a [ChartFilter],
    view: ViewMeta,
}

/// SHA-256 (hex) of the canonical JSON of a resolved recommendation and view.
///
/// The view is normalized first, so a `Base` request hashes the same whatever
/// percentile settings ride along with it.
pub fn fingerprint(dataset_id: &str, recommendation: &ChartRecommendation, view: &ViewMeta) -> String {
    let query = &recommendation.query;
    let input = FingerprintInput {
        dataset_id,
        chart_type: recommendation.chart.chart_type,
        x: &query.x,
        y: &query.y,
        series: query.series.as_ref(),
        top_n: query.top_n,
        filters: &query.filters,
        view: view.normalized(&query.y.column),
    };

    // Struct fields serialize in declaration order, so the JSON is canonical
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&canonical))
}
