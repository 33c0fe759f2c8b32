use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DataFile {
    pub bucket: String,
    pub key: String,
}

/// A catalog entry as seen by the duplicate detector.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl ProductRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
            description: None,
            stock: None,
            created_at: None,
            active: true,
        }
    }
}

fn default_active() -> bool {
    true
}

/// Ids arrive as UUID strings from the catalog and as integers from older
/// exports; both are held as opaque strings.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Text(id) => Ok(id),
        RawId::Integer(id) => Ok(id.to_string()),
    }
}

fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapped(#[serde(deserialize_with = "deserialize_id")] String);

    let ids: Vec<Wrapped> = Vec::deserialize(deserializer)?;
    Ok(ids.into_iter().map(|Wrapped(id)| id).collect())
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateGroup {
    /// Members in discovery order; the first one is the anchor.
    pub products: Vec<ProductRecord>,
    pub similarity: f64,
    pub price_range: PriceRange,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStatistics {
    pub total_products: usize,
    pub duplicate_groups: usize,
    pub total_duplicates: usize,
    pub unique_products: usize,
    pub duplicate_rate: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Inline catalog snapshot. Either this or `data` must be present.
    #[serde(default)]
    pub products: Option<Vec<ProductRecord>>,
    /// CSV catalog export for scans too large for a request body.
    #[serde(default)]
    pub data: Option<DataFile>,
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub price_tolerance: Option<f64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    pub success: bool,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub statistics: ScanStatistics,
}

/// A product about to be inserted, checked against the live catalog.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProduct {
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CheckRequest {
    pub products: Vec<CandidateProduct>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateInfo {
    pub existing_product_id: String,
    pub existing_product_name: String,
    pub existing_product_price: f64,
    /// Levenshtein ratio as a rounded percentage.
    pub name_similarity: u32,
    pub price_difference: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    #[serde(flatten)]
    pub product: CandidateProduct,
    pub duplicate: bool,
    pub confidence: f64,
    pub duplicate_info: Option<DuplicateInfo>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckStatistics {
    pub total: usize,
    pub unique: usize,
    pub duplicates: usize,
    pub duplicate_rate: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CheckResponse {
    pub success: bool,
    pub results: Vec<CheckResult>,
    pub statistics: CheckStatistics,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    #[serde(deserialize_with = "deserialize_id")]
    pub keep_product_id: String,
    #[serde(deserialize_with = "deserialize_ids")]
    pub remove_product_ids: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MergedProduct {
    pub id: String,
    pub name: String,
    pub stock: u64,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub success: bool,
    pub message: String,
    pub merged_product: MergedProduct,
    pub removed_count: usize,
}
