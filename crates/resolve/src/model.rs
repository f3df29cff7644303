use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Source dataset tag ("yelp", "omf", "osm", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceTag(String);

impl SourceTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Both axes finite and inside the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// A single normalized place record from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub source: SourceTag,
    pub name_norm: String,
    #[serde(default)]
    pub address_norm: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub category: String,
    /// Coarse region (city) used only by the lexical block key.
    #[serde(default)]
    pub region: Option<String>,
}

impl Record {
    /// Coordinates when both are present and valid.
    pub fn point(&self) -> Option<GeoPoint> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)).filter(GeoPoint::is_valid),
            _ => None,
        }
    }

    /// Address with blank values folded to `None`.
    pub fn address(&self) -> Option<&str> {
        self.address_norm.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    pub fn has_name(&self) -> bool {
        !self.name_norm.trim().is_empty()
    }
}

/// Pre-loaded records, all sources together.
#[derive(Debug, Default)]
pub struct ResolveInput {
    pub records: Vec<Record>,
}

// ---------------------------------------------------------------------------
// Pair scoring
// ---------------------------------------------------------------------------

/// Column order of [`FeatureVector::as_array`]. Every scorer is calibrated
/// against exactly this order.
pub const FEATURE_ORDER: [&str; 3] = ["geo_distance_m", "name_score", "address_score"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub geo_distance_m: f64,
    pub name_score: f64,
    pub address_score: f64,
}

impl FeatureVector {
    pub fn as_array(&self) -> [f64; 3] {
        [self.geo_distance_m, self.name_score, self.address_score]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairLabel {
    Positive,
    Negative,
    Ambiguous,
    Unlabeled,
}

impl PairLabel {
    /// Binary training value, `None` for ambiguous/unlabeled.
    pub fn as_binary(&self) -> Option<u8> {
        match self {
            Self::Positive => Some(1),
            Self::Negative => Some(0),
            Self::Ambiguous | Self::Unlabeled => None,
        }
    }

    pub fn from_binary(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Positive),
            0 => Some(Self::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for PairLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Negative => write!(f, "negative"),
            Self::Ambiguous => write!(f, "ambiguous"),
            Self::Unlabeled => write!(f, "unlabeled"),
        }
    }
}

/// A scored candidate pair. The anchor record is always on the left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePair {
    pub left_id: String,
    pub right_id: String,
    pub left_source: SourceTag,
    pub right_source: SourceTag,
    pub features: FeatureVector,
    pub label: PairLabel,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Output of the match decision boundary for one pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchDecision {
    pub prediction: u8,
    pub confidence: f64,
}

/// A pair accepted as the same place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEdge {
    pub left_id: String,
    pub right_id: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Clusters + golden records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cluster {
    pub cluster_id: String,
    /// Sorted, non-empty.
    pub members: Vec<String>,
    pub avg_confidence: Option<f64>,
    /// Sorted, de-duplicated.
    pub sources: Vec<SourceTag>,
}

impl Cluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub name_reason: String,
    pub address_reason: String,
    pub coords_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoldenRecord {
    pub golden_id: String,
    pub primary_name: Option<String>,
    pub primary_address: Option<String>,
    pub coordinates: Option<GeoPoint>,
    pub provenance: Provenance,
    pub member_ids: Vec<String>,
    /// Number of member records.
    pub cluster_size: usize,
    /// Distinct member sources, sorted.
    pub sources: Vec<SourceTag>,
    /// Number of distinct sources, not members: two yelp records and one
    /// omf record give 2.
    pub source_count: usize,
    pub avg_match_confidence: Option<f64>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolveSummary {
    pub records: usize,
    pub dropped_no_coords: usize,
    pub dropped_no_name: usize,
    pub candidate_pairs: usize,
    pub accepted_edges: usize,
    pub clusters: usize,
    pub singleton_clusters: usize,
    pub multi_member_clusters: usize,
    pub chunks_resumed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
    pub acceptance_threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResult {
    pub meta: ResolveMeta,
    pub summary: ResolveSummary,
    pub clusters: Vec<Cluster>,
    pub golden_records: Vec<GoldenRecord>,
}

/// Output of the weak-supervision (training) path.
#[derive(Debug, Clone)]
pub struct TrainingOutput {
    /// Every candidate pair with its final label (overrides applied).
    pub labeled: Vec<CandidatePair>,
    /// Ambiguous pairs no override covered; these go to human review.
    pub review_queue: Vec<CandidatePair>,
    /// Balanced, shuffled positives + negatives.
    pub training_set: Vec<CandidatePair>,
    pub overrides_applied: usize,
}
