use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::error::ResolveError;
use crate::model::SourceTag;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// One explicit configuration threaded through every pipeline stage.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolveConfig {
    pub name: String,
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub labeling: LabelingConfig,
    #[serde(default)]
    pub decision: DecisionConfig,
    #[serde(default)]
    pub survivorship: SurvivorshipConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Per-source ingestion adapters, keyed by source tag.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

// ---------------------------------------------------------------------------
// Blocking
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct BlockingConfig {
    /// Maximum great-circle distance between candidate records.
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
    /// Name-prefix length of the lexical block key. 0 disables the key.
    #[serde(default)]
    pub block_key_len: usize,
    /// Sources whose records act as anchors. Empty = match the whole
    /// record set against itself.
    #[serde(default)]
    pub anchor_sources: Vec<SourceTag>,
    /// Anchors per parallel work unit / checkpoint file.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_radius_m() -> f64 {
    100.0
}

fn default_chunk_size() -> usize {
    5000
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius_m(),
            block_key_len: 0,
            anchor_sources: Vec::new(),
            chunk_size: default_chunk_size(),
        }
    }
}

// ---------------------------------------------------------------------------
// Weak-supervision labeling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LabelingConfig {
    /// Positive requires distance strictly below this.
    #[serde(default = "default_positive_max_distance_m")]
    pub positive_max_distance_m: f64,
    /// Positive requires name score strictly above this.
    #[serde(default = "default_positive_min_name_score")]
    pub positive_min_name_score: f64,
    /// Negative when distance is strictly above this.
    #[serde(default = "default_negative_min_distance_m")]
    pub negative_min_distance_m: f64,
    /// Negative when name score is strictly below this.
    #[serde(default = "default_negative_max_name_score")]
    pub negative_max_name_score: f64,
}

fn default_positive_max_distance_m() -> f64 {
    50.0
}

fn default_positive_min_name_score() -> f64 {
    0.85
}

fn default_negative_min_distance_m() -> f64 {
    300.0
}

fn default_negative_max_name_score() -> f64 {
    0.4
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            positive_max_distance_m: default_positive_max_distance_m(),
            positive_min_name_score: default_positive_min_name_score(),
            negative_min_distance_m: default_negative_min_distance_m(),
            negative_max_name_score: default_negative_max_name_score(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionConfig {
    /// Minimum confidence for a predicted match to become an edge.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Built-in scorer. `None` means the caller must inject one.
    #[serde(default)]
    pub model: Option<ModelConfig>,
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    /// Logistic model over the features in `FEATURE_ORDER`.
    Linear { weights: Vec<f64>, bias: f64 },
    /// Weak-supervision rules used directly as the decision.
    Rules,
}

// ---------------------------------------------------------------------------
// Survivorship
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SurvivorshipConfig {
    /// Highest priority first.
    #[serde(default)]
    pub source_priority: Vec<SourceTag>,
    #[serde(default)]
    pub cluster_ids: ClusterIdMode,
    /// Stress-test knob: hide a source from name selection at a given rate.
    #[serde(default)]
    pub dropout: Option<DropoutConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterIdMode {
    /// `place_` + blake3 of the sorted member ids. Stable across replays.
    #[default]
    ContentHash,
    /// `place_` + random uuid, fresh each run.
    Random,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DropoutConfig {
    pub source: SourceTag,
    pub rate: f64,
    pub seed: u64,
}

// ---------------------------------------------------------------------------
// Training-set sampling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    /// Negatives kept per positive.
    #[serde(default = "default_negative_ratio")]
    pub negative_ratio: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_negative_ratio() -> usize {
    5
}

fn default_seed() -> u64 {
    42
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            negative_ratio: default_negative_ratio(),
            seed: default_seed(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub format: SourceFormat,
    pub file: String,
    /// Prepended to every id so ids stay unique across sources.
    #[serde(default)]
    pub id_prefix: Option<String>,
    /// Lowercase, strip punctuation, collapse whitespace.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    pub fields: FieldMapping,
}

fn default_normalize() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Csv,
    Jsonl,
}

/// Maps a source's own field names onto the record schema.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    pub id: String,
    pub name: String,
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ResolveConfig {
    pub fn from_toml(input: &str) -> Result<Self, ResolveError> {
        let config: ResolveConfig =
            toml::from_str(input).map_err(|e| ResolveError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Config with every section at its default. Handy for embedding and tests.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocking: BlockingConfig::default(),
            labeling: LabelingConfig::default(),
            decision: DecisionConfig::default(),
            survivorship: SurvivorshipConfig::default(),
            sampling: SamplingConfig::default(),
            sources: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ResolveError> {
        let invalid = |msg: String| -> Result<(), ResolveError> {
            Err(ResolveError::ConfigValidation(msg))
        };

        let b = &self.blocking;
        if !(b.radius_m.is_finite() && b.radius_m > 0.0) {
            return invalid(format!("blocking.radius_m must be > 0, got {}", b.radius_m));
        }
        if b.chunk_size == 0 {
            return invalid("blocking.chunk_size must be > 0".into());
        }

        let l = &self.labeling;
        for (field, value) in [
            ("positive_min_name_score", l.positive_min_name_score),
            ("negative_max_name_score", l.negative_max_name_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("labeling.{field} must be in [0, 1], got {value}"));
            }
        }
        if l.positive_max_distance_m < 0.0 || l.negative_min_distance_m < 0.0 {
            return invalid("labeling distances must be >= 0".into());
        }
        if l.positive_max_distance_m > l.negative_min_distance_m {
            return invalid(format!(
                "labeling.positive_max_distance_m ({}) exceeds negative_min_distance_m ({})",
                l.positive_max_distance_m, l.negative_min_distance_m
            ));
        }
        if l.negative_max_name_score > l.positive_min_name_score {
            return invalid(format!(
                "labeling.negative_max_name_score ({}) exceeds positive_min_name_score ({})",
                l.negative_max_name_score, l.positive_min_name_score
            ));
        }

        let d = &self.decision;
        if !(0.0..=1.0).contains(&d.threshold) {
            return invalid(format!("decision.threshold must be in [0, 1], got {}", d.threshold));
        }
        if let Some(ModelConfig::Linear { weights, bias }) = &d.model {
            if weights.len() != 3 {
                return invalid(format!(
                    "decision.model.weights needs 3 values (geo_distance_m, name_score, address_score), got {}",
                    weights.len()
                ));
            }
            if !weights.iter().chain(std::iter::once(bias)).all(|w| w.is_finite()) {
                return invalid("decision.model weights and bias must be finite".into());
            }
        }

        let s = &self.survivorship;
        let mut seen = HashSet::new();
        for tag in &s.source_priority {
            if !seen.insert(tag) {
                return invalid(format!("survivorship.source_priority lists '{tag}' twice"));
            }
        }
        if let Some(ref dropout) = s.dropout {
            if !(0.0..=1.0).contains(&dropout.rate) {
                return invalid(format!(
                    "survivorship.dropout.rate must be in [0, 1], got {}",
                    dropout.rate
                ));
            }
        }

        for (tag, source) in &self.sources {
            if source.file.trim().is_empty() {
                return invalid(format!("sources.{tag}.file is empty"));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
