//! Weak supervision: rule labels, manual overrides, the review queue and
//! seeded class balancing. Training path only; inference never samples.

use std::collections::HashMap;
use std::io::Read;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::{LabelingConfig, SamplingConfig};
use crate::error::ResolveError;
use crate::model::{CandidatePair, FeatureVector, PairLabel, TrainingOutput};

/// Rule label for one feature vector.
pub fn weak_label(features: &FeatureVector, rules: &LabelingConfig) -> PairLabel {
    let dist = features.geo_distance_m;
    let name = features.name_score;
    if dist < rules.positive_max_distance_m && name > rules.positive_min_name_score {
        PairLabel::Positive
    } else if dist > rules.negative_min_distance_m || name < rules.negative_max_name_score {
        PairLabel::Negative
    } else {
        PairLabel::Ambiguous
    }
}

pub fn assign_labels(pairs: &mut [CandidatePair], rules: &LabelingConfig) {
    for pair in pairs.iter_mut() {
        pair.label = weak_label(&pair.features, rules);
    }
}

// ---------------------------------------------------------------------------
// Manual overrides
// ---------------------------------------------------------------------------

/// Human decisions keyed by exact `(left_id, right_id)`.
#[derive(Debug, Default)]
pub struct ManualOverrides {
    labels: HashMap<(String, String), PairLabel>,
    /// Rows dropped because the label was not 0 or 1.
    pub rejected_rows: usize,
}

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false (and counts a rejected row) unless `label` is 0 or 1.
    pub fn insert(&mut self, left_id: &str, right_id: &str, label: u8) -> bool {
        match PairLabel::from_binary(label) {
            Some(label) => {
                self.labels.insert((left_id.to_string(), right_id.to_string()), label);
                true
            }
            None => {
                self.rejected_rows += 1;
                false
            }
        }
    }

    pub fn get(&self, left_id: &str, right_id: &str) -> Option<PairLabel> {
        self.labels
            .get(&(left_id.to_string(), right_id.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Load `left_id,right_id,label` CSV. Rows whose label isn't 0/1 (also
    /// accepting `0.0`/`1.0`) are skipped and counted, not fatal.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self, ResolveError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ResolveError::Io(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let idx = |name: &str| -> Result<usize, ResolveError> {
            headers.iter().position(|h| h == name).ok_or_else(|| ResolveError::MissingField {
                source: "manual_overrides".into(),
                field: name.into(),
            })
        };
        let left_idx = idx("left_id")?;
        let right_idx = idx("right_id")?;
        let label_idx = idx("label")?;

        let mut overrides = Self::new();
        for row in reader.records() {
            let row = row.map_err(|e| ResolveError::Io(e.to_string()))?;
            let left = row.get(left_idx).unwrap_or("").trim();
            let right = row.get(right_idx).unwrap_or("").trim();
            let label = parse_binary(row.get(label_idx).unwrap_or(""));

            match label {
                Some(label) if !left.is_empty() && !right.is_empty() => {
                    overrides.insert(left, right, label);
                }
                _ => overrides.rejected_rows += 1,
            }
        }

        if overrides.rejected_rows > 0 {
            log::warn!(
                "ignored {} manual override row(s) without a binary label",
                overrides.rejected_rows
            );
        }
        Ok(overrides)
    }
}

fn parse_binary(raw: &str) -> Option<u8> {
    let value: f64 = raw.trim().parse().ok()?;
    if value == 0.0 {
        Some(0)
    } else if value == 1.0 {
        Some(1)
    } else {
        None
    }
}

/// Replace labels with manual decisions where present. Returns how many
/// pairs were overridden.
pub fn apply_overrides(pairs: &mut [CandidatePair], overrides: &ManualOverrides) -> usize {
    let mut applied = 0;
    for pair in pairs.iter_mut() {
        if let Some(label) = overrides.get(&pair.left_id, &pair.right_id) {
            pair.label = label;
            applied += 1;
        }
    }
    applied
}

/// Ambiguous pairs still waiting for a human.
pub fn review_queue(pairs: &[CandidatePair]) -> Vec<CandidatePair> {
    pairs
        .iter()
        .filter(|p| p.label == PairLabel::Ambiguous)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Class balancing
// ---------------------------------------------------------------------------

/// Keep every positive and at most `negative_ratio` negatives per positive,
/// then shuffle. Same seed, same input → same output.
pub fn balance_training_set(
    pairs: &[CandidatePair],
    negative_ratio: usize,
    seed: u64,
) -> Vec<CandidatePair> {
    let mut rng = StdRng::seed_from_u64(seed);

    let positives: Vec<&CandidatePair> =
        pairs.iter().filter(|p| p.label == PairLabel::Positive).collect();
    let negatives: Vec<&CandidatePair> =
        pairs.iter().filter(|p| p.label == PairLabel::Negative).collect();

    let keep = positives.len().saturating_mul(negative_ratio);
    let negatives: Vec<&CandidatePair> = if negatives.len() > keep {
        let mut picked: Vec<usize> =
            rand::seq::index::sample(&mut rng, negatives.len(), keep).into_vec();
        picked.sort_unstable();
        picked.into_iter().map(|i| negatives[i]).collect()
    } else {
        negatives
    };

    let mut out: Vec<CandidatePair> = positives.into_iter().chain(negatives).cloned().collect();
    out.shuffle(&mut rng);
    out
}

/// Full training path over scored pairs: rule labels, overrides, review
/// queue, balanced set.
pub fn build_training_output(
    mut pairs: Vec<CandidatePair>,
    rules: &LabelingConfig,
    sampling: &SamplingConfig,
    overrides: &ManualOverrides,
) -> TrainingOutput {
    assign_labels(&mut pairs, rules);
    let overrides_applied = apply_overrides(&mut pairs, overrides);
    let review_queue = review_queue(&pairs);
    let training_set = balance_training_set(&pairs, sampling.negative_ratio, sampling.seed);

    log::info!(
        "labeled {} pairs: {} overridden, {} queued for review, {} in training set",
        pairs.len(),
        overrides_applied,
        review_queue.len(),
        training_set.len()
    );

    TrainingOutput {
        labeled: pairs,
        review_queue,
        training_set,
        overrides_applied,
    }
}
