//! Match decision boundary: feature vector in, `(prediction, confidence)` out.

use crate::config::{DecisionConfig, LabelingConfig, ModelConfig};
use crate::error::ResolveError;
use crate::labeling::weak_label;
use crate::model::{CandidatePair, FeatureVector, MatchDecision, MatchEdge, PairLabel};

/// Anything that can classify a pair. Implementations must return
/// `prediction ∈ {0, 1}` and `confidence ∈ [0, 1]`.
pub trait MatchScorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<MatchDecision, ResolveError>;
}

/// Logistic model over `FEATURE_ORDER`.
#[derive(Debug, Clone)]
pub struct LinearScorer {
    weights: [f64; 3],
    bias: f64,
}

impl LinearScorer {
    pub fn new(weights: [f64; 3], bias: f64) -> Self {
        Self { weights, bias }
    }
}

impl MatchScorer for LinearScorer {
    fn score(&self, features: &FeatureVector) -> Result<MatchDecision, ResolveError> {
        let z: f64 = features
            .as_array()
            .iter()
            .zip(self.weights.iter())
            .map(|(x, w)| x * w)
            .sum::<f64>()
            + self.bias;
        let confidence = 1.0 / (1.0 + (-z).exp());
        Ok(MatchDecision {
            prediction: u8::from(confidence >= 0.5),
            confidence,
        })
    }
}

/// The weak-supervision rules used as the decision: positive matches with
/// full confidence, everything else is a non-match.
#[derive(Debug, Clone)]
pub struct RuleScorer {
    rules: LabelingConfig,
}

impl RuleScorer {
    pub fn new(rules: LabelingConfig) -> Self {
        Self { rules }
    }
}

impl MatchScorer for RuleScorer {
    fn score(&self, features: &FeatureVector) -> Result<MatchDecision, ResolveError> {
        Ok(match weak_label(features, &self.rules) {
            PairLabel::Positive => MatchDecision { prediction: 1, confidence: 1.0 },
            _ => MatchDecision { prediction: 0, confidence: 0.0 },
        })
    }
}

/// Built-in scorer named by `[decision.model]`, `None` if the section is absent.
pub fn scorer_from_config(
    decision: &DecisionConfig,
    labeling: &LabelingConfig,
) -> Result<Option<Box<dyn MatchScorer>>, ResolveError> {
    match &decision.model {
        None => Ok(None),
        Some(ModelConfig::Rules) => Ok(Some(Box::new(RuleScorer::new(labeling.clone())))),
        Some(ModelConfig::Linear { weights, bias }) => {
            let weights: [f64; 3] = weights.as_slice().try_into().map_err(|_| {
                ResolveError::ConfigValidation(format!(
                    "decision.model.weights needs 3 values, got {}",
                    weights.len()
                ))
            })?;
            Ok(Some(Box::new(LinearScorer::new(weights, *bias))))
        }
    }
}

fn check_contract(decision: &MatchDecision, pair: &CandidatePair) -> Result<(), ResolveError> {
    if decision.prediction > 1 {
        return Err(ResolveError::ScorerContract(format!(
            "prediction {} for ({}, {}) is not 0 or 1",
            decision.prediction, pair.left_id, pair.right_id
        )));
    }
    if !(0.0..=1.0).contains(&decision.confidence) {
        return Err(ResolveError::ScorerContract(format!(
            "confidence {} for ({}, {}) is outside [0, 1]",
            decision.confidence, pair.left_id, pair.right_id
        )));
    }
    Ok(())
}

/// Score every pair, record its confidence, and return the accepted edges
/// (`prediction == 1 && confidence >= threshold`) in pair order.
pub fn accept_edges(
    pairs: &mut [CandidatePair],
    scorer: &dyn MatchScorer,
    threshold: f64,
) -> Result<Vec<MatchEdge>, ResolveError> {
    let mut edges = Vec::new();
    for pair in pairs.iter_mut() {
        let decision = scorer.score(&pair.features)?;
        check_contract(&decision, pair)?;
        pair.confidence = Some(decision.confidence);
        if decision.prediction == 1 && decision.confidence >= threshold {
            edges.push(MatchEdge {
                left_id: pair.left_id.clone(),
                right_id: pair.right_id.clone(),
                confidence: decision.confidence,
            });
        }
    }
    Ok(edges)
}
