use std::collections::HashMap;

use rayon::prelude::*;

use crate::blocking::{BlockingStats, CandidatePlan};
use crate::checkpoint::{ChunkStore, StoreFingerprint};
use crate::cluster::build_clusters;
use crate::config::ResolveConfig;
use crate::decision::{accept_edges, scorer_from_config, MatchScorer};
use crate::error::ResolveError;
use crate::ingest::check_unique_ids;
use crate::labeling::{build_training_output, ManualOverrides};
use crate::model::{
    CandidatePair, Cluster, GoldenRecord, Record, ResolveInput, ResolveMeta, ResolveResult,
    TrainingOutput,
};
use crate::summary::compute_summary;
use crate::survivorship::{conflate, SourceDropout};

/// Scored candidate pairs plus blocking counts.
#[derive(Debug)]
pub struct Candidates {
    /// Sorted by `(left_id, right_id)`.
    pub pairs: Vec<CandidatePair>,
    pub stats: BlockingStats,
    pub chunks: usize,
    pub chunks_resumed: usize,
}

/// Blocking + feature scoring. Anchor chunks run in parallel; with a store,
/// finished chunks are saved and reused on the next call.
pub fn generate_candidates(
    config: &ResolveConfig,
    records: &[Record],
    store: Option<&dyn ChunkStore>,
) -> Result<Candidates, ResolveError> {
    let plan = CandidatePlan::new(records, &config.blocking);
    let stats = plan.stats();
    if stats.dropped_no_name > 0 || stats.dropped_no_coords > 0 {
        log::warn!(
            "blocking skipped {} record(s) without a name and {} without coordinates",
            stats.dropped_no_name,
            stats.dropped_no_coords
        );
    }

    if let Some(store) = store {
        store.prepare(&StoreFingerprint::new(config, records))?;
    }

    let chunk_size = config.blocking.chunk_size;
    let results: Vec<(Vec<CandidatePair>, bool)> = plan
        .anchors()
        .par_chunks(chunk_size)
        .enumerate()
        .map(|(chunk, anchors)| -> Result<(Vec<CandidatePair>, bool), ResolveError> {
            if let Some(store) = store {
                if let Some(pairs) = store.load(chunk)? {
                    log::debug!("chunk {chunk}: resumed {} pairs", pairs.len());
                    return Ok((pairs, true));
                }
            }
            let pairs: Vec<CandidatePair> =
                anchors.iter().flat_map(|anchor| plan.pairs_for(anchor)).collect();
            if let Some(store) = store {
                store.save(chunk, &pairs)?;
            }
            log::debug!("chunk {chunk}: {} anchors, {} pairs", anchors.len(), pairs.len());
            Ok((pairs, false))
        })
        .collect::<Result<_, _>>()?;

    let chunks = results.len();
    let chunks_resumed = results.iter().filter(|(_, resumed)| *resumed).count();
    let mut pairs: Vec<CandidatePair> = results.into_iter().flat_map(|(p, _)| p).collect();
    pairs.sort_by(|a, b| {
        a.left_id
            .cmp(&b.left_id)
            .then_with(|| a.right_id.cmp(&b.right_id))
    });

    log::info!(
        "blocking: {} anchors in {} chunk(s) ({} resumed), {} candidate pairs",
        plan.anchors().len(),
        chunks,
        chunks_resumed,
        pairs.len()
    );

    Ok(Candidates {
        pairs,
        stats,
        chunks,
        chunks_resumed,
    })
}

/// Full inference run: candidates, decisions, clusters, golden records.
///
/// `scorer` overrides `[decision.model]`; with neither, the run fails with
/// [`ResolveError::ScorerUnavailable`] before any stage starts.
pub fn run(
    config: &ResolveConfig,
    input: &ResolveInput,
    scorer: Option<&dyn MatchScorer>,
    store: Option<&dyn ChunkStore>,
) -> Result<ResolveResult, ResolveError> {
    let built;
    let scorer: &dyn MatchScorer = match scorer {
        Some(scorer) => scorer,
        None => {
            built = scorer_from_config(&config.decision, &config.labeling)?
                .ok_or(ResolveError::ScorerUnavailable)?;
            built.as_ref()
        }
    };

    let records = &input.records;
    check_unique_ids(records)?;
    log::info!("resolving {} records ({})", records.len(), config.name);

    let Candidates {
        mut pairs,
        stats,
        chunks_resumed,
        ..
    } = generate_candidates(config, records, store)?;

    let threshold = config.decision.threshold;
    let edges = accept_edges(&mut pairs, scorer, threshold)?;
    log::info!(
        "decision: {} of {} pairs accepted at threshold {threshold}",
        edges.len(),
        pairs.len()
    );

    let by_id: HashMap<&str, &Record> = records.iter().map(|r| (r.id.as_str(), r)).collect();
    let clusters = build_clusters(
        records.iter().map(|r| r.id.as_str()),
        &edges,
        |id| by_id.get(id).map(|r| r.source.clone()),
        config.survivorship.cluster_ids,
    );

    let golden_records = conflate_all(config, &clusters, &by_id);

    let summary = compute_summary(
        records.len(),
        stats,
        pairs.len(),
        edges.len(),
        &clusters,
        chunks_resumed,
    );
    log::info!(
        "clustering: {} clusters ({} multi-member, {} singletons)",
        summary.clusters,
        summary.multi_member_clusters,
        summary.singleton_clusters
    );

    Ok(ResolveResult {
        meta: ResolveMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            acceptance_threshold: threshold,
        },
        summary,
        clusters,
        golden_records,
    })
}

/// Survivorship runs sequentially so dropout draws follow cluster order.
fn conflate_all(
    config: &ResolveConfig,
    clusters: &[Cluster],
    by_id: &HashMap<&str, &Record>,
) -> Vec<GoldenRecord> {
    let mut dropout = config.survivorship.dropout.as_ref().map(SourceDropout::new);
    if let Some(ref d) = config.survivorship.dropout {
        log::warn!(
            "source dropout enabled: hiding '{}' from name selection at rate {}",
            d.source,
            d.rate
        );
    }

    clusters
        .iter()
        .map(|cluster| {
            let members: Vec<&Record> = cluster
                .members
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .collect();
            conflate(cluster, &members, &config.survivorship, dropout.as_mut())
        })
        .collect()
}

/// Training path: candidates, rule labels, overrides, review queue and a
/// balanced training set. No scorer involved.
pub fn run_training(
    config: &ResolveConfig,
    input: &ResolveInput,
    overrides: &ManualOverrides,
    store: Option<&dyn ChunkStore>,
) -> Result<TrainingOutput, ResolveError> {
    check_unique_ids(&input.records)?;
    let candidates = generate_candidates(config, &input.records, store)?;
    Ok(build_training_output(
        candidates.pairs,
        &config.labeling,
        &config.sampling,
        overrides,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryChunkStore;
    use crate::config::ModelConfig;
    use crate::model::SourceTag;

    fn rec(id: &str, source: &str, name: &str, lat: f64, lon: f64) -> Record {
        Record {
            id: id.into(),
            source: SourceTag::from(source),
            name_norm: name.into(),
            address_norm: None,
            lat: Some(lat),
            lon: Some(lon),
            category: String::new(),
            region: None,
        }
    }

    fn rules_config() -> ResolveConfig {
        let mut config = ResolveConfig::with_name("unit");
        config.decision.model = Some(ModelConfig::Rules);
        config
    }

    #[test]
    fn missing_scorer_fails_first() {
        let config = ResolveConfig::with_name("unit");
        // duplicate ids would also fail; the scorer check comes first
        let input = ResolveInput {
            records: vec![rec("a", "x", "n", 0.0, 0.0), rec("a", "y", "n", 0.0, 0.0)],
        };
        let err = run(&config, &input, None, None).unwrap_err();
        assert!(matches!(err, ResolveError::ScorerUnavailable));
    }

    #[test]
    fn duplicate_ids_are_fatal() {
        let input = ResolveInput {
            records: vec![rec("a", "x", "n", 0.0, 0.0), rec("a", "y", "n", 0.0, 0.0)],
        };
        let err = run(&rules_config(), &input, None, None).unwrap_err();
        assert!(matches!(err, ResolveError::DuplicateId { .. }));
    }

    #[test]
    fn empty_input_is_valid() {
        let result = run(&rules_config(), &ResolveInput::default(), None, None).unwrap();
        assert!(result.clusters.is_empty());
        assert!(result.golden_records.is_empty());
        assert_eq!(result.summary.candidate_pairs, 0);
    }

    #[test]
    fn candidates_sorted_and_chunked() {
        let mut config = rules_config();
        config.blocking.chunk_size = 2;
        let records: Vec<Record> = (0..7)
            .map(|i| rec(&format!("r{i}"), "x", "cafe", 40.0 + i as f64 * 1e-5, -75.0))
            .collect();
        let candidates = generate_candidates(&config, &records, None).unwrap();
        assert_eq!(candidates.chunks, 4);
        assert_eq!(candidates.pairs.len(), 21);
        let keys: Vec<(&str, &str)> = candidates
            .pairs
            .iter()
            .map(|p| (p.left_id.as_str(), p.right_id.as_str()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn resume_skips_saved_chunks() {
        let mut config = rules_config();
        config.blocking.chunk_size = 2;
        let records: Vec<Record> = (0..6)
            .map(|i| rec(&format!("r{i}"), "x", "cafe", 40.0, -75.0 + i as f64 * 1e-5))
            .collect();
        let store = MemoryChunkStore::new();

        let fresh = generate_candidates(&config, &records, Some(&store)).unwrap();
        assert_eq!(fresh.chunks_resumed, 0);
        assert_eq!(store.chunk_count(), 3);

        store.remove(1);
        let resumed = generate_candidates(&config, &records, Some(&store)).unwrap();
        assert_eq!(resumed.chunks_resumed, 2);
        assert_eq!(resumed.pairs, fresh.pairs);
    }

    #[test]
    fn resume_refuses_changed_records() {
        let config = rules_config();
        let mut records = vec![
            rec("a", "x", "corner cafe", 40.0, -75.0),
            rec("b", "y", "corner cafe", 40.0001, -75.0),
        ];
        let store = MemoryChunkStore::new();
        let fresh = generate_candidates(&config, &records, Some(&store)).unwrap();
        assert_eq!(fresh.pairs.len(), 1);

        // same count, but b is now ~55 km away
        records[1].lat = Some(40.5);
        let err = generate_candidates(&config, &records, Some(&store)).unwrap_err();
        assert!(matches!(err, ResolveError::CheckpointMismatch(_)));
        let rerun = generate_candidates(&config, &records, None).unwrap();
        assert!(rerun.pairs.is_empty());
    }

    #[test]
    fn training_path_labels_pairs() {
        let input = ResolveInput {
            records: vec![
                rec("y1", "yelp", "joes pizza", 40.0100, -75.0100),
                rec("o1", "omf", "joes pizza", 40.0101, -75.0099),
                rec("o2", "omf", "bakery", 40.0102, -75.0101),
            ],
        };
        let out = run_training(&rules_config(), &input, &ManualOverrides::new(), None).unwrap();
        assert_eq!(out.labeled.len(), 3);
        assert!(out.training_set.len() <= 3);
        assert_eq!(out.overrides_applied, 0);
    }
}
