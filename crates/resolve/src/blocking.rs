//! Candidate generation (blocking).
//!
//! Uses an R-tree (via `rstar`) over the candidate side so each anchor only
//! sees records inside a lat/lon window sized to the blocking radius,
//! instead of the full anchor × candidate cross product. Window hits are
//! re-filtered by exact haversine distance.

use std::collections::HashSet;

use rstar::{RTree, RTreeObject, AABB};

use crate::config::BlockingConfig;
use crate::features::score_pair;
use crate::geo::{haversine_m, search_windows};
use crate::model::{CandidatePair, PairLabel, Record, SourceTag};

/// Counts of records excluded from candidate generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockingStats {
    pub eligible: usize,
    pub dropped_no_name: usize,
    pub dropped_no_coords: usize,
}

/// R-tree entry: position of a record in the candidate list plus its point.
#[derive(Debug, Clone)]
struct IndexedPoint {
    idx: usize,
    /// `[lon, lat]`
    point: [f64; 2],
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.point)
    }
}

/// Read-only spatial index over candidate records. Safe to share across
/// worker threads.
pub struct SpatialIndex<'a> {
    records: Vec<&'a Record>,
    tree: RTree<IndexedPoint>,
}

impl<'a> SpatialIndex<'a> {
    /// Records without a valid point are skipped.
    pub fn build(records: Vec<&'a Record>) -> Self {
        let points: Vec<IndexedPoint> = records
            .iter()
            .enumerate()
            .filter_map(|(idx, r)| {
                r.point().map(|p| IndexedPoint { idx, point: [p.lon, p.lat] })
            })
            .collect();
        Self {
            records,
            tree: RTree::bulk_load(points),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Records within `radius_m` of `record`, sorted by id.
    pub fn within(&self, record: &Record, radius_m: f64) -> Vec<&'a Record> {
        let Some(center) = record.point() else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut hits: Vec<&'a Record> = Vec::new();
        for window in search_windows(center, radius_m) {
            let bounds = AABB::from_corners(window.min, window.max);
            for entry in self.tree.locate_in_envelope(&bounds) {
                if !seen.insert(entry.idx) {
                    continue;
                }
                let candidate = self.records[entry.idx];
                let within = candidate
                    .point()
                    .is_some_and(|p| haversine_m(center, p) <= radius_m);
                if within {
                    hits.push(candidate);
                }
            }
        }
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits
    }
}

/// Anchors plus the index they are queried against.
pub struct CandidatePlan<'a> {
    anchors: Vec<&'a Record>,
    index: SpatialIndex<'a>,
    same_set: bool,
    radius_m: f64,
    block_key_len: usize,
    stats: BlockingStats,
}

impl<'a> CandidatePlan<'a> {
    /// Split records into anchors and candidates, dropping records that lack
    /// a name or coordinates.
    pub fn new(records: &'a [Record], config: &BlockingConfig) -> Self {
        let mut stats = BlockingStats::default();
        let mut eligible: Vec<&'a Record> = Vec::with_capacity(records.len());
        for record in records {
            if !record.has_name() {
                stats.dropped_no_name += 1;
            } else if record.point().is_none() {
                stats.dropped_no_coords += 1;
            } else {
                eligible.push(record);
            }
        }
        stats.eligible = eligible.len();
        eligible.sort_by(|a, b| a.id.cmp(&b.id));

        let same_set = config.anchor_sources.is_empty();
        let (anchors, candidates) = if same_set {
            (eligible.clone(), eligible)
        } else {
            let anchor_sources: HashSet<&SourceTag> = config.anchor_sources.iter().collect();
            eligible
                .into_iter()
                .partition(|r| anchor_sources.contains(&r.source))
        };

        Self {
            anchors,
            index: SpatialIndex::build(candidates),
            same_set,
            radius_m: config.radius_m,
            block_key_len: config.block_key_len,
            stats,
        }
    }

    /// Anchors, sorted by id.
    pub fn anchors(&self) -> &[&'a Record] {
        &self.anchors
    }

    pub fn stats(&self) -> BlockingStats {
        self.stats
    }

    /// Scored, unlabeled pairs for one anchor.
    pub fn pairs_for(&self, anchor: &Record) -> Vec<CandidatePair> {
        self.index
            .within(anchor, self.radius_m)
            .into_iter()
            .filter(|c| !self.same_set || anchor.id < c.id)
            .filter(|c| lexically_compatible(anchor, c, self.block_key_len))
            .filter_map(|c| {
                let features = score_pair(anchor, c)?;
                Some(CandidatePair {
                    left_id: anchor.id.clone(),
                    right_id: c.id.clone(),
                    left_source: anchor.source.clone(),
                    right_source: c.source.clone(),
                    features,
                    label: PairLabel::Unlabeled,
                    confidence: None,
                })
            })
            .collect()
    }
}

/// `region + first N chars of name`. Region only counts when both sides
/// have one; `key_len == 0` disables the check.
pub fn lexically_compatible(a: &Record, b: &Record, key_len: usize) -> bool {
    if key_len == 0 {
        return true;
    }
    if let (Some(ra), Some(rb)) = (&a.region, &b.region) {
        if !ra.trim().eq_ignore_ascii_case(rb.trim()) {
            return false;
        }
    }
    a.name_norm.chars().take(key_len).eq(b.name_norm.chars().take(key_len))
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn config(radius_m: f64) -> BlockingConfig {
        BlockingConfig { radius_m, ..BlockingConfig::default() }
    }

    fn all_pairs(plan: &CandidatePlan<'_>) -> Vec<(String, String)> {
        plan.anchors()
            .iter()
            .flat_map(|a| plan.pairs_for(a))
            .map(|p| (p.left_id, p.right_id))
            .collect()
    }

    #[test]
    fn same_set_emits_each_pair_once() {
        let records = vec![
            rec("a", "x", "joes pizza", 40.0100, -75.0100),
            rec("b", "y", "joes pizza llc", 40.0101, -75.0099),
            rec("c", "z", "unrelated shop", 41.5, -76.2),
        ];
        let plan = CandidatePlan::new(&records, &config(100.0));
        assert_eq!(all_pairs(&plan), vec![("a".to_string(), "b".to_string())]);
    }

    #[test]
    fn disjoint_mode_pairs_anchor_against_others() {
        let records = vec![
            rec("y1", "yelp", "joes pizza", 40.0100, -75.0100),
            rec("y2", "yelp", "joes pizza", 40.0100, -75.0100),
            rec("o1", "omf", "joes pizza llc", 40.0101, -75.0099),
        ];
        let cfg = BlockingConfig {
            anchor_sources: vec![SourceTag::from("yelp")],
            ..config(100.0)
        };
        let plan = CandidatePlan::new(&records, &cfg);
        assert_eq!(plan.anchors().len(), 2);
        let pairs = all_pairs(&plan);
        // yelp records never pair with each other
        assert_eq!(
            pairs,
            vec![("y1".to_string(), "o1".to_string()), ("y2".to_string(), "o1".to_string())]
        );
    }

    #[test]
    fn radius_boundary_is_exact() {
        // ~111 m apart (0.001 deg of latitude)
        let records = vec![
            rec("a", "x", "cafe", 40.000, -75.0),
            rec("b", "y", "cafe", 40.001, -75.0),
        ];
        assert!(all_pairs(&CandidatePlan::new(&records, &config(100.0))).is_empty());
        assert_eq!(all_pairs(&CandidatePlan::new(&records, &config(112.0))).len(), 1);
    }

    #[test]
    fn drops_records_without_name_or_coords() {
        let mut no_coords = rec("b", "y", "cafe", 0.0, 0.0);
        no_coords.lat = None;
        let records = vec![
            rec("a", "x", "cafe", 40.0, -75.0),
            no_coords,
            rec("c", "z", "   ", 40.0, -75.0),
        ];
        let plan = CandidatePlan::new(&records, &config(100.0));
        let stats = plan.stats();
        assert_eq!(stats.eligible, 1);
        assert_eq!(stats.dropped_no_coords, 1);
        assert_eq!(stats.dropped_no_name, 1);
        assert!(all_pairs(&plan).is_empty());
    }

    #[test]
    fn lexical_key_narrows_candidates() {
        let records = vec![
            rec("a", "x", "starbucks", 40.0, -75.0),
            rec("b", "y", "starbucks coffee", 40.0, -75.0),
            rec("c", "z", "subway", 40.0, -75.0),
        ];
        let cfg = BlockingConfig { block_key_len: 2, ..config(100.0) };
        let pairs = all_pairs(&CandidatePlan::new(&records, &cfg));
        assert_eq!(pairs, vec![("a".to_string(), "b".to_string())]);

        // With the key disabled all three pair up.
        assert_eq!(all_pairs(&CandidatePlan::new(&records, &config(100.0))).len(), 3);
    }

    #[test]
    fn lexical_key_respects_region() {
        let mut a = rec("a", "x", "cafe", 40.0, -75.0);
        let mut b = rec("b", "y", "cafe", 40.0, -75.0);
        a.region = Some("Philadelphia".into());
        b.region = Some("philadelphia ".into());
        assert!(lexically_compatible(&a, &b, 3));
        b.region = Some("Santa Barbara".into());
        assert!(!lexically_compatible(&a, &b, 3));
        b.region = None;
        assert!(lexically_compatible(&a, &b, 3));
    }

    #[test]
    fn finds_neighbours_across_antimeridian() {
        let records = vec![
            rec("east", "x", "harbour", -16.5, 179.9995),
            rec("west", "y", "harbour", -16.5, -179.9995),
        ];
        // ~107 m apart across the date line
        assert_eq!(all_pairs(&CandidatePlan::new(&records, &config(150.0))).len(), 1);
    }
}
