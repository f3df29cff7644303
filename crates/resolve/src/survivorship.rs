//! Survivorship: collapse a cluster into one golden record with a reason
//! for every attribute choice.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{DropoutConfig, SurvivorshipConfig};
use crate::model::{Cluster, GeoPoint, GoldenRecord, Provenance, Record, SourceTag};

pub const REASON_NONE: &str = "none";
pub const REASON_MODE: &str = "mode";
pub const REASON_MEDIAN: &str = "median";

/// Hides one source from name selection with probability `rate`. Only
/// exists when configured; draws come from its own seeded RNG, one per
/// cluster.
#[derive(Debug)]
pub struct SourceDropout {
    source: SourceTag,
    rate: f64,
    rng: StdRng,
}

impl SourceDropout {
    pub fn new(config: &DropoutConfig) -> Self {
        Self {
            source: config.source.clone(),
            rate: config.rate,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Source to hide for the next cluster, if the draw says so.
    pub fn draw(&mut self) -> Option<&SourceTag> {
        let roll: f64 = self.rng.gen();
        (roll < self.rate).then_some(&self.source)
    }
}

fn priority_rank(priority: &[SourceTag], source: &SourceTag) -> usize {
    priority
        .iter()
        .position(|s| s == source)
        .unwrap_or(usize::MAX)
}

// ---------------------------------------------------------------------------
// Attribute rules
// ---------------------------------------------------------------------------

/// Highest-priority source wins; without a listed source, the most common
/// name (ties → lexicographically smallest).
pub fn choose_name(
    members: &[&Record],
    priority: &[SourceTag],
    hidden: Option<&SourceTag>,
) -> (Option<String>, String) {
    let candidates: Vec<&Record> = members
        .iter()
        .copied()
        .filter(|r| r.has_name())
        .filter(|r| hidden != Some(&r.source))
        .collect();
    if candidates.is_empty() {
        return (None, REASON_NONE.into());
    }

    for source in priority {
        let pick = candidates
            .iter()
            .filter(|r| &r.source == source)
            .min_by(|a, b| a.id.cmp(&b.id));
        if let Some(record) = pick {
            return (
                Some(record.name_norm.trim().to_string()),
                format!("priority:{source}"),
            );
        }
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &candidates {
        *counts.entry(record.name_norm.trim()).or_default() += 1;
    }
    // BTreeMap iterates ascending, so the first max is the smallest name.
    let mut best: Option<(&str, usize)> = None;
    for (name, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((name, count));
        }
    }
    (best.map(|(name, _)| name.to_string()), REASON_MODE.into())
}

/// Most whitespace tokens wins; ties by source priority, then member id.
pub fn choose_address(members: &[&Record], priority: &[SourceTag]) -> (Option<String>, String) {
    let best = members
        .iter()
        .filter_map(|r| r.address().map(|a| (r, a)))
        .min_by(|(ra, a), (rb, b)| {
            let tokens_a = a.split_whitespace().count();
            let tokens_b = b.split_whitespace().count();
            tokens_b
                .cmp(&tokens_a)
                .then_with(|| {
                    priority_rank(priority, &ra.source).cmp(&priority_rank(priority, &rb.source))
                })
                .then_with(|| ra.id.cmp(&rb.id))
        });
    match best {
        Some((record, address)) => (
            Some(address.to_string()),
            format!("longest_tokens:{}", record.source),
        ),
        None => (None, REASON_NONE.into()),
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Per-axis median over members with valid coordinates.
pub fn choose_coordinates(members: &[&Record]) -> (Option<GeoPoint>, String) {
    let points: Vec<GeoPoint> = members.iter().filter_map(|r| r.point()).collect();
    let mut lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
    let mut lons: Vec<f64> = points.iter().map(|p| p.lon).collect();
    match (median(&mut lats), median(&mut lons)) {
        (Some(lat), Some(lon)) => (Some(GeoPoint::new(lat, lon)), REASON_MEDIAN.into()),
        _ => (None, REASON_NONE.into()),
    }
}

// ---------------------------------------------------------------------------
// Golden record
// ---------------------------------------------------------------------------

/// Build the golden record for `cluster`. `members` are the records behind
/// its member ids (ids with no record are simply absent). Never fails.
pub fn conflate(
    cluster: &Cluster,
    members: &[&Record],
    config: &SurvivorshipConfig,
    dropout: Option<&mut SourceDropout>,
) -> GoldenRecord {
    let hidden = dropout.and_then(|d| d.draw().cloned());
    let (primary_name, name_reason) =
        choose_name(members, &config.source_priority, hidden.as_ref());
    let (primary_address, address_reason) = choose_address(members, &config.source_priority);
    let (coordinates, coords_reason) = choose_coordinates(members);

    GoldenRecord {
        golden_id: cluster.cluster_id.clone(),
        primary_name,
        primary_address,
        coordinates,
        provenance: Provenance {
            name_reason,
            address_reason,
            coords_reason,
        },
        member_ids: cluster.members.clone(),
        cluster_size: cluster.size(),
        sources: cluster.sources.clone(),
        source_count: cluster.sources.len(),
        avg_match_confidence: cluster.avg_confidence,
    }
}
