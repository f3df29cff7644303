// Property-based tests for blocking and clustering.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::{BTreeSet, VecDeque};

use proptest::prelude::*;
use placefuse_resolve::blocking::CandidatePlan;
use placefuse_resolve::cluster::build_clusters;
use placefuse_resolve::config::{BlockingConfig, ClusterIdMode};
use placefuse_resolve::geo::haversine_m;
use placefuse_resolve::model::{MatchEdge, Record, SourceTag};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

const NAMES: [&str; 4] = ["joes pizza", "joes pizza llc", "corner cafe", "book nook"];

/// Records scattered over a ~500 m box so radius queries hit and miss.
fn arb_records() -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec((0.0f64..0.005, 0.0f64..0.005, 0usize..NAMES.len(), 0u8..3), 0..40)
        .prop_map(|points| {
            points
                .into_iter()
                .enumerate()
                .map(|(i, (dlat, dlon, name, source))| Record {
                    id: format!("r{i:03}"),
                    source: SourceTag::new(format!("s{source}")),
                    name_norm: NAMES[name].to_string(),
                    address_norm: None,
                    lat: Some(40.0 + dlat),
                    lon: Some(-75.0 + dlon),
                    category: String::new(),
                    region: None,
                })
                .collect()
        })
}

fn arb_edges(n: usize) -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..n, 0..n), 0..n * 2)
}

fn brute_force(records: &[Record], radius_m: f64) -> BTreeSet<(String, String)> {
    let mut out = BTreeSet::new();
    for a in records {
        for b in records {
            if a.id < b.id {
                let (pa, pb) = (a.point().unwrap(), b.point().unwrap());
                if haversine_m(pa, pb) <= radius_m {
                    out.insert((a.id.clone(), b.id.clone()));
                }
            }
        }
    }
    out
}

/// Connected components of `ids` under `edges` by breadth-first search,
/// members sorted, components ordered by smallest member.
fn bfs_components(ids: &[String], edges: &[(usize, usize)]) -> Vec<Vec<String>> {
    let mut adjacent = vec![Vec::new(); ids.len()];
    for &(a, b) in edges {
        adjacent[a].push(b);
        adjacent[b].push(a);
    }
    let mut visited = vec![false; ids.len()];
    let mut components = Vec::new();
    for start in 0..ids.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut component = Vec::new();
        while let Some(node) = queue.pop_front() {
            component.push(ids[node].clone());
            for &next in &adjacent[node] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        component.sort();
        components.push(component);
    }
    components.sort();
    components
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn blocking_matches_brute_force(records in arb_records(), radius in 10.0f64..300.0) {
        let config = BlockingConfig { radius_m: radius, ..BlockingConfig::default() };
        let plan = CandidatePlan::new(&records, &config);
        let pairs: Vec<(String, String)> = plan
            .anchors()
            .iter()
            .flat_map(|a| plan.pairs_for(a))
            .map(|p| (p.left_id, p.right_id))
            .collect();

        let unique: BTreeSet<(String, String)> = pairs.iter().cloned().collect();
        prop_assert_eq!(unique.len(), pairs.len(), "pair emitted twice");
        prop_assert_eq!(unique, brute_force(&records, radius));
    }

    #[test]
    fn feature_vectors_symmetric(records in arb_records()) {
        for a in records.iter().take(6) {
            for b in records.iter().take(6) {
                let ab = placefuse_resolve::features::score_pair(a, b).unwrap();
                let ba = placefuse_resolve::features::score_pair(b, a).unwrap();
                prop_assert_eq!(ab, ba);
                prop_assert!((0.0..=1.0).contains(&ab.name_score));
                prop_assert!(ab.geo_distance_m >= 0.0);
            }
        }
    }

    #[test]
    fn clusters_partition_universe(n in 1usize..30, seed_edges in arb_edges(30)) {
        let ids: Vec<String> = (0..n).map(|i| format!("id{i:02}")).collect();
        let index_edges: Vec<(usize, usize)> =
            seed_edges.into_iter().filter(|(a, b)| *a < n && *b < n).collect();
        let edges: Vec<MatchEdge> = index_edges
            .iter()
            .map(|&(a, b)| MatchEdge {
                left_id: ids[a].clone(),
                right_id: ids[b].clone(),
                confidence: 0.8,
            })
            .collect();

        let clusters = build_clusters(
            ids.iter().map(String::as_str),
            &edges,
            |_| None,
            ClusterIdMode::ContentHash,
        );

        let mut seen: Vec<&str> = clusters
            .iter()
            .flat_map(|c| c.members.iter().map(String::as_str))
            .collect();
        seen.sort();
        let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
        prop_assert_eq!(seen, expected);

        // both ends of every edge land together
        for edge in &edges {
            let home = |id: &str| clusters.iter().position(|c| c.members.iter().any(|m| m == id));
            prop_assert_eq!(home(edge.left_id.as_str()), home(edge.right_id.as_str()));
        }

        // exactly the connected components: no over- or under-merging
        let members: Vec<Vec<String>> = clusters.iter().map(|c| c.members.clone()).collect();
        prop_assert_eq!(members, bfs_components(&ids, &index_edges));

        let mut reversed = edges.clone();
        reversed.reverse();
        let again = build_clusters(
            ids.iter().map(String::as_str),
            &reversed,
            |_| None,
            ClusterIdMode::ContentHash,
        );
        prop_assert_eq!(clusters, again);
    }
}
