use crate::blocking::BlockingStats;
use crate::model::{Cluster, ResolveSummary};

/// Roll stage counts into the run summary.
pub fn compute_summary(
    records: usize,
    blocking: BlockingStats,
    candidate_pairs: usize,
    accepted_edges: usize,
    clusters: &[Cluster],
    chunks_resumed: usize,
) -> ResolveSummary {
    let singleton_clusters = clusters.iter().filter(|c| c.size() == 1).count();

    ResolveSummary {
        records,
        dropped_no_coords: blocking.dropped_no_coords,
        dropped_no_name: blocking.dropped_no_name,
        candidate_pairs,
        accepted_edges,
        clusters: clusters.len(),
        singleton_clusters,
        multi_member_clusters: clusters.len() - singleton_clusters,
        chunks_resumed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(members: &[&str]) -> Cluster {
        Cluster {
            cluster_id: "place_x".into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            avg_confidence: None,
            sources: vec![],
        }
    }

    #[test]
    fn summary_counts() {
        let clusters = vec![cluster(&["a", "b", "c"]), cluster(&["d"]), cluster(&["e"])];
        let blocking = BlockingStats {
            eligible: 4,
            dropped_no_name: 0,
            dropped_no_coords: 1,
        };
        let summary = compute_summary(5, blocking, 7, 2, &clusters, 0);
        assert_eq!(summary.records, 5);
        assert_eq!(summary.dropped_no_coords, 1);
        assert_eq!(summary.candidate_pairs, 7);
        assert_eq!(summary.clusters, 3);
        assert_eq!(summary.singleton_clusters, 2);
        assert_eq!(summary.multi_member_clusters, 1);
    }
}
