//! Connected components over accepted match edges.

use std::collections::{BTreeSet, HashMap};

use crate::config::ClusterIdMode;
use crate::model::{Cluster, MatchEdge, SourceTag};

/// Union-find over an index arena. Ids map to slots; `parent` and `rank`
/// are indexed by slot.
#[derive(Debug, Default)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
    index: HashMap<String, usize>,
    ids: Vec<String>,
}

impl DisjointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for id in ids {
            set.insert(id.into());
        }
        set
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Slot for `id`, adding a singleton if unseen.
    pub fn insert(&mut self, id: String) -> usize {
        if let Some(&slot) = self.index.get(&id) {
            return slot;
        }
        let slot = self.parent.len();
        self.parent.push(slot);
        self.rank.push(0);
        self.index.insert(id.clone(), slot);
        self.ids.push(id);
        slot
    }

    fn root(&mut self, slot: usize) -> usize {
        let mut root = slot;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = slot;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Representative slot of `id`, `None` if unknown.
    pub fn find(&mut self, id: &str) -> Option<usize> {
        let slot = *self.index.get(id)?;
        Some(self.root(slot))
    }

    /// Merge the sets holding `a` and `b`, adding either if unseen.
    pub fn union(&mut self, a: &str, b: &str) {
        let a = self.insert(a.to_string());
        let b = self.insert(b.to_string());
        let (ra, rb) = (self.root(a), self.root(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] = self.rank[ra].saturating_add(1);
            }
        }
    }

    /// Every component as a sorted id list, ordered by smallest member.
    pub fn components(&mut self) -> Vec<Vec<String>> {
        let mut groups: HashMap<usize, Vec<String>> = HashMap::new();
        for slot in 0..self.parent.len() {
            let root = self.root(slot);
            groups.entry(root).or_default().push(self.ids[slot].clone());
        }
        let mut out: Vec<Vec<String>> = groups
            .into_values()
            .map(|mut members| {
                members.sort();
                members
            })
            .collect();
        out.sort_by(|a, b| a[0].cmp(&b[0]));
        out
    }
}

/// `place_` + 12 hex chars.
pub fn cluster_id(members: &[String], mode: ClusterIdMode) -> String {
    let hex = match mode {
        ClusterIdMode::ContentHash => {
            let mut hasher = blake3::Hasher::new();
            for id in members {
                hasher.update(id.as_bytes());
                hasher.update(&[0]);
            }
            hasher.finalize().to_hex().to_string()
        }
        ClusterIdMode::Random => uuid::Uuid::new_v4().simple().to_string(),
    };
    format!("place_{}", &hex[..12])
}

/// Group `universe` into clusters connected by `edges`.
///
/// Edge endpoints outside `universe` join the universe (and are logged).
/// `source_of` supplies the source tag for each known id.
pub fn build_clusters<'a, F>(
    universe: impl IntoIterator<Item = &'a str>,
    edges: &[MatchEdge],
    source_of: F,
    mode: ClusterIdMode,
) -> Vec<Cluster>
where
    F: Fn(&str) -> Option<SourceTag>,
{
    let mut set = DisjointSet::with_ids(universe);
    let known = set.len();

    for edge in edges {
        for id in [&edge.left_id, &edge.right_id] {
            if !set.contains(id) {
                log::warn!("match edge references unknown record id '{id}'");
            }
        }
        set.union(&edge.left_id, &edge.right_id);
    }
    if set.len() > known {
        log::info!("{} id(s) added to the cluster universe from edges", set.len() - known);
    }

    // avg confidence per root
    let mut confidence: HashMap<usize, (f64, usize)> = HashMap::new();
    for edge in edges {
        if let Some(root) = set.find(&edge.left_id) {
            let entry = confidence.entry(root).or_insert((0.0, 0));
            entry.0 += edge.confidence;
            entry.1 += 1;
        }
    }

    set.components()
        .into_iter()
        .map(|members| {
            let root = set.find(&members[0]);
            let avg_confidence = root
                .and_then(|r| confidence.get(&r))
                .map(|(sum, n)| sum / *n as f64);
            let sources: BTreeSet<SourceTag> =
                members.iter().filter_map(|id| source_of(id)).collect();
            Cluster {
                cluster_id: cluster_id(&members, mode),
                members,
                avg_confidence,
                sources: sources.into_iter().collect(),
            }
        })
        .collect()
}
