//! Single-linkage clustering over a pairwise "close enough" relation.
//!
//! Two items land in the same cluster when a chain of close pairs connects
//! them, so A and C can share a cluster while being far apart themselves as
//! long as both are close to some B.

#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, item: usize) -> usize {
        let mut root = item;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = item;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }
        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
        true
    }
}

/// Connected components of the graph whose edges are the pairs `linked(i, j)`
/// accepts. Members are ascending and clusters are ordered by their first
/// member, so the output does not depend on evaluation order. Components
/// smaller than `min_size` are dropped.
pub fn single_linkage<F>(len: usize, min_size: usize, mut linked: F) -> Vec<Vec<usize>>
where
    F: FnMut(usize, usize) -> bool,
{
    let mut sets = UnionFind::new(len);
    for i in 0..len {
        for j in (i + 1)..len {
            if linked(i, j) {
                sets.union(i, j);
            }
        }
    }

    let mut by_root: std::collections::BTreeMap<usize, Vec<usize>> = Default::default();
    for item in 0..len {
        let root = sets.find(item);
        by_root.entry(root).or_default().push(item);
    }

    let mut clusters = by_root
        .into_values()
        .filter(|members| members.len() >= min_size.max(1))
        .collect::<Vec<_>>();
    clusters.sort_by_key(|members| members[0]);
    clusters
}
