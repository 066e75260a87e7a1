use extract::EntityKey;
use petgraph::unionfind::UnionFind;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::debug;

use crate::CommunityConfig;
use crate::graph_export::GraphData;

pub struct LouvainDetector {
    graph: GraphData,
    seed: u64,
    max_iterations: usize,
    resolution: f64,
}

impl LouvainDetector {
    pub fn new(graph: GraphData, config: &CommunityConfig) -> Self {
        Self {
            graph,
            seed: config.seed,
            max_iterations: config.max_iterations.max(1),
            resolution: config.resolution,
        }
    }

    /// Run Louvain local moving followed by a connectivity refinement.
    ///
    /// Returns one group per community. Every entity appears in exactly one
    /// group; groups are ordered by their lowest entity index and members keep
    /// entity index order. Deterministic for a fixed graph and seed.
    pub fn detect_communities(&self) -> Vec<Vec<EntityKey>> {
        let n = self.graph.entities.len();
        if n == 0 {
            return Vec::new();
        }

        let adj_list = self.adjacency();
        let degrees: Vec<f64> = adj_list.iter().map(|neighbors| neighbors.values().sum()).collect();
        let m: f64 = degrees.iter().sum::<f64>() / 2.0; // Total weight of edges

        // Initialize: each node in its own community
        let mut communities: Vec<usize> = (0..n).collect();

        if m > 0.0 {
            let iterations = self.local_moving(&adj_list, &degrees, m, &mut communities);
            debug!(iterations, "Louvain local moving finished");
        }

        let communities = self.split_disconnected(&adj_list, &communities);
        self.group(&communities)
    }

    /// Undirected weighted adjacency; self-loops carry no information for clustering
    fn adjacency(&self) -> Vec<BTreeMap<usize, f64>> {
        let mut adj_list: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); self.graph.entities.len()];

        for &(source, target) in &self.graph.edges {
            if source == target {
                continue;
            }
            *adj_list[source].entry(target).or_insert(0.0) += 1.0;
            *adj_list[target].entry(source).or_insert(0.0) += 1.0;
        }

        adj_list
    }

    fn local_moving(
        &self,
        adj_list: &[BTreeMap<usize, f64>],
        degrees: &[f64],
        m: f64,
        communities: &mut [usize],
    ) -> usize {
        let n = communities.len();
        let mut sigma_tot: Vec<f64> = degrees.to_vec();

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);

        let mut improved = true;
        let mut iteration = 0;

        while improved && iteration < self.max_iterations {
            improved = false;
            iteration += 1;

            for &node in &order {
                let k_i = degrees[node];
                if k_i == 0.0 {
                    continue;
                }

                let current_comm = communities[node];

                // Weight from this node into each neighbouring community
                let mut neighbor_comms: BTreeMap<usize, f64> = BTreeMap::new();
                for (&neighbor, &weight) in &adj_list[node] {
                    *neighbor_comms.entry(communities[neighbor]).or_insert(0.0) += weight;
                }

                // Take the node out, then put it back where the gain is highest
                sigma_tot[current_comm] -= k_i;

                let mut best_comm = current_comm;
                let mut best_gain = self.insertion_gain(
                    neighbor_comms.get(&current_comm).copied().unwrap_or(0.0),
                    sigma_tot[current_comm],
                    k_i,
                    m,
                );

                for (&comm, &k_i_in) in &neighbor_comms {
                    if comm == current_comm {
                        continue;
                    }
                    let gain = self.insertion_gain(k_i_in, sigma_tot[comm], k_i, m);
                    if gain > best_gain + 1e-12 {
                        best_gain = gain;
                        best_comm = comm;
                    }
                }

                sigma_tot[best_comm] += k_i;
                if best_comm != current_comm {
                    communities[node] = best_comm;
                    improved = true;
                }
            }
        }

        iteration
    }

    /// Modularity gain (up to a constant factor) of inserting an isolated node into a community
    fn insertion_gain(&self, k_i_in: f64, sigma_tot: f64, k_i: f64, m: f64) -> f64 {
        k_i_in - self.resolution * sigma_tot * k_i / (2.0 * m)
    }

    /// Split communities whose induced subgraph is not connected
    fn split_disconnected(&self, adj_list: &[BTreeMap<usize, f64>], communities: &[usize]) -> Vec<usize> {
        let n = communities.len();
        let mut components = UnionFind::<usize>::new(n);

        for (node, neighbors) in adj_list.iter().enumerate() {
            for &neighbor in neighbors.keys() {
                if communities[node] == communities[neighbor] {
                    components.union(node, neighbor);
                }
            }
        }

        (0..n).map(|node| components.find(node)).collect()
    }

    /// Renumber to contiguous ids in order of first member and collect members
    fn group(&self, communities: &[usize]) -> Vec<Vec<EntityKey>> {
        let mut comm_mapping: BTreeMap<usize, usize> = BTreeMap::new();
        let mut groups: Vec<Vec<EntityKey>> = Vec::new();

        for (idx, entity) in self.graph.entities.iter().enumerate() {
            let next_id = comm_mapping.len();
            let id = *comm_mapping.entry(communities[idx]).or_insert(next_id);
            if id == groups.len() {
                groups.push(Vec::new());
            }
            groups[id].push(entity.clone());
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> EntityKey {
        EntityKey::new(name, "CONCEPT")
    }

    fn names(groups: &[Vec<EntityKey>]) -> Vec<Vec<&str>> {
        groups
            .iter()
            .map(|g| g.iter().map(|k| k.name.as_str()).collect())
            .collect()
    }

    fn detect(graph: GraphData, seed: u64) -> Vec<Vec<EntityKey>> {
        let config = CommunityConfig {
            seed,
            ..CommunityConfig::default()
        };
        LouvainDetector::new(graph, &config).detect_communities()
    }

    #[test]
    fn test_small_graph() {
        let mut graph = GraphData::new();

        // Create a simple graph with 2 communities
        let a = graph.add_entity(key("A"));
        let b = graph.add_entity(key("B"));
        let c = graph.add_entity(key("C"));
        let d = graph.add_entity(key("D"));

        // Community 1: A-B
        graph.add_edge(a, b);
        graph.add_edge(b, a);

        // Community 2: C-D
        graph.add_edge(c, d);
        graph.add_edge(d, c);

        // Weak bridge
        graph.add_edge(b, c);

        let communities = detect(graph, 42);
        assert_eq!(names(&communities), vec![vec!["A", "B"], vec!["C", "D"]]);
    }

    #[test]
    fn two_triangles_joined_by_a_bridge() {
        let mut graph = GraphData::new();
        for (s, t) in [("A", "B"), ("B", "C"), ("C", "A"), ("D", "E"), ("E", "F"), ("F", "D"), ("C", "D")] {
            graph.connect(&key(s), &key(t));
        }

        for seed in [1, 7, 42, 1234] {
            let communities = detect(graph.clone(), seed);
            assert_eq!(
                names(&communities),
                vec![vec!["A", "B", "C"], vec!["D", "E", "F"]],
                "seed {}",
                seed
            );
        }
    }

    #[test]
    fn isolated_nodes_are_singletons_and_partition_is_complete() {
        let mut graph = GraphData::new();
        graph.connect(&key("A"), &key("B"));
        graph.add_entity(key("Lonely"));
        graph.connect(&key("Self"), &key("Self"));

        let communities = detect(graph.clone(), 42);
        let mut members: Vec<&str> = communities.iter().flatten().map(|k| k.name.as_str()).collect();
        members.sort();
        assert_eq!(members, vec!["A", "B", "Lonely", "Self"]);
        assert!(communities.contains(&vec![key("Lonely")]));
        assert!(communities.contains(&vec![key("Self")]));
    }

    #[test]
    fn same_seed_same_partition() {
        let mut graph = GraphData::new();
        let edges = [
            ("a", "b"), ("b", "c"), ("c", "d"), ("d", "a"), ("d", "e"),
            ("e", "f"), ("f", "g"), ("g", "e"), ("g", "h"), ("h", "i"),
        ];
        for (s, t) in edges {
            graph.connect(&key(s), &key(t));
        }

        assert_eq!(detect(graph.clone(), 99), detect(graph, 99));
    }

    #[test]
    fn empty_graph_has_no_communities() {
        assert!(detect(GraphData::new(), 42).is_empty());
    }
}
