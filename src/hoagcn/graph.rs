//! The drug-target interaction graph the link predictor runs on. Nodes are every drug, then every
//! target, of the dataset; edges are the known (positive) training interactions.

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    data::{DtiRecord, unique_in_order},
    encoding::graph::normalize_symmetric,
    error::{Error, Result},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InteractionGraph {
    pub drugs: Vec<String>,
    pub targets: Vec<String>,
    /// (drug index, target index)
    pub edges: Vec<(usize, usize)>,
    #[serde(skip)]
    drug_index: HashMap<String, usize>,
    #[serde(skip)]
    target_index: HashMap<String, usize>,
}

impl InteractionGraph {
    /// Duplicate edges are dropped.
    pub fn new(drugs: Vec<String>, targets: Vec<String>, edges: Vec<(usize, usize)>) -> Result<Self> {
        for &(d, t) in &edges {
            if d >= drugs.len() || t >= targets.len() {
                return Err(Error::Dataset(format!(
                    "edge ({d}, {t}) is out of range for {} drugs and {} targets",
                    drugs.len(),
                    targets.len()
                )));
            }
        }

        let mut edges = edges;
        edges.sort_unstable();
        edges.dedup();

        let drug_index = drugs.iter().enumerate().map(|(i, d)| (d.clone(), i)).collect();
        let target_index = targets.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();

        Ok(Self {
            drugs,
            targets,
            edges,
            drug_index,
            target_index,
        })
    }

    /// Nodes from all `records`; edges from the positive pairs of `train`.
    pub fn from_records(records: &[DtiRecord], train: &[DtiRecord]) -> Result<Self> {
        let drugs = unique_in_order(records.iter().map(|r| r.drug.as_str()));
        let targets = unique_in_order(records.iter().map(|r| r.target.as_str()));

        let drug_index: HashMap<&str, usize> =
            drugs.iter().enumerate().map(|(i, d)| (d.as_str(), i)).collect();
        let target_index: HashMap<&str, usize> =
            targets.iter().enumerate().map(|(i, t)| (t.as_str(), i)).collect();

        let edges = train
            .iter()
            .filter(|r| r.label > 0.5)
            .filter_map(|r| {
                Some((
                    *drug_index.get(r.drug.as_str())?,
                    *target_index.get(r.target.as_str())?,
                ))
            })
            .collect();

        Self::new(drugs, targets, edges)
    }

    pub fn num_drugs(&self) -> usize {
        self.drugs.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.drugs.len() + self.targets.len()
    }

    /// Node ids of a pair; `None` if either side isn't in the graph.
    pub fn pair_nodes(&self, drug: &str, target: &str) -> Option<(usize, usize)> {
        let d = *self.drug_index.get(drug)?;
        let t = *self.target_index.get(target)?;
        Some((d, self.num_drugs() + t))
    }

    /// Dense, symmetric `D^-1/2 (A + I) D^-1/2`, flat [n * n].
    pub fn normalized_adjacency(&self) -> Vec<f32> {
        let n = self.num_nodes();
        let n_drugs = self.num_drugs();

        let mut adj = vec![0.; n * n];
        for i in 0..n {
            adj[i * n + i] = 1.;
        }
        for &(d, t) in &self.edges {
            let t = n_drugs + t;
            adj[d * n + t] = 1.;
            adj[t * n + d] = 1.;
        }

        normalize_symmetric(&mut adj, n);
        adj
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer(file, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let saved: Self = serde_json::from_slice(&bytes)?;
        Self::new(saved.drugs, saved.targets, saved.edges)
    }
}

/// Node features in coordinate format.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseFeatures {
    /// (row, column)
    pub indices: Vec<(usize, usize)>,
    pub values: Vec<f32>,
    pub rows: usize,
    pub cols: usize,
}

impl SparseFeatures {
    /// One-hot node identities.
    pub fn identity(n: usize) -> Self {
        Self {
            indices: (0..n).map(|i| (i, i)).collect(),
            values: vec![1.; n],
            rows: n,
            cols: n,
        }
    }

    /// Row-major [rows * cols].
    pub fn to_dense(&self) -> Vec<f32> {
        let mut result = vec![0.; self.rows * self.cols];
        for (&(r, c), &v) in self.indices.iter().zip(&self.values) {
            result[r * self.cols + c] += v;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(d: &str, t: &str, label: f32) -> DtiRecord {
        DtiRecord {
            drug: d.to_owned(),
            target: t.to_owned(),
            label,
        }
    }

    fn graph() -> InteractionGraph {
        let all = vec![
            rec("CCO", "MKV", 1.),
            rec("CCO", "MSA", 0.),
            rec("CCN", "MSA", 1.),
            rec("CCC", "MKV", 1.),
        ];
        // The last pair is held out, so CCC has no edges.
        InteractionGraph::from_records(&all, &all[..3]).unwrap()
    }

    #[test]
    fn nodes_and_edges() {
        let g = graph();
        assert_eq!(g.num_drugs(), 3);
        assert_eq!(g.num_nodes(), 5);
        assert_eq!(g.edges, vec![(0, 0), (1, 1)]);

        assert_eq!(g.pair_nodes("CCN", "MSA"), Some((1, 4)));
        assert_eq!(g.pair_nodes("CCC", "MKV"), Some((2, 3)));
        assert_eq!(g.pair_nodes("CCCl", "MKV"), None);
    }

    #[test]
    fn adjacency_is_normalized() {
        let g = graph();
        let n = g.num_nodes();
        let adj = g.normalized_adjacency();

        for i in 0..n {
            for j in 0..n {
                assert!((adj[i * n + j] - adj[j * n + i]).abs() < 1e-6);
            }
        }
        // CCO (0) - MKV (3): both degree 2 with the self loop.
        assert!((adj[3] - 0.5).abs() < 1e-6);
        // Isolated node keeps only its self loop.
        assert!((adj[2 * n + 2] - 1.).abs() < 1e-6);
        assert_eq!(adj[2 * n + 3], 0.);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let g = graph();
        g.save(&path).unwrap();
        let loaded = InteractionGraph::load(&path).unwrap();
        assert_eq!(loaded.edges, g.edges);
        assert_eq!(loaded.pair_nodes("CCN", "MSA"), Some((1, 4)));
    }

    #[test]
    fn bad_edge() {
        assert!(InteractionGraph::new(vec!["C".into()], vec!["M".into()], vec![(0, 1)]).is_err());
    }

    #[test]
    fn identity_features() {
        let f = SparseFeatures::identity(3);
        assert_eq!(f.to_dense(), vec![1., 0., 0., 0., 1., 0., 0., 0., 1.]);
    }
}
