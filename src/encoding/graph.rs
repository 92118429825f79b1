//! Molecular graph tensors for the message-passing drug encoder: per-atom features and a
//! bond-weighted, normalized adjacency matrix.

use crate::{
    encoding::smiles::{Element, MolGraph},
    error::{Error, Result},
};

/// Max atoms for padding. Larger molecules are truncated.
pub const MAX_ATOMS: usize = 100;

const N_ELEMENTS: usize = 12;

// Element one-hot, degree, aromatic, formal charge, explicit H count.
pub const ATOM_FDIM: usize = N_ELEMENTS + 4;

#[derive(Clone, Debug)]
pub struct GraphData {
    /// Flat [num_atoms * ATOM_FDIM].
    pub atom_feats: Vec<f32>,
    /// Symmetrically normalized, with self loops. Flat [num_atoms * num_atoms].
    pub adj: Vec<f32>,
    pub num_atoms: usize,
}

fn element_slot(el: Element) -> usize {
    match el {
        Element::Hydrogen => 0,
        Element::Boron => 1,
        Element::Carbon => 2,
        Element::Nitrogen => 3,
        Element::Oxygen => 4,
        Element::Fluorine => 5,
        Element::Phosphorus => 6,
        Element::Sulfur => 7,
        Element::Chlorine => 8,
        Element::Bromine => 9,
        Element::Iodine => 10,
        Element::Other => 11,
    }
}

impl GraphData {
    pub fn new(mol: &MolGraph) -> Result<Self> {
        let num_atoms = mol.atoms.len();
        if num_atoms == 0 {
            return Err(Error::Dataset("molecule has 0 atoms".to_owned()));
        }

        let mut atom_feats = Vec::with_capacity(num_atoms * ATOM_FDIM);
        for (i, atom) in mol.atoms.iter().enumerate() {
            let mut one_hot = [0.; N_ELEMENTS];
            one_hot[element_slot(atom.element)] = 1.;
            atom_feats.extend_from_slice(&one_hot);

            atom_feats.push(mol.degree(i) as f32 / 6.0);
            atom_feats.push(if atom.aromatic { 1. } else { 0. });
            atom_feats.push(atom.charge as f32);
            atom_feats.push(atom.h_count as f32 / 4.0);
        }

        let mut adj = vec![0.; num_atoms * num_atoms];

        // Self loops
        for i in 0..num_atoms {
            adj[i * num_atoms + i] = 1.0;
        }

        for bond in &mol.bonds {
            let w = bond.order.weight();
            adj[bond.atom_0 * num_atoms + bond.atom_1] = w;
            adj[bond.atom_1 * num_atoms + bond.atom_0] = w;
        }

        normalize_symmetric(&mut adj, num_atoms);

        Ok(Self {
            atom_feats,
            adj,
            num_atoms,
        })
    }
}

/// In-place D^(-0.5) * A * D^(-0.5) on a flat, square matrix. Rows with no weight stay zero.
pub fn normalize_symmetric(adj: &mut [f32], n: usize) {
    let degrees: Vec<f32> = (0..n)
        .map(|i| adj[i * n..(i + 1) * n].iter().sum())
        .collect();

    let inv_sqrt: Vec<f32> = degrees
        .iter()
        .map(|&d| 1.0 / d.max(1e-9).sqrt())
        .collect();

    for i in 0..n {
        for j in 0..n {
            adj[i * n + j] *= inv_sqrt[i] * inv_sqrt[j];
        }
    }
}

/// Pads a single graph's adjacency to `max` nodes.
/// Returns (padded adjacency [max * max], node mask [max]).
pub fn pad_adj_and_mask(raw_adj: &[f32], num_nodes: usize, max: usize) -> (Vec<f32>, Vec<f32>) {
    let n = num_nodes.min(max);

    // Mask: 1.0 for atoms, 0.0 for pad
    let mut p_mask = Vec::with_capacity(max);
    p_mask.extend(std::iter::repeat_n(1.0, n));
    p_mask.extend(std::iter::repeat_n(0.0, max - n));

    let mut p_adj = Vec::with_capacity(max * max);
    for r in 0..n {
        let row_start = r * num_nodes;
        p_adj.extend_from_slice(&raw_adj[row_start..row_start + n]);
        p_adj.extend(std::iter::repeat_n(0.0, max - n));
    }
    p_adj.extend(std::iter::repeat_n(0.0, (max - n) * max));

    (p_adj, p_mask)
}

/// Pads per-node features [num_nodes * dim] to [max * dim].
pub fn pad_node_feats(feats: &[f32], num_nodes: usize, dim: usize, max: usize) -> Vec<f32> {
    let n = num_nodes.min(max);
    let mut out = Vec::with_capacity(max * dim);
    out.extend_from_slice(&feats[..n * dim]);
    out.resize(max * dim, 0.);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethanol_graph() {
        let mol = MolGraph::from_smiles("CCO").unwrap();
        let g = GraphData::new(&mol).unwrap();

        assert_eq!(g.num_atoms, 3);
        assert_eq!(g.atom_feats.len(), 3 * ATOM_FDIM);
        // Oxygen one-hot on the last atom.
        assert_eq!(g.atom_feats[2 * ATOM_FDIM + 4], 1.);

        for i in 0..3 {
            for j in 0..3 {
                assert!((g.adj[i * 3 + j] - g.adj[j * 3 + i]).abs() < 1e-6);
            }
        }
        // Atoms 0 and 2 aren't bonded.
        assert_eq!(g.adj[2], 0.);
        // Degree 2 (self loop + one bond) on both ends: 1 / sqrt(2 * 3).
        assert!((g.adj[1] - 1. / 6f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn padding() {
        let raw = vec![1., 2., 3., 4.];
        let (adj, mask) = pad_adj_and_mask(&raw, 2, 3);
        assert_eq!(adj, vec![1., 2., 0., 3., 4., 0., 0., 0., 0.]);
        assert_eq!(mask, vec![1., 1., 0.]);

        // Truncation
        let (adj, mask) = pad_adj_and_mask(&raw, 2, 1);
        assert_eq!(adj, vec![1.]);
        assert_eq!(mask, vec![1.]);

        let feats = pad_node_feats(&[1., 2., 3., 4.], 2, 2, 3);
        assert_eq!(feats, vec![1., 2., 3., 4., 0., 0.]);
    }
}
