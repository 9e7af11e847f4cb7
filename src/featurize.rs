//! Per-atom and per-bond features for the message-passing network, flattened into vectors
//! ready to be packed into tensors.

use crate::{
    element::Element::{self, *},
    molecules::{BondType, MolGraph},
};

// Degree, formal charge, H count, is aromatic, in ring, mass
pub const PER_ATOM_SCALARS: usize = 6;

// Single, double, triple, aromatic (one-hot), in ring
pub const PER_EDGE_FEATS: usize = 5;

// 0 is padding; see `vocab_lookup_element`.
pub const ELEM_VOCAB_SIZE: usize = 15;

#[derive(Clone, Debug)]
pub struct GraphData {
    /// Each element gets an integer assignment, to comply with the embedding layer's input
    /// requirements.
    pub elem_indices: Vec<i32>,
    /// `[num_atoms * PER_ATOM_SCALARS]`
    pub scalars: Vec<f32>,
    /// Normalised, weighted adjacency with self loops. `[num_atoms * num_atoms]`
    pub adj: Vec<f32>,
    /// `[num_atoms * num_atoms * PER_EDGE_FEATS]`
    pub edge_feats: Vec<f32>,
    pub num_atoms: usize,
}

impl GraphData {
    pub fn new(mol: &MolGraph) -> Self {
        let num_atoms = mol.num_atoms();

        let mut elem_indices = Vec::with_capacity(num_atoms);
        let mut scalars = Vec::with_capacity(num_atoms * PER_ATOM_SCALARS);

        for (i, atom) in mol.atoms.iter().enumerate() {
            elem_indices.push(vocab_lookup_element(atom.element));

            scalars.push(mol.degree(i) as f32 / 6.0);
            scalars.push(atom.formal_charge as f32);
            scalars.push(atom.num_hs as f32 / 4.0);
            scalars.push(if atom.aromatic { 1. } else { 0. });
            scalars.push(if atom.in_ring { 1. } else { 0. });
            scalars.push(atom.element.atomic_weight() * 0.01);
        }

        let n_sq = num_atoms.pow(2);
        let mut adj = vec![0.; n_sq];
        let mut edge_feats = vec![0.; n_sq * PER_EDGE_FEATS];

        let edge_feats_i = |i: usize, j: usize, k: usize| -> usize {
            (i * num_atoms + j) * PER_EDGE_FEATS + k
        };

        // Self loops
        for i in 0..num_atoms {
            adj[i * num_atoms + i] = 1.0;
        }

        for bond in &mol.bonds {
            let (a0, a1) = (bond.atom_0, bond.atom_1);

            let type_i = match bond.bond_type {
                BondType::Single => 0,
                BondType::Double => 1,
                BondType::Triple => 2,
                BondType::Aromatic => 3,
            };
            let in_ring = if bond.in_ring { 1. } else { 0. };

            for (u, v) in [(a0, a1), (a1, a0)] {
                edge_feats[edge_feats_i(u, v, type_i)] = 1.;
                edge_feats[edge_feats_i(u, v, 4)] = in_ring;
                adj[u * num_atoms + v] = bond.bond_type.order();
            }
        }

        normalize_symmetric(&mut adj, num_atoms);

        Self {
            elem_indices,
            scalars,
            adj,
            edge_feats,
            num_atoms,
        }
    }
}

/// In place: D^(-0.5) * A * D^(-0.5)
fn normalize_symmetric(adj: &mut [f32], n: usize) {
    let mut degrees = vec![0.0f32; n];
    for i in 0..n {
        degrees[i] = adj[i * n..(i + 1) * n].iter().sum();
    }

    for i in 0..n {
        let di_inv_sqrt = 1.0 / degrees[i].max(1e-9).sqrt();
        for j in 0..n {
            let dj_inv_sqrt = 1.0 / degrees[j].max(1e-9).sqrt();
            adj[i * n + j] *= di_inv_sqrt * dj_inv_sqrt;
        }
    }
}

/// Pads a flat `[n * n]` matrix to `[max * max]`, and builds the matching `[max]` node mask.
/// Returns (padded adjacency, mask).
pub fn pad_adj_and_mask(raw_adj: &[f32], num_atoms: usize, max: usize) -> (Vec<f32>, Vec<f32>) {
    let n = num_atoms.min(max);

    // Mask: 1.0 for atoms, 0.0 for pad
    let mut p_mask = Vec::with_capacity(max);
    p_mask.extend(std::iter::repeat_n(1.0, n));
    p_mask.extend(std::iter::repeat_n(0.0, max - n));

    let mut p_adj = Vec::with_capacity(max * max);
    for r in 0..n {
        let row_start = r * num_atoms;
        p_adj.extend_from_slice(&raw_adj[row_start..row_start + n]);
        p_adj.extend(std::iter::repeat_n(0.0, max - n));
    }
    p_adj.extend(std::iter::repeat_n(0.0, (max - n) * max));

    (p_adj, p_mask)
}

/// Pads `[n * n * num_feats]` edge features to `[max * max * num_feats]`.
pub fn pad_edge_feats(
    edge_feats: &[f32],
    num_atoms: usize,
    num_feats: usize,
    max: usize,
) -> Vec<f32> {
    let n = num_atoms.min(max);

    let mut out = vec![0.0f32; max.pow(2) * num_feats];

    for i in 0..n {
        for j in 0..n {
            let src_base = (i * num_atoms + j) * num_feats;
            let dst_base = (i * max + j) * num_feats;
            out[dst_base..dst_base + num_feats]
                .copy_from_slice(&edge_feats[src_base..src_base + num_feats]);
        }
    }

    out
}

/// Pads per-node rows of width `width` from `n` rows to `max` rows.
pub fn pad_rows(rows: &[f32], num_atoms: usize, width: usize, max: usize) -> Vec<f32> {
    let n = num_atoms.min(max);
    let mut out = Vec::with_capacity(max * width);
    out.extend_from_slice(&rows[..n * width]);
    out.extend(std::iter::repeat_n(0.0, (max - n) * width));
    out
}

/// Maps element to values the neural net can use.
fn vocab_lookup_element(el: Element) -> i32 {
    // 0 is reserved for padding in the batcher, so we start at 1.
    match el {
        Hydrogen => 1,
        Boron => 2,
        Carbon => 3,
        Nitrogen => 4,
        Oxygen => 5,
        Fluorine => 6,
        Silicon => 7,
        Phosphorus => 8,
        Sulfur => 9,
        Chlorine => 10,
        Selenium => 11,
        Bromine => 12,
        Iodine => 13,
        Other => 14,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes() {
        let mol = MolGraph::from_smiles("CC(=O)Oc1ccccc1").unwrap();
        let g = GraphData::new(&mol);
        let n = mol.num_atoms();

        assert_eq!(g.num_atoms, n);
        assert_eq!(g.elem_indices.len(), n);
        assert_eq!(g.scalars.len(), n * PER_ATOM_SCALARS);
        assert_eq!(g.adj.len(), n * n);
        assert_eq!(g.edge_feats.len(), n * n * PER_EDGE_FEATS);
        assert!(g.elem_indices.iter().all(|&i| i > 0 && (i as usize) < ELEM_VOCAB_SIZE));
    }

    #[test]
    fn adjacency_is_symmetric_and_normalised() {
        let mol = MolGraph::from_smiles("CC=O").unwrap();
        let g = GraphData::new(&mol);

        for i in 0..3 {
            for j in 0..3 {
                assert!((g.adj[i * 3 + j] - g.adj[j * 3 + i]).abs() < 1e-6);
            }
        }
        // Non-bonded atoms stay disconnected.
        assert_eq!(g.adj[2], 0.);
        // Self loop of the terminal methyl: 1 / (1 + 1) after normalisation.
        assert!((g.adj[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn edge_features() {
        let mol = MolGraph::from_smiles("CC=O").unwrap();
        let g = GraphData::new(&mol);
        let at = |i: usize, j: usize| &g.edge_feats[(i * 3 + j) * PER_EDGE_FEATS..][..PER_EDGE_FEATS];

        assert_eq!(at(0, 1), &[1., 0., 0., 0., 0.]);
        assert_eq!(at(2, 1), &[0., 1., 0., 0., 0.]);
        assert_eq!(at(0, 2), &[0.; PER_EDGE_FEATS]);
    }

    #[test]
    fn padding() {
        let raw = [1., 2., 3., 4.];
        let (adj, mask) = pad_adj_and_mask(&raw, 2, 3);
        assert_eq!(adj, vec![1., 2., 0., 3., 4., 0., 0., 0., 0.]);
        assert_eq!(mask, vec![1., 1., 0.]);

        assert_eq!(pad_rows(&[1., 2.], 1, 2, 2), vec![1., 2., 0., 0.]);

        let edges = pad_edge_feats(&[1., 1., 1., 1.], 2, 1, 3);
        assert_eq!(edges.iter().sum::<f32>(), 4.);
        assert_eq!(edges[4], 1.); // (1, 1)
        assert_eq!(edges[8], 0.);
    }
}
