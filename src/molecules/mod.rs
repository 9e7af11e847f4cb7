//! Molecular graphs: atoms, bonds, and the topology derived from them. These are built from
//! SMILES text (see `smiles.rs`) and consumed by the featurizer.

use std::collections::VecDeque;

use crate::element::Element;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BondType {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondType {
    pub fn order(self) -> f32 {
        match self {
            Self::Single => 1.,
            Self::Double => 2.,
            Self::Triple => 3.,
            Self::Aromatic => 1.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Atom {
    pub element: Element,
    /// Written lowercase in SMILES.
    pub aromatic: bool,
    pub formal_charge: i8,
    /// The H count stated in a bracket atom, e.g. `[nH]`. `None` for organic-subset atoms,
    /// whose hydrogens are implicit.
    pub explicit_h: Option<u8>,
    /// Total attached hydrogens; populated by `MolGraph::perceive`.
    pub num_hs: u8,
    pub in_ring: bool,
}

impl Atom {
    pub fn new(element: Element, aromatic: bool) -> Self {
        Self {
            element,
            aromatic,
            formal_charge: 0,
            explicit_h: None,
            num_hs: 0,
            in_ring: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Bond {
    pub bond_type: BondType,
    /// Lower atom index.
    pub atom_0: usize,
    pub atom_1: usize,
    pub in_ring: bool,
}

/// A molecule as a graph of heavy atoms. Hydrogens are carried as per-atom counts.
#[derive(Clone, Debug, Default)]
pub struct MolGraph {
    /// Typically the SMILES the graph was built from.
    pub ident: String,
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
    pub adjacency_list: Vec<Vec<usize>>,
}

impl MolGraph {
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn degree(&self, i: usize) -> usize {
        self.adjacency_list.get(i).map(|n| n.len()).unwrap_or(0)
    }

    /// Fold explicit hydrogen atoms into their neighbours, infer implicit hydrogens, and
    /// mark ring membership. Called once after construction.
    pub(crate) fn perceive(&mut self) -> Result<(), String> {
        let folded = self.fold_hydrogens()?;
        self.adjacency_list = build_adjacency_list(&self.bonds, self.atoms.len());
        self.assign_hs(&folded)?;
        self.mark_rings();
        Ok(())
    }

    /// Removes H atoms bonded to heavy atoms. Returns, per remaining atom, how many H atoms
    /// were removed from it. H atoms bonded only to other H atoms (e.g. `[H][H]`) are kept.
    fn fold_hydrogens(&mut self) -> Result<Vec<u8>, String> {
        let is_h: Vec<bool> = self
            .atoms
            .iter()
            .enumerate()
            .map(|(i, a)| {
                a.element == Element::Hydrogen
                    && self.bonds.iter().any(|b| {
                        let other = if b.atom_0 == i {
                            b.atom_1
                        } else if b.atom_1 == i {
                            b.atom_0
                        } else {
                            return false;
                        };
                        self.atoms[other].element != Element::Hydrogen
                    })
            })
            .collect();

        if !is_h.iter().any(|h| *h) {
            return Ok(vec![0; self.atoms.len()]);
        }

        let mut folded = vec![0u8; self.atoms.len()];
        for b in &self.bonds {
            let heavy = if is_h[b.atom_0] && !is_h[b.atom_1] {
                b.atom_1
            } else if is_h[b.atom_1] && !is_h[b.atom_0] {
                b.atom_0
            } else {
                continue;
            };
            folded[heavy] = folded[heavy]
                .checked_add(1)
                .ok_or_else(|| too_many_hs(heavy))?;
        }

        let mut old_to_new = vec![usize::MAX; self.atoms.len()];
        let mut atoms = Vec::with_capacity(self.atoms.len());
        let mut folded_new = Vec::with_capacity(self.atoms.len());
        for (i, atom) in self.atoms.iter().enumerate() {
            if is_h[i] {
                continue;
            }
            old_to_new[i] = atoms.len();
            atoms.push(atom.clone());
            folded_new.push(folded[i]);
        }

        let bonds = self
            .bonds
            .iter()
            .filter(|b| !is_h[b.atom_0] && !is_h[b.atom_1])
            .map(|b| {
                let (a0, a1) = (old_to_new[b.atom_0], old_to_new[b.atom_1]);
                Bond {
                    atom_0: a0.min(a1),
                    atom_1: a0.max(a1),
                    ..b.clone()
                }
            })
            .collect();

        self.atoms = atoms;
        self.bonds = bonds;

        Ok(folded_new)
    }

    /// Bracket atoms keep their stated count; organic-subset atoms get implicit hydrogens on
    /// top of any folded explicit ones.
    fn assign_hs(&mut self, folded: &[u8]) -> Result<(), String> {
        let mut bond_sums = vec![0.0f32; self.atoms.len()];
        for b in &self.bonds {
            bond_sums[b.atom_0] += b.bond_type.order();
            bond_sums[b.atom_1] += b.bond_type.order();
        }

        let per_atom = self.atoms.iter_mut().zip(bond_sums).zip(folded);
        for (i, ((atom, bond_sum), &f)) in per_atom.enumerate() {
            let base = match atom.explicit_h {
                Some(h) => h,
                None => implicit_hs(atom, bond_sum + f as f32),
            };
            atom.num_hs = base.checked_add(f).ok_or_else(|| too_many_hs(i))?;
        }
        Ok(())
    }

    /// A bond is in a ring if its endpoints stay connected with the bond removed.
    fn mark_rings(&mut self) {
        for bi in 0..self.bonds.len() {
            let (a0, a1) = (self.bonds[bi].atom_0, self.bonds[bi].atom_1);
            let in_ring = connected_without(&self.adjacency_list, a0, a1);
            self.bonds[bi].in_ring = in_ring;
            if in_ring {
                self.atoms[a0].in_ring = true;
                self.atoms[a1].in_ring = true;
            }
        }
    }
}

fn too_many_hs(atom: usize) -> String {
    format!("too many hydrogens on atom {atom}")
}

/// Lowest allowed valence that accommodates the bonds, minus the bond orders. Charge shifts the
/// valence: N+ behaves like C, O- like a halogen, C+/C- lose one.
fn implicit_hs(atom: &Atom, bond_sum: f32) -> u8 {
    let used = bond_sum.floor() as i32;
    let charge = atom.formal_charge as i32;

    let valences = atom.element.valences();
    // Aromatic atoms only take their lowest valence.
    let valences = if atom.aromatic && !valences.is_empty() {
        &valences[..1]
    } else {
        valences
    };

    for &v in valences {
        let v = match atom.element {
            Element::Boron | Element::Carbon | Element::Silicon => v as i32 - charge.abs(),
            _ => v as i32 + charge,
        };
        if v >= used {
            return (v - used).max(0) as u8;
        }
    }

    0
}

fn connected_without(adj: &[Vec<usize>], from: usize, to: usize) -> bool {
    let mut visited = vec![false; adj.len()];
    let mut queue = VecDeque::from([from]);
    visited[from] = true;

    while let Some(u) = queue.pop_front() {
        for &v in &adj[u] {
            if u == from && v == to {
                continue;
            }
            if v == to {
                return true;
            }
            if !visited[v] {
                visited[v] = true;
                queue.push_back(v);
            }
        }
    }
    false
}

pub fn build_adjacency_list(bonds: &[Bond], atoms_len: usize) -> Vec<Vec<usize>> {
    let mut result = vec![Vec::new(); atoms_len];

    for bond in bonds {
        result[bond.atom_0].push(bond.atom_1);
        result[bond.atom_1].push(bond.atom_0);
    }

    result
}
