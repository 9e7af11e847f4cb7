//! Build molecular graphs from SMILES text.
//!
//! Supports the organic subset, bracket atoms, branches, ring closures (including `%NN`),
//! and dot-separated fragments. Stereo markers are parsed and discarded.

use std::{collections::HashMap, iter::Peekable, str::Chars};

use crate::{
    element::Element,
    error::{Error, Result},
    molecules::{Atom, Bond, BondType, MolGraph},
};

type CharIter<'a> = Peekable<Chars<'a>>;

const MAX_CHARGE: u32 = 15;

impl MolGraph {
    pub fn from_smiles(data: &str) -> Result<Self> {
        let data = data.trim();
        let err = |details: String| Error::Smiles {
            smiles: data.to_owned(),
            details,
        };

        let mut atoms: Vec<Atom> = Vec::new();
        let mut bonds: Vec<Bond> = Vec::new();

        let mut current: Option<usize> = None;
        let mut last_bond: Option<BondType> = None;
        // Saves the current atom at each branch open.
        let mut branch_stack: Vec<Option<usize>> = Vec::new();
        // ring_idx -> (atom index, explicit bond type at open)
        let mut ring_map: HashMap<u32, (usize, Option<BondType>)> = HashMap::new();

        let mut chars = data.chars().peekable();

        while let Some(&ch) = chars.peek() {
            match ch {
                '-' => {
                    last_bond = Some(BondType::Single);
                    chars.next();
                }
                '=' => {
                    last_bond = Some(BondType::Double);
                    chars.next();
                }
                '#' => {
                    last_bond = Some(BondType::Triple);
                    chars.next();
                }
                ':' => {
                    last_bond = Some(BondType::Aromatic);
                    chars.next();
                }
                // Directional bonds; connectivity only.
                '/' | '\\' => {
                    last_bond = Some(BondType::Single);
                    chars.next();
                }
                '(' => {
                    if current.is_none() {
                        return Err(err("branch opened before any atom".into()));
                    }
                    branch_stack.push(current);
                    chars.next();
                }
                ')' => {
                    current = branch_stack
                        .pop()
                        .ok_or_else(|| err("unmatched ')'".into()))?;
                    last_bond = None;
                    chars.next();
                }
                '.' => {
                    current = None;
                    last_bond = None;
                    chars.next();
                }
                '%' => {
                    chars.next();
                    let d1 = consume_digit(&mut chars).map_err(&err)?;
                    let d2 = consume_digit(&mut chars).map_err(&err)?;
                    handle_ring(
                        d1 * 10 + d2,
                        current,
                        last_bond.take(),
                        &mut ring_map,
                        &mut bonds,
                        &atoms,
                    )
                    .map_err(&err)?;
                }
                '0'..='9' => {
                    let d = ch as u32 - '0' as u32;
                    chars.next();
                    handle_ring(d, current, last_bond.take(), &mut ring_map, &mut bonds, &atoms)
                        .map_err(&err)?;
                }
                '[' => {
                    let atom = parse_bracket_atom(&mut chars).map_err(&err)?;
                    let idx = push_atom(atom, current, last_bond.take(), &mut atoms, &mut bonds);
                    current = Some(idx);
                }
                _ => match parse_organic_atom(&mut chars) {
                    Some((element, aromatic)) => {
                        let atom = Atom::new(element, aromatic);
                        let idx =
                            push_atom(atom, current, last_bond.take(), &mut atoms, &mut bonds);
                        current = Some(idx);
                    }
                    None => return Err(err(format!("unrecognized character '{ch}'"))),
                },
            }
        }

        if !branch_stack.is_empty() {
            return Err(err("unclosed '('".into()));
        }
        if !ring_map.is_empty() {
            let mut open: Vec<_> = ring_map.keys().copied().collect();
            open.sort_unstable();
            return Err(err(format!("unclosed ring closure {open:?}")));
        }
        if atoms.is_empty() {
            return Err(err("no atoms".into()));
        }

        let mut mol = Self {
            ident: data.to_owned(),
            atoms,
            bonds,
            adjacency_list: Vec::new(),
        };
        mol.perceive().map_err(&err)?;

        Ok(mol)
    }
}

/// The bond between two adjacent atoms when no bond symbol is written: aromatic between two
/// aromatic atoms, single otherwise.
fn implicit_bt(a: &Atom, b: &Atom) -> BondType {
    if a.aromatic && b.aromatic {
        BondType::Aromatic
    } else {
        BondType::Single
    }
}

/// Add a new atom, bond it to `prev` if present, return its index.
fn push_atom(
    atom: Atom,
    prev: Option<usize>,
    bond_type: Option<BondType>,
    atoms: &mut Vec<Atom>,
    bonds: &mut Vec<Bond>,
) -> usize {
    let idx = atoms.len();

    if let Some(p) = prev {
        let bt = bond_type.unwrap_or_else(|| implicit_bt(&atoms[p], &atom));
        add_bond(p, idx, bt, bonds);
    }
    atoms.push(atom);

    idx
}

/// Open or close a ring-closure bond. An explicit bond symbol at either end wins; otherwise the
/// bond is aromatic between aromatic atoms and single elsewhere.
fn handle_ring(
    ring_idx: u32,
    current: Option<usize>,
    explicit_bt: Option<BondType>,
    ring_map: &mut HashMap<u32, (usize, Option<BondType>)>,
    bonds: &mut Vec<Bond>,
    atoms: &[Atom],
) -> std::result::Result<(), String> {
    let cur = current.ok_or("ring closure digit without a current atom")?;

    match ring_map.remove(&ring_idx) {
        Some((other, bt_open)) => {
            if other == cur {
                return Err(format!("ring closure {ring_idx} bonds an atom to itself"));
            }
            let bond_type = explicit_bt
                .or(bt_open)
                .unwrap_or_else(|| implicit_bt(&atoms[other], &atoms[cur]));
            add_bond(cur, other, bond_type, bonds);
        }
        None => {
            ring_map.insert(ring_idx, (cur, explicit_bt));
        }
    }

    Ok(())
}

/// Parse `[isotope? symbol chirality? Hcount? charge? :map?]`. The leading `[` must still be in
/// the iterator. Isotope, chirality and atom map are discarded.
fn parse_bracket_atom(chars: &mut CharIter) -> std::result::Result<Atom, String> {
    chars.next(); // '['

    while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
        chars.next();
    }

    let first = chars
        .next()
        .ok_or("unexpected end of input inside bracket atom")?;
    if !first.is_ascii_alphabetic() {
        return Err(format!("expected element symbol in bracket atom, found '{first}'"));
    }
    let aromatic = first.is_ascii_lowercase();
    let mut sym = String::from(first.to_ascii_uppercase());

    // Second letter, e.g. the 'l' of Cl. For aromatic atoms ('se', 'as') this is also lowercase.
    if let Some(&c) = chars.peek() {
        if c.is_ascii_lowercase() {
            let candidate = format!("{sym}{c}");
            if Element::from_letter(&candidate).is_ok() {
                sym = candidate;
                chars.next();
            }
        }
    }

    let element = Element::from_letter(&sym).map_err(|e| e.to_string())?;
    let mut atom = Atom::new(element, aromatic);

    while chars.peek().copied() == Some('@') {
        chars.next();
    }

    // H count: a single digit. Absent means zero for bracket atoms.
    let mut h_count = 0;
    if chars.peek().copied() == Some('H') {
        chars.next();
        h_count = 1;
        if let Some(d) = chars.next_if(char::is_ascii_digit) {
            h_count = d as u8 - b'0';
            if chars.peek().is_some_and(char::is_ascii_digit) {
                return Err("hydrogen count must be a single digit".into());
            }
        }
    }
    atom.explicit_h = Some(h_count);

    if let Some(sign) = chars.next_if(|c| *c == '+' || *c == '-') {
        let mut magnitude = 1;
        if let Some(n) = read_number(chars) {
            magnitude = n;
        } else {
            // '++' and '--'
            while chars.next_if_eq(&sign).is_some() {
                magnitude += 1;
            }
        }
        if magnitude > MAX_CHARGE {
            return Err(format!("charge magnitude {magnitude} exceeds {MAX_CHARGE}"));
        }
        let magnitude = magnitude as i8;
        atom.formal_charge = if sign == '+' { magnitude } else { -magnitude };
    }

    if chars.peek().copied() == Some(':') {
        chars.next();
        read_number(chars);
    }

    match chars.next() {
        Some(']') => Ok(atom),
        other => Err(format!("expected ']' to close bracket atom, found {other:?}")),
    }
}

/// Saturates rather than overflowing; callers bound the result.
fn read_number(chars: &mut CharIter) -> Option<u32> {
    let mut out: Option<u32> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        chars.next();
        out = Some(out.unwrap_or(0).saturating_mul(10).saturating_add(d));
    }
    out
}

/// Parse an organic-subset atom (no brackets). Returns `None` for unrecognized characters,
/// leaving the iterator untouched.
fn parse_organic_atom(chars: &mut CharIter) -> Option<(Element, bool)> {
    let ch = chars.peek().copied()?;

    let result = match ch {
        'C' => {
            chars.next();
            if chars.peek().copied() == Some('l') {
                chars.next();
                return Some((Element::Chlorine, false));
            }
            return Some((Element::Carbon, false));
        }
        'B' => {
            chars.next();
            if chars.peek().copied() == Some('r') {
                chars.next();
                return Some((Element::Bromine, false));
            }
            return Some((Element::Boron, false));
        }
        'N' => (Element::Nitrogen, false),
        'O' => (Element::Oxygen, false),
        'S' => (Element::Sulfur, false),
        'P' => (Element::Phosphorus, false),
        'F' => (Element::Fluorine, false),
        'I' => (Element::Iodine, false),
        'b' => (Element::Boron, true),
        'c' => (Element::Carbon, true),
        'n' => (Element::Nitrogen, true),
        'o' => (Element::Oxygen, true),
        's' => (Element::Sulfur, true),
        'p' => (Element::Phosphorus, true),
        _ => return None,
    };
    chars.next();

    Some(result)
}

fn consume_digit(chars: &mut CharIter) -> std::result::Result<u32, String> {
    match chars.next() {
        Some(c) if c.is_ascii_digit() => Ok(c as u32 - '0' as u32),
        Some(c) => Err(format!("expected digit after '%', found '{c}'")),
        None => Err("expected digit after '%', found end of input".into()),
    }
}

/// Stored with the lower index as atom_0.
fn add_bond(a: usize, b: usize, bond_type: BondType, bonds: &mut Vec<Bond>) {
    bonds.push(Bond {
        bond_type,
        atom_0: a.min(b),
        atom_1: a.max(b),
        in_ring: false,
    });
}
