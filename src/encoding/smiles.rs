//! SMILES handling: the character alphabet used by the sequence encoders, and a parser that
//! builds the molecular graph used by the message-passing encoder.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Longest SMILES prefix the sequence encoders see.
pub const MAX_SEQ_DRUG: usize = 100;

/// Index 0 (`?`) stands for any character outside the alphabet.
pub const SMILES_CHARS: [char; 63] = [
    '?', '#', '%', ')', '(', '+', '-', '.', '1', '0', '3', '2', '5', '4', '7', '6', '9', '8', '=',
    'A', 'C', 'B', 'E', 'D', 'G', 'F', 'I', 'H', 'K', 'M', 'L', 'O', 'N', 'P', 'S', 'R', 'U', 'T',
    'W', 'V', 'Y', '[', 'Z', ']', '_', 'a', 'c', 'b', 'e', 'd', 'g', 'f', 'i', 'h', 'm', 'l', 'o',
    'n', 's', 'r', 'u', 't', 'y',
];

pub const TOKEN_PAD: i32 = 0;
pub const TOKEN_CLS: i32 = 1;
/// Pad + CLS + one token per alphabet character.
pub const TOKEN_VOCAB: usize = SMILES_CHARS.len() + 2;
/// Token sequence length, including `[CLS]`.
pub const TOKEN_LEN: usize = MAX_SEQ_DRUG + 1;

fn smiles_char_index(c: char) -> u8 {
    SMILES_CHARS.iter().position(|&v| v == c).unwrap_or(0) as u8
}

/// Alphabet index per character, truncated or padded (`None`) to `MAX_SEQ_DRUG`.
pub fn char_indices(smiles: &str) -> Vec<Option<u8>> {
    let mut result: Vec<Option<u8>> = smiles
        .trim()
        .chars()
        .take(MAX_SEQ_DRUG)
        .map(|c| Some(smiles_char_index(c)))
        .collect();
    result.resize(MAX_SEQ_DRUG, None);
    result
}

/// `[CLS]` followed by one token per character, padded with `TOKEN_PAD` to `TOKEN_LEN`.
pub fn tokens(smiles: &str) -> Vec<i32> {
    let mut result = Vec::with_capacity(TOKEN_LEN);
    result.push(TOKEN_CLS);
    result.extend(
        smiles
            .trim()
            .chars()
            .take(MAX_SEQ_DRUG)
            .map(|c| smiles_char_index(c) as i32 + 2),
    );
    result.resize(TOKEN_LEN, TOKEN_PAD);
    result
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Element {
    Hydrogen,
    Boron,
    Carbon,
    Nitrogen,
    Oxygen,
    Fluorine,
    Phosphorus,
    Sulfur,
    Chlorine,
    Bromine,
    Iodine,
    /// Metals, selenium, silicon etc. These are rare in drug-like sets.
    Other,
}

impl Element {
    pub fn from_symbol(sym: &str) -> Self {
        match sym {
            "H" => Self::Hydrogen,
            "B" => Self::Boron,
            "C" => Self::Carbon,
            "N" => Self::Nitrogen,
            "O" => Self::Oxygen,
            "F" => Self::Fluorine,
            "P" => Self::Phosphorus,
            "S" => Self::Sulfur,
            "Cl" => Self::Chlorine,
            "Br" => Self::Bromine,
            "I" => Self::Iodine,
            _ => Self::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondOrder {
    /// Edge weight in the molecular adjacency matrix.
    pub fn weight(self) -> f32 {
        match self {
            Self::Single => 1.0,
            Self::Double => 2.0,
            Self::Triple => 3.0,
            Self::Aromatic => 1.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Atom {
    pub element: Element,
    /// Written lowercase in the SMILES.
    pub aromatic: bool,
    pub charge: i8,
    /// Explicit hydrogens from a bracket atom.
    pub h_count: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bond {
    /// The lower atom index.
    pub atom_0: usize,
    pub atom_1: usize,
    pub order: BondOrder,
}

/// Atoms and bonds of a parsed SMILES. Hydrogens are implicit unless written as atoms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MolGraph {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
    pub adjacency_list: Vec<Vec<usize>>,
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

impl MolGraph {
    pub fn from_smiles(data: &str) -> Result<Self> {
        let data = data.trim();
        if data.is_empty() {
            return Err(Error::smiles(data, "empty string"));
        }

        let mut mol = Self::default();

        let mut current: Option<usize> = None;
        // Two consecutive aromatic atoms share an implicit aromatic bond; a mixed or
        // non-aromatic pair gets an implicit single bond.
        let mut current_aromatic = false;
        let mut last_bond: Option<BondOrder> = None;
        let mut branch_stack: Vec<(Option<usize>, bool)> = Vec::new();
        // ring number -> (atom index, explicit bond at open, aromatic at open)
        let mut ring_map: HashMap<u32, (usize, Option<BondOrder>, bool)> = HashMap::new();

        let mut chars = data.chars().peekable();

        while let Some(&ch) = chars.peek() {
            match ch {
                '-' => {
                    last_bond = Some(BondOrder::Single);
                    chars.next();
                }
                '=' => {
                    last_bond = Some(BondOrder::Double);
                    chars.next();
                }
                '#' => {
                    last_bond = Some(BondOrder::Triple);
                    chars.next();
                }
                ':' => {
                    last_bond = Some(BondOrder::Aromatic);
                    chars.next();
                }
                // Stereo bonds count as single for connectivity.
                '/' | '\\' => {
                    last_bond = Some(BondOrder::Single);
                    chars.next();
                }
                '(' => {
                    if current.is_none() {
                        return Err(Error::smiles(data, "branch without a preceding atom"));
                    }
                    branch_stack.push((current, current_aromatic));
                    chars.next();
                }
                ')' => {
                    let (prev, prev_ar) = branch_stack
                        .pop()
                        .ok_or_else(|| Error::smiles(data, "unmatched ')'"))?;
                    current = prev;
                    current_aromatic = prev_ar;
                    last_bond = None;
                    chars.next();
                }
                '.' => {
                    current = None;
                    current_aromatic = false;
                    last_bond = None;
                    chars.next();
                }
                '%' => {
                    chars.next();
                    let d1 = consume_digit(data, &mut chars)?;
                    let d2 = consume_digit(data, &mut chars)?;
                    let bt = last_bond.take();
                    mol.handle_ring(data, d1 * 10 + d2, current, current_aromatic, bt, &mut ring_map)?;
                }
                '0'..='9' => {
                    chars.next();
                    let bt = last_bond.take();
                    let d = ch as u32 - '0' as u32;
                    mol.handle_ring(data, d, current, current_aromatic, bt, &mut ring_map)?;
                }
                '[' => {
                    let atom = parse_bracket_atom(data, &mut chars)?;
                    let aromatic = atom.aromatic;
                    let bt = last_bond
                        .take()
                        .unwrap_or_else(|| implicit_bond(current_aromatic, aromatic));
                    current = Some(mol.push_atom(atom, current, bt));
                    current_aromatic = aromatic;
                }
                _ => match parse_organic_atom(&mut chars) {
                    Some((element, aromatic)) => {
                        let bt = last_bond
                            .take()
                            .unwrap_or_else(|| implicit_bond(current_aromatic, aromatic));
                        let atom = Atom {
                            element,
                            aromatic,
                            charge: 0,
                            h_count: 0,
                        };
                        current = Some(mol.push_atom(atom, current, bt));
                        current_aromatic = aromatic;
                    }
                    None => {
                        return Err(Error::smiles(
                            data,
                            format!("unrecognized character '{ch}'"),
                        ));
                    }
                },
            }
        }

        if !branch_stack.is_empty() {
            return Err(Error::smiles(data, "unclosed branch"));
        }
        if !ring_map.is_empty() {
            return Err(Error::smiles(data, "unclosed ring"));
        }

        Ok(mol)
    }

    /// Adds an atom, bonded to `prev` if present; returns its index.
    fn push_atom(&mut self, atom: Atom, prev: Option<usize>, order: BondOrder) -> usize {
        let idx = self.atoms.len();
        self.atoms.push(atom);
        self.adjacency_list.push(Vec::new());

        if let Some(p) = prev {
            self.add_bond(p, idx, order);
        }
        idx
    }

    fn add_bond(&mut self, a: usize, b: usize, order: BondOrder) {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.bonds.push(Bond {
            atom_0: lo,
            atom_1: hi,
            order,
        });
        self.adjacency_list[a].push(b);
        self.adjacency_list[b].push(a);
    }

    /// Opens or closes a ring bond. An explicit bond symbol at either end wins; otherwise
    /// the bond is aromatic if both ends are.
    fn handle_ring(
        &mut self,
        data: &str,
        ring: u32,
        current: Option<usize>,
        current_aromatic: bool,
        explicit: Option<BondOrder>,
        ring_map: &mut HashMap<u32, (usize, Option<BondOrder>, bool)>,
    ) -> Result<()> {
        let cur = current.ok_or_else(|| Error::smiles(data, "ring closure without an atom"))?;

        match ring_map.remove(&ring) {
            Some((other, bt_open, open_aromatic)) => {
                if other == cur {
                    return Err(Error::smiles(data, "ring closes on the same atom"));
                }
                let order = explicit
                    .or(bt_open)
                    .unwrap_or_else(|| implicit_bond(open_aromatic, current_aromatic));
                self.add_bond(cur, other, order);
            }
            None => {
                ring_map.insert(ring, (cur, explicit, current_aromatic));
            }
        }
        Ok(())
    }

    pub fn degree(&self, atom: usize) -> usize {
        self.adjacency_list.get(atom).map(|n| n.len()).unwrap_or(0)
    }
}

fn implicit_bond(prev_aromatic: bool, new_aromatic: bool) -> BondOrder {
    if prev_aromatic && new_aromatic {
        BondOrder::Aromatic
    } else {
        BondOrder::Single
    }
}

/// `[isotope? symbol chirality? Hcount? charge? :map?]`. The leading `[` is still in the
/// iterator.
fn parse_bracket_atom(data: &str, chars: &mut Chars<'_>) -> Result<Atom> {
    chars.next();

    while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
        chars.next();
    }

    let first = chars
        .next()
        .filter(|c| c.is_ascii_alphabetic())
        .ok_or_else(|| Error::smiles(data, "bracket atom without an element symbol"))?;
    let aromatic = first.is_ascii_lowercase();
    let mut sym = String::from(first.to_ascii_uppercase());

    // Second letter of two-letter symbols (Cl, Br, Se, ...). `H` is never a second letter.
    if let Some(&c) = chars.peek()
        && c.is_ascii_lowercase()
    {
        sym.push(c);
        chars.next();
    }

    while chars.peek() == Some(&'@') {
        chars.next();
    }

    let mut h_count = 0;
    if chars.peek() == Some(&'H') {
        chars.next();
        h_count = 1;
        if let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            h_count = d as u8;
            chars.next();
        }
        if h_count > 4 {
            return Err(Error::smiles(data, "hydrogen count out of range"));
        }
    }

    let mut charge: i8 = 0;
    while let Some(&c) = chars.peek() {
        let sign = match c {
            '+' => 1,
            '-' => -1,
            _ => break,
        };
        chars.next();
        let step = match chars.peek().and_then(|c| c.to_digit(10)) {
            Some(d) => {
                chars.next();
                sign * d as i8
            }
            None => sign,
        };
        charge = charge
            .checked_add(step)
            .ok_or_else(|| Error::smiles(data, "charge out of range"))?;
    }

    if chars.peek() == Some(&':') {
        chars.next();
        while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            chars.next();
        }
    }

    match chars.next() {
        Some(']') => {}
        other => {
            return Err(Error::smiles(
                data,
                format!("expected ']' to close bracket atom, found {other:?}"),
            ));
        }
    }

    Ok(Atom {
        element: Element::from_symbol(&sym),
        aromatic,
        charge,
        h_count,
    })
}

/// Organic-subset atom outside brackets. Returns `None` without consuming anything for
/// characters that don't start one.
fn parse_organic_atom(chars: &mut Chars<'_>) -> Option<(Element, bool)> {
    let ch = *chars.peek()?;

    let (element, aromatic) = match ch {
        'C' => {
            chars.next();
            if chars.peek() == Some(&'l') {
                chars.next();
                return Some((Element::Chlorine, false));
            }
            return Some((Element::Carbon, false));
        }
        'B' => {
            chars.next();
            if chars.peek() == Some(&'r') {
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
        'H' => (Element::Hydrogen, false),
        'b' => (Element::Boron, true),
        'c' => (Element::Carbon, true),
        'n' => (Element::Nitrogen, true),
        'o' => (Element::Oxygen, true),
        's' => (Element::Sulfur, true),
        'p' => (Element::Phosphorus, true),
        _ => return None,
    };

    chars.next();
    Some((element, aromatic))
}

fn consume_digit(data: &str, chars: &mut Chars<'_>) -> Result<u32> {
    match chars.next().and_then(|c| c.to_digit(10)) {
        Some(d) => Ok(d),
        None => Err(Error::smiles(data, "expected two digits after '%'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alphabet() {
        assert_eq!(SMILES_CHARS.len(), 63);
        assert_eq!(TOKEN_VOCAB, 65);

        let idx = char_indices("C=O");
        assert_eq!(idx.len(), MAX_SEQ_DRUG);
        assert_eq!(idx[0], Some(20));
        assert_eq!(idx[1], Some(18));
        assert_eq!(idx[3], None);

        // Unknown characters fall back to `?`.
        assert_eq!(char_indices("X")[0], Some(0));

        let long = "C".repeat(150);
        assert!(char_indices(&long).iter().all(|v| v.is_some()));
    }

    #[test]
    fn token_layout() {
        let t = tokens("CO");
        assert_eq!(t.len(), TOKEN_LEN);
        assert_eq!(t[0], TOKEN_CLS);
        assert_eq!(t[1], 20 + 2);
        assert_eq!(t[2], 31 + 2);
        assert_eq!(t[3], TOKEN_PAD);
        assert!(t.iter().all(|&v| (v as usize) < TOKEN_VOCAB));
    }

    #[test]
    fn benzene_ring() {
        let mol = MolGraph::from_smiles("c1ccccc1").unwrap();
        assert_eq!(mol.atoms.len(), 6);
        assert_eq!(mol.bonds.len(), 6);
        assert!(mol.bonds.iter().all(|b| b.order == BondOrder::Aromatic));
        assert!((0..6).all(|i| mol.degree(i) == 2));
    }

    #[test]
    fn branches_and_charges() {
        // Acetate with an ammonium counter-ion.
        let mol = MolGraph::from_smiles("CC(=O)[O-].[NH4+]").unwrap();
        assert_eq!(mol.atoms.len(), 5);
        assert_eq!(mol.bonds.len(), 3);
        assert_eq!(mol.degree(1), 3);
        assert_eq!(mol.bonds[1].order, BondOrder::Double);
        assert_eq!(mol.atoms[3].charge, -1);
        assert_eq!(mol.atoms[4].element, Element::Nitrogen);
        assert_eq!(mol.atoms[4].h_count, 4);
        assert_eq!(mol.atoms[4].charge, 1);
        // Disconnected component.
        assert_eq!(mol.degree(4), 0);
    }

    #[test]
    fn halogens_and_two_digit_rings() {
        let mol = MolGraph::from_smiles("ClC%12CCC%12Br").unwrap();
        assert_eq!(mol.atoms[0].element, Element::Chlorine);
        assert_eq!(mol.atoms[5].element, Element::Bromine);
        assert_eq!(mol.bonds.len(), 6);
    }

    #[test]
    fn rejects_malformed() {
        let big_charge = format!("[C{}]", "+9".repeat(20));
        let big_anion = format!("[O{}]", "-".repeat(200));
        for bad in [
            "", "C1CC", "CC)C", "C(C", "[C", "C%1", "1CC", "CQ", "[CH9]", "[NH5+]",
            big_charge.as_str(),
            big_anion.as_str(),
        ] {
            assert!(
                matches!(MolGraph::from_smiles(bad), Err(Error::Smiles { .. })),
                "{bad} should fail"
            );
        }
    }

    #[test]
    fn bracket_charge_and_hydrogens() {
        let g = MolGraph::from_smiles("[NH4+]").unwrap();
        assert_eq!(g.atoms[0].h_count, 4);
        assert_eq!(g.atoms[0].charge, 1);

        let g = MolGraph::from_smiles("[Fe+++]").unwrap();
        assert_eq!(g.atoms[0].charge, 3);
        let g = MolGraph::from_smiles("[O-2]").unwrap();
        assert_eq!(g.atoms[0].charge, -2);
    }
}
