//! Amino acid sequence features.

/// Longest sequence prefix the CNN sees.
pub const MAX_SEQ_PROTEIN: usize = 1000;

/// Index 0 (`?`) stands for any character outside the alphabet. Includes the ambiguity codes
/// B, Z, X and the rare residues O (pyrrolysine), U (selenocysteine).
pub const AMINO_CHARS: [char; 26] = [
    '?', 'A', 'C', 'B', 'E', 'D', 'G', 'F', 'I', 'H', 'K', 'M', 'L', 'O', 'N', 'Q', 'P', 'S', 'R',
    'U', 'T', 'W', 'V', 'Y', 'X', 'Z',
];

/// The 20 standard residues used by the composition features.
pub const STANDARD_AA: [char; 20] = [
    'A', 'R', 'N', 'D', 'C', 'Q', 'E', 'G', 'H', 'I', 'L', 'K', 'M', 'F', 'P', 'S', 'T', 'W', 'Y',
    'V',
];

/// 20 single residue + 400 dipeptide frequencies.
pub const AAC_DIM: usize = 20 + 20 * 20;

fn amino_index(c: char) -> u8 {
    let c = c.to_ascii_uppercase();
    AMINO_CHARS.iter().position(|&v| v == c).unwrap_or(0) as u8
}

fn standard_index(c: char) -> Option<usize> {
    let c = c.to_ascii_uppercase();
    STANDARD_AA.iter().position(|&v| v == c)
}

/// Alphabet index per residue, truncated or padded (`None`) to `MAX_SEQ_PROTEIN`.
pub fn char_indices(seq: &str) -> Vec<Option<u8>> {
    let mut result: Vec<Option<u8>> = seq
        .trim()
        .chars()
        .take(MAX_SEQ_PROTEIN)
        .map(|c| Some(amino_index(c)))
        .collect();
    result.resize(MAX_SEQ_PROTEIN, None);
    result
}

/// Amino acid composition followed by dipeptide composition, over the whole sequence.
/// Residues outside the standard 20 are skipped, and break dipeptides.
pub fn composition(seq: &str) -> Vec<f32> {
    let mut result = vec![0.; AAC_DIM];

    let idx: Vec<Option<usize>> = seq.trim().chars().map(standard_index).collect();

    let n_single = idx.iter().flatten().count();
    if n_single > 0 {
        for i in idx.iter().flatten() {
            result[*i] += 1.;
        }
        for v in &mut result[..20] {
            *v /= n_single as f32;
        }
    }

    let mut n_pairs = 0;
    for w in idx.windows(2) {
        if let [Some(a), Some(b)] = w {
            result[20 + a * 20 + b] += 1.;
            n_pairs += 1;
        }
    }
    if n_pairs > 0 {
        for v in &mut result[20..] {
            *v /= n_pairs as f32;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices() {
        let idx = char_indices("mkX*");
        assert_eq!(idx.len(), MAX_SEQ_PROTEIN);
        assert_eq!(idx[0], Some(11));
        assert_eq!(idx[1], Some(10));
        assert_eq!(idx[2], Some(24));
        assert_eq!(idx[3], Some(0));
        assert_eq!(idx[4], None);
    }

    #[test]
    fn composition_sums() {
        let aac = composition("AAGXA");
        assert_eq!(aac.len(), AAC_DIM);

        let single: f32 = aac[..20].iter().sum();
        let pairs: f32 = aac[20..].iter().sum();
        assert!((single - 1.).abs() < 1e-6);
        assert!((pairs - 1.).abs() < 1e-6);

        // A: 3 of 4 standard residues.
        assert!((aac[0] - 0.75).abs() < 1e-6);
        // AA and AG are the only unbroken pairs.
        let g = 7;
        assert!((aac[20] - 0.5).abs() < 1e-6);
        assert!((aac[20 + g] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn composition_of_empty_is_zero() {
        assert!(composition("").iter().all(|&v| v == 0.));
    }
}
