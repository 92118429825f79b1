//! Turning SMILES strings and amino acid sequences into the numeric inputs of the classifier.
//! Each unique drug and target is featurized once; records share the result through an `Arc`.

pub mod graph;
pub mod protein;
pub mod smiles;

use std::{collections::HashMap, fmt::Display, str::FromStr, sync::Arc};

use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use graph::GraphData;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DrugEncoding {
    /// 1D convolutions over one-hot SMILES characters.
    #[serde(rename = "CNN", alias = "cnn")]
    Cnn,
    /// Self-attention over SMILES character tokens.
    #[serde(rename = "Transformer", alias = "transformer")]
    Transformer,
    /// Message passing over the molecular graph.
    #[serde(rename = "MPNN", alias = "mpnn")]
    Mpnn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetEncoding {
    /// 1D convolutions over one-hot amino acids.
    #[serde(rename = "CNN", alias = "cnn")]
    Cnn,
    /// Amino acid and dipeptide composition.
    #[serde(rename = "AAC", alias = "aac")]
    Aac,
}

impl FromStr for DrugEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cnn" => Ok(Self::Cnn),
            "transformer" => Ok(Self::Transformer),
            "mpnn" => Ok(Self::Mpnn),
            _ => Err(Error::InvalidOption(format!("unknown drug encoding `{s}`"))),
        }
    }
}

impl FromStr for TargetEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cnn" => Ok(Self::Cnn),
            "aac" => Ok(Self::Aac),
            _ => Err(Error::InvalidOption(format!(
                "unknown target encoding `{s}`"
            ))),
        }
    }
}

impl Display for DrugEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = match self {
            Self::Cnn => "CNN",
            Self::Transformer => "Transformer",
            Self::Mpnn => "MPNN",
        };
        write!(f, "{v}")
    }
}

impl Display for TargetEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = match self {
            Self::Cnn => "CNN",
            Self::Aac => "AAC",
        };
        write!(f, "{v}")
    }
}

#[derive(Clone, Debug)]
pub enum DrugFeatures {
    /// Alphabet indices for the CNN, padded to `MAX_SEQ_DRUG`. `None` is padding.
    Chars(Vec<Option<u8>>),
    /// Token ids for the transformer, `[CLS]` first, 0 for padding.
    Tokens(Vec<i32>),
    Graph(GraphData),
}

#[derive(Clone, Debug)]
pub enum TargetFeatures {
    /// Alphabet indices, padded to `MAX_SEQ_PROTEIN`. `None` is padding.
    Chars(Vec<Option<u8>>),
    Composition(Vec<f32>),
}

pub fn encode_drug(smiles: &str, encoding: DrugEncoding) -> Result<DrugFeatures> {
    Ok(match encoding {
        DrugEncoding::Cnn => DrugFeatures::Chars(smiles::char_indices(smiles)),
        DrugEncoding::Transformer => DrugFeatures::Tokens(smiles::tokens(smiles)),
        DrugEncoding::Mpnn => {
            let mol = smiles::MolGraph::from_smiles(smiles)?;
            DrugFeatures::Graph(GraphData::new(&mol)?)
        }
    })
}

pub fn encode_target(seq: &str, encoding: TargetEncoding) -> TargetFeatures {
    match encoding {
        TargetEncoding::Cnn => TargetFeatures::Chars(protein::char_indices(seq)),
        TargetEncoding::Aac => TargetFeatures::Composition(protein::composition(seq)),
    }
}

/// Featurized drugs and targets, keyed by their SMILES / sequence.
#[derive(Clone, Debug, Default)]
pub struct FeatureCache {
    pub drugs: HashMap<String, Arc<DrugFeatures>>,
    pub targets: HashMap<String, Arc<TargetFeatures>>,
}

impl FeatureCache {
    /// Featurizes in parallel. Drugs that fail to encode (unparseable SMILES for graph
    /// encodings) are left out with a warning; callers drop the records that reference them.
    pub fn build(
        drugs: &[String],
        targets: &[String],
        drug_enc: DrugEncoding,
        target_enc: TargetEncoding,
    ) -> Self {
        let drugs = drugs
            .par_iter()
            .filter_map(|s| match encode_drug(s, drug_enc) {
                Ok(f) => Some((s.clone(), Arc::new(f))),
                Err(e) => {
                    warn!("Skipping drug: {e}");
                    None
                }
            })
            .collect();

        let targets = targets
            .par_iter()
            .map(|s| (s.clone(), Arc::new(encode_target(s, target_enc))))
            .collect();

        Self { drugs, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_names() {
        assert_eq!("transformer".parse::<DrugEncoding>().unwrap(), DrugEncoding::Transformer);
        assert_eq!("MPNN".parse::<DrugEncoding>().unwrap(), DrugEncoding::Mpnn);
        assert_eq!("aac".parse::<TargetEncoding>().unwrap(), TargetEncoding::Aac);
        assert!("morgan".parse::<DrugEncoding>().is_err());
        assert_eq!(DrugEncoding::Cnn.to_string(), "CNN");
    }

    #[test]
    fn cache_skips_bad_graphs() {
        let drugs = vec!["CCO".to_owned(), "C1CC".to_owned()];
        let targets = vec!["MKV".to_owned()];

        let cache = FeatureCache::build(&drugs, &targets, DrugEncoding::Mpnn, TargetEncoding::Aac);
        assert!(cache.drugs.contains_key("CCO"));
        assert!(!cache.drugs.contains_key("C1CC"));
        assert_eq!(cache.targets.len(), 1);

        let cache = FeatureCache::build(&drugs, &targets, DrugEncoding::Cnn, TargetEncoding::Cnn);
        assert_eq!(cache.drugs.len(), 2);
    }
}
