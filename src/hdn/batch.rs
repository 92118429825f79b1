//! Collating featurized pairs into padded tensors.

use std::sync::Arc;

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::Int,
    tensor::{Tensor, TensorData, backend::Backend},
};

use crate::{
    data::DtiRecord,
    encoding::{
        DrugFeatures, FeatureCache, TargetFeatures,
        graph::{ATOM_FDIM, MAX_ATOMS, pad_adj_and_mask, pad_node_feats},
        protein::{AAC_DIM, AMINO_CHARS, MAX_SEQ_PROTEIN},
        smiles::{MAX_SEQ_DRUG, SMILES_CHARS, TOKEN_LEN, TOKEN_PAD},
    },
    hdn::model::{DrugInput, TargetInput},
};

/// One pair, with features shared through the cache.
#[derive(Clone, Debug)]
pub struct HdnItem {
    pub drug: Arc<DrugFeatures>,
    pub target: Arc<TargetFeatures>,
    pub label: f32,
}

/// Pairs the cache has features for, in input order. Also returns the number dropped.
pub fn items_from_records(records: &[DtiRecord], cache: &FeatureCache) -> (Vec<HdnItem>, usize) {
    let mut result = Vec::with_capacity(records.len());
    let mut dropped = 0;

    for r in records {
        match (cache.drugs.get(&r.drug), cache.targets.get(&r.target)) {
            (Some(d), Some(t)) => result.push(HdnItem {
                drug: d.clone(),
                target: t.clone(),
                label: r.label,
            }),
            _ => dropped += 1,
        }
    }

    (result, dropped)
}

#[derive(Clone, Debug)]
pub struct HdnBatch<B: Backend> {
    pub drug: DrugInput<B>,
    pub target: TargetInput<B>,
    /// [batch, 1]
    pub labels: Tensor<B, 2>,
}

#[derive(Clone, Debug, Default)]
pub struct HdnBatcher;

/// Channel-major one-hot: `[alphabet, len]` per item. `None` positions stay all-zero.
fn one_hot_into(out: &mut Vec<f32>, indices: &[Option<u8>], alphabet: usize, len: usize) {
    let start = out.len();
    out.resize(start + alphabet * len, 0.);

    for (pos, idx) in indices.iter().take(len).enumerate() {
        if let Some(c) = idx {
            out[start + *c as usize * len + pos] = 1.;
        }
    }
}

fn drug_input<B: Backend>(items: &[HdnItem], device: &B::Device) -> DrugInput<B> {
    let b = items.len();

    // Every item comes from a cache built for one encoding, so the first item's variant holds
    // for the batch. Mismatched items are left as padding.
    match items.first().map(|i| &*i.drug) {
        Some(DrugFeatures::Tokens(_)) => {
            let mut ids = Vec::with_capacity(b * TOKEN_LEN);
            for item in items {
                let start = ids.len();
                if let DrugFeatures::Tokens(t) = &*item.drug {
                    ids.extend(t.iter().take(TOKEN_LEN));
                }
                ids.resize(start + TOKEN_LEN, TOKEN_PAD);
            }
            let data = TensorData::new(ids, [b, TOKEN_LEN]);
            DrugInput::Tokens(Tensor::<B, 2, Int>::from_data(data, device))
        }
        Some(DrugFeatures::Graph(_)) => {
            let mut feats = Vec::with_capacity(b * MAX_ATOMS * ATOM_FDIM);
            let mut adj = Vec::with_capacity(b * MAX_ATOMS * MAX_ATOMS);
            let mut mask = Vec::with_capacity(b * MAX_ATOMS);

            for item in items {
                if let DrugFeatures::Graph(g) = &*item.drug {
                    feats.extend(pad_node_feats(&g.atom_feats, g.num_atoms, ATOM_FDIM, MAX_ATOMS));
                    let (p_adj, p_mask) = pad_adj_and_mask(&g.adj, g.num_atoms, MAX_ATOMS);
                    adj.extend(p_adj);
                    mask.extend(p_mask);
                } else {
                    feats.extend(std::iter::repeat_n(0., MAX_ATOMS * ATOM_FDIM));
                    adj.extend(std::iter::repeat_n(0., MAX_ATOMS * MAX_ATOMS));
                    mask.extend(std::iter::repeat_n(0., MAX_ATOMS));
                }
            }

            DrugInput::Graph {
                feats: Tensor::from_data(
                    TensorData::new(feats, [b, MAX_ATOMS, ATOM_FDIM]),
                    device,
                ),
                adj: Tensor::from_data(TensorData::new(adj, [b, MAX_ATOMS, MAX_ATOMS]), device),
                mask: Tensor::from_data(TensorData::new(mask, [b, MAX_ATOMS, 1]), device),
            }
        }
        _ => {
            let alphabet = SMILES_CHARS.len();
            let mut data = Vec::with_capacity(b * alphabet * MAX_SEQ_DRUG);
            for item in items {
                match &*item.drug {
                    DrugFeatures::Chars(idx) => {
                        one_hot_into(&mut data, idx, alphabet, MAX_SEQ_DRUG)
                    }
                    _ => one_hot_into(&mut data, &[], alphabet, MAX_SEQ_DRUG),
                }
            }
            DrugInput::Chars(Tensor::from_data(
                TensorData::new(data, [b, alphabet, MAX_SEQ_DRUG]),
                device,
            ))
        }
    }
}

fn target_input<B: Backend>(items: &[HdnItem], device: &B::Device) -> TargetInput<B> {
    let b = items.len();

    match items.first().map(|i| &*i.target) {
        Some(TargetFeatures::Composition(_)) => {
            let mut data = Vec::with_capacity(b * AAC_DIM);
            for item in items {
                let start = data.len();
                if let TargetFeatures::Composition(c) = &*item.target {
                    data.extend(c.iter().take(AAC_DIM));
                }
                data.resize(start + AAC_DIM, 0.);
            }
            TargetInput::Composition(Tensor::from_data(
                TensorData::new(data, [b, AAC_DIM]),
                device,
            ))
        }
        _ => {
            let alphabet = AMINO_CHARS.len();
            let mut data = Vec::with_capacity(b * alphabet * MAX_SEQ_PROTEIN);
            for item in items {
                match &*item.target {
                    TargetFeatures::Chars(idx) => {
                        one_hot_into(&mut data, idx, alphabet, MAX_SEQ_PROTEIN)
                    }
                    _ => one_hot_into(&mut data, &[], alphabet, MAX_SEQ_PROTEIN),
                }
            }
            TargetInput::Chars(Tensor::from_data(
                TensorData::new(data, [b, alphabet, MAX_SEQ_PROTEIN]),
                device,
            ))
        }
    }
}

impl<B: Backend> Batcher<B, HdnItem, HdnBatch<B>> for HdnBatcher {
    fn batch(&self, items: Vec<HdnItem>, device: &B::Device) -> HdnBatch<B> {
        let labels: Vec<f32> = items.iter().map(|i| i.label).collect();
        let n = labels.len();

        HdnBatch {
            drug: drug_input(&items, device),
            target: target_input(&items, device),
            labels: Tensor::from_data(TensorData::new(labels, [n, 1]), device),
        }
    }
}
