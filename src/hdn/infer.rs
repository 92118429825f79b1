//! Scoring pairs with a trained classifier, in memory or reloaded from a result folder.

use std::{collections::HashMap, fs, path::Path};

use burn::{
    data::dataloader::batcher::Batcher,
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{activation, backend::Backend},
};

use crate::{
    backend::to_vec,
    data::{DtiRecord, unique_in_order},
    encoding::FeatureCache,
    error::{Error, Result},
    hdn::{
        CONFIG_FILE, MODEL_FILE,
        batch::{HdnBatch, HdnBatcher, HdnItem, items_from_records},
        model::{HdnModel, HdnModelConfig},
    },
};

/// Scores items in order. Probabilities for binary models, affinities otherwise.
pub fn predict_items<B: Backend>(
    model: &HdnModel<B>,
    items: &[HdnItem],
    binary: bool,
    batch_size: usize,
    device: &B::Device,
) -> Result<Vec<f32>> {
    let mut result = Vec::with_capacity(items.len());

    for chunk in items.chunks(batch_size.max(1)) {
        let batch: HdnBatch<B> = HdnBatcher.batch(chunk.to_vec(), device);
        let out = model.forward(batch.drug, batch.target)?;
        let out = if binary { activation::sigmoid(out) } else { out };
        result.extend(to_vec(out)?);
    }

    Ok(result)
}

/// A trained classifier and the settings it was built with.
pub struct HdnPredictor<B: Backend> {
    pub model: HdnModel<B>,
    pub config: HdnModelConfig,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> HdnPredictor<B> {
    pub fn new(model: HdnModel<B>, config: HdnModelConfig, batch_size: usize, device: B::Device) -> Self {
        Self {
            model,
            config,
            batch_size,
            device,
        }
    }

    /// Loads `config.json` and `model.mpk` from a model folder.
    pub fn load(dir: &Path, batch_size: usize, device: B::Device) -> Result<Self> {
        let cfg_bytes = fs::read(dir.join(CONFIG_FILE))?;
        let config: HdnModelConfig = serde_json::from_slice(&cfg_bytes)?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .init::<B>(&device)
            .load_file(dir.join(MODEL_FILE), &recorder, &device)
            .map_err(|e| Error::Record(format!("{e:?}")))?;

        Ok(Self::new(model, config, batch_size, device))
    }

    /// Scores records in order. `None` where the drug can't be featurized with this model's
    /// encoding.
    pub fn predict(&self, records: &[DtiRecord]) -> Result<Vec<Option<f32>>> {
        let drugs = unique_in_order(records.iter().map(|r| r.drug.as_str()));
        let targets = unique_in_order(records.iter().map(|r| r.target.as_str()));
        let cache = FeatureCache::build(
            &drugs,
            &targets,
            self.config.drug_encoding,
            self.config.target_encoding,
        );

        // Positions of the records that have features.
        let mut positions = HashMap::new();
        let mut kept = Vec::with_capacity(records.len());
        for (i, r) in records.iter().enumerate() {
            if cache.drugs.contains_key(&r.drug) {
                positions.insert(kept.len(), i);
                kept.push(r.clone());
            }
        }

        let (items, _) = items_from_records(&kept, &cache);
        let scores = predict_items(
            &self.model,
            &items,
            self.config.binary,
            self.batch_size,
            &self.device,
        )?;

        let mut result = vec![None; records.len()];
        for (k, score) in scores.into_iter().enumerate() {
            if let Some(&i) = positions.get(&k) {
                result[i] = Some(score);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::CpuBackend,
        config::HdnConfig,
        encoding::{DrugEncoding, TargetEncoding},
    };

    #[test]
    fn predict_marks_unusable_drugs() {
        let device = Default::default();
        let run = HdnConfig {
            drug_encoding: DrugEncoding::Mpnn,
            target_encoding: TargetEncoding::Aac,
            cls_hidden_dims: vec![8],
            hidden_dim_drug: 4,
            hidden_dim_protein: 4,
            mpnn_hidden_size: 4,
            mlp_hidden_dims_target: vec![8],
            ..Default::default()
        };
        let config = HdnModelConfig::from_run(&run, true);
        let model = config.init::<CpuBackend>(&device);
        let predictor = HdnPredictor::new(model, config, 2, device);

        let records: Vec<DtiRecord> = ["CCO", "C1CC", "CCN", "c1ccccc1"]
            .iter()
            .map(|d| DtiRecord {
                drug: d.to_string(),
                target: "MKVLA".to_owned(),
                label: 0.,
            })
            .collect();

        let scores = predictor.predict(&records).unwrap();
        assert_eq!(scores.len(), 4);
        assert!(scores[1].is_none());
        for i in [0, 2, 3] {
            let s = scores[i].unwrap();
            assert!((0. ..=1.).contains(&s));
        }
    }
}
