//! Training the classifier: Adam over shuffled mini-batches, validation after every epoch, and
//! the best epoch's weights kept.

use std::{fs, path::Path, time::Instant};

use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::InMemDataset},
    module::{AutodiffModule, Module},
    nn::loss::{BinaryCrossEntropyLossConfig, MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer, decay::WeightDecayConfig},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{
        ElementConversion, Tensor,
        backend::{AutodiffBackend, Backend},
    },
};
use log::{info, warn};

use crate::{
    config::HdnConfig,
    error::{Error, Result},
    hdn::{
        CONFIG_FILE, MODEL_FILE, VALID_LOG_FILE,
        batch::{HdnBatch, HdnBatcher, HdnItem},
        infer::predict_items,
        model::{HdnModel, HdnModelConfig},
    },
    metrics::Metrics,
    report::{EpochLog, write_valid_log},
};

/// The best model, moved off the autodiff backend, and its training history.
pub struct HdnTrained<B: Backend> {
    pub model: HdnModel<B>,
    pub config: HdnModelConfig,
    pub log: Vec<EpochLog>,
    pub best_epoch: usize,
}

fn compute_loss<B: AutodiffBackend>(
    out: Tensor<B, 2>,
    labels: Tensor<B, 2>,
    binary: bool,
    device: &B::Device,
) -> Tensor<B, 1> {
    if binary {
        BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(device)
            .forward(out, labels.int())
    } else {
        MseLoss::new().forward(out, labels, Reduction::Mean)
    }
}

/// Trains on `train`, selecting the epoch with the best validation score (AUROC for binary
/// labels, MSE otherwise). Writes the model, its config and the per-epoch log to `out_dir`.
pub fn train<B: AutodiffBackend>(
    cfg: &HdnConfig,
    binary: bool,
    train: &[HdnItem],
    valid: &[HdnItem],
    out_dir: &Path,
    device: &B::Device,
) -> Result<HdnTrained<B::InnerBackend>> {
    if train.is_empty() {
        return Err(Error::Dataset("no HDN training pairs".to_owned()));
    }
    if valid.is_empty() {
        warn!("No HDN validation pairs; keeping the final epoch");
    }

    let start = Instant::now();
    fs::create_dir_all(out_dir)?;

    B::seed(cfg.seed);

    let model_cfg = HdnModelConfig::from_run(cfg, binary);
    let mut model = model_cfg.init::<B>(device);
    info!(
        "HDN ({} drug / {} target encoding): {} parameters, {} training pairs",
        model_cfg.drug_encoding,
        model_cfg.target_encoding,
        model.num_params(),
        train.len()
    );

    let weight_decay = (cfg.decay > 0.).then(|| WeightDecayConfig::new(cfg.decay as f32));
    let mut optim = AdamConfig::new()
        .with_weight_decay(weight_decay)
        .init::<B, HdnModel<B>>();

    let train_loader = DataLoaderBuilder::<B, HdnItem, HdnBatch<B>>::new(HdnBatcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .set_device(device.clone())
        .build(InMemDataset::new(train.to_vec()));

    let valid_labels: Vec<f32> = valid.iter().map(|i| i.label).collect();

    let mut log = Vec::with_capacity(cfg.train_epoch);
    let mut best: Option<(usize, f32, HdnModel<B::InnerBackend>)> = None;

    for epoch in 1..=cfg.train_epoch {
        let mut loss_sum = 0.;
        let mut n_batches = 0;

        for batch in train_loader.iter() {
            let out = model.forward(batch.drug, batch.target)?;
            let loss = compute_loss(out, batch.labels, binary, device);

            loss_sum += loss.clone().into_scalar().elem::<f32>();
            n_batches += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.lr, model, grads);
        }
        let train_loss = loss_sum / n_batches.max(1) as f32;

        let model_valid = model.valid();
        let scores = predict_items(&model_valid, valid, binary, cfg.batch_size, device)?;
        let metrics = Metrics::compute(&scores, &valid_labels, binary);
        let score = metrics.selection_score();

        let improved = match &best {
            None => true,
            Some(_) if valid.is_empty() => true,
            Some((_, s, _)) => score > *s || (s.is_nan() && !score.is_nan()),
        };

        info!("HDN epoch {epoch}/{}: train loss {train_loss:.4}; valid {metrics}", cfg.train_epoch);
        log.push(EpochLog::new(epoch, train_loss, &metrics, improved));

        if improved {
            best = Some((epoch, score, model_valid));
        }
    }

    let Some((best_epoch, _, best_model)) = best else {
        return Err(Error::InvalidOption("train_epoch must be > 0".to_owned()));
    };

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    best_model
        .clone()
        .save_file(out_dir.join(MODEL_FILE), &recorder)
        .map_err(|e| Error::Record(format!("{e:?}")))?;

    let config_file = fs::File::create(out_dir.join(CONFIG_FILE))?;
    serde_json::to_writer_pretty(config_file, &model_cfg)?;

    write_valid_log(&out_dir.join(VALID_LOG_FILE), &log)?;

    info!(
        "HDN training complete in {} s. Best epoch: {best_epoch}. Saved to {}",
        start.elapsed().as_secs(),
        out_dir.display()
    );

    Ok(HdnTrained {
        model: best_model,
        config: model_cfg,
        log,
        best_epoch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{CpuBackend, CpuTrainBackend},
        data::DtiRecord,
        encoding::{DrugEncoding, FeatureCache, TargetEncoding},
        hdn::{batch::items_from_records, infer::HdnPredictor},
    };

    fn records() -> Vec<DtiRecord> {
        let drugs = ["CCO", "CCN", "c1ccccc1", "CC(=O)O", "CCCl", "C=CC"];
        let targets = ["MKVLA", "MSAGG", "MTTQW"];
        let mut result = Vec::new();
        for (i, d) in drugs.iter().enumerate() {
            for (j, t) in targets.iter().enumerate() {
                result.push(DtiRecord {
                    drug: d.to_string(),
                    target: t.to_string(),
                    label: ((i + j) % 2) as f32,
                });
            }
        }
        result
    }

    #[test]
    fn trains_saves_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let cfg = HdnConfig {
            drug_encoding: DrugEncoding::Cnn,
            target_encoding: TargetEncoding::Aac,
            cls_hidden_dims: vec![8],
            hidden_dim_drug: 4,
            hidden_dim_protein: 4,
            cnn_drug_filters: vec![4],
            cnn_drug_kernels: vec![3],
            mlp_hidden_dims_target: vec![8],
            train_epoch: 2,
            batch_size: 4,
            ..Default::default()
        };

        let recs = records();
        let drugs: Vec<String> = recs.iter().map(|r| r.drug.clone()).collect();
        let targets: Vec<String> = recs.iter().map(|r| r.target.clone()).collect();
        let cache = FeatureCache::build(&drugs, &targets, cfg.drug_encoding, cfg.target_encoding);
        let (items, _) = items_from_records(&recs, &cache);

        let trained =
            train::<CpuTrainBackend>(&cfg, true, &items[..12], &items[12..], dir.path(), &device)
                .unwrap();

        assert_eq!(trained.log.len(), 2);
        assert!((1..=2).contains(&trained.best_epoch));
        assert!(dir.path().join(MODEL_FILE).exists());
        assert!(dir.path().join(CONFIG_FILE).exists());
        assert!(dir.path().join(VALID_LOG_FILE).exists());

        let in_memory = predict_items(&trained.model, &items[12..], true, 4, &device).unwrap();

        let loaded = HdnPredictor::<CpuBackend>::load(dir.path(), 4, device).unwrap();
        let reloaded = loaded.predict(&recs[12..]).unwrap();
        for (a, b) in in_memory.iter().zip(&reloaded) {
            assert!((a - b.unwrap()).abs() < 1e-5);
        }
    }
}
