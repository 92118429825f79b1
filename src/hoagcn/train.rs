//! Training the link predictor on labelled training pairs, with early stopping on validation
//! AUROC.

use std::{fs, path::Path, time::Instant};

use burn::{
    module::{AutodiffModule, Module},
    nn::loss::BinaryCrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer, decay::WeightDecayConfig},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{
        ElementConversion, Tensor, TensorData, activation,
        backend::{AutodiffBackend, Backend},
    },
};
use log::{info, warn};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{
    backend::to_vec,
    config::HoagcnConfig,
    data::DtiRecord,
    error::{Error, Result},
    hoagcn::{
        CONFIG_FILE, GRAPH_FILE, MODEL_FILE, VALID_LOG_FILE,
        graph::InteractionGraph,
        infer::{graph_tensors, node_tensors},
        model::{HoagcnModel, HoagcnModelConfig},
    },
    metrics::{BinaryMetrics, Metrics},
    report::{EpochLog, write_valid_log},
};

pub struct HoagcnTrained<B: Backend> {
    pub model: HoagcnModel<B>,
    pub config: HoagcnModelConfig,
    pub log: Vec<EpochLog>,
    pub best_epoch: usize,
}

/// Node pairs and labels of the records that are in the graph.
fn labelled_pairs(graph: &InteractionGraph, records: &[DtiRecord]) -> (Vec<(usize, usize)>, Vec<f32>) {
    let mut pairs = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());

    for r in records {
        if let Some(p) = graph.pair_nodes(&r.drug, &r.target) {
            pairs.push(p);
            labels.push(r.label);
        }
    }
    (pairs, labels)
}

fn check_binary(records: &[DtiRecord]) -> Result<()> {
    if records.iter().any(|r| r.label != 0. && r.label != 1.) {
        return Err(Error::InvalidOption(
            "HOAGCN link prediction requires binary (0/1) labels".to_owned(),
        ));
    }
    Ok(())
}

/// Trains on `train`, stopping once validation AUROC hasn't improved for `early_stopping`
/// epochs. The best epoch's model is saved to `out_dir` with its config, graph and log.
pub fn train<B: AutodiffBackend>(
    cfg: &HoagcnConfig,
    graph: &InteractionGraph,
    train: &[DtiRecord],
    valid: &[DtiRecord],
    out_dir: &Path,
    device: &B::Device,
) -> Result<HoagcnTrained<B::InnerBackend>> {
    check_binary(train)?;
    check_binary(valid)?;

    let (train_pairs, train_labels) = labelled_pairs(graph, train);
    let (valid_pairs, valid_labels) = labelled_pairs(graph, valid);

    if train_pairs.is_empty() {
        return Err(Error::Dataset("no HOAGCN training pairs".to_owned()));
    }
    if valid_pairs.is_empty() {
        warn!("No HOAGCN validation pairs; early stopping is disabled");
    }

    let start = Instant::now();
    fs::create_dir_all(out_dir)?;

    B::seed(cfg.seed);
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let model_cfg = HoagcnModelConfig::from_run(cfg, graph.num_nodes());
    let mut model = model_cfg.init::<B>(device);
    info!(
        "HOAGCN (order {}): {} nodes, {} edges, {} parameters, {} training pairs",
        cfg.order,
        graph.num_nodes(),
        graph.edges.len(),
        model.num_params(),
        train_pairs.len()
    );

    let weight_decay =
        (cfg.weight_decay > 0.).then(|| WeightDecayConfig::new(cfg.weight_decay as f32));
    let mut optim = AdamConfig::new()
        .with_weight_decay(weight_decay)
        .init::<B, HoagcnModel<B>>();

    let bce = BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .init(device);

    let (adj, features) = graph_tensors::<B>(graph, device);
    let (adj_valid, features_valid) = graph_tensors::<B::InnerBackend>(graph, device);

    let mut order: Vec<usize> = (0..train_pairs.len()).collect();
    let mut log = Vec::new();
    let mut best: Option<(usize, f32, HoagcnModel<B::InnerBackend>)> = None;
    let mut since_best = 0;

    for epoch in 1..=cfg.epochs {
        order.shuffle(&mut rng);

        let mut loss_sum = 0.;
        let mut n_batches = 0;

        for chunk in order.chunks(cfg.batch_size) {
            let pairs: Vec<(usize, usize)> = chunk.iter().map(|&i| train_pairs[i]).collect();
            let labels: Vec<f32> = chunk.iter().map(|&i| train_labels[i]).collect();

            let (d, t) = node_tensors::<B>(&pairs, device);
            let targets =
                Tensor::<B, 2>::from_data(TensorData::new(labels, [chunk.len(), 1]), device).int();

            let logits = model.forward(adj.clone(), features.clone(), d, t);
            let loss = bce.forward(logits, targets);

            loss_sum += loss.clone().into_scalar().elem::<f32>();
            n_batches += 1;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(cfg.learning_rate, model, grads);
        }
        let train_loss = loss_sum / n_batches.max(1) as f32;

        let model_valid = model.valid();
        let emb = model_valid.embed(adj_valid.clone(), features_valid.clone());

        let mut scores = Vec::with_capacity(valid_pairs.len());
        for chunk in valid_pairs.chunks(cfg.batch_size) {
            let (d, t) = node_tensors::<B::InnerBackend>(chunk, device);
            let logits = model_valid.score_pairs(emb.clone(), d, t);
            scores.extend(to_vec(activation::sigmoid(logits))?);
        }

        let metrics = BinaryMetrics::compute(&scores, &valid_labels);
        let auroc = metrics.auroc;

        let improved = match &best {
            None => true,
            Some(_) if valid_pairs.is_empty() => true,
            Some((_, b, _)) => auroc > *b || (b.is_nan() && !auroc.is_nan()),
        };

        info!(
            "HOAGCN epoch {epoch}/{}: train loss {train_loss:.4}; valid {metrics}",
            cfg.epochs
        );
        log.push(EpochLog::new(
            epoch,
            train_loss,
            &Metrics::Binary(metrics),
            improved,
        ));

        if improved {
            best = Some((epoch, auroc, model_valid));
            since_best = 0;
        } else {
            since_best += 1;
            if since_best >= cfg.early_stopping {
                info!(
                    "HOAGCN: no validation AUROC improvement in {since_best} epochs; stopping"
                );
                break;
            }
        }
    }

    let Some((best_epoch, _, best_model)) = best else {
        return Err(Error::InvalidOption("epochs must be > 0".to_owned()));
    };

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    best_model
        .clone()
        .save_file(out_dir.join(MODEL_FILE), &recorder)
        .map_err(|e| Error::Record(format!("{e:?}")))?;

    let config_file = fs::File::create(out_dir.join(CONFIG_FILE))?;
    serde_json::to_writer_pretty(config_file, &model_cfg)?;

    graph.save(&out_dir.join(GRAPH_FILE))?;
    write_valid_log(&out_dir.join(VALID_LOG_FILE), &log)?;

    info!(
        "HOAGCN training complete in {} s. Best epoch: {best_epoch}. Saved to {}",
        start.elapsed().as_secs(),
        out_dir.display()
    );

    Ok(HoagcnTrained {
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
        hoagcn::infer::HoagcnPredictor,
    };

    fn records() -> Vec<DtiRecord> {
        let mut result = Vec::new();
        for d in 0..6 {
            for t in 0..4 {
                result.push(DtiRecord {
                    drug: format!("C{}", "C".repeat(d)),
                    target: format!("M{}", "K".repeat(t)),
                    label: if d % 2 == t % 2 { 1. } else { 0. },
                });
            }
        }
        result
    }

    fn small_config() -> HoagcnConfig {
        HoagcnConfig {
            epochs: 3,
            batch_size: 8,
            early_stopping: 1,
            order: 2,
            layers_1: 4,
            layers_2: 4,
            hidden_1: 8,
            hidden_2: 4,
            dropout: 0.1,
            ..Default::default()
        }
    }

    #[test]
    fn trains_saves_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();

        let recs = records();
        let (train_recs, valid_recs) = recs.split_at(18);
        let graph = InteractionGraph::from_records(&recs, train_recs).unwrap();

        let cfg = small_config();
        let trained = train::<CpuTrainBackend>(
            &cfg,
            &graph,
            train_recs,
            valid_recs,
            dir.path(),
            &device,
        )
        .unwrap();

        assert!(!trained.log.is_empty() && trained.log.len() <= 3);
        assert!(trained.best_epoch <= trained.log.len());
        for f in [MODEL_FILE, CONFIG_FILE, GRAPH_FILE, VALID_LOG_FILE] {
            assert!(dir.path().join(f).exists(), "{f}");
        }

        let in_memory = HoagcnPredictor::new(
            trained.model,
            trained.config,
            graph.clone(),
            8,
            device,
        );
        let loaded = HoagcnPredictor::<CpuBackend>::load(dir.path(), 8, device).unwrap();

        let a = in_memory.predict(valid_recs).unwrap();
        let b = loaded.predict(valid_recs).unwrap();
        for (a, b) in a.iter().zip(&b) {
            assert!((a.unwrap() - b.unwrap()).abs() < 1e-5);
        }
    }

    #[test]
    fn stops_after_patience_without_improvement() {
        let recs = records();
        let graph = InteractionGraph::from_records(&recs, &recs).unwrap();
        // One class only: validation AUROC is undefined every epoch, so only the first counts.
        let negatives: Vec<DtiRecord> = recs.iter().filter(|r| r.label == 0.).cloned().collect();

        for patience in [1, 3] {
            let dir = tempfile::tempdir().unwrap();
            let cfg = HoagcnConfig {
                epochs: 10,
                early_stopping: patience,
                ..small_config()
            };
            let trained = train::<CpuTrainBackend>(
                &cfg,
                &graph,
                &recs,
                &negatives,
                dir.path(),
                &Default::default(),
            )
            .unwrap();

            assert_eq!(trained.log.len(), patience + 1, "patience {patience}");
            assert_eq!(trained.best_epoch, 1);
        }
    }

    #[test]
    fn continuous_labels_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut recs = records();
        recs[0].label = 5.2;
        let graph = InteractionGraph::from_records(&recs, &recs).unwrap();

        let res = train::<CpuTrainBackend>(
            &small_config(),
            &graph,
            &recs,
            &recs,
            dir.path(),
            &Default::default(),
        );
        assert!(matches!(res, Err(Error::InvalidOption(_))));
    }
}
