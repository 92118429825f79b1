//! End-to-end runs: load and split the data, train the models, combine their scores and write
//! the result folder. Also reloads a result folder to score new pairs.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use burn::tensor::backend::AutodiffBackend;
use log::{info, warn};
use serde::Deserialize;

#[cfg(feature = "gpu")]
use crate::backend::{GpuTrainBackend, gpu_device};
use crate::{
    backend::{CpuBackend, CpuTrainBackend, cpu_device, use_gpu},
    config::RunConfig,
    data::{self, DtiRecord},
    encoding::FeatureCache,
    ensemble::Ensemble,
    error::{Error, Result},
    hdn::{self, HdnPredictor, batch::items_from_records},
    hoagcn::{self, HoagcnPredictor, InteractionGraph},
    metrics::Metrics,
    report::{
        self, ENSEMBLE_FILE, METRICS_FILE, ModelReport, PREDICTIONS_FILE, RUN_CONFIG_FILE,
        RunReport, Scores,
    },
    split::{Split, split},
};

pub const HDN_DIR: &str = "hdn";
pub const HOAGCN_DIR: &str = "hoagcn";

/// Which models a run trains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Models {
    /// Both models and the ensemble.
    All,
    Hoagcn,
    Hdn,
}

impl Models {
    fn hdn(self) -> bool {
        matches!(self, Self::All | Self::Hdn)
    }

    fn hoagcn(self) -> bool {
        matches!(self, Self::All | Self::Hoagcn)
    }
}

/// Metrics over the records a model produced a score for.
fn scored_metrics(scores: &[Option<f32>], records: &[DtiRecord], binary: bool) -> Metrics {
    let (s, l): (Vec<f32>, Vec<f32>) = scores
        .iter()
        .zip(records)
        .filter_map(|(s, r)| s.map(|s| (s, r.label)))
        .unzip();
    Metrics::compute(&s, &l, binary)
}

/// Validation and test scores of one model.
struct SplitScores {
    valid: Vec<Option<f32>>,
    test: Vec<Option<f32>>,
}

impl SplitScores {
    fn report(&self, split: &Split, binary: bool, best_epoch: Option<usize>) -> ModelReport {
        ModelReport {
            valid: scored_metrics(&self.valid, &split.valid, binary),
            test: scored_metrics(&self.test, &split.test, binary),
            best_epoch,
        }
    }
}

fn run_hdn<B: AutodiffBackend>(
    cfg: &RunConfig,
    drugs: &[String],
    targets: &[String],
    split: &Split,
    binary: bool,
    out_dir: &Path,
    device: &B::Device,
) -> Result<(SplitScores, usize)> {
    let cache = FeatureCache::build(drugs, targets, cfg.hdn.drug_encoding, cfg.hdn.target_encoding);

    let (train_items, dropped_train) = items_from_records(&split.train, &cache);
    let (valid_items, dropped_valid) = items_from_records(&split.valid, &cache);
    if dropped_train + dropped_valid > 0 {
        warn!(
            "HDN: dropped {dropped_train} training and {dropped_valid} validation pairs whose drug \
             couldn't be featurized"
        );
    }

    let trained = hdn::train::<B>(&cfg.hdn, binary, &train_items, &valid_items, out_dir, device)?;
    let predictor = HdnPredictor::new(
        trained.model,
        trained.config,
        cfg.hdn.batch_size,
        device.clone(),
    );

    let scores = SplitScores {
        valid: predictor.predict(&split.valid)?,
        test: predictor.predict(&split.test)?,
    };
    Ok((scores, trained.best_epoch))
}

fn run_hoagcn<B: AutodiffBackend>(
    cfg: &RunConfig,
    records: &[DtiRecord],
    split: &Split,
    out_dir: &Path,
    device: &B::Device,
) -> Result<(SplitScores, usize)> {
    let graph = InteractionGraph::from_records(records, &split.train)?;

    let trained = hoagcn::train::<B>(
        &cfg.hoagcn,
        &graph,
        &split.train,
        &split.valid,
        out_dir,
        device,
    )?;
    let predictor = HoagcnPredictor::new(
        trained.model,
        trained.config,
        graph,
        cfg.hoagcn.batch_size,
        device.clone(),
    );

    let scores = SplitScores {
        valid: predictor.predict(&split.valid)?,
        test: predictor.predict(&split.test)?,
    };
    Ok((scores, trained.best_epoch))
}

/// Fits the ensemble on validation pairs that both models scored.
fn fit_ensemble(
    cfg: &RunConfig,
    hoagcn: &[Option<f32>],
    hdn: &[Option<f32>],
    valid: &[DtiRecord],
) -> Result<Ensemble> {
    let mut g = Vec::new();
    let mut h = Vec::new();
    let mut labels = Vec::new();

    for ((&gs, &hs), r) in hoagcn.iter().zip(hdn).zip(valid) {
        if let Some(hs) = hs {
            g.push(gs);
            h.push(hs);
            labels.push(r.label);
        }
    }

    Ensemble::fit(&cfg.ensemble, &g, &h, &labels)
}

fn run_on<B: AutodiffBackend>(
    cfg: &RunConfig,
    result_dir: &Path,
    models: Models,
    device: &B::Device,
) -> Result<RunReport> {
    let start = Instant::now();

    let dataset = data::load(&cfg.data)?;
    let binary = dataset.binary;

    let split = split(
        &dataset.records,
        cfg.data.split_method,
        cfg.data.frac,
        cfg.data.random_seed,
    )?;
    info!(
        "{} split: {} train, {} valid, {} test",
        cfg.data.split_method,
        split.train.len(),
        split.valid.len(),
        split.test.len()
    );

    fs::create_dir_all(result_dir)?;
    report::save_run_config(&result_dir.join(RUN_CONFIG_FILE), cfg)?;

    let mut run_report = RunReport::default();

    let hdn_scores = if models.hdn() {
        let (scores, best_epoch) = run_hdn::<B>(
            cfg,
            &dataset.drugs(),
            &dataset.targets(),
            &split,
            binary,
            &result_dir.join(HDN_DIR),
            device,
        )?;
        run_report.hdn = Some(scores.report(&split, binary, Some(best_epoch)));
        Some(scores)
    } else {
        None
    };

    let hoagcn_scores = if models.hoagcn() {
        if binary {
            let (scores, best_epoch) = run_hoagcn::<B>(
                cfg,
                &dataset.records,
                &split,
                &result_dir.join(HOAGCN_DIR),
                device,
            )?;
            run_report.hoagcn = Some(scores.report(&split, binary, Some(best_epoch)));
            Some(scores)
        } else if models == Models::Hoagcn {
            return Err(Error::InvalidOption(
                "HOAGCN needs binary labels; set `binary = true` in the data config".to_owned(),
            ));
        } else {
            warn!("Labels are continuous; skipping HOAGCN and the ensemble");
            None
        }
    } else {
        None
    };

    let mut ensemble_scores = None;
    if let (Some(g), Some(h)) = (&hoagcn_scores, &hdn_scores) {
        let ensemble = fit_ensemble(cfg, &g.valid, &h.valid, &split.valid)?;
        report::save_ensemble(&result_dir.join(ENSEMBLE_FILE), &ensemble)?;

        let scores = SplitScores {
            valid: ensemble.apply_partial(&g.valid, &h.valid),
            test: ensemble.apply_partial(&g.test, &h.test),
        };
        run_report.ensemble = Some(scores.report(&split, binary, None));
        ensemble_scores = Some(scores);
    }

    let pick = |s: &Option<SplitScores>, valid: bool| {
        s.as_ref()
            .map(|s| if valid { s.valid.clone() } else { s.test.clone() })
            .unwrap_or_default()
    };
    let valid = Scores {
        hdn: pick(&hdn_scores, true),
        hoagcn: pick(&hoagcn_scores, true),
        ensemble: pick(&ensemble_scores, true),
    };
    let test = Scores {
        hdn: pick(&hdn_scores, false),
        hoagcn: pick(&hoagcn_scores, false),
        ensemble: pick(&ensemble_scores, false),
    };
    report::write_predictions(
        &result_dir.join(PREDICTIONS_FILE),
        &[
            ("valid", split.valid.as_slice(), &valid),
            ("test", split.test.as_slice(), &test),
        ],
        true,
    )?;

    run_report.save(&result_dir.join(METRICS_FILE))?;
    run_report.log_table();

    info!(
        "Run complete in {} s. Results saved to {}",
        start.elapsed().as_secs(),
        result_dir.display()
    );
    Ok(run_report)
}

/// Trains the selected models and writes the result folder. Runs on the GPU backend when
/// `hoagcn.cuda` is set and the crate has the `gpu` feature.
pub fn run(cfg: &RunConfig, result_dir: &Path, models: Models) -> Result<RunReport> {
    cfg.validate()?;

    if use_gpu(cfg.hoagcn.cuda) {
        #[cfg(feature = "gpu")]
        {
            return run_on::<GpuTrainBackend>(cfg, result_dir, models, &gpu_device());
        }
    }
    run_on::<CpuTrainBackend>(cfg, result_dir, models, &cpu_device())
}

#[derive(Debug, Deserialize)]
struct QueryRow {
    smiles: String,
    sequence: String,
    #[serde(default)]
    label: Option<f32>,
}

/// Reads `smiles,sequence[,label]` rows. Labels are used only if every row has one.
pub fn read_query_pairs(path: &Path) -> Result<(Vec<DtiRecord>, bool)> {
    let mut rdr = csv::Reader::from_path(path)?;

    let mut records = Vec::new();
    let mut labelled = true;
    for row in rdr.deserialize::<QueryRow>() {
        let row = row?;
        labelled &= row.label.is_some();
        records.push(DtiRecord {
            drug: row.smiles.trim().to_owned(),
            target: row.sequence.trim().to_owned(),
            label: row.label.unwrap_or(f32::NAN),
        });
    }

    if records.is_empty() {
        return Err(Error::Dataset(format!("{}: no pairs", path.display())));
    }
    Ok((records, labelled))
}

/// Scores the pairs of `input` with the models saved in `result_dir`, writing `output`. Pairs
/// the link predictor has no nodes for keep the classifier's score.
pub fn predict(result_dir: &Path, input: &Path, output: &Path, batch_size: usize) -> Result<Scores> {
    let device = cpu_device();
    let (records, labelled) = read_query_pairs(input)?;

    let hdn_dir: PathBuf = result_dir.join(HDN_DIR);
    let hoagcn_dir: PathBuf = result_dir.join(HOAGCN_DIR);

    let mut scores = Scores::default();
    let mut binary = true;

    if hdn_dir.join(hdn::CONFIG_FILE).exists() {
        let predictor = HdnPredictor::<CpuBackend>::load(&hdn_dir, batch_size, device)?;
        binary = predictor.config.binary;
        scores.hdn = predictor.predict(&records)?;
    }
    if hoagcn_dir.join(hoagcn::CONFIG_FILE).exists() {
        let predictor = HoagcnPredictor::<CpuBackend>::load(&hoagcn_dir, batch_size, device)?;
        scores.hoagcn = predictor.predict(&records)?;

        let unknown = scores.hoagcn.iter().filter(|s| s.is_none()).count();
        if unknown > 0 {
            info!("{unknown} pairs have a drug or target outside the interaction graph");
        }
    }

    if scores.hdn.is_empty() && scores.hoagcn.is_empty() {
        return Err(Error::Dataset(format!(
            "no trained models in {}",
            result_dir.display()
        )));
    }

    let ensemble_path = result_dir.join(ENSEMBLE_FILE);
    if ensemble_path.exists() && !scores.hdn.is_empty() && !scores.hoagcn.is_empty() {
        let ensemble = report::load_ensemble(&ensemble_path)?;
        scores.ensemble = ensemble.apply_partial(&scores.hoagcn, &scores.hdn);
    }

    if labelled {
        for (name, s) in [
            ("HDN", &scores.hdn),
            ("HOAGCN", &scores.hoagcn),
            ("Ensemble", &scores.ensemble),
        ] {
            if !s.is_empty() {
                info!("  {name:<9} {}", scored_metrics(s, &records, binary));
            }
        }
    }

    report::write_predictions(output, &[("", records.as_slice(), &scores)], labelled)?;
    info!("Scored {} pairs. Saved to {}", records.len(), output.display());

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_with_and_without_labels() {
        let dir = tempfile::tempdir().unwrap();

        let path = dir.path().join("a.csv");
        fs::write(&path, "smiles,sequence,label\nCCO,MKV,1\nCCN,MSA,0\n").unwrap();
        let (recs, labelled) = read_query_pairs(&path).unwrap();
        assert!(labelled);
        assert_eq!(recs[1].drug, "CCN");
        assert_eq!(recs[1].label, 0.);

        let path = dir.path().join("b.csv");
        fs::write(&path, "smiles,sequence\nCCO,MKV\n").unwrap();
        let (recs, labelled) = read_query_pairs(&path).unwrap();
        assert!(!labelled);
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn metrics_skip_unscored_pairs() {
        let records: Vec<DtiRecord> = [1., 0., 1.]
            .iter()
            .map(|&label| DtiRecord {
                drug: "C".into(),
                target: "M".into(),
                label,
            })
            .collect();

        let m = scored_metrics(&[Some(0.9), Some(0.1), None], &records, true);
        match m {
            Metrics::Binary(m) => {
                assert_eq!(m.n, 2);
                assert_eq!(m.auroc, 1.);
            }
            Metrics::Regression(_) => panic!("expected binary metrics"),
        }
    }

    #[test]
    fn empty_folder_has_no_models() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("pairs.csv");
        fs::write(&input, "smiles,sequence\nCCO,MKV\n").unwrap();

        let res = predict(dir.path(), &input, &dir.path().join("out.csv"), 16);
        assert!(matches!(res, Err(Error::Dataset(_))));
    }
}
