//! Files written to a result folder: per-epoch validation logs, metrics, predictions and the
//! config the run used.

use std::{fs, path::Path};

use log::info;
use serde::Serialize;

use crate::{
    config::RunConfig,
    data::DtiRecord,
    ensemble::Ensemble,
    error::{Error, Result},
    metrics::Metrics,
};

pub const METRICS_FILE: &str = "metrics.json";
pub const ENSEMBLE_FILE: &str = "ensemble.json";
pub const PREDICTIONS_FILE: &str = "predictions.csv";
pub const RUN_CONFIG_FILE: &str = "run_config.toml";

/// One row of `valid_log.csv`. Columns of the other task are left empty.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpochLog {
    pub epoch: usize,
    pub train_loss: f32,
    pub valid_auroc: Option<f32>,
    pub valid_auprc: Option<f32>,
    pub valid_log_loss: Option<f32>,
    pub valid_mse: Option<f32>,
    pub valid_pearson: Option<f32>,
    pub valid_ci: Option<f32>,
    /// This epoch's model was the best so far.
    pub best: bool,
}

impl EpochLog {
    pub fn new(epoch: usize, train_loss: f32, metrics: &Metrics, best: bool) -> Self {
        let mut result = Self {
            epoch,
            train_loss,
            valid_auroc: None,
            valid_auprc: None,
            valid_log_loss: None,
            valid_mse: None,
            valid_pearson: None,
            valid_ci: None,
            best,
        };

        match metrics {
            Metrics::Binary(m) => {
                result.valid_auroc = Some(m.auroc);
                result.valid_auprc = Some(m.auprc);
                result.valid_log_loss = Some(m.log_loss);
            }
            Metrics::Regression(m) => {
                result.valid_mse = Some(m.mse);
                result.valid_pearson = Some(m.pearson);
                result.valid_ci = Some(m.ci);
            }
        }
        result
    }
}

pub fn write_valid_log(path: &Path, log: &[EpochLog]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in log {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Validation and test metrics of one model.
#[derive(Clone, Debug, Serialize)]
pub struct ModelReport {
    pub valid: Metrics,
    pub test: Metrics,
    /// `None` for the ensemble, which isn't trained by epoch.
    pub best_epoch: Option<usize>,
}

/// Contents of `metrics.json`. Models that didn't run are absent.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdn: Option<ModelReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hoagcn: Option<ModelReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensemble: Option<ModelReport>,
}

impl RunReport {
    /// Logs a test metrics table, one line per model.
    pub fn log_table(&self) {
        info!("Test metrics:");
        for (name, report) in [
            ("HDN", &self.hdn),
            ("HOAGCN", &self.hoagcn),
            ("Ensemble", &self.ensemble),
        ] {
            if let Some(r) = report {
                info!("  {name:<9} {}", r.test);
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

pub fn save_ensemble(path: &Path, ensemble: &Ensemble) -> Result<()> {
    let file = fs::File::create(path)?;
    serde_json::to_writer_pretty(file, ensemble)?;
    Ok(())
}

pub fn load_ensemble(path: &Path) -> Result<Ensemble> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn save_run_config(path: &Path, cfg: &RunConfig) -> Result<()> {
    cfg.save(path)
}

/// One row of a predictions file. Scores a model couldn't produce are left empty.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictionRow<'a> {
    /// `valid`, `test`, or empty for `predict` runs.
    pub split: &'a str,
    pub smiles: &'a str,
    pub sequence: &'a str,
    pub label: Option<f32>,
    pub hdn: Option<f32>,
    pub hoagcn: Option<f32>,
    pub ensemble: Option<f32>,
}

/// Per-model scores for a list of records, aligned with it.
#[derive(Clone, Debug, Default)]
pub struct Scores {
    pub hdn: Vec<Option<f32>>,
    pub hoagcn: Vec<Option<f32>>,
    pub ensemble: Vec<Option<f32>>,
}

impl Scores {
    fn check_len(&self, n: usize) -> Result<()> {
        for (name, v) in [
            ("HDN", &self.hdn),
            ("HOAGCN", &self.hoagcn),
            ("ensemble", &self.ensemble),
        ] {
            if !v.is_empty() && v.len() != n {
                return Err(Error::Tensor(format!(
                    "{} {name} scores for {n} records",
                    v.len()
                )));
            }
        }
        Ok(())
    }
}

/// Writes predictions for one or more record sets. `with_labels` controls whether the label
/// column is filled.
pub fn write_predictions(
    path: &Path,
    parts: &[(&str, &[DtiRecord], &Scores)],
    with_labels: bool,
) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    for &(split, records, scores) in parts {
        scores.check_len(records.len())?;
        let get = |v: &[Option<f32>], i: usize| v.get(i).copied().flatten();

        for (i, r) in records.iter().enumerate() {
            wtr.serialize(PredictionRow {
                split,
                smiles: &r.drug,
                sequence: &r.target,
                label: with_labels.then_some(r.label),
                hdn: get(&scores.hdn, i),
                hoagcn: get(&scores.hoagcn, i),
                ensemble: get(&scores.ensemble, i),
            })?;
        }
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ensemble::EnsembleStrategy,
        metrics::{BinaryMetrics, RegressionMetrics},
    };

    #[test]
    fn valid_log_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("valid_log.csv");

        let binary = Metrics::Binary(BinaryMetrics::compute(&[0.9, 0.2], &[1., 0.]));
        let regression = Metrics::Regression(RegressionMetrics::compute(&[5., 6.], &[5., 7.]));

        let log = vec![
            EpochLog::new(1, 0.7, &binary, true),
            EpochLog::new(2, 0.5, &regression, false),
        ];
        write_valid_log(&path, &log).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "epoch,train_loss,valid_auroc,valid_auprc,valid_log_loss,valid_mse,valid_pearson,valid_ci,best"
        );
        assert!(lines.next().unwrap().starts_with("1,0.7,1.0,1.0,"));
        assert!(lines.next().unwrap().starts_with("2,0.5,,,,0.5,"));
    }

    #[test]
    fn predictions_leave_missing_scores_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PREDICTIONS_FILE);

        let records = vec![
            DtiRecord {
                drug: "CCO".into(),
                target: "MKV".into(),
                label: 1.,
            },
            DtiRecord {
                drug: "CCN".into(),
                target: "MKV".into(),
                label: 0.,
            },
        ];
        let scores = Scores {
            hdn: vec![Some(0.8), Some(0.1)],
            hoagcn: vec![Some(0.6), None],
            ensemble: vec![Some(0.7), Some(0.1)],
        };

        write_predictions(&path, &[("test", records.as_slice(), &scores)], true).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "split,smiles,sequence,label,hdn,hoagcn,ensemble");
        assert_eq!(lines[1], "test,CCO,MKV,1.0,0.8,0.6,0.7");
        assert_eq!(lines[2], "test,CCN,MKV,0.0,0.1,,0.1");
    }

    #[test]
    fn misaligned_scores_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![DtiRecord {
            drug: "C".into(),
            target: "M".into(),
            label: 0.,
        }];
        let scores = Scores {
            hdn: vec![Some(0.1), Some(0.2)],
            ..Default::default()
        };

        let res = write_predictions(&dir.path().join("p.csv"), &[("", records.as_slice(), &scores)], false);
        assert!(res.is_err());
    }

    #[test]
    fn ensemble_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ENSEMBLE_FILE);

        let ens = Ensemble {
            strategy: EnsembleStrategy::Tuned,
            hoagcn_weight: 0.35,
            valid_auroc: 0.9,
        };
        save_ensemble(&path, &ens).unwrap();
        assert_eq!(load_ensemble(&path).unwrap(), ens);

        let undefined = Ensemble {
            valid_auroc: f32::NAN,
            ..ens
        };
        save_ensemble(&path, &undefined).unwrap();
        assert!(load_ensemble(&path).unwrap().valid_auroc.is_nan());
    }
}
