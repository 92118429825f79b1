//! Loading drug-target interaction benchmarks into flat `(SMILES, sequence, label)` records.
//!
//! DAVIS and KIBA use the DeepDTA layout: `SMILES.txt` and `target_seq.txt` are JSON objects
//! (id -> string; file order is significant), and `affinity.txt` is a drug x target matrix.
//! Other data can be supplied as a CSV with `smiles`, `sequence` and `label` columns.

use std::{
    collections::HashSet,
    fmt::Display,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DAVIS_THRESHOLD_NM: f32 = 30.;
pub const KIBA_THRESHOLD: f32 = 9.;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Davis,
    Kiba,
    Csv,
}

impl DatasetKind {
    pub fn default_threshold(self) -> f32 {
        match self {
            Self::Kiba => KIBA_THRESHOLD,
            _ => DAVIS_THRESHOLD_NM,
        }
    }
}

impl FromStr for DatasetKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "davis" => Ok(Self::Davis),
            "kiba" => Ok(Self::Kiba),
            "csv" => Ok(Self::Csv),
            _ => Err(Error::InvalidOption(format!("unknown dataset `{s}`"))),
        }
    }
}

impl Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = match self {
            Self::Davis => "davis",
            Self::Kiba => "kiba",
            Self::Csv => "csv",
        };
        write!(f, "{v}")
    }
}

/// One drug-target pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DtiRecord {
    /// SMILES.
    pub drug: String,
    /// Amino acid sequence.
    pub target: String,
    pub label: f32,
}

#[derive(Clone, Debug, Default)]
pub struct DtiDataset {
    pub records: Vec<DtiRecord>,
    /// True if labels are 0/1 interaction flags rather than affinities.
    pub binary: bool,
}

impl DtiDataset {
    /// Unique drugs, in first-seen order.
    pub fn drugs(&self) -> Vec<String> {
        unique_in_order(self.records.iter().map(|r| r.drug.as_str()))
    }

    /// Unique targets, in first-seen order.
    pub fn targets(&self) -> Vec<String> {
        unique_in_order(self.records.iter().map(|r| r.target.as_str()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub(crate) fn unique_in_order<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut result = Vec::new();
    for item in items {
        if seen.insert(item) {
            result.push(item.to_owned());
        }
    }
    result
}

/// nM to p-units (e.g. Kd to pKd). The offset keeps zero affinities finite.
pub fn convert_y_unit(nm: f32) -> f32 {
    -((nm as f64) * 1e-9 + 1e-10).log10() as f32
}

/// A pair interacts when its raw affinity value is below the threshold.
pub fn binarize(raw: f32, threshold: f32) -> f32 {
    if raw < threshold { 1. } else { 0. }
}

/// Reads a JSON object of id -> string, keeping file order.
fn read_json_values(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)?;
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&text)?;

    map.into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => Ok(s),
            _ => Err(Error::Dataset(format!(
                "{}: value for `{k}` is not a string",
                path.display()
            ))),
        })
        .collect()
}

/// Parses an affinity matrix. Missing cells (empty, `nan`) are `None`.
fn read_affinity(path: &Path, sep: char, n_rows: usize, n_cols: usize) -> Result<Vec<Vec<Option<f32>>>> {
    let text = fs::read_to_string(path)?;

    let mut rows = Vec::with_capacity(n_rows);
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let cells: Vec<&str> = if sep == ' ' {
            line.split_whitespace().collect()
        } else {
            line.trim_end_matches(['\r', '\n']).split(sep).collect()
        };

        let mut row = Vec::with_capacity(cells.len());
        for cell in cells {
            let cell = cell.trim();
            if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
                row.push(None);
                continue;
            }
            let v: f32 = cell.parse().map_err(|_| {
                Error::Dataset(format!(
                    "{}: non-numeric cell `{cell}` on line {}",
                    path.display(),
                    i + 1
                ))
            })?;
            row.push(if v.is_nan() { None } else { Some(v) });
        }

        if row.len() != n_cols {
            return Err(Error::Dataset(format!(
                "{}: line {} has {} columns; expected {n_cols} (one per target)",
                path.display(),
                i + 1,
                row.len()
            )));
        }
        rows.push(row);
    }

    if rows.len() != n_rows {
        return Err(Error::Dataset(format!(
            "{}: {} rows; expected {n_rows} (one per drug)",
            path.display(),
            rows.len()
        )));
    }

    Ok(rows)
}

fn load_matrix_dataset(
    dir: &Path,
    sep: char,
    mut label: impl FnMut(f32) -> f32,
    binary: bool,
) -> Result<DtiDataset> {
    let drugs = read_json_values(&dir.join("SMILES.txt"))?;
    let targets = read_json_values(&dir.join("target_seq.txt"))?;
    let affinity = read_affinity(&dir.join("affinity.txt"), sep, drugs.len(), targets.len())?;

    let mut records = Vec::with_capacity(drugs.len() * targets.len());
    for (drug, row) in drugs.iter().zip(&affinity) {
        for (target, cell) in targets.iter().zip(row) {
            let Some(v) = cell else {
                continue;
            };
            records.push(DtiRecord {
                drug: drug.clone(),
                target: target.clone(),
                label: label(*v),
            });
        }
    }

    if records.is_empty() {
        return Err(Error::Dataset(format!("{}: no records", dir.display())));
    }

    info!(
        "Loaded {} pairs ({} drugs, {} targets) from {}",
        records.len(),
        drugs.len(),
        targets.len(),
        dir.display()
    );

    Ok(DtiDataset { records, binary })
}

/// DAVIS (Kd in nM). Labels are binarized against `threshold`, or converted to pKd.
pub fn load_process_davis(
    path: &Path,
    binary: bool,
    convert_to_log: bool,
    threshold: f32,
) -> Result<DtiDataset> {
    let dir = path.join("DAVIS");
    load_matrix_dataset(
        &dir,
        ' ',
        |v| {
            if binary {
                binarize(v, threshold)
            } else if convert_to_log {
                convert_y_unit(v)
            } else {
                v
            }
        },
        binary,
    )
}

/// KIBA scores. These are already on a log-like scale, so no unit conversion applies.
pub fn load_process_kiba(path: &Path, binary: bool, threshold: f32) -> Result<DtiDataset> {
    let dir = path.join("KIBA");
    load_matrix_dataset(
        &dir,
        '\t',
        |v| if binary { binarize(v, threshold) } else { v },
        binary,
    )
}

#[derive(Debug, Deserialize)]
struct PairRow {
    smiles: String,
    sequence: String,
    label: f32,
}

/// Loads pairs from a CSV with (at least) `smiles`, `sequence` and `label` columns.
///
/// With `binary`, labels must already be 0 or 1.
pub fn load_pairs_csv(path: &Path, binary: bool) -> Result<DtiDataset> {
    let mut rdr = csv::Reader::from_path(path)?;

    let mut records = Vec::new();
    for (i, row) in rdr.deserialize::<PairRow>().enumerate() {
        let row = row?;
        if binary && row.label != 0. && row.label != 1. {
            return Err(Error::Dataset(format!(
                "{}: record {i} has label {} but binary labels are required",
                path.display(),
                row.label
            )));
        }
        records.push(DtiRecord {
            drug: row.smiles.trim().to_owned(),
            target: row.sequence.trim().to_owned(),
            label: row.label,
        });
    }

    if records.is_empty() {
        return Err(Error::Dataset(format!("{}: no records", path.display())));
    }

    info!("Loaded {} pairs from {}", records.len(), path.display());
    Ok(DtiDataset { records, binary })
}

/// Loads the dataset named by the data section of a run config.
pub fn load(cfg: &crate::config::DataConfig) -> Result<DtiDataset> {
    let path = PathBuf::from(&cfg.path);
    let threshold = cfg
        .threshold
        .unwrap_or_else(|| cfg.dataset.default_threshold());

    match cfg.dataset {
        DatasetKind::Davis => load_process_davis(&path, cfg.binary, cfg.convert_to_log, threshold),
        DatasetKind::Kiba => load_process_kiba(&path, cfg.binary, threshold),
        DatasetKind::Csv => load_pairs_csv(&path, cfg.binary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_matrix_set(root: &Path, name: &str, affinity: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        // Keys deliberately out of lexical order; file order must win.
        fs::write(dir.join("SMILES.txt"), r#"{"d2": "CCO", "d1": "c1ccccc1"}"#).unwrap();
        fs::write(
            dir.join("target_seq.txt"),
            r#"{"t9": "MKV", "t1": "MSA", "t5": "GGA"}"#,
        )
        .unwrap();
        fs::write(dir.join("affinity.txt"), affinity).unwrap();
    }

    #[test]
    fn unit_conversion() {
        assert!((convert_y_unit(10_000.) - 5.).abs() < 1e-4);
        assert!((convert_y_unit(1.) - 8.9586).abs() < 1e-3);
        assert!(convert_y_unit(0.).is_finite());
    }

    #[test]
    fn davis_binary() {
        let dir = tempfile::tempdir().unwrap();
        write_matrix_set(dir.path(), "DAVIS", "10000 5 29.9\n30 1 10000\n");

        let ds = load_process_davis(dir.path(), true, true, 30.).unwrap();
        assert!(ds.binary);
        assert_eq!(ds.len(), 6);
        assert_eq!(ds.records[0].drug, "CCO");
        assert_eq!(ds.records[0].target, "MKV");
        let labels: Vec<f32> = ds.records.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![0., 1., 1., 0., 1., 0.]);
        assert_eq!(ds.drugs(), vec!["CCO", "c1ccccc1"]);
        assert_eq!(ds.targets(), vec!["MKV", "MSA", "GGA"]);
    }

    #[test]
    fn davis_log() {
        let dir = tempfile::tempdir().unwrap();
        write_matrix_set(dir.path(), "DAVIS", "10000 10000 10000\n10000 10000 1\n");

        let ds = load_process_davis(dir.path(), false, true, 30.).unwrap();
        assert!(!ds.binary);
        assert!((ds.records[0].label - 5.).abs() < 1e-4);
        assert!((ds.records[5].label - 8.9586).abs() < 1e-3);
    }

    #[test]
    fn kiba_skips_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_matrix_set(dir.path(), "KIBA", "11.1\t\t8.5\nnan\t12.0\t9.0\n");

        let ds = load_process_kiba(dir.path(), true, 9.).unwrap();
        assert_eq!(ds.len(), 4);
        let labels: Vec<f32> = ds.records.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![0., 1., 0., 0.]);
    }

    #[test]
    fn matrix_shape_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        write_matrix_set(dir.path(), "DAVIS", "1 2\n3 4\n");
        assert!(matches!(
            load_process_davis(dir.path(), true, true, 30.),
            Err(Error::Dataset(_))
        ));
    }

    #[test]
    fn pairs_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        fs::write(
            &path,
            "id,smiles,sequence,label\n0,CCO,MKV,1\n1,CCN,MSA,0\n",
        )
        .unwrap();

        let ds = load_pairs_csv(&path, true).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records[1].drug, "CCN");

        fs::write(&path, "smiles,sequence,label\nCCO,MKV,0.4\n").unwrap();
        assert!(load_pairs_csv(&path, true).is_err());
        assert!(load_pairs_csv(&path, false).is_ok());
    }
}
