//! Run configuration, loaded from a TOML file such as `mindg.toml`. Every key is optional; missing
//! keys keep their default. CLI flags are applied on top of the loaded file.
//!
//! Example:
//! ```toml
//! [data]
//! dataset = "davis"
//! path = "./data"
//!
//! [hoagcn]
//! order = 3
//! epochs = 100
//!
//! [hdn]
//! drug_encoding = "Transformer"
//! target_encoding = "CNN"
//! cls_hidden_dims = [1024, 1024, 512]
//! LR = 0.001
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    data::DatasetKind,
    encoding::{DrugEncoding, TargetEncoding, protein::MAX_SEQ_PROTEIN, smiles::MAX_SEQ_DRUG},
    ensemble::EnsembleStrategy,
    error::{Error, Result},
    split::SplitMethod,
};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub data: DataConfig,
    pub hoagcn: HoagcnConfig,
    pub hdn: HdnConfig,
    pub ensemble: EnsembleConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataConfig {
    pub dataset: DatasetKind,
    /// Root folder; DAVIS and KIBA are read from `<path>/DAVIS` and `<path>/KIBA`. For
    /// `csv`, the pair file itself.
    pub path: String,
    pub binary: bool,
    pub convert_to_log: bool,
    /// nM for DAVIS, KIBA score for KIBA. `None` uses the dataset's default.
    pub threshold: Option<f32>,
    pub split_method: SplitMethod,
    /// Train, validation, test.
    pub frac: [f32; 3],
    pub random_seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetKind::Davis,
            path: "./data".to_owned(),
            binary: true,
            convert_to_log: true,
            threshold: None,
            split_method: SplitMethod::Random,
            frac: [0.7, 0.1, 0.2],
            random_seed: 1,
        }
    }
}

/// Options of the higher-order GCN link predictor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HoagcnConfig {
    pub seed: u64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Number of epochs without a validation AUROC improvement before training stops.
    pub early_stopping: usize,
    pub learning_rate: f64,
    pub dropout: f64,
    /// Highest adjacency power used by the multi-scale layers.
    pub order: usize,
    pub cuda: bool,
    /// Filters per order in the first (sparse feature) layer block.
    pub layers_1: usize,
    /// Filters per order in the second layer block.
    pub layers_2: usize,
    pub hidden_1: usize,
    pub hidden_2: usize,
    pub weight_decay: f64,
}

impl Default for HoagcnConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            epochs: 50,
            batch_size: 256,
            early_stopping: 10,
            learning_rate: 0.01,
            dropout: 0.5,
            order: 4,
            cuda: false,
            layers_1: 32,
            layers_2: 32,
            hidden_1: 64,
            hidden_2: 32,
            weight_decay: 0.0,
        }
    }
}

/// Options of the drug/target sequence classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HdnConfig {
    pub drug_encoding: DrugEncoding,
    pub target_encoding: TargetEncoding,
    pub cls_hidden_dims: Vec<usize>,
    pub train_epoch: usize,
    #[serde(rename = "LR")]
    pub lr: f64,
    pub batch_size: usize,
    pub hidden_dim_drug: usize,
    pub hidden_dim_protein: usize,
    pub mpnn_hidden_size: usize,
    pub mpnn_depth: usize,
    pub cnn_drug_filters: Vec<usize>,
    pub cnn_drug_kernels: Vec<usize>,
    pub cnn_target_filters: Vec<usize>,
    pub cnn_target_kernels: Vec<usize>,
    pub transformer_emb_size_drug: usize,
    pub transformer_intermediate_size_drug: usize,
    pub transformer_num_attention_heads_drug: usize,
    pub transformer_n_layer_drug: usize,
    pub transformer_dropout_rate: f64,
    pub mlp_hidden_dims_target: Vec<usize>,
    pub dropout: f64,
    /// Adam weight decay.
    pub decay: f64,
    pub seed: u64,
}

impl Default for HdnConfig {
    fn default() -> Self {
        Self {
            drug_encoding: DrugEncoding::Transformer,
            target_encoding: TargetEncoding::Cnn,
            cls_hidden_dims: vec![1024, 1024, 512],
            train_epoch: 10,
            lr: 0.001,
            batch_size: 128,
            hidden_dim_drug: 128,
            hidden_dim_protein: 256,
            mpnn_hidden_size: 128,
            mpnn_depth: 3,
            cnn_drug_filters: vec![32, 64, 96],
            cnn_drug_kernels: vec![4, 6, 8],
            cnn_target_filters: vec![32, 64, 96],
            cnn_target_kernels: vec![4, 8, 12],
            transformer_emb_size_drug: 128,
            transformer_intermediate_size_drug: 512,
            transformer_num_attention_heads_drug: 8,
            transformer_n_layer_drug: 2,
            transformer_dropout_rate: 0.1,
            mlp_hidden_dims_target: vec![1024, 256, 64],
            dropout: 0.1,
            decay: 0.0,
            seed: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnsembleConfig {
    pub strategy: EnsembleStrategy,
    /// Used by the `weighted` strategy; the HDN gets `1 - hoagcn_weight`.
    pub hoagcn_weight: f32,
    /// Weight increment searched by the `tuned` strategy.
    pub grid_step: f32,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            strategy: EnsembleStrategy::Tuned,
            hoagcn_weight: 0.5,
            grid_step: 0.05,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.data.validate()?;
        self.hoagcn.validate()?;
        self.hdn.validate()?;
        self.ensemble.validate()
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidOption(msg.into())
}

fn check_dropout(name: &str, p: f64) -> Result<()> {
    if !(0.0..1.0).contains(&p) {
        return Err(invalid(format!("{name} must be in [0, 1), got {p}")));
    }
    Ok(())
}

/// Convolutions are unpadded, so the kernels must leave at least one position of `seq_len`.
fn check_conv(name: &str, filters: &[usize], kernels: &[usize], seq_len: usize) -> Result<()> {
    if filters.is_empty() || filters.len() != kernels.len() {
        return Err(invalid(format!(
            "{name}: filters and kernels must be non-empty and of equal length ({} vs {})",
            filters.len(),
            kernels.len()
        )));
    }
    if filters.iter().chain(kernels).any(|&v| v == 0) {
        return Err(invalid(format!("{name}: filters and kernels must be > 0")));
    }
    let shrink: usize = kernels.iter().map(|k| k - 1).sum();
    if shrink >= seq_len {
        return Err(invalid(format!(
            "{name}: kernels {kernels:?} are too wide for sequences of length {seq_len}"
        )));
    }
    Ok(())
}

impl DataConfig {
    pub fn validate(&self) -> Result<()> {
        let sum: f32 = self.frac.iter().sum();
        if (sum - 1.0).abs() > 1e-6 || self.frac.iter().any(|&f| f <= 0.0) {
            return Err(invalid(format!(
                "frac must be three positive values summing to 1, got {:?}",
                self.frac
            )));
        }
        Ok(())
    }
}

impl HoagcnConfig {
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(invalid("order must be >= 1"));
        }
        if self.batch_size == 0 || self.epochs == 0 {
            return Err(invalid("hoagcn batch_size and epochs must be > 0"));
        }
        if self.early_stopping == 0 {
            return Err(invalid("early_stopping must be >= 1"));
        }
        if self.layers_1 == 0 || self.layers_2 == 0 || self.hidden_1 == 0 || self.hidden_2 == 0 {
            return Err(invalid("hoagcn layer widths must be > 0"));
        }
        check_dropout("hoagcn dropout", self.dropout)
    }
}

impl HdnConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.train_epoch == 0 {
            return Err(invalid("hdn batch_size and train_epoch must be > 0"));
        }
        if self.cls_hidden_dims.iter().any(|&d| d == 0) {
            return Err(invalid("cls_hidden_dims entries must be > 0"));
        }
        check_conv(
            "cnn_drug",
            &self.cnn_drug_filters,
            &self.cnn_drug_kernels,
            MAX_SEQ_DRUG,
        )?;
        check_conv(
            "cnn_target",
            &self.cnn_target_filters,
            &self.cnn_target_kernels,
            MAX_SEQ_PROTEIN,
        )?;
        if self.transformer_num_attention_heads_drug == 0
            || self.transformer_emb_size_drug % self.transformer_num_attention_heads_drug != 0
        {
            return Err(invalid(
                "transformer_emb_size_drug must be divisible by the number of attention heads",
            ));
        }
        check_dropout("hdn dropout", self.dropout)?;
        check_dropout("transformer_dropout_rate", self.transformer_dropout_rate)
    }
}

impl EnsembleConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.hoagcn_weight) {
            return Err(invalid("hoagcn_weight must be in [0, 1]"));
        }
        if !(self.grid_step > 0.0 && self.grid_step <= 1.0) {
            return Err(invalid("grid_step must be in (0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: RunConfig = toml::from_str(
            r#"
            [hoagcn]
            order = 2
            cuda = true

            [hdn]
            LR = 0.0005
            drug_encoding = "CNN"
            cls_hidden_dims = [256, 64]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.hoagcn.order, 2);
        assert!(cfg.hoagcn.cuda);
        assert_eq!(cfg.hoagcn.seed, 42);
        assert_eq!(cfg.hdn.lr, 0.0005);
        assert_eq!(cfg.hdn.drug_encoding, DrugEncoding::Cnn);
        assert_eq!(cfg.hdn.cls_hidden_dims, vec![256, 64]);
        assert_eq!(cfg.hdn.cnn_target_kernels, vec![4, 8, 12]);
        assert_eq!(cfg.data.frac, [0.7, 0.1, 0.2]);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let res: std::result::Result<RunConfig, _> = toml::from_str("[hoagcn]\nordr = 2\n");
        assert!(res.is_err());
    }

    #[test]
    fn bad_values_fail_validation() {
        let mut cfg = RunConfig::default();
        cfg.data.frac = [0.5, 0.1, 0.1];
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.hoagcn.order = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.hoagcn.early_stopping = 0;
        assert!(cfg.validate().is_err());
        cfg.hoagcn.early_stopping = 1;
        assert!(cfg.validate().is_ok());

        let mut cfg = RunConfig::default();
        cfg.hdn.cnn_target_kernels = vec![4, 8];
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.hdn.dropout = 1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RunConfig::default();
        cfg.hdn.cnn_drug_filters = vec![32, 32];
        cfg.hdn.cnn_drug_kernels = vec![60, 42];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mindg.toml");

        let mut cfg = RunConfig::default();
        cfg.hoagcn.order = 3;
        cfg.data.threshold = Some(10.);
        cfg.save(&path).unwrap();

        assert_eq!(RunConfig::load(&path).unwrap(), cfg);
    }
}
