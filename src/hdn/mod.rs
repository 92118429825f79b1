//! The sequence-based classifier (HDN/MDN). Drugs and targets are encoded separately, from their
//! SMILES and amino acid sequence, and a dense head scores the concatenated encodings.
//!
//! A trained model lives in its own folder: `model.mpk` (weights), `config.json` (the network
//! settings needed to rebuild it) and `valid_log.csv` (per-epoch validation metrics).

pub mod batch;
pub mod infer;
pub mod model;
pub mod train;

pub use infer::{HdnPredictor, predict_items};
pub use model::{HdnModel, HdnModelConfig};
pub use train::{HdnTrained, train};

pub const MODEL_FILE: &str = "model.mpk";
pub const CONFIG_FILE: &str = "config.json";
pub const VALID_LOG_FILE: &str = "valid_log.csv";
