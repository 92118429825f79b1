//! The higher-order GCN link predictor (HOAGCN). Drugs and targets are nodes of one bipartite
//! graph, and interactions are scored from node embeddings that mix neighbourhoods of several
//! radii.
//!
//! A trained model folder holds `model.mpk`, `config.json`, `graph.json` (node names and the
//! training edges) and `valid_log.csv`.

pub mod graph;
pub mod infer;
pub mod layers;
pub mod model;
pub mod train;

pub use graph::InteractionGraph;
pub use infer::HoagcnPredictor;
pub use model::{HoagcnModel, HoagcnModelConfig};
pub use train::{HoagcnTrained, train};

pub const MODEL_FILE: &str = "model.mpk";
pub const CONFIG_FILE: &str = "config.json";
pub const GRAPH_FILE: &str = "graph.json";
pub const VALID_LOG_FILE: &str = "valid_log.csv";
