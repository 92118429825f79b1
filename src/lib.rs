//! MINDG: drug-target interaction prediction.
//!
//! Two models score `(SMILES, amino acid sequence)` pairs: a higher-order GCN link predictor
//! over the drug-target interaction graph ([`hoagcn`]), and a classifier that encodes the drug
//! and target sequences separately ([`hdn`]). Their probabilities are combined by
//! [`ensemble`]. [`pipeline`] runs the whole thing and writes a result folder.

pub mod backend;
pub mod config;
pub mod data;
pub mod encoding;
pub mod ensemble;
pub mod error;
pub mod hdn;
pub mod hoagcn;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod split;


pub use error::{Error, Result};
