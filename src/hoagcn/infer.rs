//! Scoring pairs with a trained link predictor. Node embeddings are computed once per predictor.

use std::{fs, path::Path};

use burn::{
    module::Module,
    prelude::Int,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::{Tensor, TensorData, activation, backend::Backend},
};

use crate::{
    backend::to_vec,
    data::DtiRecord,
    error::{Error, Result},
    hoagcn::{
        CONFIG_FILE, GRAPH_FILE, MODEL_FILE,
        graph::{InteractionGraph, SparseFeatures},
        model::{HoagcnModel, HoagcnModelConfig},
    },
};

/// Normalized adjacency and identity node features, [nodes, nodes] each.
pub fn graph_tensors<B: Backend>(
    graph: &InteractionGraph,
    device: &B::Device,
) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let n = graph.num_nodes();
    let adj = Tensor::from_data(TensorData::new(graph.normalized_adjacency(), [n, n]), device);

    let features = SparseFeatures::identity(n);
    let features = Tensor::from_data(
        TensorData::new(features.to_dense(), [features.rows, features.cols]),
        device,
    );

    (adj, features)
}

/// Node id tensors for a list of (drug node, target node) pairs.
pub(crate) fn node_tensors<B: Backend>(
    pairs: &[(usize, usize)],
    device: &B::Device,
) -> (Tensor<B, 1, Int>, Tensor<B, 1, Int>) {
    let n = pairs.len();
    let drugs: Vec<i64> = pairs.iter().map(|p| p.0 as i64).collect();
    let targets: Vec<i64> = pairs.iter().map(|p| p.1 as i64).collect();

    (
        Tensor::from_data(TensorData::new(drugs, [n]), device),
        Tensor::from_data(TensorData::new(targets, [n]), device),
    )
}

pub struct HoagcnPredictor<B: Backend> {
    model: HoagcnModel<B>,
    pub config: HoagcnModelConfig,
    pub graph: InteractionGraph,
    embeddings: Tensor<B, 2>,
    batch_size: usize,
    device: B::Device,
}

impl<B: Backend> HoagcnPredictor<B> {
    pub fn new(
        model: HoagcnModel<B>,
        config: HoagcnModelConfig,
        graph: InteractionGraph,
        batch_size: usize,
        device: B::Device,
    ) -> Self {
        let (adj, features) = graph_tensors::<B>(&graph, &device);
        let embeddings = model.embed(adj, features);

        Self {
            model,
            config,
            graph,
            embeddings,
            batch_size,
            device,
        }
    }

    /// Loads `config.json`, `graph.json` and `model.mpk` from a model folder.
    pub fn load(dir: &Path, batch_size: usize, device: B::Device) -> Result<Self> {
        let cfg_bytes = fs::read(dir.join(CONFIG_FILE))?;
        let config: HoagcnModelConfig = serde_json::from_slice(&cfg_bytes)?;
        let graph = InteractionGraph::load(&dir.join(GRAPH_FILE))?;

        if graph.num_nodes() != config.feature_count {
            return Err(Error::Record(format!(
                "graph has {} nodes, but the model was built for {}",
                graph.num_nodes(),
                config.feature_count
            )));
        }

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .init::<B>(&device)
            .load_file(dir.join(MODEL_FILE), &recorder, &device)
            .map_err(|e| Error::Record(format!("{e:?}")))?;

        Ok(Self::new(model, config, graph, batch_size, device))
    }

    /// Interaction probabilities for pairs of node ids.
    pub fn predict_nodes(&self, pairs: &[(usize, usize)]) -> Result<Vec<f32>> {
        let mut result = Vec::with_capacity(pairs.len());

        for chunk in pairs.chunks(self.batch_size.max(1)) {
            let (d, t) = node_tensors::<B>(chunk, &self.device);
            let logits = self.model.score_pairs(self.embeddings.clone(), d, t);
            result.extend(to_vec(activation::sigmoid(logits))?);
        }

        Ok(result)
    }

    /// Probabilities in record order; `None` where the drug or target isn't a graph node.
    pub fn predict(&self, records: &[DtiRecord]) -> Result<Vec<Option<f32>>> {
        let nodes: Vec<Option<(usize, usize)>> = records
            .iter()
            .map(|r| self.graph.pair_nodes(&r.drug, &r.target))
            .collect();

        let known: Vec<(usize, usize)> = nodes.iter().flatten().copied().collect();
        let mut scores = self.predict_nodes(&known)?.into_iter();

        Ok(nodes
            .iter()
            .map(|n| n.and_then(|_| scores.next()))
            .collect())
    }
}
