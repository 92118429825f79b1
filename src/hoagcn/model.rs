//! The higher-order GCN link predictor: two blocks of multi-scale graph convolutions produce node
//! embeddings, and a bilinear head scores drug-target pairs.

use burn::{
    config::Config,
    module::Module,
    nn::{Dropout, DropoutConfig, Linear, LinearConfig},
    prelude::Int,
    tensor::{Tensor, backend::Backend},
};

use crate::{
    config::HoagcnConfig,
    hoagcn::layers::{Bilinear, DenseNgcnLayer, SparseNgcnLayer, elu},
};

#[derive(Config, Debug)]
pub struct HoagcnModelConfig {
    /// Node feature width; the node count for identity features.
    pub feature_count: usize,
    pub order: usize,
    pub layers_1: usize,
    pub layers_2: usize,
    pub hidden_1: usize,
    pub hidden_2: usize,
    pub dropout: f64,
}

impl HoagcnModelConfig {
    pub fn from_run(cfg: &HoagcnConfig, feature_count: usize) -> Self {
        Self {
            feature_count,
            order: cfg.order,
            layers_1: cfg.layers_1,
            layers_2: cfg.layers_2,
            hidden_1: cfg.hidden_1,
            hidden_2: cfg.hidden_2,
            dropout: cfg.dropout,
        }
    }

    /// Width of the node embeddings.
    pub fn embedding_dim(&self) -> usize {
        self.order * self.layers_2
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> HoagcnModel<B> {
        let upper = (1..=self.order)
            .map(|i| {
                SparseNgcnLayer::new(self.feature_count, self.layers_1, i, self.dropout, device)
            })
            .collect();

        let bottom = (1..=self.order)
            .map(|i| {
                DenseNgcnLayer::new(
                    self.order * self.layers_1,
                    self.layers_2,
                    i,
                    self.dropout,
                    device,
                )
            })
            .collect();

        let emb = self.embedding_dim();

        HoagcnModel {
            upper,
            bottom,
            bilinear: Bilinear::new(emb, emb, self.hidden_1, device),
            fc_1: LinearConfig::new(self.hidden_1, self.hidden_2).init(device),
            fc_2: LinearConfig::new(self.hidden_2, 1).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct HoagcnModel<B: Backend> {
    upper: Vec<SparseNgcnLayer<B>>,
    bottom: Vec<DenseNgcnLayer<B>>,
    bilinear: Bilinear<B>,
    fc_1: Linear<B>,
    fc_2: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> HoagcnModel<B> {
    /// Node embeddings, [nodes, order * layers_2].
    pub fn embed(&self, adj: Tensor<B, 2>, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let upper: Vec<_> = self
            .upper
            .iter()
            .map(|l| l.forward(adj.clone(), features.clone()))
            .collect();
        let h = Tensor::cat(upper, 1);

        let bottom: Vec<_> = self
            .bottom
            .iter()
            .map(|l| l.forward(adj.clone(), h.clone()))
            .collect();
        Tensor::cat(bottom, 1)
    }

    /// Logits, [batch, 1], for pairs of node ids.
    pub fn score_pairs(
        &self,
        embeddings: Tensor<B, 2>,
        drug_nodes: Tensor<B, 1, Int>,
        target_nodes: Tensor<B, 1, Int>,
    ) -> Tensor<B, 2> {
        let e_d = embeddings.clone().select(0, drug_nodes);
        let e_t = embeddings.select(0, target_nodes);

        let h = elu(self.bilinear.forward(e_d, e_t));
        let h = self.dropout.forward(h);
        let h = elu(self.fc_1.forward(h));
        self.fc_2.forward(h)
    }

    pub fn forward(
        &self,
        adj: Tensor<B, 2>,
        features: Tensor<B, 2>,
        drug_nodes: Tensor<B, 1, Int>,
        target_nodes: Tensor<B, 1, Int>,
    ) -> Tensor<B, 2> {
        let emb = self.embed(adj, features);
        self.score_pairs(emb, drug_nodes, target_nodes)
    }
}
