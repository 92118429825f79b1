//! Network definition: a drug encoder and a target encoder, whose outputs are concatenated and
//! fed to a dense classifier head.

use burn::{
    config::Config,
    module::Module,
    nn::{
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig,
        conv::{Conv1d, Conv1dConfig},
        transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput},
    },
    prelude::Int,
    tensor::{Tensor, activation, backend::Backend},
};

use crate::{
    config::HdnConfig,
    encoding::{
        DrugEncoding, TargetEncoding,
        graph::ATOM_FDIM,
        protein::{AAC_DIM, AMINO_CHARS},
        smiles::{SMILES_CHARS, TOKEN_LEN, TOKEN_PAD, TOKEN_VOCAB},
    },
    error::{Error, Result as HdnResult},
};

/// Everything needed to rebuild the network for inference. Saved as `config.json` next to the
/// weights.
#[derive(Config, Debug)]
pub struct HdnModelConfig {
    pub drug_encoding: DrugEncoding,
    pub target_encoding: TargetEncoding,
    /// Labels are interaction flags; outputs are logits.
    pub binary: bool,
    pub hidden_dim_drug: usize,
    pub hidden_dim_protein: usize,
    pub cls_hidden_dims: Vec<usize>,
    pub cnn_drug_filters: Vec<usize>,
    pub cnn_drug_kernels: Vec<usize>,
    pub cnn_target_filters: Vec<usize>,
    pub cnn_target_kernels: Vec<usize>,
    pub transformer_emb_size: usize,
    pub transformer_intermediate_size: usize,
    pub transformer_heads: usize,
    pub transformer_layers: usize,
    pub transformer_dropout: f64,
    pub mpnn_hidden_size: usize,
    pub mpnn_depth: usize,
    pub mlp_hidden_dims_target: Vec<usize>,
    pub dropout: f64,
}

impl HdnModelConfig {
    pub fn from_run(cfg: &HdnConfig, binary: bool) -> Self {
        Self {
            drug_encoding: cfg.drug_encoding,
            target_encoding: cfg.target_encoding,
            binary,
            hidden_dim_drug: cfg.hidden_dim_drug,
            hidden_dim_protein: cfg.hidden_dim_protein,
            cls_hidden_dims: cfg.cls_hidden_dims.clone(),
            cnn_drug_filters: cfg.cnn_drug_filters.clone(),
            cnn_drug_kernels: cfg.cnn_drug_kernels.clone(),
            cnn_target_filters: cfg.cnn_target_filters.clone(),
            cnn_target_kernels: cfg.cnn_target_kernels.clone(),
            transformer_emb_size: cfg.transformer_emb_size_drug,
            transformer_intermediate_size: cfg.transformer_intermediate_size_drug,
            transformer_heads: cfg.transformer_num_attention_heads_drug,
            transformer_layers: cfg.transformer_n_layer_drug,
            transformer_dropout: cfg.transformer_dropout_rate,
            mpnn_hidden_size: cfg.mpnn_hidden_size,
            mpnn_depth: cfg.mpnn_depth,
            mlp_hidden_dims_target: cfg.mlp_hidden_dims_target.clone(),
            dropout: cfg.dropout,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> HdnModel<B> {
        let (mut drug_cnn, mut drug_transformer, mut drug_mpnn) = (None, None, None);
        match self.drug_encoding {
            DrugEncoding::Cnn => {
                drug_cnn = Some(CnnEncoder::new(
                    SMILES_CHARS.len(),
                    &self.cnn_drug_filters,
                    &self.cnn_drug_kernels,
                    self.hidden_dim_drug,
                    device,
                ));
            }
            DrugEncoding::Transformer => {
                drug_transformer = Some(TransformerDrugEncoder::new(self, device));
            }
            DrugEncoding::Mpnn => {
                drug_mpnn = Some(MpnnEncoder::new(
                    ATOM_FDIM,
                    self.mpnn_hidden_size,
                    self.mpnn_depth,
                    self.hidden_dim_drug,
                    device,
                ));
            }
        }

        let (mut target_cnn, mut target_mlp) = (None, None);
        match self.target_encoding {
            TargetEncoding::Cnn => {
                target_cnn = Some(CnnEncoder::new(
                    AMINO_CHARS.len(),
                    &self.cnn_target_filters,
                    &self.cnn_target_kernels,
                    self.hidden_dim_protein,
                    device,
                ));
            }
            TargetEncoding::Aac => {
                target_mlp = Some(MlpEncoder::new(
                    AAC_DIM,
                    &self.mlp_hidden_dims_target,
                    self.hidden_dim_protein,
                    device,
                ));
            }
        }

        let mut cls_layers = Vec::with_capacity(self.cls_hidden_dims.len());
        let mut dim_in = self.hidden_dim_drug + self.hidden_dim_protein;
        for &dim in &self.cls_hidden_dims {
            cls_layers.push(LinearConfig::new(dim_in, dim).init(device));
            dim_in = dim;
        }

        HdnModel {
            drug_cnn,
            drug_transformer,
            drug_mpnn,
            target_cnn,
            target_mlp,
            cls_layers,
            head: LinearConfig::new(dim_in, 1).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// 1D convolutions over a one-hot sequence, global max pooled, then projected.
#[derive(Module, Debug)]
pub struct CnnEncoder<B: Backend> {
    convs: Vec<Conv1d<B>>,
    fc: Linear<B>,
}

impl<B: Backend> CnnEncoder<B> {
    pub fn new(
        channels: usize,
        filters: &[usize],
        kernels: &[usize],
        dim_out: usize,
        device: &B::Device,
    ) -> Self {
        let mut convs = Vec::with_capacity(filters.len());
        let mut ch_in = channels;
        for (&f, &k) in filters.iter().zip(kernels) {
            convs.push(Conv1dConfig::new(ch_in, f, k).init(device));
            ch_in = f;
        }

        Self {
            convs,
            fc: LinearConfig::new(ch_in, dim_out).init(device),
        }
    }

    /// `x`: [batch, channels, length]
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 2> {
        let mut x = x;
        for conv in &self.convs {
            x = activation::relu(conv.forward(x));
        }

        // Global max pool over the sequence: [B, C, L] -> [B, C]
        let [b, c, _] = x.dims();
        let pooled = x.max_dim(2).reshape([b, c]);
        self.fc.forward(pooled)
    }
}

/// Self-attention over SMILES tokens. The encoding is the output at the leading `[CLS]` token.
#[derive(Module, Debug)]
pub struct TransformerDrugEncoder<B: Backend> {
    token_emb: Embedding<B>,
    pos_emb: Embedding<B>,
    encoder: TransformerEncoder<B>,
    fc: Linear<B>,
}

impl<B: Backend> TransformerDrugEncoder<B> {
    pub fn new(cfg: &HdnModelConfig, device: &B::Device) -> Self {
        let d = cfg.transformer_emb_size;
        Self {
            token_emb: EmbeddingConfig::new(TOKEN_VOCAB, d).init(device),
            pos_emb: EmbeddingConfig::new(TOKEN_LEN, d).init(device),
            encoder: TransformerEncoderConfig::new(
                d,
                cfg.transformer_intermediate_size,
                cfg.transformer_heads,
                cfg.transformer_layers,
            )
            .with_dropout(cfg.transformer_dropout)
            .init(device),
            fc: LinearConfig::new(d, cfg.hidden_dim_drug).init(device),
        }
    }

    /// `tokens`: [batch, TOKEN_LEN]
    pub fn forward(&self, tokens: Tensor<B, 2, Int>) -> Tensor<B, 2> {
        let device = tokens.device();
        let [b, len] = tokens.dims();

        let mask_pad = tokens.clone().equal_elem(TOKEN_PAD);

        let positions = Tensor::<B, 1, Int>::arange(0..len as i64, &device).reshape([1, len]);
        // [B, L, D] + [1, L, D]
        let x = self.token_emb.forward(tokens) + self.pos_emb.forward(positions);

        let x = self
            .encoder
            .forward(TransformerEncoderInput::new(x).mask_pad(mask_pad));

        let [_, _, d] = x.dims();
        let cls = x.slice([0..b, 0..1, 0..d]).reshape([b, d]);
        self.fc.forward(cls)
    }
}

/// Graph convolutions over atoms, with residual connections, then a masked mean readout.
#[derive(Module, Debug)]
pub struct MpnnEncoder<B: Backend> {
    node_encoder: Linear<B>,
    layers: Vec<Linear<B>>,
    fc: Linear<B>,
}

impl<B: Backend> MpnnEncoder<B> {
    pub fn new(
        feat_dim: usize,
        hidden: usize,
        depth: usize,
        dim_out: usize,
        device: &B::Device,
    ) -> Self {
        Self {
            node_encoder: LinearConfig::new(feat_dim, hidden).init(device),
            layers: (0..depth)
                .map(|_| LinearConfig::new(hidden, hidden).init(device))
                .collect(),
            fc: LinearConfig::new(hidden, dim_out).init(device),
        }
    }

    pub fn forward(
        &self,
        feats: Tensor<B, 3>, // [Batch, N, F]
        adj: Tensor<B, 3>,   // [Batch, N, N]
        mask: Tensor<B, 3>,  // [Batch, N, 1]
    ) -> Tensor<B, 2> {
        let mut h = activation::relu(self.node_encoder.forward(feats)) * mask.clone();

        for layer in &self.layers {
            let agg = adj.clone().matmul(h.clone());
            h = (activation::relu(layer.forward(agg)) + h) * mask.clone();
        }

        let atom_counts = mask.sum_dim(1); // [B, 1, 1]
        let mean = h.sum_dim(1) / (atom_counts + 1e-6);
        let [b, _, d] = mean.dims();
        self.fc.forward(mean.reshape([b, d]))
    }
}

/// Dense layers with ReLU over a fixed-length feature vector.
#[derive(Module, Debug)]
pub struct MlpEncoder<B: Backend> {
    layers: Vec<Linear<B>>,
}

impl<B: Backend> MlpEncoder<B> {
    pub fn new(dim_in: usize, hidden: &[usize], dim_out: usize, device: &B::Device) -> Self {
        let dims: Vec<usize> = std::iter::once(dim_in)
            .chain(hidden.iter().copied())
            .chain(std::iter::once(dim_out))
            .collect();

        Self {
            layers: dims
                .windows(2)
                .map(|w| LinearConfig::new(w[0], w[1]).init(device))
                .collect(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = x;
        for layer in &self.layers {
            x = activation::relu(layer.forward(x));
        }
        x
    }
}

/// Drug-side network input, one variant per drug encoding.
#[derive(Clone, Debug)]
pub enum DrugInput<B: Backend> {
    /// One-hot characters, [batch, alphabet, MAX_SEQ_DRUG].
    Chars(Tensor<B, 3>),
    Tokens(Tensor<B, 2, Int>),
    Graph {
        feats: Tensor<B, 3>,
        adj: Tensor<B, 3>,
        mask: Tensor<B, 3>,
    },
}

#[derive(Clone, Debug)]
pub enum TargetInput<B: Backend> {
    /// One-hot residues, [batch, alphabet, MAX_SEQ_PROTEIN].
    Chars(Tensor<B, 3>),
    Composition(Tensor<B, 2>),
}

#[derive(Module, Debug)]
pub struct HdnModel<B: Backend> {
    // Exactly one drug and one target encoder is present.
    drug_cnn: Option<CnnEncoder<B>>,
    drug_transformer: Option<TransformerDrugEncoder<B>>,
    drug_mpnn: Option<MpnnEncoder<B>>,
    target_cnn: Option<CnnEncoder<B>>,
    target_mlp: Option<MlpEncoder<B>>,
    cls_layers: Vec<Linear<B>>,
    head: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> HdnModel<B> {
    fn encode_drug(&self, input: DrugInput<B>) -> HdnResult<Tensor<B, 2>> {
        match (input, &self.drug_cnn, &self.drug_transformer, &self.drug_mpnn) {
            (DrugInput::Chars(x), Some(enc), _, _) => Ok(enc.forward(x)),
            (DrugInput::Tokens(t), _, Some(enc), _) => Ok(enc.forward(t)),
            (DrugInput::Graph { feats, adj, mask }, _, _, Some(enc)) => {
                Ok(enc.forward(feats, adj, mask))
            }
            _ => Err(Error::Tensor(
                "drug input doesn't match the model's drug encoder".to_owned(),
            )),
        }
    }

    fn encode_target(&self, input: TargetInput<B>) -> HdnResult<Tensor<B, 2>> {
        match (input, &self.target_cnn, &self.target_mlp) {
            (TargetInput::Chars(x), Some(enc), _) => Ok(enc.forward(x)),
            (TargetInput::Composition(x), _, Some(enc)) => Ok(enc.forward(x)),
            _ => Err(Error::Tensor(
                "target input doesn't match the model's target encoder".to_owned(),
            )),
        }
    }

    /// Returns [batch, 1]: logits for binary models, affinities otherwise.
    pub fn forward(&self, drug: DrugInput<B>, target: TargetInput<B>) -> HdnResult<Tensor<B, 2>> {
        let v_d = self.encode_drug(drug)?;
        let v_p = self.encode_target(target)?;

        let mut v = Tensor::cat(vec![v_d, v_p], 1);
        for layer in &self.cls_layers {
            v = activation::relu(self.dropout.forward(layer.forward(v)));
        }

        Ok(self.head.forward(v))
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::{
        backend::CpuBackend,
        encoding::{
            graph::MAX_ATOMS,
            protein::MAX_SEQ_PROTEIN,
            smiles::{MAX_SEQ_DRUG, TOKEN_CLS},
        },
    };

    type B = CpuBackend;

    fn small_config(drug: DrugEncoding, target: TargetEncoding) -> HdnModelConfig {
        let mut run = HdnConfig {
            drug_encoding: drug,
            target_encoding: target,
            cls_hidden_dims: vec![16, 8],
            hidden_dim_drug: 8,
            hidden_dim_protein: 8,
            mpnn_hidden_size: 8,
            mpnn_depth: 2,
            cnn_drug_filters: vec![4, 4],
            cnn_drug_kernels: vec![3, 3],
            cnn_target_filters: vec![4, 4],
            cnn_target_kernels: vec![5, 5],
            transformer_emb_size_drug: 8,
            transformer_intermediate_size_drug: 16,
            transformer_num_attention_heads_drug: 2,
            transformer_n_layer_drug: 1,
            mlp_hidden_dims_target: vec![16],
            ..Default::default()
        };
        run.dropout = 0.;
        HdnModelConfig::from_run(&run, true)
    }

    fn drug_input(enc: DrugEncoding, b: usize, device: &<B as Backend>::Device) -> DrugInput<B> {
        match enc {
            DrugEncoding::Cnn => {
                DrugInput::Chars(Tensor::zeros([b, SMILES_CHARS.len(), MAX_SEQ_DRUG], device))
            }
            DrugEncoding::Transformer => {
                let mut ids = vec![TOKEN_PAD; b * TOKEN_LEN];
                for i in 0..b {
                    ids[i * TOKEN_LEN] = TOKEN_CLS;
                    ids[i * TOKEN_LEN + 1] = 22;
                }
                DrugInput::Tokens(Tensor::from_data(
                    TensorData::new(ids, [b, TOKEN_LEN]),
                    device,
                ))
            }
            DrugEncoding::Mpnn => DrugInput::Graph {
                feats: Tensor::ones([b, MAX_ATOMS, ATOM_FDIM], device),
                adj: Tensor::zeros([b, MAX_ATOMS, MAX_ATOMS], device),
                mask: Tensor::ones([b, MAX_ATOMS, 1], device),
            },
        }
    }

    fn target_input(enc: TargetEncoding, b: usize, device: &<B as Backend>::Device) -> TargetInput<B> {
        match enc {
            TargetEncoding::Cnn => {
                TargetInput::Chars(Tensor::zeros([b, AMINO_CHARS.len(), MAX_SEQ_PROTEIN], device))
            }
            TargetEncoding::Aac => TargetInput::Composition(Tensor::zeros([b, AAC_DIM], device)),
        }
    }

    #[test]
    fn forward_shapes_for_each_encoding() {
        let device = Default::default();

        for drug in [DrugEncoding::Cnn, DrugEncoding::Transformer, DrugEncoding::Mpnn] {
            for target in [TargetEncoding::Cnn, TargetEncoding::Aac] {
                let model = small_config(drug, target).init::<B>(&device);
                let out = model
                    .forward(drug_input(drug, 3, &device), target_input(target, 3, &device))
                    .unwrap();
                assert_eq!(out.dims(), [3, 1], "{drug} / {target}");
            }
        }
    }

    #[test]
    fn mismatched_input_is_an_error() {
        let device = Default::default();
        let model = small_config(DrugEncoding::Cnn, TargetEncoding::Cnn).init::<B>(&device);

        let res = model.forward(
            drug_input(DrugEncoding::Transformer, 2, &device),
            target_input(TargetEncoding::Cnn, 2, &device),
        );
        assert!(matches!(res, Err(Error::Tensor(_))));
    }
}
