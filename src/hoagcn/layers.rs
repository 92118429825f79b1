//! Multi-scale graph convolution layers. A layer with `iterations = k` propagates its transformed
//! features over the normalized adjacency `k - 1` times, so a block of layers with
//! `k = 1..=order` sees neighbourhoods of every radius up to `order`.

use burn::{
    module::{Module, Param},
    nn::{Dropout, DropoutConfig, Initializer},
    tensor::{Tensor, activation, backend::Backend},
};

/// Exponential linear unit, alpha = 1.
pub fn elu<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    let neg = x.clone().clamp_max(0.0).exp() - 1.0;
    activation::relu(x) + neg
}

fn xavier<B: Backend>(rows: usize, cols: usize, device: &B::Device) -> Param<Tensor<B, 2>> {
    Initializer::XavierUniform { gain: 1.0 }.init_with([rows, cols], Some(rows), Some(cols), device)
}

/// First-block layer, applied to the (sparse) node features: `H = X W + b`, dropout, ReLU, then
/// propagation.
#[derive(Module, Debug)]
pub struct SparseNgcnLayer<B: Backend> {
    weight: Param<Tensor<B, 2>>,
    /// [1, out]
    bias: Param<Tensor<B, 2>>,
    dropout: Dropout,
    iterations: usize,
}

impl<B: Backend> SparseNgcnLayer<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        iterations: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            weight: xavier(in_channels, out_channels, device),
            bias: xavier(1, out_channels, device),
            dropout: DropoutConfig::new(dropout).init(),
            iterations,
        }
    }

    pub fn forward(&self, adj: Tensor<B, 2>, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let h = features.matmul(self.weight.val()) + self.bias.val();
        let mut h = activation::relu(self.dropout.forward(h));

        for _ in 1..self.iterations {
            h = adj.clone().matmul(h);
        }
        h
    }
}

/// Second-block layer: `H = X W`, dropout, propagation, then `+ b`.
#[derive(Module, Debug)]
pub struct DenseNgcnLayer<B: Backend> {
    weight: Param<Tensor<B, 2>>,
    bias: Param<Tensor<B, 2>>,
    dropout: Dropout,
    iterations: usize,
}

impl<B: Backend> DenseNgcnLayer<B> {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        iterations: usize,
        dropout: f64,
        device: &B::Device,
    ) -> Self {
        Self {
            weight: xavier(in_channels, out_channels, device),
            bias: xavier(1, out_channels, device),
            dropout: DropoutConfig::new(dropout).init(),
            iterations,
        }
    }

    pub fn forward(&self, adj: Tensor<B, 2>, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut h = self.dropout.forward(features.matmul(self.weight.val()));

        for _ in 1..self.iterations {
            h = adj.clone().matmul(h);
        }
        h + self.bias.val()
    }
}

/// `y_k = x1ᵀ A_k x2 + b_k`. The weight is stored as [in_1, out * in_2].
#[derive(Module, Debug)]
pub struct Bilinear<B: Backend> {
    weight: Param<Tensor<B, 2>>,
    bias: Param<Tensor<B, 2>>,
    in_2: usize,
    out: usize,
}

impl<B: Backend> Bilinear<B> {
    pub fn new(in_1: usize, in_2: usize, out: usize, device: &B::Device) -> Self {
        let bound = 1. / (in_1 as f64).sqrt();
        let init = Initializer::Uniform {
            min: -bound,
            max: bound,
        };

        Self {
            weight: init.init([in_1, out * in_2], device),
            bias: init.init([1, out], device),
            in_2,
            out,
        }
    }

    /// `x1`: [batch, in_1], `x2`: [batch, in_2] -> [batch, out]
    pub fn forward(&self, x1: Tensor<B, 2>, x2: Tensor<B, 2>) -> Tensor<B, 2> {
        let [b, _] = x1.dims();

        // [B, out * in_2] -> [B, out, in_2]
        let proj = x1.matmul(self.weight.val()).reshape([b, self.out, self.in_2]);
        let y = (proj * x2.unsqueeze_dim::<3>(1)).sum_dim(2);

        y.reshape([b, self.out]) + self.bias.val()
    }
}
