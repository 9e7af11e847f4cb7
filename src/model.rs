//! The message-passing network: atom encoder, edge-conditioned message-passing layers, mean
//! aggregation over atoms, and a feed-forward regression head.

use burn::{
    config::Config,
    module::Module,
    nn::{
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, Linear, LinearConfig,
    },
    prelude::Int,
    tensor::{Tensor, activation, backend::Backend},
};

use crate::{
    data::datapoint::ExtraAtomMode,
    featurize::{ELEM_VOCAB_SIZE, PER_ATOM_SCALARS, PER_EDGE_FEATS},
};

/// Saved next to the weights so inference rebuilds the same architecture.
#[derive(Config, Debug)]
pub struct ModelConfig {
    pub vocab_size_elem: usize,
    pub embedding_dim: usize,
    pub n_node_scalars: usize,
    pub edge_feat_dim: usize,
    /// Width of the extra per-atom features or descriptors.
    pub extra_dim: usize,
    pub mode: ExtraAtomMode,
    pub hidden_dim: usize,
    /// Number of message-passing layers.
    pub depth: usize,
    pub ffn_hidden_dim: usize,
    pub ffn_layers: usize,
    pub dropout: f64,
}

impl ModelConfig {
    /// Defaults for everything but the extra features.
    pub fn for_extras(extra_dim: usize, mode: ExtraAtomMode) -> Self {
        Self {
            vocab_size_elem: ELEM_VOCAB_SIZE,
            embedding_dim: 16,
            n_node_scalars: PER_ATOM_SCALARS,
            edge_feat_dim: PER_EDGE_FEATS,
            extra_dim,
            mode,
            hidden_dim: 300,
            depth: 3,
            ffn_hidden_dim: 300,
            ffn_layers: 1,
            dropout: 0.,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let dim = self.hidden_dim;

        let emb_elem = EmbeddingConfig::new(self.vocab_size_elem, self.embedding_dim).init(device);

        let mut node_input_dim = self.embedding_dim + self.n_node_scalars;
        if self.mode == ExtraAtomMode::Feature {
            node_input_dim += self.extra_dim;
        }
        let node_encoder = LinearConfig::new(node_input_dim, dim).init(device);

        let edge_encoder = LinearConfig::new(self.edge_feat_dim, dim).init(device);
        let edge_proj = LinearConfig::new(self.edge_feat_dim, 1).init(device);

        let mut mp_layers = Vec::with_capacity(self.depth);
        for _ in 0..self.depth {
            mp_layers.push(LinearConfig::new(dim, dim).init(device));
        }

        let descriptor_proj = (self.mode == ExtraAtomMode::Descriptor)
            .then(|| LinearConfig::new(dim + self.extra_dim, dim).init(device));

        let mut ffn_layers = Vec::with_capacity(self.ffn_layers);
        for layer_i in 0..self.ffn_layers {
            let in_dim = if layer_i == 0 { dim } else { self.ffn_hidden_dim };
            ffn_layers.push(LinearConfig::new(in_dim, self.ffn_hidden_dim).init(device));
        }
        let head_in = if self.ffn_layers == 0 {
            dim
        } else {
            self.ffn_hidden_dim
        };

        Model {
            emb_elem,
            node_encoder,
            edge_encoder,
            edge_proj,
            mp_layers,
            descriptor_proj,
            ffn_layers,
            head: LinearConfig::new(head_in, 1).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    emb_elem: Embedding<B>,
    node_encoder: Linear<B>,
    edge_encoder: Linear<B>,
    /// Gates each bond's contribution to the adjacency.
    edge_proj: Linear<B>,
    mp_layers: Vec<Linear<B>>,
    /// Present in descriptor mode: folds the descriptors into the atom hidden states.
    descriptor_proj: Option<Linear<B>>,
    ffn_layers: Vec<Linear<B>>,
    head: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> Model<B> {
    /// GINE-style layer: neighbour states plus bond embeddings, weighted by the adjacency,
    /// summed, then an update with a residual connection.
    fn message_passing_layer(
        &self,
        adj_weighted: &Tensor<B, 3>, // [Batch, N, N]
        mask: &Tensor<B, 3>,         // [Batch, N, 1]
        nodes: Tensor<B, 3>,         // [Batch, N, D]
        edge_emb: &Tensor<B, 4>,     // [Batch, N, N, D]
        linear: &Linear<B>,
        dropout: bool,
    ) -> Tensor<B, 3> {
        // [B, N, D] -> [B, 1, N, D], combined with edges -> [B, N, N, D]
        let nodes_j = nodes.clone().unsqueeze_dim(1);
        let message = activation::relu(nodes_j + edge_emb.clone());

        let weights = adj_weighted.clone().unsqueeze_dim(3); // [B, N, N, 1]

        // sum_dim(2) gives [B, N, 1, D]; flatten back to [B, N, D].
        let agg = (message * weights).sum_dim(2).flatten(2, 3);

        let mut out = activation::relu(linear.forward(agg));
        if dropout {
            out = self.dropout.forward(out);
        }

        (out + nodes) * mask.clone()
    }

    pub fn forward(
        &self,
        elem_ids: Tensor<B, 2, Int>,
        scalars: Tensor<B, 3>,
        extra: Tensor<B, 3>,
        adj: Tensor<B, 3>,
        edge_feats: Tensor<B, 4>,
        mask: Tensor<B, 3>,
    ) -> Tensor<B, 2> {
        let [b, n, _n2, f] = edge_feats.dims();

        let ef_flat = edge_feats.reshape([b * n * n, f]);
        let gate = activation::sigmoid(self.edge_proj.forward(ef_flat.clone())).reshape([b, n, n]);
        let adj_eff = adj * gate;

        let edge_emb_flat = self.edge_encoder.forward(ef_flat);
        let [_, d_hidden] = edge_emb_flat.dims();
        let edge_emb = edge_emb_flat.reshape([b, n, n, d_hidden]);

        let x_elem = self.emb_elem.forward(elem_ids);
        let raw_nodes = match self.descriptor_proj {
            None => Tensor::cat(vec![x_elem, scalars, extra.clone()], 2),
            Some(_) => Tensor::cat(vec![x_elem, scalars], 2),
        };
        let mut hidden = self.node_encoder.forward(raw_nodes) * mask.clone();

        for (i, layer) in self.mp_layers.iter().enumerate() {
            let dropout = i != self.mp_layers.len() - 1;
            hidden =
                self.message_passing_layer(&adj_eff, &mask, hidden, &edge_emb, layer, dropout);
        }

        if let Some(proj) = &self.descriptor_proj {
            let joined = Tensor::cat(vec![hidden, extra], 2);
            hidden = activation::relu(proj.forward(joined)) * mask.clone();
        }

        // Mean over real atoms.
        let atom_counts = mask.sum_dim(1); // [B, 1, 1]
        let graph_mean = hidden.sum_dim(1) / (atom_counts + 1e-6);
        let [b_g, _one, d] = graph_mean.dims();
        let mut x = graph_mean.reshape([b_g, d]);

        for layer in &self.ffn_layers {
            x = self.dropout.forward(activation::relu(layer.forward(x)));
        }

        self.head.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, data::dataloader::batcher::Batcher};

    use super::*;
    use crate::data::{
        datapoint::build_datapoints,
        dataset::{MolBatch, MolBatcher, Sample, StandardScaler},
        records::FeatureArray,
    };

    fn forward_shape(mode: ExtraAtomMode) -> [usize; 2] {
        let smiles = vec!["CCO".to_string(), "c1ccccc1".to_string()];
        let features = vec![
            FeatureArray::Flat(vec![0.1; 9]),
            FeatureArray::Flat(vec![0.2; 18]),
        ];
        let dps = build_datapoints(&smiles, &features, &[1., 2.], mode).unwrap();

        let batcher = MolBatcher {
            scaler: StandardScaler::fit(&dps),
        };
        let device = Default::default();
        let batch: MolBatch<NdArray> =
            batcher.batch(dps.iter().map(Sample::from).collect(), &device);

        let mut cfg = ModelConfig::for_extras(3, mode);
        cfg.hidden_dim = 16;
        cfg.ffn_hidden_dim = 8;
        let model = cfg.init::<NdArray>(&device);

        model
            .forward(
                batch.elem_ids,
                batch.scalars,
                batch.extra,
                batch.adj,
                batch.edge_feats,
                batch.mask,
            )
            .dims()
    }

    #[test]
    fn feature_mode_forward() {
        assert_eq!(forward_shape(ExtraAtomMode::Feature), [2, 1]);
    }

    #[test]
    fn descriptor_mode_forward() {
        assert_eq!(forward_shape(ExtraAtomMode::Descriptor), [2, 1]);
    }

    #[test]
    fn descriptor_projection_only_in_descriptor_mode() {
        let device = Default::default();
        let f = ModelConfig::for_extras(2, ExtraAtomMode::Feature).init::<NdArray>(&device);
        let d = ModelConfig::for_extras(2, ExtraAtomMode::Descriptor).init::<NdArray>(&device);
        assert!(f.descriptor_proj.is_none());
        assert!(d.descriptor_proj.is_some());
        assert!(d.num_params() > f.num_params());
    }
}
