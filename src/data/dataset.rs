//! Featurized samples, target/feature scaling, and batching into tensors.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::Int,
    tensor::{Tensor, TensorData, backend::Backend},
};
use log::warn;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    data::datapoint::Datapoint,
    featurize::{self, GraphData, PER_ATOM_SCALARS, PER_EDGE_FEATS},
};

#[derive(Clone, Debug)]
pub struct Sample {
    pub graph: GraphData,
    /// Unscaled extra per-atom values, `[num_atoms * extra_width]`.
    pub extra: Vec<f32>,
    pub extra_width: usize,
    pub target: f32,
}

impl From<&Datapoint> for Sample {
    fn from(dp: &Datapoint) -> Self {
        Self {
            graph: GraphData::new(&dp.mol),
            extra: dp.extra.values.clone(),
            extra_width: dp.extra.width,
            target: dp.y,
        }
    }
}

/// In-memory collection of featurized molecules.
pub struct MoleculeDataset {
    samples: Vec<Sample>,
}

impl MoleculeDataset {
    pub fn new(datapoints: &[Datapoint]) -> Self {
        Self {
            samples: datapoints.par_iter().map(Sample::from).collect(),
        }
    }

    pub fn extra_width(&self) -> usize {
        self.samples.first().map(|s| s.extra_width).unwrap_or(0)
    }
}

impl Dataset<Sample> for MoleculeDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Seeded shuffle split into (train, validation). If the validation split would be empty,
/// the training set doubles as the validation set.
pub fn split(
    datapoints: &[Datapoint],
    val_fraction: f32,
    seed: u64,
) -> (Vec<Datapoint>, Vec<Datapoint>) {
    let mut indices: Vec<usize> = (0..datapoints.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_val = (datapoints.len() as f32 * val_fraction.clamp(0., 1.)).round() as usize;
    // Keep at least one training sample.
    let n_val = n_val.min(datapoints.len().saturating_sub(1));

    if n_val == 0 {
        warn!("Validation split is empty; validating on the training set");
        return (datapoints.to_vec(), datapoints.to_vec());
    }

    let valid = indices[..n_val].iter().map(|&i| datapoints[i].clone()).collect();
    let train = indices[n_val..].iter().map(|&i| datapoints[i].clone()).collect();

    (train, valid)
}

/// Per-column mean and std of the extra atom values, and of the targets. Fitted on the training
/// set; applied to every batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    pub y_mean: f32,
    pub y_std: f32,
}

fn safe_std(s: f32) -> f32 {
    if s.abs() < 1e-9 { 1.0 } else { s }
}

impl StandardScaler {
    pub fn fit(train: &[Datapoint]) -> Self {
        let width = train.first().map(|dp| dp.extra.width).unwrap_or(0);

        let mut mean = vec![0.0; width];
        let mut var = vec![0.0; width];
        let mut rows = 0usize;

        for dp in train {
            for r in 0..dp.extra.num_rows {
                for (m, v) in mean.iter_mut().zip(dp.extra.row(r)) {
                    *m += v;
                }
                rows += 1;
            }
        }
        let n_rows = rows.max(1) as f32;
        for m in &mut mean {
            *m /= n_rows;
        }

        for dp in train {
            for r in 0..dp.extra.num_rows {
                for (i, v) in dp.extra.row(r).iter().enumerate() {
                    let d = v - mean[i];
                    var[i] += d * d;
                }
            }
        }
        let std = var.iter().map(|v| (v / n_rows).sqrt()).collect();

        let n = train.len().max(1) as f32;
        let y_mean = train.iter().map(|dp| dp.y).sum::<f32>() / n;
        let y_var = train.iter().map(|dp| (dp.y - y_mean).powi(2)).sum::<f32>() / n;

        Self {
            mean,
            std,
            y_mean,
            y_std: y_var.sqrt(),
        }
    }

    pub fn normalize_target(&self, y: f32) -> f32 {
        (y - self.y_mean) / safe_std(self.y_std)
    }

    pub fn denormalize_target(&self, y_norm: f32) -> f32 {
        y_norm * safe_std(self.y_std) + self.y_mean
    }

    /// Scales row-major `[rows * width]` values in place.
    pub fn apply_in_place(&self, x: &mut [f32]) {
        let width = self.mean.len();
        if width == 0 {
            return;
        }
        for row in x.chunks_mut(width) {
            for (i, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[i]) / safe_std(self.std[i]);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct MolBatch<B: Backend> {
    pub elem_ids: Tensor<B, 2, Int>,
    /// Per-atom properties, e.g. degree and formal charge.
    pub scalars: Tensor<B, 3>,
    /// Scaled extra per-atom values.
    pub extra: Tensor<B, 3>,
    pub adj: Tensor<B, 3>,
    pub edge_feats: Tensor<B, 4>,
    pub mask: Tensor<B, 3>,
    pub targets: Tensor<B, 2>,
}

/// Pads each graph to the largest graph in the batch.
#[derive(Clone)]
pub struct MolBatcher {
    pub scaler: StandardScaler,
}

impl<B: Backend> Batcher<B, Sample, MolBatch<B>> for MolBatcher {
    fn batch(&self, items: Vec<Sample>, device: &B::Device) -> MolBatch<B> {
        let batch_size = items.len();
        let max_atoms = items.iter().map(|s| s.graph.num_atoms).max().unwrap_or(0).max(1);
        let extra_width = items.first().map(|s| s.extra_width).unwrap_or(0).max(1);

        let mut batch_elem_ids = Vec::with_capacity(batch_size * max_atoms);
        let mut batch_scalars = Vec::new();
        let mut batch_extra = Vec::new();
        let mut batch_adj = Vec::new();
        let mut batch_edge_feats = Vec::new();
        let mut batch_mask = Vec::new();
        let mut batch_y = Vec::with_capacity(batch_size);

        for mut item in items {
            let n = item.graph.num_atoms;

            batch_elem_ids.extend_from_slice(&item.graph.elem_indices);
            batch_elem_ids.extend(std::iter::repeat_n(0, max_atoms - n));

            batch_scalars.extend(featurize::pad_rows(
                &item.graph.scalars,
                n,
                PER_ATOM_SCALARS,
                max_atoms,
            ));

            if item.extra_width == 0 {
                item.extra = vec![0.; n];
            } else {
                self.scaler.apply_in_place(&mut item.extra);
            }
            batch_extra.extend(featurize::pad_rows(&item.extra, n, extra_width, max_atoms));

            let (p_adj, p_mask) = featurize::pad_adj_and_mask(&item.graph.adj, n, max_atoms);
            batch_adj.extend(p_adj);
            batch_mask.extend(p_mask);

            batch_edge_feats.extend(featurize::pad_edge_feats(
                &item.graph.edge_feats,
                n,
                PER_EDGE_FEATS,
                max_atoms,
            ));

            batch_y.push(self.scaler.normalize_target(item.target));
        }

        let elem_ids = TensorData::new(batch_elem_ids, [batch_size, max_atoms]);
        let scalars = TensorData::new(batch_scalars, [batch_size, max_atoms, PER_ATOM_SCALARS]);
        let extra = TensorData::new(batch_extra, [batch_size, max_atoms, extra_width]);
        let adj = TensorData::new(batch_adj, [batch_size, max_atoms, max_atoms]);
        let edge_feats = TensorData::new(
            batch_edge_feats,
            [batch_size, max_atoms, max_atoms, PER_EDGE_FEATS],
        );
        let mask = TensorData::new(batch_mask, [batch_size, max_atoms, 1]);
        let y = TensorData::new(batch_y, [batch_size, 1]);

        MolBatch {
            elem_ids: Tensor::from_data(elem_ids, device),
            scalars: Tensor::from_data(scalars, device),
            extra: Tensor::from_data(extra, device),
            adj: Tensor::from_data(adj, device),
            edge_feats: Tensor::from_data(edge_feats, device),
            mask: Tensor::from_data(mask, device),
            targets: Tensor::from_data(y, device),
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;
    use crate::data::{
        datapoint::{ExtraAtomMode, build_datapoints},
        records::FeatureArray,
    };

    fn datapoints() -> Vec<Datapoint> {
        let smiles = vec!["CCO".to_string(), "CC".to_string(), "C".to_string()];
        let features = vec![
            FeatureArray::Matrix(vec![vec![1., 10.], vec![2., 10.], vec![3., 10.]]),
            FeatureArray::Matrix(vec![vec![4., 10.], vec![5., 10.]]),
            FeatureArray::Matrix(vec![vec![6., 10.]]),
        ];
        build_datapoints(&smiles, &features, &[1., 2., 3.], ExtraAtomMode::Feature).unwrap()
    }

    #[test]
    fn scaler() {
        let scaler = StandardScaler::fit(&datapoints());

        assert!((scaler.mean[0] - 3.5).abs() < 1e-6);
        assert!((scaler.mean[1] - 10.).abs() < 1e-6);
        // Constant column: std 0, treated as 1 when scaling.
        assert_eq!(scaler.std[1], 0.);
        assert!((scaler.y_mean - 2.).abs() < 1e-6);

        let mut x = vec![3.5, 10., 3.5, 11.];
        scaler.apply_in_place(&mut x);
        assert_eq!(x, vec![0., 0., 0., 1.]);

        let y = scaler.normalize_target(2.5);
        assert!((scaler.denormalize_target(y) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn split_is_seeded() {
        let dps = datapoints();

        let (train, valid) = split(&dps, 0.34, 7);
        assert_eq!((train.len(), valid.len()), (2, 1));

        let (train_2, valid_2) = split(&dps, 0.34, 7);
        assert_eq!(valid[0].mol.ident, valid_2[0].mol.ident);
        assert_eq!(train[0].mol.ident, train_2[0].mol.ident);
    }

    #[test]
    fn empty_split_reuses_train() {
        let dps = datapoints();
        let (train, valid) = split(&dps, 0., 7);
        assert_eq!(train.len(), 3);
        assert_eq!(valid.len(), 3);
    }

    #[test]
    fn dataset_and_batch_shapes() {
        let dps = datapoints();
        let dataset = MoleculeDataset::new(&dps);
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.extra_width(), 2);

        let items: Vec<Sample> = (0..dataset.len()).filter_map(|i| dataset.get(i)).collect();
        let batcher = MolBatcher {
            scaler: StandardScaler::fit(&dps),
        };
        let device = Default::default();
        let batch: MolBatch<NdArray> = batcher.batch(items, &device);

        assert_eq!(batch.elem_ids.dims(), [3, 3]);
        assert_eq!(batch.scalars.dims(), [3, 3, PER_ATOM_SCALARS]);
        assert_eq!(batch.extra.dims(), [3, 3, 2]);
        assert_eq!(batch.adj.dims(), [3, 3, 3]);
        assert_eq!(batch.edge_feats.dims(), [3, 3, 3, PER_EDGE_FEATS]);
        assert_eq!(batch.targets.dims(), [3, 1]);

        let mask = batch.mask.into_data().to_vec::<f32>().unwrap();
        assert_eq!(mask, vec![1., 1., 1., 1., 1., 0., 1., 0., 0.]);
    }
}
