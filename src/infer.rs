//! Inference from a saved checkpoint. Shares the model and batching with `train.rs`.

use std::{fs, path::Path};

use burn::{
    backend::NdArray,
    data::dataloader::batcher::Batcher,
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use log::{info, warn};

use crate::{
    data::{
        datapoint::Datapoint,
        dataset::{MolBatch, MolBatcher, Sample, StandardScaler},
    },
    error::{Error, Result},
    model::{Model, ModelConfig},
    train::checkpoint_paths,
};

// CPU is fast enough for inference on small batches.
type InferBackend = NdArray;

const INFER_BATCH_SIZE: usize = 64;

pub struct Predictor {
    model: Model<InferBackend>,
    config: ModelConfig,
    batcher: MolBatcher,
    device: <InferBackend as Backend>::Device,
}

impl Predictor {
    /// Rebuilds the model from the config saved in `artifact_dir`, and loads its weights and
    /// scaler.
    pub fn load(artifact_dir: &Path) -> Result<Self> {
        let (model_path, config_path, scaler_path) = checkpoint_paths(artifact_dir);

        let config: ModelConfig = serde_json::from_slice(&fs::read(&config_path)?)?;
        let scaler: StandardScaler = serde_json::from_slice(&fs::read(&scaler_path)?)?;

        let device = Default::default();

        // Model extension is inferred by the recorder.
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = config
            .init::<InferBackend>(&device)
            .load_file(model_path, &recorder, &device)
            .map_err(|e| Error::Checkpoint(e.to_string()))?;

        info!(
            "Loaded model from {artifact_dir:?} ({} mode, {} extra values per atom)",
            config.mode, config.extra_dim
        );

        Ok(Self {
            model,
            config,
            batcher: MolBatcher { scaler },
            device,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// One prediction per datapoint, in the label's original units.
    pub fn predict(&self, datapoints: &[Datapoint]) -> Result<Vec<f32>> {
        if datapoints.is_empty() {
            return Err(Error::EmptyDataset("predict"));
        }

        for (index, dp) in datapoints.iter().enumerate() {
            if dp.extra.width != self.config.extra_dim {
                return Err(Error::FeatureWidth {
                    index,
                    expected: self.config.extra_dim,
                    found: dp.extra.width,
                });
            }
        }
        if datapoints[0].mode != self.config.mode {
            warn!(
                "Datapoints were built in {} mode; the model was trained in {} mode",
                datapoints[0].mode, self.config.mode
            );
        }

        let mut result = Vec::with_capacity(datapoints.len());

        for chunk in datapoints.chunks(INFER_BATCH_SIZE) {
            let items = chunk.iter().map(Sample::from).collect();
            let batch: MolBatch<InferBackend> = self.batcher.batch(items, &self.device);

            let pred = self.model.forward(
                batch.elem_ids,
                batch.scalars,
                batch.extra,
                batch.adj,
                batch.edge_feats,
                batch.mask,
            );

            let values = pred
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| Error::Checkpoint(format!("{e:?}")))?;

            result.extend(
                values
                    .into_iter()
                    .map(|v| self.batcher.scaler.denormalize_target(v)),
            );
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(Predictor::load(dir.path()), Err(Error::Io { .. })));
    }
}
