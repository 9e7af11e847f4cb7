//! Supervised training: wires the dataset, loaders, model, optimizer and learning-rate schedule
//! into burn's training loop, then writes the checkpoint.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

#[cfg(not(feature = "wgpu"))]
use burn::backend::NdArray;
#[cfg(feature = "wgpu")]
use burn::backend::Wgpu;
use burn::{
    backend::Autodiff,
    data::dataloader::DataLoaderBuilder,
    lr_scheduler::cosine::CosineAnnealingLrSchedulerConfig,
    module::Module,
    nn::loss::{MseLoss, Reduction},
    optim::AdamConfig,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
    train::{
        InferenceStep, Learner, RegressionOutput, SupervisedTraining, TrainOutput, TrainStep,
        TrainingStrategy, metric::LossMetric,
    },
};
use log::info;

use crate::{
    config::TrainConfig,
    data::{
        datapoint::Datapoint,
        dataset::{self, MolBatch, MolBatcher, MoleculeDataset, StandardScaler},
    },
    error::{Error, Result},
    model::Model,
};

#[cfg(not(feature = "wgpu"))]
pub(crate) type ValidBackend = NdArray;
#[cfg(feature = "wgpu")]
pub(crate) type ValidBackend = Wgpu;
pub(crate) type TrainBackend = Autodiff<ValidBackend>;

/// File stem of the weights; the recorder appends `.mpk`.
pub const MODEL_FILE: &str = "model";
pub const MODEL_CONFIG_FILE: &str = "model_config.json";
pub const SCALER_FILE: &str = "scaler.json";

/// Weights, model config and scaler paths within an artifact directory.
pub fn checkpoint_paths(artifact_dir: &Path) -> (PathBuf, PathBuf, PathBuf) {
    (
        artifact_dir.join(MODEL_FILE),
        artifact_dir.join(MODEL_CONFIG_FILE),
        artifact_dir.join(SCALER_FILE),
    )
}

impl<B: Backend> Model<B> {
    fn forward_regression(&self, batch: MolBatch<B>) -> RegressionOutput<B> {
        let pred = self.forward(
            batch.elem_ids,
            batch.scalars,
            batch.extra,
            batch.adj,
            batch.edge_feats,
            batch.mask,
        );

        let loss = MseLoss::new().forward(pred.clone(), batch.targets.clone(), Reduction::Mean);

        RegressionOutput::new(loss, pred, batch.targets)
    }
}

impl TrainStep for Model<TrainBackend> {
    type Input = MolBatch<TrainBackend>;
    type Output = RegressionOutput<TrainBackend>;

    fn step(&self, batch: Self::Input) -> TrainOutput<Self::Output> {
        let output = self.forward_regression(batch);
        let grads = output.loss.backward();

        TrainOutput::new(self, grads, output)
    }
}

impl InferenceStep for Model<ValidBackend> {
    type Input = MolBatch<ValidBackend>;
    type Output = RegressionOutput<ValidBackend>;

    fn step(&self, batch: Self::Input) -> Self::Output {
        self.forward_regression(batch)
    }
}

/// What a finished training run produced.
#[derive(Clone, Debug)]
pub struct TrainReport {
    pub num_train: usize,
    pub num_valid: usize,
    pub epochs: usize,
    pub num_params: usize,
    /// Includes the `.mpk` extension.
    pub model_path: PathBuf,
    pub config_path: PathBuf,
    pub scaler_path: PathBuf,
    pub elapsed_s: f32,
}

/// Trains a model on `datapoints` and writes the checkpoint to `cfg.artifact_dir`.
pub fn train(datapoints: &[Datapoint], cfg: &TrainConfig) -> Result<TrainReport> {
    cfg.validate()?;

    let Some(first) = datapoints.first() else {
        return Err(Error::EmptyDataset("train on"));
    };
    let mode = first.mode;

    let start = Instant::now();
    fs::create_dir_all(&cfg.artifact_dir)?;

    let (data_train, data_valid) = dataset::split(datapoints, cfg.val_fraction, cfg.seed);
    let dataset_train = MoleculeDataset::new(&data_train);
    let extra_dim = dataset_train.extra_width();
    info!(
        "Training on {} datapoints, validating on {} ({mode} mode, {extra_dim} extra values per atom)",
        data_train.len(),
        data_valid.len()
    );

    let scaler = StandardScaler::fit(&data_train);
    let device = Default::default();

    TrainBackend::seed(&device, cfg.seed);
    ValidBackend::seed(&device, cfg.seed);

    let train_loader = DataLoaderBuilder::new(MolBatcher {
        scaler: scaler.clone(),
    })
    .batch_size(cfg.batch_size)
    .shuffle(cfg.seed)
    .build(dataset_train);

    let valid_loader = DataLoaderBuilder::new(MolBatcher {
        scaler: scaler.clone(),
    })
    .batch_size(cfg.batch_size)
    .build(MoleculeDataset::new(&data_valid));

    let model_cfg = cfg.model_config(extra_dim, mode);
    let model = model_cfg.init::<TrainBackend>(&device);
    let num_params = model.num_params();
    info!("Model parameter count: {num_params}");

    let optim = AdamConfig::new().init();
    let steps_per_epoch = data_train.len().div_ceil(cfg.batch_size);
    let lr_scheduler =
        CosineAnnealingLrSchedulerConfig::new(cfg.learning_rate, steps_per_epoch * cfg.epochs)
            .with_min_lr(cfg.min_learning_rate)
            .init()
            .map_err(Error::Training)?;

    let artifact_dir = cfg
        .artifact_dir
        .to_str()
        .ok_or_else(|| Error::Checkpoint(format!("non-UTF-8 path {:?}", cfg.artifact_dir)))?;

    let training = SupervisedTraining::new(artifact_dir, train_loader, valid_loader)
        .metrics((LossMetric::new(),))
        .num_epochs(cfg.epochs)
        .with_training_strategy(TrainingStrategy::SingleDevice(device.clone()))
        .summary();

    let result = training.launch(Learner::new(model, optim, lr_scheduler));

    let (model_path, config_path, scaler_path) = checkpoint_paths(&cfg.artifact_dir);

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    result
        .model
        .save_file(&model_path, &recorder)
        .map_err(|e| Error::Checkpoint(e.to_string()))?;

    serde_json::to_writer_pretty(fs::File::create(&config_path)?, &model_cfg)?;
    serde_json::to_writer_pretty(fs::File::create(&scaler_path)?, &scaler)?;

    let elapsed_s = start.elapsed().as_secs_f32();
    let model_path = model_path.with_extension("mpk");
    info!("Training complete in {elapsed_s:.1} s. Saved model to {model_path:?}");

    Ok(TrainReport {
        num_train: data_train.len(),
        num_valid: data_valid.len(),
        epochs: cfg.epochs,
        num_params,
        model_path,
        config_path,
        scaler_path,
        elapsed_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainConfig {
            artifact_dir: dir.path().to_owned(),
            ..Default::default()
        };
        assert!(matches!(train(&[], &cfg), Err(Error::EmptyDataset(_))));
    }

    #[test]
    fn paths_within_artifact_dir() {
        let (m, c, s) = checkpoint_paths(Path::new("ckpt"));
        assert_eq!(m, Path::new("ckpt/model"));
        assert_eq!(c, Path::new("ckpt/model_config.json"));
        assert_eq!(s, Path::new("ckpt/scaler.json"));
    }
}
