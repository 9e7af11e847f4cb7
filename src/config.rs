//! Training hyperparameters, read from an optional TOML file.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    data::datapoint::ExtraAtomMode,
    error::{Error, Result},
    model::ModelConfig,
};

/// Missing keys take their defaults; unknown keys are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Floor of the cosine annealing schedule.
    pub min_learning_rate: f64,
    pub seed: u64,
    /// Share of datapoints held out for validation. 0 validates on the training set.
    pub val_fraction: f32,
    pub hidden_dim: usize,
    /// Message-passing layers.
    pub depth: usize,
    pub ffn_hidden_dim: usize,
    pub ffn_layers: usize,
    pub dropout: f64,
    pub artifact_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 3,
            batch_size: 50,
            learning_rate: 1e-3,
            min_learning_rate: 1e-4,
            seed: 42,
            val_fraction: 0.,
            hidden_dim: 300,
            depth: 3,
            ffn_hidden_dim: 300,
            ffn_layers: 1,
            dropout: 0.,
            artifact_dir: PathBuf::from("checkpoints"),
        }
    }
}

impl TrainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&text).map_err(|source| Error::Config {
            path: path.to_owned(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::InvalidConfig("epochs must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch_size must be at least 1".into()));
        }
        if self.hidden_dim == 0 || self.ffn_hidden_dim == 0 {
            return Err(Error::InvalidConfig("layer widths must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.val_fraction) {
            return Err(Error::InvalidConfig(format!(
                "val_fraction must be in [0, 1), got {}",
                self.val_fraction
            )));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(Error::InvalidConfig(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.min_learning_rate > self.learning_rate {
            return Err(Error::InvalidConfig(
                "min_learning_rate exceeds learning_rate".into(),
            ));
        }
        Ok(())
    }

    /// Network architecture for datapoints with `extra_dim` extra values per atom.
    pub fn model_config(&self, extra_dim: usize, mode: ExtraAtomMode) -> ModelConfig {
        let mut cfg = ModelConfig::for_extras(extra_dim, mode);
        cfg.hidden_dim = self.hidden_dim;
        cfg.depth = self.depth;
        cfg.ffn_hidden_dim = self.ffn_hidden_dim;
        cfg.ffn_layers = self.ffn_layers;
        cfg.dropout = self.dropout;
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.toml");
        fs::write(&path, "epochs = 10\nhidden_dim = 64\nartifact_dir = \"out\"\n").unwrap();

        let cfg = TrainConfig::load(&path).unwrap();
        assert_eq!(cfg.epochs, 10);
        assert_eq!(cfg.hidden_dim, 64);
        assert_eq!(cfg.artifact_dir, PathBuf::from("out"));
        assert_eq!(cfg.batch_size, 50);
        assert_eq!(cfg.seed, 42);
    }

    #[test]
    fn unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.toml");
        fs::write(&path, "epochs = 2\nepoch = 3\n").unwrap();

        assert!(matches!(TrainConfig::load(&path), Err(Error::Config { .. })));
    }

    #[test]
    fn out_of_range_values() {
        let cfg = TrainConfig {
            epochs: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig(_))));

        let cfg = TrainConfig {
            val_fraction: 1.,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn model_config_follows_train_config() {
        let cfg = TrainConfig {
            hidden_dim: 32,
            depth: 2,
            ..Default::default()
        };
        let m = cfg.model_config(4, ExtraAtomMode::Descriptor);
        assert_eq!(m.hidden_dim, 32);
        assert_eq!(m.depth, 2);
        assert_eq!(m.extra_dim, 4);
        assert_eq!(m.mode, ExtraAtomMode::Descriptor);
    }
}
