//! Molecular property regression with a small message-passing network.
//!
//! Records of `(smiles, per-atom features, label)` are loaded from a pickle or JSON file,
//! validated against each molecule's atom count, and turned into datapoints. Those feed a
//! `burn` dataset and data loader, a message-passing model, and burn's supervised training loop.

pub mod config;
pub mod data;
pub mod element;
pub mod error;
pub mod featurize;
pub mod infer;
pub mod model;
pub mod molecules;
pub mod pipeline;
pub mod smiles;
pub mod train;

pub use config::TrainConfig;
pub use data::{
    datapoint::{Datapoint, ExtraAtomMode, build_datapoints, reshape_features},
    records::{FeatureArray, MolRecord, load_records, save_records, unpack},
};
pub use error::{Error, Result};
pub use infer::Predictor;
pub use model::{Model, ModelConfig};
pub use train::{TrainReport, train};
