use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to decode pickle data: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("failed to decode JSON data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config file {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid training config: {0}")]
    InvalidConfig(String),

    #[error("unknown element symbol '{0}'")]
    UnknownElement(String),

    #[error("failed to parse SMILES '{smiles}': {details}")]
    Smiles { smiles: String, details: String },

    #[error(
        "record {index}: feature array has {rows} rows but the molecule has {atoms} atoms"
    )]
    FeatureShape {
        index: usize,
        atoms: usize,
        rows: usize,
    },

    #[error("record {index}: feature rows have differing widths ({expected} and {found})")]
    RaggedFeatures {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("record {index}: flat feature array of length {len} cannot be split into {atoms} atom rows")]
    FlatFeatureLength {
        index: usize,
        atoms: usize,
        len: usize,
    },

    #[error("record {index}: feature rows are empty")]
    EmptyFeatures { index: usize },

    #[error("record {index}: feature width {found} differs from the dataset's width {expected}")]
    FeatureWidth {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error(
        "input lists are not aligned: {molecules} molecules, {features} feature arrays, {labels} labels"
    )]
    LengthMismatch {
        molecules: usize,
        features: usize,
        labels: usize,
    },

    #[error("unknown extra atom feature mode '{0}'; expected 'feature' or 'descriptor'")]
    UnknownMode(String),

    #[error("no datapoints to {0}")]
    EmptyDataset(&'static str),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("training failed: {0}")]
    Training(String),
}

impl Error {
    /// Attaches the record index to a shape error raised without one.
    pub(crate) fn at_index(self, index: usize) -> Self {
        match self {
            Self::FeatureShape { atoms, rows, .. } => Self::FeatureShape { index, atoms, rows },
            Self::RaggedFeatures {
                expected, found, ..
            } => Self::RaggedFeatures {
                index,
                expected,
                found,
            },
            Self::FlatFeatureLength { atoms, len, .. } => {
                Self::FlatFeatureLength { index, atoms, len }
            }
            Self::EmptyFeatures { .. } => Self::EmptyFeatures { index },
            other => other,
        }
    }
}
