//! Input records, validated datapoints, and the dataset/batching layer fed to the trainer.

pub mod datapoint;
pub mod dataset;
pub mod records;
