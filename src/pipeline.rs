//! The end-to-end driver: records → datapoints → dataset → dataloader → model → trainer.

use std::path::Path;

use log::info;

use crate::{
    config::TrainConfig,
    data::{
        datapoint::{Datapoint, ExtraAtomMode, build_datapoints},
        records::{self, FeatureArray, load_records},
    },
    error::Result,
    train::{TrainReport, train},
};

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub num_datapoints: usize,
    pub report: TrainReport,
}

fn print_loaded(smiles: &[String], features: &[FeatureArray], labels: &[f32]) {
    println!("Loaded {} molecules", smiles.len());
    for (i, ((smi, feats), y)) in smiles.iter().zip(features).zip(labels).enumerate() {
        let layout = match feats {
            FeatureArray::Matrix(rows) => format!(
                "{} x {}",
                rows.len(),
                rows.first().map(Vec::len).unwrap_or(0)
            ),
            FeatureArray::Flat(v) => format!("{} (flat)", v.len()),
        };
        println!("  {i:>4}  {smi:<40} features: {layout:<12} label: {y}");
    }
}

/// Loads the record file at `path` and builds datapoints, with extra atom values used as
/// `mode` describes.
pub fn load_datapoints(path: &Path, mode: &str) -> Result<Vec<Datapoint>> {
    let mode: ExtraAtomMode = mode.parse()?;

    let (smiles, features, labels) = records::unpack(load_records(path)?);
    print_loaded(&smiles, &features, &labels);

    let datapoints = build_datapoints(&smiles, &features, &labels, mode)?;
    info!("Built {} datapoints in {mode} mode", datapoints.len());

    Ok(datapoints)
}

/// Loads `path` and trains on it.
pub fn run(path: &Path, mode: &str, cfg: &TrainConfig) -> Result<RunSummary> {
    let datapoints = load_datapoints(path, mode)?;
    let report = train(&datapoints, cfg)?;

    Ok(RunSummary {
        num_datapoints: datapoints.len(),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::records::{MolRecord, save_records},
        error::Error,
    };

    #[test]
    fn unknown_mode_checked_before_io() {
        let err = load_datapoints(Path::new("does/not/exist.pkl"), "atom").unwrap_err();
        assert!(matches!(err, Error::UnknownMode(_)));
    }

    #[test]
    fn loads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mols.pkl");
        save_records(
            &path,
            &[
                MolRecord("CCO".into(), FeatureArray::Flat(vec![0.; 6]), 1.),
                MolRecord("CCN".into(), FeatureArray::Flat(vec![0.; 8]), 2.),
            ],
        )
        .unwrap();

        // Second record: 8 values don't split into 3 atom rows.
        assert!(matches!(
            load_datapoints(&path, "feature"),
            Err(Error::FlatFeatureLength { index: 1, .. })
        ));
    }
}
