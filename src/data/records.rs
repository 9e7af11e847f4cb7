//! Record files: a sequence of `(smiles, features, label)` tuples, stored either as a Python
//! pickle or as JSON.
//!
//! A pickle written from Python with plain lists loads as-is:
//!
//! ```python
//! records = [("CCO", [[0.1, 1.0], [0.2, 0.0], [0.3, 1.0]], 1.5), ...]
//! pickle.dump(records, open("data.pkl", "wb"))
//! ```
//!
//! NumPy arrays pickle as opaque reduce calls; convert them with `.tolist()` first.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_pickle::{DeOptions, SerOptions};

use crate::error::Result;

/// Extra per-atom values, as found in the input file. Either one row per atom, or all rows
/// concatenated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureArray {
    Matrix(Vec<Vec<f32>>),
    Flat(Vec<f32>),
}

/// One input tuple: the molecule (as SMILES), its per-atom feature array, and its label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MolRecord(pub String, pub FeatureArray, pub f32);

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Loads records from `path`. `.json` files are read as JSON; anything else as a pickle.
pub fn load_records(path: &Path) -> Result<Vec<MolRecord>> {
    let reader = BufReader::new(File::open(path)?);

    let records: Vec<MolRecord> = if is_json(path) {
        serde_json::from_reader(reader)?
    } else {
        serde_pickle::from_reader(reader, DeOptions::new())?
    };

    info!("Loaded {} records from {path:?}", records.len());
    Ok(records)
}

/// Writes records in the format implied by the extension of `path`.
pub fn save_records(path: &Path, records: &[MolRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);

    if is_json(path) {
        serde_json::to_writer_pretty(&mut writer, records)?;
    } else {
        serde_pickle::to_writer(&mut writer, &records, SerOptions::new())?;
    }
    writer.flush()?;

    debug!("Wrote {} records to {path:?}", records.len());
    Ok(())
}

/// Splits records into parallel lists of molecules, feature arrays, and labels.
pub fn unpack(records: Vec<MolRecord>) -> (Vec<String>, Vec<FeatureArray>, Vec<f32>) {
    let mut smiles = Vec::with_capacity(records.len());
    let mut features = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());

    for MolRecord(smi, feats, y) in records {
        smiles.push(smi);
        features.push(feats);
        labels.push(y);
    }

    (smiles, features, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<MolRecord> {
        vec![
            MolRecord(
                "CCO".into(),
                FeatureArray::Matrix(vec![vec![1., 0.], vec![0., 1.], vec![1., 1.]]),
                0.5,
            ),
            MolRecord("CN".into(), FeatureArray::Flat(vec![1., 2., 3., 4.]), -1.),
        ]
    }

    #[test]
    fn pickle_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mols.pkl");

        save_records(&path, &records()).unwrap();
        assert_eq!(load_records(&path).unwrap(), records());
    }

    #[test]
    fn json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mols.json");

        std::fs::write(
            &path,
            r#"[["CCO", [[1, 0], [0, 1], [1, 1]], 0.5], ["CN", [1, 2, 3, 4], -1]]"#,
        )
        .unwrap();
        assert_eq!(load_records(&path).unwrap(), records());
    }

    #[test]
    fn malformed_pickle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pkl");
        std::fs::write(&path, b"not a pickle").unwrap();

        assert!(matches!(
            load_records(&path),
            Err(crate::error::Error::Pickle(_))
        ));
    }

    #[test]
    fn unpack_keeps_order() {
        let (smiles, features, labels) = unpack(records());
        assert_eq!(smiles, vec!["CCO", "CN"]);
        assert_eq!(features[1], FeatureArray::Flat(vec![1., 2., 3., 4.]));
        assert_eq!(labels, vec![0.5, -1.]);
    }
}
