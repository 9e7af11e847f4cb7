//! Datapoints: a parsed molecule, its label, and its validated per-atom extra features.

use std::{fmt, str::FromStr};

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    data::records::FeatureArray,
    error::{Error, Result},
    molecules::MolGraph,
};

/// Where extra per-atom values enter the network.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtraAtomMode {
    /// Concatenated to each atom's input features, before message passing.
    #[default]
    Feature,
    /// Concatenated to each atom's hidden state, after message passing.
    Descriptor,
}

impl FromStr for ExtraAtomMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feature" | "features" | "v_f" => Ok(Self::Feature),
            "descriptor" | "descriptors" | "v_d" => Ok(Self::Descriptor),
            _ => Err(Error::UnknownMode(s.to_owned())),
        }
    }
}

impl fmt::Display for ExtraAtomMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self {
            Self::Feature => "feature",
            Self::Descriptor => "descriptor",
        };
        write!(f, "{v}")
    }
}

/// A `(num_rows, width)` matrix, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct AtomFeatures {
    pub values: Vec<f32>,
    pub num_rows: usize,
    pub width: usize,
}

impl AtomFeatures {
    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.width..(i + 1) * self.width]
    }
}

/// Validates `array` against a molecule with `num_atoms` atoms, and reshapes it to
/// `(num_atoms, feature_dim)`. Errors carry index 0; callers attach the record index.
pub fn reshape_features(array: &FeatureArray, num_atoms: usize) -> Result<AtomFeatures> {
    match array {
        FeatureArray::Matrix(rows) => {
            if rows.len() != num_atoms {
                return Err(Error::FeatureShape {
                    index: 0,
                    atoms: num_atoms,
                    rows: rows.len(),
                });
            }

            let width = rows.first().map(Vec::len).unwrap_or(0);
            if let Some(bad) = rows.iter().find(|r| r.len() != width) {
                return Err(Error::RaggedFeatures {
                    index: 0,
                    expected: width,
                    found: bad.len(),
                });
            }
            if width == 0 {
                return Err(Error::EmptyFeatures { index: 0 });
            }

            Ok(AtomFeatures {
                values: rows.concat(),
                num_rows: num_atoms,
                width,
            })
        }
        FeatureArray::Flat(values) => {
            if num_atoms == 0 || values.is_empty() || values.len() % num_atoms != 0 {
                return Err(Error::FlatFeatureLength {
                    index: 0,
                    atoms: num_atoms,
                    len: values.len(),
                });
            }

            Ok(AtomFeatures {
                values: values.clone(),
                num_rows: num_atoms,
                width: values.len() / num_atoms,
            })
        }
    }
}

#[derive(Clone, Debug)]
pub struct Datapoint {
    pub mol: MolGraph,
    pub y: f32,
    pub extra: AtomFeatures,
    pub mode: ExtraAtomMode,
}

impl Datapoint {
    /// Parses the molecule and validates its feature array.
    pub fn new(smiles: &str, features: &FeatureArray, y: f32, mode: ExtraAtomMode) -> Result<Self> {
        let mol = MolGraph::from_smiles(smiles)?;
        let extra = reshape_features(features, mol.num_atoms())?;

        Ok(Self {
            mol,
            y,
            extra,
            mode,
        })
    }
}

/// Builds one datapoint per molecule. The three lists must align positionally, and all feature
/// arrays must share one width.
pub fn build_datapoints(
    smiles: &[String],
    features: &[FeatureArray],
    labels: &[f32],
    mode: ExtraAtomMode,
) -> Result<Vec<Datapoint>> {
    if smiles.len() != features.len() || smiles.len() != labels.len() {
        return Err(Error::LengthMismatch {
            molecules: smiles.len(),
            features: features.len(),
            labels: labels.len(),
        });
    }

    let datapoints: Vec<Datapoint> = smiles
        .par_iter()
        .zip(features.par_iter())
        .zip(labels.par_iter())
        .enumerate()
        .map(|(i, ((smi, feats), &y))| {
            Datapoint::new(smi, feats, y, mode).map_err(|e| e.at_index(i))
        })
        .collect::<Result<_>>()?;

    if let Some(first) = datapoints.first() {
        let expected = first.extra.width;
        if let Some((index, dp)) = datapoints
            .iter()
            .enumerate()
            .find(|(_, dp)| dp.extra.width != expected)
        {
            return Err(Error::FeatureWidth {
                index,
                expected,
                found: dp.extra.width,
            });
        }
    }

    for (i, dp) in datapoints.iter().enumerate() {
        debug!(
            "Datapoint {i}: {} ({} atoms, {} extra {}s per atom), y = {}",
            dp.mol.ident,
            dp.mol.num_atoms(),
            dp.extra.width,
            mode,
            dp.y
        );
    }

    Ok(datapoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing() {
        assert_eq!("feature".parse::<ExtraAtomMode>().unwrap(), ExtraAtomMode::Feature);
        assert_eq!(" Descriptor ".parse::<ExtraAtomMode>().unwrap(), ExtraAtomMode::Descriptor);
        assert_eq!("V_D".parse::<ExtraAtomMode>().unwrap(), ExtraAtomMode::Descriptor);

        let err = "bond".parse::<ExtraAtomMode>().unwrap_err();
        assert!(matches!(err, Error::UnknownMode(ref m) if m == "bond"));
        assert!(err.to_string().contains("'bond'"));
    }

    #[test]
    fn reshape_matrix() {
        let arr = FeatureArray::Matrix(vec![vec![1., 2.], vec![3., 4.], vec![5., 6.]]);
        let f = reshape_features(&arr, 3).unwrap();
        assert_eq!((f.num_rows, f.width), (3, 2));
        assert_eq!(f.row(1), &[3., 4.]);
    }

    #[test]
    fn reshape_flat() {
        let arr = FeatureArray::Flat(vec![1., 2., 3., 4., 5., 6.]);
        let f = reshape_features(&arr, 2).unwrap();
        assert_eq!((f.num_rows, f.width), (2, 3));
        assert_eq!(f.row(1), &[4., 5., 6.]);
    }

    #[test]
    fn reshape_mismatch() {
        let arr = FeatureArray::Matrix(vec![vec![1.]; 4]);
        assert!(matches!(
            reshape_features(&arr, 3),
            Err(Error::FeatureShape { atoms: 3, rows: 4, .. })
        ));

        let ragged = FeatureArray::Matrix(vec![vec![1., 2.], vec![3.]]);
        assert!(matches!(
            reshape_features(&ragged, 2),
            Err(Error::RaggedFeatures { expected: 2, found: 1, .. })
        ));

        let flat = FeatureArray::Flat(vec![1., 2., 3.]);
        assert!(matches!(
            reshape_features(&flat, 2),
            Err(Error::FlatFeatureLength { atoms: 2, len: 3, .. })
        ));

        assert!(reshape_features(&FeatureArray::Flat(vec![]), 2).is_err());
        assert!(matches!(
            reshape_features(&FeatureArray::Matrix(vec![vec![], vec![]]), 2),
            Err(Error::EmptyFeatures { .. })
        ));
    }

    #[test]
    fn datapoints_match_atom_counts() {
        let smiles = vec!["CCO".to_string(), "c1ccccc1".to_string()];
        let features = vec![
            FeatureArray::Matrix(vec![vec![0.5]; 3]),
            FeatureArray::Matrix(vec![vec![0.25]; 6]),
        ];
        let dps =
            build_datapoints(&smiles, &features, &[1., 2.], ExtraAtomMode::Descriptor).unwrap();

        assert_eq!(dps.len(), 2);
        assert_eq!(dps[1].extra.num_rows, 6);
        assert_eq!(dps[1].y, 2.);
        assert!(dps.iter().all(|dp| dp.mode == ExtraAtomMode::Descriptor));
    }

    #[test]
    fn datapoint_error_names_record() {
        let smiles = vec!["CCO".to_string(), "c1ccccc1".to_string()];
        let features = vec![
            FeatureArray::Matrix(vec![vec![0.5]; 3]),
            FeatureArray::Matrix(vec![vec![0.25]; 5]),
        ];
        let err = build_datapoints(&smiles, &features, &[1., 2.], ExtraAtomMode::Feature)
            .unwrap_err();

        assert!(matches!(err, Error::FeatureShape { index: 1, atoms: 6, rows: 5 }));
        assert!(err.to_string().contains("record 1"));
    }

    #[test]
    fn misaligned_lists() {
        let smiles = vec!["CCO".to_string()];
        let features = vec![FeatureArray::Flat(vec![1., 2., 3.])];
        assert!(matches!(
            build_datapoints(&smiles, &features, &[1., 2.], ExtraAtomMode::Feature),
            Err(Error::LengthMismatch { molecules: 1, features: 1, labels: 2 })
        ));
    }

    #[test]
    fn differing_widths() {
        let smiles = vec!["CC".to_string(), "CC".to_string()];
        let features = vec![
            FeatureArray::Flat(vec![1., 2.]),
            FeatureArray::Flat(vec![1., 2., 3., 4.]),
        ];
        assert!(matches!(
            build_datapoints(&smiles, &features, &[1., 2.], ExtraAtomMode::Feature),
            Err(Error::FeatureWidth { index: 1, expected: 1, found: 2 })
        ));
    }
}
