//! Chemical elements we expect to encounter in drug-like molecules.

use crate::error::{Error, Result};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Element {
    Hydrogen,
    Boron,
    Carbon,
    Nitrogen,
    Oxygen,
    Fluorine,
    Silicon,
    Phosphorus,
    Sulfur,
    Chlorine,
    Selenium,
    Bromine,
    Iodine,
    Other,
}

impl Element {
    pub fn from_letter(letter: &str) -> Result<Self> {
        match letter.to_uppercase().as_ref() {
            "H" => Ok(Self::Hydrogen),
            "B" => Ok(Self::Boron),
            "C" => Ok(Self::Carbon),
            "N" => Ok(Self::Nitrogen),
            "O" => Ok(Self::Oxygen),
            "F" => Ok(Self::Fluorine),
            "SI" => Ok(Self::Silicon),
            "P" => Ok(Self::Phosphorus),
            "S" => Ok(Self::Sulfur),
            "CL" => Ok(Self::Chlorine),
            "SE" => Ok(Self::Selenium),
            "BR" => Ok(Self::Bromine),
            "I" => Ok(Self::Iodine),
            // Metals and the like; the featurizer buckets these together.
            "NA" | "K" | "LI" | "MG" | "CA" | "ZN" | "FE" | "CU" | "AL" | "SN" | "PT" | "AS"
            | "TE" | "AG" | "AU" | "HG" => Ok(Self::Other),
            _ => Err(Error::UnknownElement(letter.to_owned())),
        }
    }

    /// Allowed valences, lowest first. Used to infer implicit hydrogens on organic-subset
    /// atoms the same way SMILES readers do: pick the lowest valence that fits the bonds.
    pub fn valences(&self) -> &'static [u8] {
        match self {
            Self::Hydrogen => &[1],
            Self::Boron => &[3],
            Self::Carbon => &[4],
            Self::Nitrogen => &[3, 5],
            Self::Oxygen => &[2],
            Self::Fluorine | Self::Chlorine | Self::Bromine | Self::Iodine => &[1],
            Self::Silicon => &[4],
            Self::Phosphorus => &[3, 5],
            Self::Sulfur | Self::Selenium => &[2, 4, 6],
            Self::Other => &[],
        }
    }

    #[rustfmt::skip]
    /// Standard atomic weight, in Daltons.
    pub fn atomic_weight(&self) -> f32 {
        match self {
            Self::Hydrogen   => 1.008,
            Self::Boron      => 10.81,
            Self::Carbon     => 12.011,
            Self::Nitrogen   => 14.007,
            Self::Oxygen     => 15.999,
            Self::Fluorine   => 18.998,
            Self::Silicon    => 28.085,
            Self::Phosphorus => 30.974,
            Self::Sulfur     => 32.06,
            Self::Chlorine   => 35.45,
            Self::Selenium   => 78.971,
            Self::Bromine    => 79.904,
            Self::Iodine     => 126.904,
            Self::Other      => 0.,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters() {
        assert_eq!(Element::from_letter("Cl").unwrap(), Element::Chlorine);
        assert_eq!(Element::from_letter("br").unwrap(), Element::Bromine);
        assert_eq!(Element::from_letter("Na").unwrap(), Element::Other);
        assert!(Element::from_letter("Qq").is_err());
    }
}
