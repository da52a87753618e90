//!
//! The target-molecule table, supplemented from `original_source`'s molar-mass usage
//! in the flux calculator (see SPEC_FULL.md "Supplemented features").
//!

use crate::result::{Error, Result};

/// A gas species the pipeline can retrieve a column for (spec §6 `molecule` enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Molecule {
    SO2,
    BrO,
    NO2,
    O3,
    HCHO,
}

/// Avogadro's number, used to convert molecule counts to moles.
const AVOGADRO: f64 = 6.022_140_76e23;

impl Molecule {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "SO2" => Ok(Molecule::SO2),
            "BrO" => Ok(Molecule::BrO),
            "NO2" => Ok(Molecule::NO2),
            "O3" => Ok(Molecule::O3),
            "HCHO" => Ok(Molecule::HCHO),
            other => Err(Error::UnknownMolecule(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Molecule::SO2 => "SO2",
            Molecule::BrO => "BrO",
            Molecule::NO2 => "NO2",
            Molecule::O3 => "O3",
            Molecule::HCHO => "HCHO",
        }
    }

    /// Molar mass in g/mol.
    pub fn molar_mass_g_per_mol(&self) -> f64 {
        match self {
            Molecule::SO2 => 64.066,
            Molecule::BrO => 95.90,
            Molecule::NO2 => 46.006,
            Molecule::O3 => 47.997,
            Molecule::HCHO => 30.026,
        }
    }

    /// Converts a column density in molecule/cm^2 to kg/m^2, as used by the flux
    /// calculator (spec §4.11).
    pub fn convert_molec_cm2_to_kg_m2(&self, column_molec_cm2: f64) -> f64 {
        let molec_per_m2 = column_molec_cm2 * 1.0e4;
        let moles_per_m2 = molec_per_m2 / AVOGADRO;
        let grams_per_m2 = moles_per_m2 * self.molar_mass_g_per_mol();
        grams_per_m2 / 1000.0
    }
}
