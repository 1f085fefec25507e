//! Fit-parameter files.
//!
//! Estimators echo the parameters they used so a caller can score a second
//! cohort with parameters derived on a first one. This module stores those
//! parameters as human-readable TOML.

use crate::kdm::KdmFit;
use crate::phenoage::PhenoAgeFit;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

/// Custom error type for fit-parameter loading and saving.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write fit parameter file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML fit parameter file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize fit parameters to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

/// A parameter set that can be written to and read back from a TOML file.
pub trait FitArtifact: Serialize + DeserializeOwned {
    /// Saves the parameters to `path`, replacing any existing file.
    fn save(&self, path: &str) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Loads parameters previously written by [`FitArtifact::save`].
    fn load(path: &str) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        Ok(toml::from_str(&toml_string)?)
    }
}

impl FitArtifact for KdmFit {}
impl FitArtifact for PhenoAgeFit {}
