//! Shared pieces of the estimator contract: the biomarker panel, the error
//! taxonomy, the result wrapper, and the per-subject map.
//!
//! Every estimator validates its whole input before computing anything, so a
//! call either fails once with the first offending column or parameter, or
//! returns a complete result. Numeric degeneracies inside a subject are policy,
//! not errors, and are handled by the estimators themselves.

use crate::dataset::{Dataset, DatasetError};
use itertools::Itertools;
use ndarray::Array1;
use rayon::prelude::*;
use thiserror::Error;

/// Datasets with at least this many subjects are scored on the rayon pool.
pub const PARALLEL_THRESHOLD: usize = 4096;

/// Broad category of an estimation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The dataset or panel does not have the required shape.
    Schema,
    /// The fit parameters are incomplete or out of range.
    Parameter,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("The biomarker panel is empty; at least one biomarker is required.")]
    EmptyPanel,
    #[error("Biomarker '{0}' is listed more than once in the panel.")]
    DuplicateBiomarker(String),
    #[error(
        "The required column '{0}' was not found in the dataset. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error("Non-finite value in column '{column}' for subject '{sample_id}'.")]
    NonFiniteValue { column: String, sample_id: String },
    #[error("The fit parameters have no entry for '{0}'.")]
    MissingParameter(String),
    #[error(
        "Residual standard deviation for '{biomarker}' is {value}; it must be finite and greater than zero."
    )]
    InvalidResidualSd { biomarker: String, value: f64 },
    #[error("Fit parameter '{name}' has the non-finite value {value}.")]
    InvalidCoefficient { name: String, value: f64 },
    #[error("Gompertz gamma is {0}; it must be finite and greater than zero.")]
    InvalidGamma(f64),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

impl EstimationError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptyPanel
            | Self::DuplicateBiomarker(_)
            | Self::ColumnNotFound(_)
            | Self::NonFiniteValue { .. }
            | Self::Dataset(_) => ErrorClass::Schema,
            Self::MissingParameter(_)
            | Self::InvalidResidualSd { .. }
            | Self::InvalidCoefficient { .. }
            | Self::InvalidGamma(_) => ErrorClass::Parameter,
        }
    }
}

/// An ordered, duplicate-free, non-empty list of biomarker column names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiomarkerPanel {
    names: Vec<String>,
}

impl BiomarkerPanel {
    pub fn new<I, S>(names: I) -> Result<Self, EstimationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(EstimationError::EmptyPanel);
        }
        if let Some(dup) = names.iter().duplicates().next() {
            return Err(EstimationError::DuplicateBiomarker(dup.clone()));
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Maps each panel member to its column index in `dataset`.
    ///
    /// Fails on the first missing column, then on the first non-finite value
    /// (reported with the subject that carries it). Runs before any scoring.
    pub fn resolve(&self, dataset: &Dataset) -> Result<Vec<usize>, EstimationError> {
        let indices = self
            .names
            .iter()
            .map(|name| {
                dataset
                    .column_index(name)
                    .ok_or_else(|| EstimationError::ColumnNotFound(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let values = dataset.values();
        for (name, &j) in self.names.iter().zip(&indices) {
            if let Some(i) = values.column(j).iter().position(|v| !v.is_finite()) {
                return Err(EstimationError::NonFiniteValue {
                    column: name.clone(),
                    sample_id: dataset.sample_ids()[i].clone(),
                });
            }
        }
        Ok(indices)
    }
}

/// An augmented copy of the input dataset plus the fit parameters that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult<F> {
    pub dataset: Dataset,
    pub fit: F,
}

/// Evaluates `score` for every subject index, preserving input order.
pub(crate) fn map_subjects<F>(n_subjects: usize, score: F) -> Array1<f64>
where
    F: Fn(usize) -> f64 + Send + Sync,
{
    if n_subjects >= PARALLEL_THRESHOLD {
        log::debug!("Scoring {n_subjects} subjects on the rayon pool");
        (0..n_subjects)
            .into_par_iter()
            .map(score)
            .collect::<Vec<f64>>()
            .into()
    } else {
        (0..n_subjects).map(score).collect()
    }
}
