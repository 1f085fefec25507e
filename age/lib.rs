#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Biological age estimation from clinical biomarker panels.
//!
//! Two independent estimators share the same shape:
//! `(dataset, panel, fit?) -> (augmented dataset, fit used)`.
//!
//! - [`kdm`]: Klemera-Doubal Method biological age.
//! - [`phenoage`]: Levine phenotypic age via a Gompertz inverse transform.
//!
//! The [`data`] and [`model`] modules are I/O collaborators used by the
//! command-line tool; the estimators themselves never touch the filesystem.

pub mod data;
pub mod dataset;
pub mod kdm;
pub mod model;
pub mod panel;
pub mod phenoage;

pub use dataset::{Dataset, DatasetError, SubjectRecord};
pub use kdm::{
    DegenerateSd, KdmCoefficients, KdmFit, KdmOptions, estimate_kdm, estimate_kdm_with,
};
pub use panel::{BiomarkerPanel, ErrorClass, EstimationError, EstimationResult};
pub use phenoage::{PhenoAgeFit, canonical_panel, estimate_phenoage};
