//! # Levine Phenotypic Age
//!
//! A linear mortality score is built from the biomarker panel and mapped to an
//! age through the Gompertz cumulative distribution at 120 years:
//!
//! ```text
//! score  = intercept + Σ coefficient_b * x_b
//! cdf120 = 1 - exp(-gamma * exp(score))
//! age    = -ln(1 - cdf120) / gamma
//! ```
//!
//! Once `cdf120` saturates at 1 the logarithm is undefined and the estimate is
//! pinned to [`MAX_PHENOAGE`]. Every subject therefore receives a finite age in
//! `(0, 120]`.
//!
//! The default coefficients are the published constants of Levine et al.
//! for a nine-biomarker panel. They live in an immutable table owned by this
//! module; callers wanting other values build their own [`PhenoAgeFit`].

use crate::dataset::Dataset;
use crate::panel::{BiomarkerPanel, EstimationError, EstimationResult, map_subjects};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PHENOAGE_COLUMN: &str = "phenoage";
pub const PHENOAGE_ACCELERATION_COLUMN: &str = "phenoage_acceleration";

/// Upper bound of the Gompertz horizon, in years.
pub const MAX_PHENOAGE: f64 = 120.0;

pub const LEVINE_INTERCEPT: f64 = -19.9067;
pub const LEVINE_GAMMA: f64 = 0.0077;

/// Levine et al. mortality-score coefficients, in canonical panel order.
pub const LEVINE_COEFFICIENTS: [(&str, f64); 9] = [
    ("albumin", -0.0336),
    ("creatinine", 0.0095),
    ("glucose", 0.1953),
    ("lncrp", 0.0954),
    ("lymph", -0.0120),
    ("mcv", 0.0268),
    ("rdw", 0.3306),
    ("alp", 0.0019),
    ("wbc", 0.0554),
];

/// Linear mortality model plus the Gompertz shape used to turn it into an age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenoAgeFit {
    pub intercept: f64,
    pub gamma: f64,
    pub coefficients: BTreeMap<String, f64>,
}

impl PhenoAgeFit {
    /// The published Levine coefficient set.
    pub fn levine() -> Self {
        Self {
            intercept: LEVINE_INTERCEPT,
            gamma: LEVINE_GAMMA,
            coefficients: LEVINE_COEFFICIENTS
                .iter()
                .map(|&(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn coefficient(&self, biomarker: &str) -> Option<f64> {
        self.coefficients.get(biomarker).copied()
    }
}

impl Default for PhenoAgeFit {
    fn default() -> Self {
        Self::levine()
    }
}

/// The nine biomarkers covered by the Levine coefficients.
pub fn canonical_panel() -> BiomarkerPanel {
    BiomarkerPanel::new(LEVINE_COEFFICIENTS.iter().map(|&(name, _)| name))
        .expect("the Levine table is non-empty and duplicate-free")
}

/// Linear mortality score for one subject; `values` pairs with `coefficients`.
pub fn mortality_score(
    intercept: f64,
    coefficients: &[f64],
    values: impl IntoIterator<Item = f64>,
) -> f64 {
    values
        .into_iter()
        .zip(coefficients)
        .fold(intercept, |score, (x, &beta)| score + beta * x)
}

/// Maps a mortality score to an age through the Gompertz inverse CDF.
///
/// `gamma` must be positive; the estimators validate that before calling.
///
/// A NaN score (opposite-signed terms that both overflowed) has no defined
/// survival probability and is treated like a saturated one, so every score
/// maps into `(0, 120]`.
pub fn gompertz_age(score: f64, gamma: f64) -> f64 {
    let cdf120 = -(-gamma * score.exp()).exp_m1();
    if cdf120.is_nan() || cdf120 >= 1.0 {
        return MAX_PHENOAGE;
    }
    let age = -(-cdf120).ln_1p() / gamma;
    // Past the horizon, or underflowed for very negative scores.
    age.clamp(f64::MIN_POSITIVE, MAX_PHENOAGE)
}

/// Estimates phenotypic age for every subject in `dataset`.
///
/// Returns a copy of the dataset with `phenoage` and `phenoage_acceleration`
/// appended, and the parameters used (the supplied `fit`, or the Levine set
/// when `fit` is `None`).
pub fn estimate_phenoage(
    dataset: &Dataset,
    panel: &BiomarkerPanel,
    fit: Option<&PhenoAgeFit>,
) -> Result<EstimationResult<PhenoAgeFit>, EstimationError> {
    let indices = panel.resolve(dataset)?;
    let fit = fit.cloned().unwrap_or_else(PhenoAgeFit::levine);
    let coefficients = validated_coefficients(&fit, panel)?;

    let values = dataset.values();
    let ages = dataset.ages();
    let phenoage = map_subjects(dataset.n_subjects(), |i| {
        let score = mortality_score(
            fit.intercept,
            &coefficients,
            indices.iter().map(|&j| values[[i, j]]),
        );
        gompertz_age(score, fit.gamma)
    });
    let saturated = phenoage.iter().filter(|&&a| a == MAX_PHENOAGE).count();
    if saturated > 0 {
        log::warn!("{saturated} subject(s) reached the {MAX_PHENOAGE}-year PhenoAge ceiling");
    }
    let acceleration: Array1<f64> = &phenoage - &ages;

    log::info!(
        "PhenoAge estimated for {} subjects from {} biomarkers",
        dataset.n_subjects(),
        panel.len()
    );

    let dataset = dataset.with_columns(vec![
        (PHENOAGE_COLUMN.to_string(), phenoage),
        (PHENOAGE_ACCELERATION_COLUMN.to_string(), acceleration),
    ])?;
    Ok(EstimationResult { dataset, fit })
}

fn validated_coefficients(
    fit: &PhenoAgeFit,
    panel: &BiomarkerPanel,
) -> Result<Vec<f64>, EstimationError> {
    if !(fit.gamma.is_finite() && fit.gamma > 0.0) {
        return Err(EstimationError::InvalidGamma(fit.gamma));
    }
    if !fit.intercept.is_finite() {
        return Err(EstimationError::InvalidCoefficient {
            name: "intercept".to_string(),
            value: fit.intercept,
        });
    }
    panel
        .iter()
        .map(|name| {
            let beta = fit
                .coefficient(name)
                .ok_or_else(|| EstimationError::MissingParameter(name.to_string()))?;
            if !beta.is_finite() {
                return Err(EstimationError::InvalidCoefficient {
                    name: name.to_string(),
                    value: beta,
                });
            }
            log::debug!("PhenoAge '{name}': coefficient={beta}");
            Ok(beta)
        })
        .collect()
}
