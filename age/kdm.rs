//! # Klemera-Doubal Method Biological Age
//!
//! Each biomarker `b` is modelled as a linear function of chronological age
//! with slope `k`, intercept `q` and residual standard deviation `s`. For one
//! subject the biomarkers are combined by inverse-variance weighting:
//!
//! ```text
//! numerator   = Σ ((x_b - q_b) / s_b) * (k_b / s_b)
//! denominator = Σ (k_b / s_b)^2
//! kdm_ba      = age + numerator / denominator
//! ```
//!
//! When the denominator is zero (every slope zero, or every biomarker skipped)
//! the estimate falls back to chronological age. That is a valid result, not
//! an error.
//!
//! Parameters are normally trained on a reference cohort and supplied by the
//! caller. Without them, [`KdmFit::derive_default`] produces an illustrative
//! set from the dataset itself (cohort mean and standard deviation with the
//! placeholder slope [`DEFAULT_SLOPE`]); no regression against age is run, so
//! those defaults are not authoritative.

use crate::dataset::Dataset;
use crate::panel::{BiomarkerPanel, EstimationError, EstimationResult, map_subjects};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder slope used when no trained parameters are supplied.
pub const DEFAULT_SLOPE: f64 = 0.1;

pub const KDM_BA_COLUMN: &str = "kdm_ba";
pub const KDM_ACCELERATION_COLUMN: &str = "kdm_acceleration";

/// Linear age model for a single biomarker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KdmCoefficients {
    pub slope: f64,
    pub intercept: f64,
    pub residual_sd: f64,
}

/// Per-biomarker KDM parameters, keyed by column name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KdmFit {
    pub biomarkers: BTreeMap<String, KdmCoefficients>,
}

/// What to do with a biomarker whose residual standard deviation is exactly zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DegenerateSd {
    /// Fail validation with [`EstimationError::InvalidResidualSd`].
    #[default]
    Reject,
    /// Keep going; the biomarker contributes no weight to any subject.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KdmOptions {
    pub degenerate_sd: DegenerateSd,
}

impl KdmFit {
    /// Derives illustrative parameters from `dataset`: the slope is
    /// [`DEFAULT_SLOPE`], the intercept is the cohort mean and the residual SD
    /// is the cohort standard deviation (divisor n).
    pub fn derive_default(
        dataset: &Dataset,
        panel: &BiomarkerPanel,
    ) -> Result<Self, EstimationError> {
        let indices = panel.resolve(dataset)?;
        Ok(derive_from_columns(dataset, panel, &indices))
    }

    pub fn get(&self, biomarker: &str) -> Option<&KdmCoefficients> {
        self.biomarkers.get(biomarker)
    }

    pub fn insert(&mut self, biomarker: impl Into<String>, coefficients: KdmCoefficients) {
        self.biomarkers.insert(biomarker.into(), coefficients);
    }
}

/// Estimates KDM biological age with the default options.
///
/// See [`estimate_kdm_with`].
pub fn estimate_kdm(
    dataset: &Dataset,
    panel: &BiomarkerPanel,
    fit: Option<&KdmFit>,
) -> Result<EstimationResult<KdmFit>, EstimationError> {
    estimate_kdm_with(dataset, panel, fit, KdmOptions::default())
}

/// Estimates KDM biological age for every subject in `dataset`.
///
/// Returns a copy of the dataset with `kdm_ba` and `kdm_acceleration`
/// appended, together with the parameters used (the supplied `fit`, or the
/// derived defaults when `fit` is `None`). All validation happens before any
/// subject is scored.
pub fn estimate_kdm_with(
    dataset: &Dataset,
    panel: &BiomarkerPanel,
    fit: Option<&KdmFit>,
    options: KdmOptions,
) -> Result<EstimationResult<KdmFit>, EstimationError> {
    let indices = panel.resolve(dataset)?;
    let fit = match fit {
        Some(supplied) => supplied.clone(),
        None => derive_from_columns(dataset, panel, &indices),
    };
    let coefficients = validated_coefficients(&fit, panel, options.degenerate_sd)?;

    for (name, c) in panel.iter().zip(&coefficients) {
        log::debug!(
            "KDM '{name}': slope={}, intercept={}, residual_sd={}",
            c.slope,
            c.intercept,
            c.residual_sd
        );
    }

    let values = dataset.values();
    let ages = dataset.ages();
    let kdm_ba = map_subjects(dataset.n_subjects(), |i| {
        kdm_subject_estimate(
            ages[i],
            indices.iter().map(|&j| values[[i, j]]),
            &coefficients,
        )
    });
    let acceleration: Array1<f64> = &kdm_ba - &ages;

    log::info!(
        "KDM-BA estimated for {} subjects from {} biomarkers",
        dataset.n_subjects(),
        panel.len()
    );

    let dataset = dataset.with_columns(vec![
        (KDM_BA_COLUMN.to_string(), kdm_ba),
        (KDM_ACCELERATION_COLUMN.to_string(), acceleration),
    ])?;
    Ok(EstimationResult { dataset, fit })
}

/// KDM estimate for one subject. `values` and `coefficients` are paired in
/// panel order. A biomarker with zero residual SD carries no weight.
///
/// Weights are divided by the largest `|slope / residual_sd|` before they are
/// summed, so very small residual SDs do not overflow the denominator. Each
/// `slope / residual_sd` must itself be finite, which the estimators check.
pub fn kdm_subject_estimate(
    age: f64,
    values: impl IntoIterator<Item = f64>,
    coefficients: &[KdmCoefficients],
) -> f64 {
    let scale = coefficients
        .iter()
        .filter(|c| c.residual_sd != 0.0)
        .map(|c| (c.slope / c.residual_sd).abs())
        .fold(0.0, f64::max);
    if scale == 0.0 {
        return age;
    }

    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (x, c) in values.into_iter().zip(coefficients) {
        if c.residual_sd == 0.0 {
            continue;
        }
        let weight = c.slope / c.residual_sd / scale;
        numerator += (x - c.intercept) / c.residual_sd * weight;
        denominator += weight * weight;
    }
    // The largest scaled weight is 1, so the denominator is at least 1.
    age + numerator / denominator / scale
}

fn derive_from_columns(dataset: &Dataset, panel: &BiomarkerPanel, indices: &[usize]) -> KdmFit {
    log::warn!(
        "No KDM parameters supplied; deriving illustrative defaults (cohort mean/SD, slope {DEFAULT_SLOPE}). \
         Supply parameters trained on a reference cohort for meaningful estimates."
    );
    let values = dataset.values();
    let biomarkers = panel
        .iter()
        .zip(indices)
        .map(|(name, &j)| {
            let column = values.column(j);
            let coefficients = KdmCoefficients {
                slope: DEFAULT_SLOPE,
                intercept: column.mean().unwrap_or_default(),
                residual_sd: column.std(0.0),
            };
            (name.to_string(), coefficients)
        })
        .collect();
    KdmFit { biomarkers }
}

fn validated_coefficients(
    fit: &KdmFit,
    panel: &BiomarkerPanel,
    policy: DegenerateSd,
) -> Result<Vec<KdmCoefficients>, EstimationError> {
    panel
        .iter()
        .map(|name| {
            let c = *fit
                .get(name)
                .ok_or_else(|| EstimationError::MissingParameter(name.to_string()))?;

            for (label, value) in [("slope", c.slope), ("intercept", c.intercept)] {
                if !value.is_finite() {
                    return Err(EstimationError::InvalidCoefficient {
                        name: format!("{name}.{label}"),
                        value,
                    });
                }
            }

            let sd = c.residual_sd;
            if sd == 0.0 && policy == DegenerateSd::Skip {
                log::warn!("Residual SD for '{name}' is zero; the biomarker carries no weight.");
            } else if !(sd.is_finite() && sd > 0.0 && (c.slope / sd).is_finite()) {
                return Err(EstimationError::InvalidResidualSd {
                    biomarker: name.to_string(),
                    value: sd,
                });
            }
            Ok(c)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::ErrorClass;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn single_subject(value: f64) -> Dataset {
        Dataset::new(
            vec!["s1".into()],
            array![50.0],
            vec!["albumin".into()],
            array![[value]],
        )
        .unwrap()
    }

    fn coefficients(slope: f64, intercept: f64, residual_sd: f64) -> KdmCoefficients {
        KdmCoefficients {
            slope,
            intercept,
            residual_sd,
        }
    }

    #[test]
    fn zero_numerator_returns_chronological_age() {
        let ds = single_subject(42.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(0.1, 42.0, 1.0));

        let result = estimate_kdm(&ds, &panel, Some(&fit)).unwrap();
        assert_abs_diff_eq!(result.dataset.column(KDM_BA_COLUMN).unwrap()[0], 50.0);
        assert_abs_diff_eq!(result.dataset.column(KDM_ACCELERATION_COLUMN).unwrap()[0], 0.0);
        assert_eq!(result.fit, fit);
    }

    #[test]
    fn single_biomarker_shifts_age_by_residual_over_slope() {
        // One biomarker reduces to age + (x - q) / k.
        let ds = single_subject(44.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(0.5, 42.0, 2.0));

        let result = estimate_kdm(&ds, &panel, Some(&fit)).unwrap();
        assert_abs_diff_eq!(
            result.dataset.column(KDM_BA_COLUMN).unwrap()[0],
            54.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn all_zero_slopes_fall_back_to_age() {
        let age = 63.5;
        let estimate = kdm_subject_estimate(
            age,
            [10.0, -3.0],
            &[coefficients(0.0, 1.0, 2.0), coefficients(0.0, 5.0, 0.5)],
        );
        assert_eq!(estimate, age);
    }

    #[test]
    fn tiny_residual_sd_does_not_overflow_the_weights() {
        let ds = single_subject(42.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(0.1, 40.0, 1.0e-200));

        let result = estimate_kdm(&ds, &panel, Some(&fit)).unwrap();
        let kdm = result.dataset.column(KDM_BA_COLUMN).unwrap()[0];
        assert!(kdm.is_finite(), "got {kdm}");
        assert_abs_diff_eq!(kdm, 70.0, epsilon = 1e-9);
    }

    #[test]
    fn tiny_residual_sd_dominates_a_mixed_panel() {
        let estimate = kdm_subject_estimate(
            50.0,
            [42.0, 10.0],
            &[coefficients(0.1, 40.0, 1.0e-200), coefficients(0.5, 0.0, 1.0)],
        );
        assert_abs_diff_eq!(estimate, 70.0, epsilon = 1e-9);
    }

    #[test]
    fn unrepresentable_weight_is_rejected() {
        let ds = single_subject(42.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(1.0, 40.0, 1.0e-320));
        let err = estimate_kdm(&ds, &panel, Some(&fit)).unwrap_err();
        assert!(matches!(err, EstimationError::InvalidResidualSd { .. }));
    }

    #[test]
    fn missing_parameter_is_a_parameter_error() {
        let ds = single_subject(42.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let err = estimate_kdm(&ds, &panel, Some(&KdmFit::default())).unwrap_err();
        assert_eq!(err, EstimationError::MissingParameter("albumin".into()));
        assert_eq!(err.class(), ErrorClass::Parameter);
    }

    #[test]
    fn zero_residual_sd_is_rejected_unless_skipped() {
        let ds = single_subject(42.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(0.1, 40.0, 0.0));

        let err = estimate_kdm(&ds, &panel, Some(&fit)).unwrap_err();
        assert!(matches!(err, EstimationError::InvalidResidualSd { .. }));

        let options = KdmOptions {
            degenerate_sd: DegenerateSd::Skip,
        };
        let result = estimate_kdm_with(&ds, &panel, Some(&fit), options).unwrap();
        assert_eq!(result.dataset.column(KDM_BA_COLUMN).unwrap()[0], 50.0);
    }

    #[test]
    fn negative_residual_sd_is_rejected_even_when_skipping() {
        let ds = single_subject(42.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(0.1, 40.0, -1.0));
        let options = KdmOptions {
            degenerate_sd: DegenerateSd::Skip,
        };
        let err = estimate_kdm_with(&ds, &panel, Some(&fit), options).unwrap_err();
        assert_eq!(
            err,
            EstimationError::InvalidResidualSd {
                biomarker: "albumin".into(),
                value: -1.0
            }
        );
    }

    #[test]
    fn non_finite_slope_is_rejected() {
        let ds = single_subject(42.0);
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(f64::NAN, 40.0, 1.0));
        let err = estimate_kdm(&ds, &panel, Some(&fit)).unwrap_err();
        match err {
            EstimationError::InvalidCoefficient { name, .. } => assert_eq!(name, "albumin.slope"),
            other => panic!("Expected InvalidCoefficient, got {other:?}"),
        }
    }

    #[test]
    fn default_parameters_use_mean_and_population_sd() {
        let ds = Dataset::new(
            vec!["a".into(), "b".into(), "c".into()],
            array![30.0, 40.0, 50.0],
            vec!["creatinine".into()],
            array![[80.0], [85.0], [90.0]],
        )
        .unwrap();
        let panel = BiomarkerPanel::new(["creatinine"]).unwrap();
        let fit = KdmFit::derive_default(&ds, &panel).unwrap();
        let c = fit.get("creatinine").unwrap();
        assert_eq!(c.slope, DEFAULT_SLOPE);
        assert_abs_diff_eq!(c.intercept, 85.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.residual_sd, (50.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn constant_biomarker_yields_a_degenerate_default() {
        let ds = Dataset::new(
            vec!["a".into(), "b".into()],
            array![30.0, 40.0],
            vec!["glucose".into()],
            array![[5.0], [5.0]],
        )
        .unwrap();
        let panel = BiomarkerPanel::new(["glucose"]).unwrap();

        let err = estimate_kdm(&ds, &panel, None).unwrap_err();
        assert!(matches!(err, EstimationError::InvalidResidualSd { value, .. } if value == 0.0));

        let options = KdmOptions {
            degenerate_sd: DegenerateSd::Skip,
        };
        let result = estimate_kdm_with(&ds, &panel, None, options).unwrap();
        let kdm = result.dataset.column(KDM_BA_COLUMN).unwrap();
        assert_eq!(kdm.to_vec(), vec![30.0, 40.0]);
    }

    #[test]
    fn input_dataset_is_left_untouched() {
        let ds = single_subject(42.0);
        let before = ds.clone();
        let panel = BiomarkerPanel::new(["albumin"]).unwrap();
        let mut fit = KdmFit::default();
        fit.insert("albumin", coefficients(0.2, 40.0, 1.0));
        let result = estimate_kdm(&ds, &panel, Some(&fit)).unwrap();
        assert_eq!(ds, before);
        assert_eq!(result.dataset.column_names().len(), 3);
    }
}
