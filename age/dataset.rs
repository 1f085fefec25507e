//! # Subject Dataset
//!
//! The in-memory table every estimator reads from and returns. A dataset holds
//! one row per subject: a unique identifier, a chronological age, and a dense
//! block of numeric columns (biomarkers, plus any columns appended by earlier
//! estimation calls).
//!
//! - Immutable: estimators never modify a dataset. [`Dataset::with_columns`]
//!   returns an augmented copy and leaves the receiver untouched.
//! - Validated on construction: ages are finite and positive, identifiers and
//!   column names are unique, and `age` is never an ordinary column.
//! - Units are whatever the caller chose; nothing here interprets them.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Name of the chronological age column in tabular inputs and outputs.
pub const AGE_COLUMN: &str = "age";

/// One subject, materialized as an owned row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectRecord {
    pub sample_id: String,
    /// Chronological age in years.
    pub age: f64,
    /// Column name to value. Every record in a dataset carries the same keys.
    pub biomarkers: BTreeMap<String, f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatasetError {
    #[error("A dataset must contain at least one subject.")]
    Empty,
    #[error("'{what}' has length {found}, but {expected} was expected.")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    #[error("Sample identifier '{0}' appears more than once.")]
    DuplicateSampleId(String),
    #[error("Column '{0}' appears more than once.")]
    DuplicateColumn(String),
    #[error("'{0}' is reserved for chronological age and cannot be used as a data column.")]
    ReservedColumn(String),
    #[error("Subject '{sample_id}' has age {age}; ages must be finite and greater than zero.")]
    InvalidAge { sample_id: String, age: f64 },
    #[error("Subject '{sample_id}' does not carry the same biomarker columns as the first subject.")]
    InconsistentColumns { sample_id: String },
}

/// Columnar subject table: `values` has shape `[n_subjects, n_columns]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    sample_ids: Vec<String>,
    age: Array1<f64>,
    column_names: Vec<String>,
    values: Array2<f64>,
}

impl Dataset {
    pub fn new(
        sample_ids: Vec<String>,
        age: Array1<f64>,
        column_names: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, DatasetError> {
        let n = sample_ids.len();
        if n == 0 {
            return Err(DatasetError::Empty);
        }
        check_len("age", n, age.len())?;
        check_len("value rows", n, values.nrows())?;
        check_len("value columns", column_names.len(), values.ncols())?;

        let mut seen_ids = HashSet::with_capacity(n);
        for id in &sample_ids {
            if !seen_ids.insert(id.as_str()) {
                return Err(DatasetError::DuplicateSampleId(id.clone()));
            }
        }

        let mut seen_columns = HashSet::with_capacity(column_names.len());
        for name in &column_names {
            if name == AGE_COLUMN {
                return Err(DatasetError::ReservedColumn(name.clone()));
            }
            if !seen_columns.insert(name.as_str()) {
                return Err(DatasetError::DuplicateColumn(name.clone()));
            }
        }

        if let Some((id, &bad)) = sample_ids
            .iter()
            .zip(age.iter())
            .find(|&(_, &a)| !a.is_finite() || a <= 0.0)
        {
            return Err(DatasetError::InvalidAge {
                sample_id: id.clone(),
                age: bad,
            });
        }

        Ok(Self {
            sample_ids,
            age,
            column_names,
            values,
        })
    }

    /// Builds a dataset from row records. Columns are laid out in sorted name order.
    pub fn from_records(records: &[SubjectRecord]) -> Result<Self, DatasetError> {
        let first = records.first().ok_or(DatasetError::Empty)?;
        let column_names: Vec<String> = first.biomarkers.keys().cloned().collect();

        let mut values = Array2::<f64>::zeros((records.len(), column_names.len()));
        for (i, record) in records.iter().enumerate() {
            let same_keys = record.biomarkers.len() == column_names.len()
                && record.biomarkers.keys().eq(column_names.iter());
            if !same_keys {
                return Err(DatasetError::InconsistentColumns {
                    sample_id: record.sample_id.clone(),
                });
            }
            for (j, &value) in record.biomarkers.values().enumerate() {
                values[[i, j]] = value;
            }
        }

        let sample_ids = records.iter().map(|r| r.sample_id.clone()).collect();
        let age = records.iter().map(|r| r.age).collect();
        Self::new(sample_ids, age, column_names, values)
    }

    pub fn n_subjects(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn ages(&self) -> ArrayView1<'_, f64> {
        self.age.view()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name).map(|j| self.values.column(j))
    }

    pub fn subject(&self, index: usize) -> Option<SubjectRecord> {
        let sample_id = self.sample_ids.get(index)?.clone();
        let row = self.values.row(index);
        let biomarkers = self
            .column_names
            .iter()
            .cloned()
            .zip(row.iter().copied())
            .collect();
        Some(SubjectRecord {
            sample_id,
            age: self.age[index],
            biomarkers,
        })
    }

    pub fn records(&self) -> Vec<SubjectRecord> {
        (0..self.n_subjects())
            .filter_map(|i| self.subject(i))
            .collect()
    }

    /// Returns a copy with `appended` columns added on the right.
    ///
    /// A name that already exists is overwritten in its current position, so
    /// re-running an estimator on its own output replaces the earlier estimate.
    pub fn with_columns(&self, appended: Vec<(String, Array1<f64>)>) -> Result<Self, DatasetError> {
        let n = self.n_subjects();
        let mut column_names = self.column_names.clone();
        let mut columns: Vec<Array1<f64>> =
            self.values.columns().into_iter().map(|c| c.to_owned()).collect();

        for (name, column) in appended {
            if name == AGE_COLUMN {
                return Err(DatasetError::ReservedColumn(name));
            }
            check_len(&name, n, column.len())?;
            match column_names.iter().position(|c| *c == name) {
                Some(j) => columns[j] = column,
                None => {
                    column_names.push(name);
                    columns.push(column);
                }
            }
        }

        let values = Array2::from_shape_fn((n, columns.len()), |(i, j)| columns[j][i]);
        Ok(Self {
            sample_ids: self.sample_ids.clone(),
            age: self.age.clone(),
            column_names,
            values,
        })
    }
}

fn check_len(what: &str, expected: usize, found: usize) -> Result<(), DatasetError> {
    if expected != found {
        return Err(DatasetError::ShapeMismatch {
            what: what.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn record(id: &str, age: f64, pairs: &[(&str, f64)]) -> SubjectRecord {
        SubjectRecord {
            sample_id: id.to_string(),
            age,
            biomarkers: pairs.iter().map(|&(k, v)| (k.to_string(), v)).collect(),
        }
    }

    #[test]
    fn from_records_lays_columns_out_in_sorted_order() {
        let ds = Dataset::from_records(&[
            record("a", 30.0, &[("wbc", 6.0), ("albumin", 45.0)]),
            record("b", 40.0, &[("albumin", 42.0), ("wbc", 6.5)]),
        ])
        .unwrap();

        assert_eq!(ds.column_names(), &["albumin".to_string(), "wbc".to_string()]);
        assert_abs_diff_eq!(ds.column("wbc").unwrap()[1], 6.5);
        assert_abs_diff_eq!(ds.ages()[0], 30.0);
        assert_eq!(ds.subject(1).unwrap(), record("b", 40.0, &[("albumin", 42.0), ("wbc", 6.5)]));
    }

    #[test]
    fn inconsistent_records_are_rejected() {
        let err = Dataset::from_records(&[
            record("a", 30.0, &[("albumin", 45.0)]),
            record("b", 40.0, &[("glucose", 5.0)]),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            DatasetError::InconsistentColumns {
                sample_id: "b".to_string()
            }
        );
    }

    #[test]
    fn non_positive_age_is_rejected() {
        let err = Dataset::new(
            vec!["s1".into(), "s2".into()],
            array![30.0, 0.0],
            vec!["x".into()],
            array![[1.0], [2.0]],
        )
        .unwrap_err();
        match err {
            DatasetError::InvalidAge { sample_id, .. } => assert_eq!(sample_id, "s2"),
            other => panic!("Expected InvalidAge, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_ids_and_reserved_columns_are_rejected() {
        let dup = Dataset::new(
            vec!["s1".into(), "s1".into()],
            array![30.0, 31.0],
            vec!["x".into()],
            array![[1.0], [2.0]],
        );
        assert_eq!(dup.unwrap_err(), DatasetError::DuplicateSampleId("s1".into()));

        let reserved = Dataset::new(
            vec!["s1".into()],
            array![30.0],
            vec!["age".into()],
            array![[1.0]],
        );
        assert_eq!(reserved.unwrap_err(), DatasetError::ReservedColumn("age".into()));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(Dataset::from_records(&[]).unwrap_err(), DatasetError::Empty);
    }

    #[test]
    fn with_columns_appends_and_overwrites_without_touching_the_original() {
        let ds = Dataset::new(
            vec!["s1".into(), "s2".into()],
            array![30.0, 40.0],
            vec!["x".into()],
            array![[1.0], [2.0]],
        )
        .unwrap();

        let first = ds
            .with_columns(vec![("est".to_string(), array![31.0, 39.0])])
            .unwrap();
        assert_eq!(first.column_names().len(), 2);
        assert_eq!(ds.column_names().len(), 1);

        let second = first
            .with_columns(vec![("est".to_string(), array![32.0, 38.0])])
            .unwrap();
        assert_eq!(second.column_names(), first.column_names());
        assert_abs_diff_eq!(second.column("est").unwrap()[0], 32.0);
        assert_abs_diff_eq!(first.column("est").unwrap()[0], 31.0);
    }

    #[test]
    fn with_columns_checks_length() {
        let ds = Dataset::new(vec!["s1".into()], array![30.0], vec![], Array2::zeros((1, 0))).unwrap();
        let err = ds
            .with_columns(vec![("est".to_string(), array![1.0, 2.0])])
            .unwrap_err();
        assert!(matches!(err, DatasetError::ShapeMismatch { .. }));
    }
}
