//! # Tabular Input and Output
//!
//! Reads subject tables from delimited text and writes estimation results back
//! out. This is the only place the crate touches files holding subject data;
//! the estimators work purely on [`Dataset`] values.
//!
//! - Input schema: an `age` column, every requested biomarker column, and an
//!   optional `sample_id` (or `sampleID`) column. Other columns are ignored.
//! - Delimiter: comma for `.csv` files, tab otherwise.
//! - Failures are assumed to be user-input errors, so `DataError` names the
//!   offending column.

use crate::dataset::{AGE_COLUMN, Dataset, DatasetError};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Column names accepted as subject identifiers, in order of preference.
const SAMPLE_ID_COLUMNS: [&str; 2] = ["sample_id", "sampleID"];

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to write delimited output: {0}")]
    CsvError(#[from] csv::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the required column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the required column '{0}'. This tool requires all data to be finite."
    )]
    NonFiniteValuesFound(String),
    #[error("The input table is not a valid subject dataset: {0}")]
    InvalidDataset(#[from] DatasetError),
}

/// Loads `age`, the given biomarker columns and the subject identifiers from `path`.
pub fn load_dataset(path: &str, biomarkers: &[String]) -> Result<Dataset, DataError> {
    log::info!("Loading data from '{path}'");
    let separator = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => b',',
        _ => b'\t',
    };

    let df = CsvReader::new(File::open(Path::new(path))?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_parse_options(CsvParseOptions::default().with_separator(separator)),
        )
        .finish()?;

    let columns_set: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut required: Vec<&str> = Vec::with_capacity(biomarkers.len() + 1);
    required.push(AGE_COLUMN);
    required.extend(biomarkers.iter().map(String::as_str));
    if let Some(missing) = required.iter().find(|c| !columns_set.contains(**c)) {
        return Err(DataError::ColumnNotFound(missing.to_string()));
    }
    log::debug!("All required columns found: {required:?}");

    let age = Array1::from_vec(extract_numeric_column(&df, AGE_COLUMN)?);
    let n = age.len();

    let mut buffer = Vec::with_capacity(n * biomarkers.len());
    for name in biomarkers {
        buffer.append(&mut extract_numeric_column(&df, name)?);
    }
    // Columns were appended one after another, so the buffer is column-major.
    let values = Array2::from_shape_fn((n, biomarkers.len()), |(i, j)| buffer[j * n + i]);

    let id_column = SAMPLE_ID_COLUMNS
        .iter()
        .find(|c| columns_set.contains(**c))
        .copied();
    let sample_ids = build_sample_ids(&df, id_column, n)?;

    log::info!("Loaded {n} subjects with {} biomarker columns", biomarkers.len());
    Ok(Dataset::new(sample_ids, age, biomarkers.to_vec(), values)?)
}

/// Writes `sample_id`, `age` and every data column of `dataset` as tab-separated text.
pub fn write_results(path: &str, dataset: &Dataset) -> Result<(), DataError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)?;

    let mut header = vec![SAMPLE_ID_COLUMNS[0].to_string(), AGE_COLUMN.to_string()];
    header.extend(dataset.column_names().iter().cloned());
    writer.write_record(&header)?;

    let values = dataset.values();
    for (i, id) in dataset.sample_ids().iter().enumerate() {
        let mut record = Vec::with_capacity(header.len());
        record.push(id.clone());
        record.push(dataset.ages()[i].to_string());
        record.extend(values.row(i).iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    log::info!("Wrote {} rows to '{path}'", dataset.n_subjects());
    Ok(())
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, DataError> {
    let series = df.column(column_name)?;
    if series.null_count() > 0 {
        return Err(DataError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || DataError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", series.dtype()),
    };
    let casted = series.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    // A failed string-to-float parse shows up as new nulls.
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let values: Vec<f64> = casted.f64()?.rechunk().into_no_null_iter().collect();
    if values.iter().any(|v| !v.is_finite()) {
        return Err(DataError::NonFiniteValuesFound(column_name.to_string()));
    }
    Ok(values)
}

fn build_sample_ids(
    df: &DataFrame,
    id_column: Option<&str>,
    n: usize,
) -> Result<Vec<String>, DataError> {
    let sequential = || -> Vec<String> { (1..=n).map(|i| i.to_string()).collect() };
    let Some(name) = id_column else {
        return Ok(sequential());
    };

    let casted = df.column(name)?.cast(&DataType::String)?;
    casted
        .str()?
        .into_iter()
        .map(|value| match value {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(DataError::MissingValuesFound(name.to_string())),
        })
        .collect()
}
