//! Arrow value extraction helpers
//!
//! Small adapters for pulling typed scalar values out of Arrow arrays while
//! handling nulls and the handful of physical types the CSV reader infers
//! (Utf8, Int32/Int64, Float32/Float64).

use crate::error::{CohortError, Result};
use arrow::array::{
    Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;

/// Look up a column by name, failing with a descriptive error when absent.
///
/// # Arguments
/// * `batch` - The record batch to search
/// * `name` - The column name from the configured mapping
///
/// # Errors
/// Returns `CohortError::MissingColumn` if the batch has no such column.
pub fn require_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| CohortError::MissingColumn(name.to_string()))
}

/// Extract a string value from an Arrow array at the specified index, handling nulls.
///
/// Integer columns are rendered with their decimal representation, which
/// covers inputs that store identifiers or ZIP codes as numbers.
///
/// # Returns
/// `Some(String)` if the value exists and is not null, otherwise `None`
#[must_use]
pub fn string_value(array: &ArrayRef, index: usize) -> Option<String> {
    if array.is_null(index) {
        return None;
    }

    match array.data_type() {
        DataType::Utf8 => {
            let string_array = array.as_any().downcast_ref::<StringArray>()?;
            Some(string_array.value(index).to_string())
        }
        DataType::Int32 => {
            let int_array = array.as_any().downcast_ref::<Int32Array>()?;
            Some(int_array.value(index).to_string())
        }
        DataType::Int64 => {
            let int_array = array.as_any().downcast_ref::<Int64Array>()?;
            Some(int_array.value(index).to_string())
        }
        _ => None,
    }
}

/// Extract an i64 value from an Arrow array at the specified index, handling nulls.
///
/// # Returns
/// `Some(i64)` if the value exists and is not null, otherwise `None`
#[must_use]
pub fn i64_value(array: &ArrayRef, index: usize) -> Option<i64> {
    if array.is_null(index) {
        return None;
    }

    match array.data_type() {
        DataType::Int32 => {
            let int_array = array.as_any().downcast_ref::<Int32Array>()?;
            Some(i64::from(int_array.value(index)))
        }
        DataType::Int64 => {
            let int_array = array.as_any().downcast_ref::<Int64Array>()?;
            Some(int_array.value(index))
        }
        _ => None,
    }
}

/// Extract an f64 value from an Arrow array at the specified index, handling nulls.
///
/// Integer columns are widened; a CSV column of whole-number claim amounts
/// infers as Int64 and still reads as f64 here.
///
/// # Returns
/// `Some(f64)` if the value exists and is not null, otherwise `None`
#[must_use]
pub fn f64_value(array: &ArrayRef, index: usize) -> Option<f64> {
    if array.is_null(index) {
        return None;
    }

    match array.data_type() {
        DataType::Float64 => {
            let float_array = array.as_any().downcast_ref::<Float64Array>()?;
            Some(float_array.value(index))
        }
        DataType::Float32 => {
            let float_array = array.as_any().downcast_ref::<Float32Array>()?;
            Some(f64::from(float_array.value(index)))
        }
        DataType::Int32 => {
            let int_array = array.as_any().downcast_ref::<Int32Array>()?;
            Some(f64::from(int_array.value(index)))
        }
        DataType::Int64 => {
            let int_array = array.as_any().downcast_ref::<Int64Array>()?;
            Some(int_array.value(index) as f64)
        }
        _ => None,
    }
}
