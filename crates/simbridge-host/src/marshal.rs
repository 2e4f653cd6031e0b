//! Conversions between typed samples and untyped field data.
//!
//! Typed code never needs these: sessions and loops are generic over the
//! model variant. They exist for the edges where samples come from or go to
//! configuration files, feeds and recordings.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use simbridge_sys::Sample;

use crate::error::MarshalError;

/// Field values in declaration order.
pub fn to_values<S: Sample>(sample: &S) -> Vec<f64> {
    (0..S::FIELDS.len())
        .filter_map(|index| sample.get(index))
        .collect()
}

/// Builds a sample from values in declaration order. The count must match.
pub fn from_values<S: Sample>(variant: &'static str, values: &[f64]) -> Result<S, MarshalError> {
    if values.len() != S::FIELDS.len() {
        return Err(MarshalError::FieldCount {
            variant,
            expected: S::FIELDS.len(),
            actual: values.len(),
        });
    }
    let mut sample = S::default();
    for (index, value) in values.iter().enumerate() {
        sample.set(index, *value);
    }
    Ok(sample)
}

/// Builds a sample from named values. Unnamed fields stay at zero.
pub fn from_named<S: Sample>(
    variant: &'static str,
    values: &BTreeMap<String, f64>,
) -> Result<S, MarshalError> {
    let mut sample = S::default();
    for (name, value) in values {
        let index = field_index::<S>(name).ok_or_else(|| MarshalError::UnknownField {
            variant,
            field: name.clone(),
        })?;
        sample.set(index, *value);
    }
    Ok(sample)
}

/// Checks that `names` lists exactly the fields of `S`, in order.
pub fn check_fields<S, N>(variant: &'static str, names: &[N]) -> Result<(), MarshalError>
where
    S: Sample,
    N: AsRef<str>,
{
    if names.len() != S::FIELDS.len() {
        return Err(MarshalError::FieldCount {
            variant,
            expected: S::FIELDS.len(),
            actual: names.len(),
        });
    }
    for (index, (expected, actual)) in S::FIELDS.iter().zip(names).enumerate() {
        if *expected != actual.as_ref() {
            return Err(MarshalError::FieldOrder {
                variant,
                index,
                expected,
                actual: actual.as_ref().to_string(),
            });
        }
    }
    Ok(())
}

pub fn field_index<S: Sample>(name: &str) -> Option<usize> {
    S::FIELDS.iter().position(|field| *field == name)
}

/// `speed=150 distance=15` style rendering for logs.
pub fn describe<S: Sample>(sample: &S) -> String {
    let mut out = String::new();
    for (index, name) in S::FIELDS.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        let value = sample.get(index).unwrap_or(f64::NAN);
        let _ = write!(out, "{name}={value}");
    }
    out
}

/// First field holding NaN or an infinity, if any.
pub fn first_non_finite<S: Sample>(sample: &S) -> Option<&'static str> {
    S::FIELDS
        .iter()
        .enumerate()
        .find(|(index, _)| sample.get(*index).map_or(false, |value| !value.is_finite()))
        .map(|(_, name)| *name)
}
