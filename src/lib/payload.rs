use std::convert::TryFrom;
use std::fmt::Display;

use thiserror::Error;

use crate::fields::{offsets, payload_size, Field, FieldKind, Width};

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("payload is {actual} bytes, field table expects {expected}")]
    Length { expected: usize, actual: usize },
    #[error("field table has {expected} fields, got {actual} values")]
    ValueCount { expected: usize, actual: usize },
    #[error("value for '{label}' does not match the field type")]
    Type { label: &'static str },
    #[error("value for '{label}' does not fit in {size} bytes")]
    Overflow { label: &'static str, size: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(u32),
    Float(f64),
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Text(s) => s.fmt(f),
            Value::Int(v) => v.fmt(f),
            Value::Float(v) => v.fmt(f),
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Text(_) => None,
            Value::Int(v) => Some(f64::from(*v)),
            Value::Float(v) => Some(*v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub key: Option<&'static str>,
    pub label: &'static str,
    pub value: Value,
    pub unit: &'static str,
}

/// Decode a complete payload, one record per field in table order.
pub fn decode(payload: &[u8], table: &[Field]) -> Result<Vec<TelemetryRecord>, DecodeError> {
    let expected = payload_size(table);
    if payload.len() != expected {
        return Err(DecodeError::Length {
            expected,
            actual: payload.len(),
        });
    }

    Ok(table
        .iter()
        .zip(offsets(table))
        .map(|(field, offset)| {
            let bytes = &payload[offset..offset + field.size()];
            TelemetryRecord {
                key: field.key,
                label: field.label,
                value: decode_field(field.kind, bytes),
                unit: field.unit,
            }
        })
        .collect())
}

fn decode_field(kind: FieldKind, bytes: &[u8]) -> Value {
    match kind {
        FieldKind::Text { .. } => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        FieldKind::Version => Value::Text(format!("{:02}.{:02}", bytes[0], bytes[1])),
        FieldKind::Float { scale, .. } => Value::Float(scale_up(be_uint(bytes), scale)),
        FieldKind::Int { .. } => Value::Int(be_uint(bytes)),
    }
}

fn be_uint(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

// Divide for negative exponents so that e.g. 2442 * 10^-1 is exactly 244.2.
fn scale_up(raw: u32, scale: i32) -> f64 {
    let factor = 10f64.powi(scale.abs());
    if scale < 0 {
        f64::from(raw) / factor
    } else {
        f64::from(raw) * factor
    }
}

fn scale_down(value: f64, scale: i32) -> f64 {
    let factor = 10f64.powi(scale.abs());
    if scale < 0 {
        value * factor
    } else {
        value / factor
    }
}

/// Build a payload from one value per field; the inverse of [`decode`].
///
/// Text shorter than its field is padded with NUL bytes.
pub fn pack(values: &[Value], table: &[Field]) -> Result<Vec<u8>, DecodeError> {
    if values.len() != table.len() {
        return Err(DecodeError::ValueCount {
            expected: table.len(),
            actual: values.len(),
        });
    }

    let mut payload = Vec::with_capacity(payload_size(table));
    for (field, value) in table.iter().zip(values) {
        let label = field.label;
        let overflow = DecodeError::Overflow {
            label,
            size: field.size(),
        };

        match (field.kind, value) {
            (FieldKind::Text { size }, Value::Text(s)) => {
                let bytes = s.as_bytes();
                if bytes.len() > size {
                    return Err(overflow);
                }
                payload.extend_from_slice(bytes);
                payload.resize(payload.len() + size - bytes.len(), 0);
            }
            (FieldKind::Version, Value::Text(s)) => {
                let (ma, mi) = s
                    .split_once('.')
                    .and_then(|(ma, mi)| Some((ma.parse::<u8>().ok()?, mi.parse::<u8>().ok()?)))
                    .ok_or(DecodeError::Type { label })?;
                payload.extend_from_slice(&[ma, mi]);
            }
            (FieldKind::Float { width, scale }, Value::Float(v)) => {
                let raw = scale_down(*v, scale).round();
                if !(0.0..=f64::from(u32::MAX)).contains(&raw) {
                    return Err(overflow);
                }
                put_be(&mut payload, width, raw as u32).map_err(|_| overflow)?;
            }
            (FieldKind::Int { width }, Value::Int(v)) => {
                put_be(&mut payload, width, *v).map_err(|_| overflow)?;
            }
            _ => return Err(DecodeError::Type { label }),
        }
    }
    Ok(payload)
}

fn put_be(payload: &mut Vec<u8>, width: Width, value: u32) -> Result<(), std::num::TryFromIntError> {
    match width {
        Width::U16 => payload.extend_from_slice(&u16::try_from(value)?.to_be_bytes()),
        Width::U32 => payload.extend_from_slice(&value.to_be_bytes()),
    }
    Ok(())
}
