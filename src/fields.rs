//! Null-safe typed field accessors
//!
//! Each accessor reads the cell at a zero-based ordinal of any [`Record`].
//! Defaulting variants return the caller's default for null cells; `_opt`
//! variants return `None`. A non-null cell of the wrong type is an
//! `InvalidCast` error.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::error::{DataError, Result};
use crate::record::Record;
use crate::value::Value;

/// Chunk size used by [`get_bytes`]
pub const BYTES_CHUNK_SIZE: usize = 8192;

fn read<R, T>(
    record: &R,
    ordinal: usize,
    expected: &'static str,
    convert: impl FnOnce(&Value) -> Option<T>,
) -> Result<Option<T>>
where
    R: Record + ?Sized,
{
    let value = record.value(ordinal)?;
    if value.is_null() {
        return Ok(None);
    }
    convert(value)
        .map(Some)
        .ok_or(DataError::InvalidCast { ordinal, expected, found: value.kind() })
}

/// Text cell, `None` when null
pub fn get_string<R: Record + ?Sized>(record: &R, ordinal: usize) -> Result<Option<String>> {
    read(record, ordinal, "string", |v| match v {
        Value::Text(s) => Some(s.clone()),
        Value::Integer(_) | Value::Real(_) => Some(v.to_string()),
        _ => None,
    })
}

pub fn get_i32_opt<R: Record + ?Sized>(record: &R, ordinal: usize) -> Result<Option<i32>> {
    read(record, ordinal, "i32", |v| v.as_i64().and_then(|i| i32::try_from(i).ok()))
}

pub fn get_i32<R: Record + ?Sized>(record: &R, ordinal: usize, default: i32) -> Result<i32> {
    Ok(get_i32_opt(record, ordinal)?.unwrap_or(default))
}

pub fn get_i64_opt<R: Record + ?Sized>(record: &R, ordinal: usize) -> Result<Option<i64>> {
    read(record, ordinal, "i64", Value::as_i64)
}

pub fn get_i64<R: Record + ?Sized>(record: &R, ordinal: usize, default: i64) -> Result<i64> {
    Ok(get_i64_opt(record, ordinal)?.unwrap_or(default))
}

pub fn get_f64_opt<R: Record + ?Sized>(record: &R, ordinal: usize) -> Result<Option<f64>> {
    read(record, ordinal, "f64", Value::as_f64)
}

pub fn get_f64<R: Record + ?Sized>(record: &R, ordinal: usize, default: f64) -> Result<f64> {
    Ok(get_f64_opt(record, ordinal)?.unwrap_or(default))
}

pub fn get_datetime_opt<R: Record + ?Sized>(
    record: &R,
    ordinal: usize,
) -> Result<Option<NaiveDateTime>> {
    read(record, ordinal, "datetime", Value::as_datetime)
}

pub fn get_datetime<R: Record + ?Sized>(
    record: &R,
    ordinal: usize,
    default: NaiveDateTime,
) -> Result<NaiveDateTime> {
    Ok(get_datetime_opt(record, ordinal)?.unwrap_or(default))
}

pub fn get_uuid_opt<R: Record + ?Sized>(record: &R, ordinal: usize) -> Result<Option<Uuid>> {
    read(record, ordinal, "uuid", Value::as_uuid)
}

pub fn get_uuid<R: Record + ?Sized>(record: &R, ordinal: usize, default: Uuid) -> Result<Uuid> {
    Ok(get_uuid_opt(record, ordinal)?.unwrap_or(default))
}

pub fn get_bool_opt<R: Record + ?Sized>(record: &R, ordinal: usize) -> Result<Option<bool>> {
    read(record, ordinal, "bool", Value::as_bool)
}

pub fn get_bool<R: Record + ?Sized>(record: &R, ordinal: usize, default: bool) -> Result<bool> {
    Ok(get_bool_opt(record, ordinal)?.unwrap_or(default))
}

/// Read a large-object cell in [`BYTES_CHUNK_SIZE`] chunks until a short read
pub fn get_bytes<R: Record + ?Sized>(record: &R, ordinal: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut chunk = [0u8; BYTES_CHUNK_SIZE];
    let mut offset = 0;
    loop {
        let n = record.read_bytes(ordinal, offset, &mut chunk)?;
        data.extend_from_slice(&chunk[..n]);
        offset += n;
        if n < chunk.len() {
            break;
        }
    }
    Ok(data)
}
