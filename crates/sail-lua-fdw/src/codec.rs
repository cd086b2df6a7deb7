//! Conversion between engine values and the text form exchanged with scripts.
//!
//! Scripts only ever see nullable strings. A value is encoded with the
//! canonical text of its logical type, and decoded with the input rules of the
//! column's declared type, so that `decode(encode(v)) == v` for every value the
//! column can hold.

use std::collections::BTreeMap;
use std::num::{IntErrorKind, ParseIntError};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::common::ScalarValue;
use thiserror::Error;

use crate::types::{ColumnDescriptor, LogicalType, Row};
use crate::value::ScriptValue;

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("invalid input syntax for type {logical_type}: \"{text}\"")]
    InvalidInput {
        logical_type: LogicalType,
        text: String,
    },
    #[error("value \"{text}\" is out of range for type {data_type}")]
    OutOfRange { data_type: String, text: String },
    #[error("row has {actual} values but the table has {expected} columns")]
    RowShape { expected: usize, actual: usize },
}

/// Days between 0001-01-01 and 1970-01-01 in the proleptic Gregorian calendar.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const UTC_SUFFIX: &str = "+00:00";

/// Encodes a value into its canonical text. SQL NULL encodes to `None`.
///
/// Dates and timestamps must fall inside the range chrono represents (about
/// 262,000 years either side of the common era). Values outside it fail with
/// [`CodecError::OutOfRange`], so `decode(encode(v)) == v` holds only inside
/// that range.
pub fn encode(value: &ScalarValue) -> CodecResult<Option<String>> {
    if value.is_null() {
        return match LogicalType::of(&value.data_type()) {
            Some(_) => Ok(None),
            None => Err(CodecError::UnsupportedType(value.data_type().to_string())),
        };
    }
    let text = match value {
        ScalarValue::Int8(Some(v)) => v.to_string(),
        ScalarValue::Int16(Some(v)) => v.to_string(),
        ScalarValue::Int32(Some(v)) => v.to_string(),
        ScalarValue::Int64(Some(v)) => v.to_string(),
        ScalarValue::UInt8(Some(v)) => v.to_string(),
        ScalarValue::UInt16(Some(v)) => v.to_string(),
        ScalarValue::UInt32(Some(v)) => v.to_string(),
        ScalarValue::UInt64(Some(v)) => v.to_string(),
        ScalarValue::Float32(Some(v)) => ryu::Buffer::new().format(*v).to_string(),
        ScalarValue::Float64(Some(v)) => ryu::Buffer::new().format(*v).to_string(),
        ScalarValue::Boolean(Some(v)) => v.to_string(),
        ScalarValue::Utf8(Some(v)) | ScalarValue::LargeUtf8(Some(v)) => v.clone(),
        ScalarValue::Date32(Some(days)) => encode_date(*days)?,
        ScalarValue::TimestampSecond(Some(v), tz) => {
            encode_timestamp(DateTime::from_timestamp(*v, 0), tz.is_some(), *v)?
        }
        ScalarValue::TimestampMillisecond(Some(v), tz) => {
            encode_timestamp(DateTime::from_timestamp_millis(*v), tz.is_some(), *v)?
        }
        ScalarValue::TimestampMicrosecond(Some(v), tz) => {
            encode_timestamp(DateTime::from_timestamp_micros(*v), tz.is_some(), *v)?
        }
        ScalarValue::TimestampNanosecond(Some(v), tz) => {
            encode_timestamp(Some(DateTime::from_timestamp_nanos(*v)), tz.is_some(), *v)?
        }
        other => return Err(CodecError::UnsupportedType(other.data_type().to_string())),
    };
    Ok(Some(text))
}

fn encode_date(days: i32) -> CodecResult<String> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .ok_or_else(|| CodecError::OutOfRange {
            data_type: DataType::Date32.to_string(),
            text: days.to_string(),
        })
}

fn encode_timestamp(datetime: Option<DateTime<Utc>>, zoned: bool, raw: i64) -> CodecResult<String> {
    let datetime = datetime.ok_or_else(|| CodecError::OutOfRange {
        data_type: "timestamp".to_string(),
        text: raw.to_string(),
    })?;
    let mut text = datetime.naive_utc().format(TIMESTAMP_FORMAT).to_string();
    if zoned {
        text.push_str(UTC_SUFFIX);
    }
    Ok(text)
}

/// Decodes text into a value of the declared type. `None` decodes to the typed
/// SQL NULL.
pub fn decode(text: Option<&str>, data_type: &DataType) -> CodecResult<ScalarValue> {
    let logical_type = LogicalType::of(data_type)
        .ok_or_else(|| CodecError::UnsupportedType(data_type.to_string()))?;
    let Some(text) = text else {
        return ScalarValue::try_from(data_type)
            .map_err(|_| CodecError::UnsupportedType(data_type.to_string()));
    };
    let value = match data_type {
        DataType::Int8 => ScalarValue::Int8(Some(parse_integer(text, data_type)?)),
        DataType::Int16 => ScalarValue::Int16(Some(parse_integer(text, data_type)?)),
        DataType::Int32 => ScalarValue::Int32(Some(parse_integer(text, data_type)?)),
        DataType::Int64 => ScalarValue::Int64(Some(parse_integer(text, data_type)?)),
        DataType::UInt8 => ScalarValue::UInt8(Some(parse_integer(text, data_type)?)),
        DataType::UInt16 => ScalarValue::UInt16(Some(parse_integer(text, data_type)?)),
        DataType::UInt32 => ScalarValue::UInt32(Some(parse_integer(text, data_type)?)),
        DataType::UInt64 => ScalarValue::UInt64(Some(parse_integer(text, data_type)?)),
        DataType::Float32 => ScalarValue::Float32(Some(parse_float(text, logical_type)?)),
        DataType::Float64 => ScalarValue::Float64(Some(parse_float(text, logical_type)?)),
        DataType::Boolean => ScalarValue::Boolean(Some(parse_boolean(text)?)),
        DataType::Utf8 => ScalarValue::Utf8(Some(text.to_string())),
        DataType::LargeUtf8 => ScalarValue::LargeUtf8(Some(text.to_string())),
        DataType::Date32 => ScalarValue::Date32(Some(parse_date(text)?)),
        DataType::Timestamp(unit, tz) => {
            let datetime = parse_timestamp(text)?.and_utc();
            let out_of_range = || CodecError::OutOfRange {
                data_type: data_type.to_string(),
                text: text.to_string(),
            };
            match unit {
                TimeUnit::Second => ScalarValue::TimestampSecond(Some(datetime.timestamp()), tz.clone()),
                TimeUnit::Millisecond => {
                    ScalarValue::TimestampMillisecond(Some(datetime.timestamp_millis()), tz.clone())
                }
                TimeUnit::Microsecond => {
                    ScalarValue::TimestampMicrosecond(Some(datetime.timestamp_micros()), tz.clone())
                }
                TimeUnit::Nanosecond => ScalarValue::TimestampNanosecond(
                    Some(datetime.timestamp_nanos_opt().ok_or_else(out_of_range)?),
                    tz.clone(),
                ),
            }
        }
        _ => return Err(CodecError::UnsupportedType(data_type.to_string())),
    };
    Ok(value)
}

fn parse_integer<T>(text: &str, data_type: &DataType) -> CodecResult<T>
where
    T: FromStr<Err = ParseIntError>,
{
    text.trim().parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => CodecError::OutOfRange {
            data_type: data_type.to_string(),
            text: text.to_string(),
        },
        _ => CodecError::InvalidInput {
            logical_type: LogicalType::Integer,
            text: text.to_string(),
        },
    })
}

fn parse_float<T: FromStr>(text: &str, logical_type: LogicalType) -> CodecResult<T> {
    text.trim()
        .parse::<T>()
        .map_err(|_| CodecError::InvalidInput {
            logical_type,
            text: text.to_string(),
        })
}

fn parse_boolean(text: &str) -> CodecResult<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        _ => Err(CodecError::InvalidInput {
            logical_type: LogicalType::Boolean,
            text: text.to_string(),
        }),
    }
}

fn parse_date(text: &str) -> CodecResult<i32> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
        CodecError::InvalidInput {
            logical_type: LogicalType::Date,
            text: text.to_string(),
        }
    })?;
    Ok(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

/// Parses a timestamp into its UTC wall-clock time.
///
/// The date and time may be separated by a space or `T`. A trailing offset
/// (`Z`, `+hh`, `+hhmm`, `+hh:mm`) shifts the value to UTC; without one the
/// text is taken as UTC already.
fn parse_timestamp(text: &str) -> CodecResult<NaiveDateTime> {
    let invalid = || CodecError::InvalidInput {
        logical_type: LogicalType::Timestamp,
        text: text.to_string(),
    };
    let mut normalized = text.trim().to_string();
    if normalized.len() > 10 && normalized.as_bytes()[10] == b'T' {
        normalized.replace_range(10..11, " ");
    }
    if let Some(stripped) = normalized.strip_suffix('Z') {
        normalized = format!("{stripped}{UTC_SUFFIX}");
    }
    if let Ok(datetime) = DateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(datetime.naive_utc());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT) {
        return Ok(datetime);
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(invalid)
}

/// Decodes a row returned by a script. Fields that are missing or are not
/// strings decode as NULL.
pub fn decode_row(value: &ScriptValue, columns: &Arc<[ColumnDescriptor]>) -> CodecResult<Row> {
    let values = columns
        .iter()
        .map(|column| match value.field(column.name()) {
            Some(ScriptValue::Bytes(bytes)) => Err(CodecError::InvalidInput {
                logical_type: column.logical_type(),
                text: String::from_utf8_lossy(bytes).into_owned(),
            }),
            field => decode(field.and_then(ScriptValue::as_str), column.data_type()),
        })
        .collect::<CodecResult<Vec<_>>>()?;
    Row::try_new(Arc::clone(columns), values)
}

/// Encodes a row as a script table keyed by column name. NULL columns are
/// left out of the table.
pub fn encode_row(row: &Row) -> CodecResult<ScriptValue> {
    let mut fields = BTreeMap::new();
    for (column, value) in row.columns().iter().zip(row.values()) {
        if let Some(text) = encode(value)? {
            fields.insert(column.name().to_string(), ScriptValue::String(text));
        }
    }
    Ok(ScriptValue::Table(fields))
}
