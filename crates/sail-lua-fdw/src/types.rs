use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use datafusion::arrow::datatypes::{DataType, TimeUnit};
use datafusion::common::ScalarValue;

use crate::codec::CodecError;

/// The data domain of a column as seen by table scripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Integer,
    Float,
    Boolean,
    Text,
    Date,
    Timestamp,
}

impl LogicalType {
    pub const ALL: [LogicalType; 6] = [
        LogicalType::Integer,
        LogicalType::Float,
        LogicalType::Boolean,
        LogicalType::Text,
        LogicalType::Date,
        LogicalType::Timestamp,
    ];

    /// The name published to scripts.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalType::Integer => "integer",
            LogicalType::Float => "float",
            LogicalType::Boolean => "boolean",
            LogicalType::Text => "text",
            LogicalType::Date => "date",
            LogicalType::Timestamp => "timestamp",
        }
    }

    /// Returns the logical type of an Arrow data type, or `None` if values of
    /// that type cannot cross the script boundary.
    pub fn of(data_type: &DataType) -> Option<Self> {
        match data_type {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Some(LogicalType::Integer),
            DataType::Float32 | DataType::Float64 => Some(LogicalType::Float),
            DataType::Boolean => Some(LogicalType::Boolean),
            DataType::Utf8 | DataType::LargeUtf8 => Some(LogicalType::Text),
            DataType::Date32 => Some(LogicalType::Date),
            DataType::Timestamp(_, _) => Some(LogicalType::Timestamp),
            _ => None,
        }
    }

    /// The Arrow type used for columns declared only by their logical type.
    pub fn default_data_type(&self) -> DataType {
        match self {
            LogicalType::Integer => DataType::Int64,
            LogicalType::Float => DataType::Float64,
            LogicalType::Boolean => DataType::Boolean,
            LogicalType::Text => DataType::Utf8,
            LogicalType::Date => DataType::Date32,
            LogicalType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for LogicalType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "bigint" | "int8" | "int4" | "long" => Ok(LogicalType::Integer),
            "float" | "double" | "real" | "float8" | "float4" => Ok(LogicalType::Float),
            "boolean" | "bool" => Ok(LogicalType::Boolean),
            "text" | "string" | "varchar" => Ok(LogicalType::Text),
            "date" => Ok(LogicalType::Date),
            "timestamp" => Ok(LogicalType::Timestamp),
            other => Err(CodecError::UnsupportedType(other.to_string())),
        }
    }
}

/// A column of a scripted table.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    name: String,
    data_type: DataType,
    logical_type: LogicalType,
}

impl ColumnDescriptor {
    pub fn try_new(name: impl Into<String>, data_type: DataType) -> Result<Self, CodecError> {
        let logical_type = LogicalType::of(&data_type)
            .ok_or_else(|| CodecError::UnsupportedType(data_type.to_string()))?;
        Ok(Self {
            name: name.into(),
            data_type,
            logical_type,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn logical_type(&self) -> LogicalType {
        self.logical_type
    }
}

/// A row of native values aligned with the columns of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[ColumnDescriptor]>,
    values: Vec<ScalarValue>,
}

impl Row {
    pub fn try_new(columns: Arc<[ColumnDescriptor]>, values: Vec<ScalarValue>) -> Result<Self, CodecError> {
        if columns.len() != values.len() {
            return Err(CodecError::RowShape {
                expected: columns.len(),
                actual: values.len(),
            });
        }
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.values
    }

    /// Returns the value of the named column.
    pub fn get(&self, name: &str) -> Option<&ScalarValue> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .and_then(|i| self.values.get(i))
    }
}
