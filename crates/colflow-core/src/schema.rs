//! Logical column types. Pure data; no Arrow dependency here.
//!
//! Batches are positional: columns carry a type but no name. Names, if any,
//! live in whatever frame abstraction sits on top of the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Binary,
}

impl DataType {
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Boolean => "Boolean",
            DataType::Int64 => "Int64",
            DataType::Float64 => "Float64",
            DataType::Utf8 => "Utf8",
            DataType::Binary => "Binary",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Rough in-memory width used for buffer accounting.
    pub fn width_hint(self) -> usize {
        match self {
            DataType::Boolean => 1,
            DataType::Int64 | DataType::Float64 => 8,
            DataType::Utf8 => 32,
            DataType::Binary => 64,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Boolean" => Ok(DataType::Boolean),
            "Int64" => Ok(DataType::Int64),
            "Float64" => Ok(DataType::Float64),
            "Utf8" => Ok(DataType::Utf8),
            "Binary" => Ok(DataType::Binary),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}
