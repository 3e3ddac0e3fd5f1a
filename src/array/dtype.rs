//! Pixel data types and their zarr / OME encodings.

use std::fmt;

use crate::error::StoreError;

/// Pixel data type of a pyramid.
///
/// All types are stored little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::UInt8 | DataType::Int8 => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::UInt64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// The zarr v2 `dtype` string (e.g. `<u2`).
    pub fn zarr_str(&self) -> &'static str {
        match self {
            DataType::UInt8 => "|u1",
            DataType::UInt16 => "<u2",
            DataType::UInt32 => "<u4",
            DataType::UInt64 => "<u8",
            DataType::Int8 => "|i1",
            DataType::Int16 => "<i2",
            DataType::Int32 => "<i4",
            DataType::Int64 => "<i8",
            DataType::Float32 => "<f4",
            DataType::Float64 => "<f8",
        }
    }

    /// Parse a zarr v2 `dtype` string.
    ///
    /// Single-byte types are accepted with any byte-order marker. Big-endian
    /// multi-byte types are rejected.
    pub fn from_zarr_str(s: &str) -> Result<Self, StoreError> {
        let dtype = match s {
            "|u1" | "<u1" | ">u1" | "u1" => DataType::UInt8,
            "|i1" | "<i1" | ">i1" | "i1" => DataType::Int8,
            "<u2" => DataType::UInt16,
            "<u4" => DataType::UInt32,
            "<u8" => DataType::UInt64,
            "<i2" => DataType::Int16,
            "<i4" => DataType::Int32,
            "<i8" => DataType::Int64,
            "<f4" => DataType::Float32,
            "<f8" => DataType::Float64,
            other => return Err(StoreError::UnsupportedDataType(other.to_string())),
        };
        Ok(dtype)
    }

    /// The OME-XML `Pixels/@Type` value.
    pub fn ome_type(&self) -> &'static str {
        match self {
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float",
            DataType::Float64 => "double",
        }
    }

    /// Whether this is a floating point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ome_type())
    }
}
