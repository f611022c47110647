use std::fmt;

use crate::error::{ReclassifyError, Result};

/// Storage type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

// Narrowest first; widening picks the first entry that holds both operands.
const WIDENING_ORDER: [PixelType; 8] = [
    PixelType::UInt8,
    PixelType::Int8,
    PixelType::UInt16,
    PixelType::Int16,
    PixelType::UInt32,
    PixelType::Int32,
    PixelType::Float32,
    PixelType::Float64,
];

impl PixelType {
    pub fn is_integer(self) -> bool {
        !matches!(self, PixelType::Float32 | PixelType::Float64)
    }

    /// Inclusive value range of an integer type.
    fn integer_range(self) -> Option<(f64, f64)> {
        match self {
            PixelType::UInt8 => Some((u8::MIN as f64, u8::MAX as f64)),
            PixelType::Int8 => Some((i8::MIN as f64, i8::MAX as f64)),
            PixelType::UInt16 => Some((u16::MIN as f64, u16::MAX as f64)),
            PixelType::Int16 => Some((i16::MIN as f64, i16::MAX as f64)),
            PixelType::UInt32 => Some((u32::MIN as f64, u32::MAX as f64)),
            PixelType::Int32 => Some((i32::MIN as f64, i32::MAX as f64)),
            PixelType::Float32 | PixelType::Float64 => None,
        }
    }

    /// True if every value of `other` is exactly representable in `self`.
    pub fn contains(self, other: PixelType) -> bool {
        match (self.integer_range(), other.integer_range()) {
            (Some((lo, hi)), Some((other_lo, other_hi))) => lo <= other_lo && other_hi <= hi,
            (Some(_), None) => false,
            (None, _) => match self {
                PixelType::Float64 => true,
                _ => matches!(
                    other,
                    PixelType::UInt8
                        | PixelType::Int8
                        | PixelType::UInt16
                        | PixelType::Int16
                        | PixelType::Float32
                ),
            },
        }
    }

    /// Narrowest type holding every value of both `self` and `other`.
    pub fn widen(self, other: PixelType) -> PixelType {
        WIDENING_ORDER
            .into_iter()
            .find(|candidate| candidate.contains(self) && candidate.contains(other))
            .unwrap_or(PixelType::Float64)
    }

    /// Narrowest type that stores `value` exactly.
    pub fn for_value(value: f64) -> PixelType {
        if value.is_nan() {
            return PixelType::Float32;
        }
        if value.fract() == 0.0 {
            if let Some(t) = WIDENING_ORDER.into_iter().find(|t| {
                t.integer_range()
                    .is_some_and(|(lo, hi)| lo <= value && value <= hi)
            }) {
                return t;
            }
        }
        if (value as f32) as f64 == value {
            PixelType::Float32
        } else {
            PixelType::Float64
        }
    }

    /// Narrowest type that holds `self` plus every value in `values`.
    pub fn fitting<I>(self, values: I) -> PixelType
    where
        I: IntoIterator<Item = f64>,
    {
        values
            .into_iter()
            .fold(self, |acc, v| acc.widen(PixelType::for_value(v)))
    }

    /// Convert a value to what this type would store: integers round and
    /// saturate, Float32 loses precision.
    pub fn cast(self, value: f64) -> f64 {
        match self.integer_range() {
            Some((lo, hi)) => {
                if value.is_nan() {
                    0.0
                } else {
                    value.round().clamp(lo, hi)
                }
            }
            None => match self {
                PixelType::Float32 => (value as f32) as f64,
                _ => value,
            },
        }
    }

    pub fn parse(name: &str) -> Result<PixelType> {
        match name.to_ascii_lowercase().as_str() {
            "uint8" | "byte" => Ok(PixelType::UInt8),
            "int8" => Ok(PixelType::Int8),
            "uint16" => Ok(PixelType::UInt16),
            "int16" => Ok(PixelType::Int16),
            "uint32" => Ok(PixelType::UInt32),
            "int32" => Ok(PixelType::Int32),
            "float32" => Ok(PixelType::Float32),
            "float64" => Ok(PixelType::Float64),
            other => Err(ReclassifyError::UnsupportedPixelType(other.to_string())),
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelType::UInt8 => "uint8",
            PixelType::Int8 => "int8",
            PixelType::UInt16 => "uint16",
            PixelType::Int16 => "int16",
            PixelType::UInt32 => "uint32",
            PixelType::Int32 => "int32",
            PixelType::Float32 => "float32",
            PixelType::Float64 => "float64",
        };
        f.write_str(name)
    }
}

#[cfg(feature = "gdal")]
mod gdal_types {
    use super::PixelType;
    use crate::error::{ReclassifyError, Result};
    use gdal::raster::GdalDataType;

    impl PixelType {
        pub fn from_gdal(data_type: GdalDataType) -> Result<PixelType> {
            match data_type {
                GdalDataType::UInt8 => Ok(PixelType::UInt8),
                GdalDataType::UInt16 => Ok(PixelType::UInt16),
                GdalDataType::Int16 => Ok(PixelType::Int16),
                GdalDataType::UInt32 => Ok(PixelType::UInt32),
                GdalDataType::Int32 => Ok(PixelType::Int32),
                GdalDataType::Float32 => Ok(PixelType::Float32),
                GdalDataType::Float64 => Ok(PixelType::Float64),
                // The Int8 variant only exists when built against GDAL 3.7+.
                other if other.name() == "Int8" => Ok(PixelType::Int8),
                other => Err(ReclassifyError::UnsupportedPixelType(format!("{:?}", other))),
            }
        }
    }
}
