//! Sample format descriptions from the manifest format table

use crate::error::{BvpError, Result};
use crate::vector;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element kind tag of a format table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// Unsigned integer samples
    #[serde(rename = "u")]
    Unsigned,
    /// Signed integer samples
    #[serde(rename = "i")]
    Signed,
    /// Floating point samples
    #[serde(rename = "f")]
    Float,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ElementKind::Unsigned => "u",
            ElementKind::Signed => "i",
            ElementKind::Float => "f",
        };
        write!(f, "{}", tag)
    }
}

/// Concrete sample types a format can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// 16-bit floating point
    F16,
    /// 32-bit floating point
    F32,
}

impl SampleType {
    /// Size in bytes of one sample
    pub fn size_in_bytes(&self) -> usize {
        match self {
            SampleType::U8 | SampleType::I8 => 1,
            SampleType::U16 | SampleType::I16 | SampleType::F16 => 2,
            SampleType::U32 | SampleType::I32 | SampleType::F32 => 4,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, SampleType::F16 | SampleType::F32)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One entry of the manifest's format table
///
/// Describes the element layout of every block that references it: how many
/// samples make up one element, how wide a sample is, and the microblock
/// tile geometry that `Block` buffers are ordered by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Format {
    /// Format family identifier (e.g. "mono")
    pub family: String,

    /// Samples per element
    pub count: i64,

    /// Element kind tag
    #[serde(rename = "type")]
    pub kind: ElementKind,

    /// Bytes per sample
    pub size: i64,

    /// Microblock extent in elements, one entry per axis
    pub microblock_dimensions: Vec<i64>,

    /// Declared bytes per microblock, cross-checked against the geometry
    pub microblock_size: i64,

    /// Packed index width for quantized payloads (2 or 4)
    pub index_bits: Option<u32>,
}

impl Format {
    /// Create a format with the microblock byte size derived from the geometry
    pub fn new(
        family: impl Into<String>,
        count: i64,
        kind: ElementKind,
        size: i64,
        microblock_dimensions: Vec<i64>,
    ) -> Self {
        let microblock_size = count * size * vector::product(&microblock_dimensions);
        Self {
            family: family.into(),
            count,
            kind,
            size,
            microblock_dimensions,
            microblock_size,
            index_bits: None,
        }
    }

    /// Set the packed index width
    pub fn with_index_bits(mut self, bits: u32) -> Self {
        self.index_bits = Some(bits);
        self
    }

    /// Bytes per element
    pub fn element_bytes(&self) -> i64 {
        self.count * self.size
    }

    /// Bytes per microblock, derived from the geometry
    pub fn microblock_byte_size(&self) -> i64 {
        self.element_bytes() * vector::product(&self.microblock_dimensions)
    }

    /// Bytes of a dense buffer with the given dimensions
    pub fn block_byte_size(&self, dimensions: &[i64]) -> i64 {
        self.element_bytes() * vector::product(dimensions)
    }

    /// Check internal consistency of this entry
    pub fn validate(&self) -> Result<()> {
        if self.count < 1 {
            return Err(BvpError::MalformedManifest(format!(
                "format channel count must be positive, got {}",
                self.count
            )));
        }
        if self.size < 1 {
            return Err(BvpError::MalformedManifest(format!(
                "format sample size must be positive, got {}",
                self.size
            )));
        }
        if self.microblock_dimensions.is_empty()
            || self.microblock_dimensions.iter().any(|&d| d < 1)
        {
            return Err(BvpError::MalformedManifest(format!(
                "format microblock dimensions must be positive, got {:?}",
                self.microblock_dimensions
            )));
        }
        if self.microblock_size != self.microblock_byte_size() {
            return Err(BvpError::MalformedManifest(format!(
                "declared microblock size {} does not match geometry ({} expected)",
                self.microblock_size,
                self.microblock_byte_size()
            )));
        }
        if let Some(bits) = self.index_bits {
            if bits != 2 && bits != 4 {
                return Err(BvpError::MalformedManifest(format!(
                    "index width must be 2 or 4 bits, got {}",
                    bits
                )));
            }
        }
        Ok(())
    }

    /// Resolve the concrete sample type of this format
    ///
    /// Fails on kind/size combinations outside the closed set rather than
    /// guessing a layout for them.
    pub fn sample_type(&self) -> Result<SampleType> {
        match (self.kind, self.size) {
            (ElementKind::Unsigned, 1) => Ok(SampleType::U8),
            (ElementKind::Unsigned, 2) => Ok(SampleType::U16),
            (ElementKind::Unsigned, 4) => Ok(SampleType::U32),
            (ElementKind::Signed, 1) => Ok(SampleType::I8),
            (ElementKind::Signed, 2) => Ok(SampleType::I16),
            (ElementKind::Signed, 4) => Ok(SampleType::I32),
            (ElementKind::Float, 2) => Ok(SampleType::F16),
            (ElementKind::Float, 4) => Ok(SampleType::F32),
            (kind, size) => Err(BvpError::MalformedManifest(format!(
                "unsupported sample type {}{}",
                kind,
                size * 8
            ))),
        }
    }
}
