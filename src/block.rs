//! Dense, microblock-tiled volume buffers
//!
//! A [`Block`] owns a contiguous byte buffer holding an N-dimensional region
//! of samples. The buffer is ordered by microblock: whole microblocks laid
//! out in first-axis-fastest grid order, bytes contiguous within each
//! microblock. Cropping and splicing therefore move whole microblocks only,
//! which keeps both operations a sequence of straight `memcpy`s regardless
//! of element type or channel count.

use crate::error::{BvpError, Result};
use crate::format::Format;
use crate::vector;
use std::fmt;
use std::sync::Arc;

/// A dimensioned byte buffer over a microblock grid
#[derive(Clone)]
pub struct Block {
    dimensions: Vec<i64>,
    format: Arc<Format>,
    data: Vec<u8>,
}

impl Block {
    /// Wrap an existing buffer
    ///
    /// The buffer length must match the byte size implied by `dimensions`
    /// and `format` exactly, and the dimensions must describe a whole
    /// number of microblocks on every axis.
    pub fn new(dimensions: Vec<i64>, format: Arc<Format>, data: Vec<u8>) -> Result<Self> {
        format.validate()?;
        check_dimensions(&dimensions, &format)?;
        let expected = format.block_byte_size(&dimensions);
        if data.len() as i64 != expected {
            return Err(BvpError::MalformedPayload(format!(
                "buffer of {} bytes does not match dimensions {:?} ({} expected)",
                data.len(),
                dimensions,
                expected
            )));
        }
        Ok(Self {
            dimensions,
            format,
            data,
        })
    }

    /// Allocate a zero-filled block
    pub fn zeroed(dimensions: Vec<i64>, format: Arc<Format>) -> Result<Self> {
        format.validate()?;
        check_dimensions(&dimensions, &format)?;
        let len = format.block_byte_size(&dimensions) as usize;
        Ok(Self {
            dimensions,
            format,
            data: vec![0; len],
        })
    }

    /// Extent of the block in elements, one entry per axis
    pub fn dimensions(&self) -> &[i64] {
        &self.dimensions
    }

    /// Format shared by this block and its microblock grid
    pub fn format(&self) -> &Arc<Format> {
        &self.format
    }

    /// Raw microblock-ordered buffer
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the block, keeping only the buffer
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Buffer length in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Copy the sub-region `[start, end)` into a new block
    ///
    /// Both bounds must lie on the microblock grid. All checks run before
    /// any copying, so a failed call allocates nothing and changes nothing.
    pub fn extract(&self, start: &[i64], end: &[i64]) -> Result<Block> {
        let extent = vector::sub(end, start)?;
        self.check_region(start, end, &extent)?;

        let microblock = &self.format.microblock_dimensions;
        let grid_start = vector::div(start, microblock)?;
        let crop_extent = vector::div(&extent, microblock)?;
        let full_extent = vector::div(&self.dimensions, microblock)?;

        let mut out = Block::zeroed(extent, Arc::clone(&self.format))?;
        let chunk = self.format.microblock_size as usize;
        for local in vector::lexi(&crop_extent) {
            let global = vector::add(&local, &grid_start)?;
            let src = vector::linear_index(&global, &full_extent)? as usize * chunk;
            let dst = vector::linear_index(&local, &crop_extent)? as usize * chunk;
            out.data[dst..dst + chunk].copy_from_slice(&self.data[src..src + chunk]);
        }
        Ok(out)
    }

    /// Copy `source` into this block at `offset`
    ///
    /// The mirror image of [`extract`](Block::extract): source microblocks
    /// are read in their own grid order and written into this block's grid.
    /// Requires identical formats. All checks run before any copying, so a
    /// failed call leaves this block untouched.
    pub fn splice(&mut self, offset: &[i64], source: &Block) -> Result<()> {
        if self.format != source.format {
            return Err(BvpError::FormatMismatch(
                "destination and source formats differ".to_string(),
            ));
        }
        let end = vector::add(offset, &source.dimensions)?;
        let extent = vector::sub(&end, offset)?;
        self.check_region(offset, &end, &extent)?;

        let microblock = &self.format.microblock_dimensions;
        let grid_start = vector::div(offset, microblock)?;
        let crop_extent = vector::div(&extent, microblock)?;
        let full_extent = vector::div(&self.dimensions, microblock)?;

        let chunk = self.format.microblock_size as usize;
        for local in vector::lexi(&crop_extent) {
            let global = vector::add(&local, &grid_start)?;
            let src = vector::linear_index(&local, &crop_extent)? as usize * chunk;
            let dst = vector::linear_index(&global, &full_extent)? as usize * chunk;
            self.data[dst..dst + chunk].copy_from_slice(&source.data[src..src + chunk]);
        }
        Ok(())
    }

    fn check_region(&self, start: &[i64], end: &[i64], extent: &[i64]) -> Result<()> {
        let microblock = &self.format.microblock_dimensions;
        if vector::any(&vector::gt(start, end)?) {
            return Err(BvpError::StartAfterEnd(format!("{:?} to {:?}", start, end)));
        }
        if start.iter().any(|&s| s < 0) {
            return Err(BvpError::StartOutOfBounds(format!("{:?}", start)));
        }
        if vector::any(&vector::gt(end, &self.dimensions)?) {
            return Err(BvpError::EndOutOfBounds(format!(
                "{:?} exceeds {:?}",
                end, self.dimensions
            )));
        }
        if vector::rem(start, microblock)?.iter().any(|&r| r != 0) {
            return Err(BvpError::MisalignedStart(format!(
                "{:?} not on grid {:?}",
                start, microblock
            )));
        }
        if vector::rem(extent, microblock)?.iter().any(|&r| r != 0) {
            return Err(BvpError::NonIntegerMicroblockExtent(format!(
                "{:?} not a whole number of microblocks {:?}",
                extent, microblock
            )));
        }
        Ok(())
    }
}

fn check_dimensions(dimensions: &[i64], format: &Format) -> Result<()> {
    if dimensions.len() != format.microblock_dimensions.len() {
        return Err(BvpError::DimensionMismatch(format!(
            "{} axes vs {} in format",
            dimensions.len(),
            format.microblock_dimensions.len()
        )));
    }
    if dimensions.iter().any(|&d| d < 0) {
        return Err(BvpError::DimensionMismatch(format!(
            "negative dimensions {:?}",
            dimensions
        )));
    }
    if vector::rem(dimensions, &format.microblock_dimensions)?
        .iter()
        .any(|&r| r != 0)
    {
        return Err(BvpError::NonIntegerMicroblockExtent(format!(
            "dimensions {:?} not a whole number of microblocks {:?}",
            dimensions, format.microblock_dimensions
        )));
    }
    Ok(())
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("dimensions", &self.dimensions)
            .field("format", &self.format.family)
            .field("bytes", &self.data.len())
            .finish()
    }
}
