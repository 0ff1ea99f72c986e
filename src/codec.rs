//! Payload decoders for encoded block data
//!
//! Every leaf block carries its payload under one of a closed set of
//! encodings. `raw` is a passthrough handled by the resolver; the two real
//! decoders live here as pure functions. Both reject malformed streams
//! instead of guessing.

use crate::error::{BvpError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload encodings understood by the decoders
///
/// Unknown tags parse into [`Encoding::Other`] so that a manifest with an
/// unrecognized encoding loads fine and fails loudly only when the affected
/// block is actually resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Byte-for-byte passthrough
    Raw,
    /// Byte-oriented LZ variant with nibble-packed run lengths
    Lz4mod,
    /// Sparse quantized volumetric codec with a min/max side-channel
    S3dc,
    /// Any tag outside the closed set, kept verbatim for error reporting
    #[serde(untagged)]
    Other(String),
}

impl Encoding {
    /// Manifest tag of this encoding
    pub fn as_str(&self) -> &str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Lz4mod => "lz4mod",
            Encoding::S3dc => "s3dc",
            Encoding::Other(tag) => tag,
        }
    }
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Raw
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generic byte decoder
///
/// The stream is a sequence of tokens. Each token byte carries a literal
/// run length in its high nibble and a match length in its low nibble; a
/// nibble of 15 extends with continuation bytes (add while the consumed
/// byte equals 255, stop after the first smaller one). Literals are copied
/// verbatim, then a 2-byte little-endian offset names a back-reference for
/// the match copy. A zero token byte ends the stream early.
pub mod lz4mod {
    use crate::error::{BvpError, Result};

    fn take(input: &[u8], pos: &mut usize, what: &str) -> Result<u8> {
        let byte = input.get(*pos).copied().ok_or_else(|| {
            BvpError::MalformedPayload(format!("unexpected end of payload in {}", what))
        })?;
        *pos += 1;
        Ok(byte)
    }

    fn run_length(nibble: u8, input: &[u8], pos: &mut usize) -> Result<usize> {
        let mut length = nibble as usize;
        if nibble == 15 {
            loop {
                let byte = take(input, pos, "length escape")?;
                length += byte as usize;
                if byte < 255 {
                    break;
                }
            }
        }
        Ok(length)
    }

    fn read_offset(input: &[u8], pos: &mut usize) -> Result<usize> {
        let lo = take(input, pos, "match offset")?;
        let hi = take(input, pos, "match offset")?;
        Ok(u16::from_le_bytes([lo, hi]) as usize)
    }

    /// Total decoded length of `input`, computed without copying
    ///
    /// Runs the same token parsing as [`decompress`] so callers can size
    /// the destination buffer exactly; the two always agree.
    pub fn decompressed_size(input: &[u8]) -> Result<usize> {
        let mut pos = 0;
        let mut size = 0usize;
        while pos < input.len() {
            let token = input[pos];
            pos += 1;
            if token == 0 {
                break;
            }
            let literals = run_length(token >> 4, input, &mut pos)?;
            if input.len() - pos < literals {
                return Err(BvpError::MalformedPayload(
                    "literal run past end of payload".to_string(),
                ));
            }
            pos += literals;
            size += literals;
            if pos >= input.len() {
                break;
            }
            let offset = read_offset(input, &mut pos)?;
            let matched = run_length(token & 0x0f, input, &mut pos)?;
            if matched > 0 {
                if offset == 0 {
                    return Err(BvpError::MalformedPayload(
                        "match with zero offset".to_string(),
                    ));
                }
                if offset > size {
                    return Err(BvpError::MalformedPayload(format!(
                        "match offset {} reaches before start of output",
                        offset
                    )));
                }
            }
            size += matched;
        }
        Ok(size)
    }

    /// Decode `input` into a freshly allocated buffer
    pub fn decompress(input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(decompressed_size(input)?);
        let mut pos = 0;
        while pos < input.len() {
            let token = input[pos];
            pos += 1;
            if token == 0 {
                break;
            }
            let literals = run_length(token >> 4, input, &mut pos)?;
            if input.len() - pos < literals {
                return Err(BvpError::MalformedPayload(
                    "literal run past end of payload".to_string(),
                ));
            }
            output.extend_from_slice(&input[pos..pos + literals]);
            pos += literals;
            if pos >= input.len() {
                break;
            }
            let offset = read_offset(input, &mut pos)?;
            let matched = run_length(token & 0x0f, input, &mut pos)?;
            if matched > 0 {
                if offset == 0 {
                    return Err(BvpError::MalformedPayload(
                        "match with zero offset".to_string(),
                    ));
                }
                if offset > output.len() {
                    return Err(BvpError::MalformedPayload(format!(
                        "match offset {} reaches before start of output",
                        offset
                    )));
                }
                // one byte at a time: a short offset must re-read bytes
                // written earlier in this same match
                let mut src = output.len() - offset;
                for _ in 0..matched {
                    let byte = output[src];
                    output.push(byte);
                    src += 1;
                }
            }
        }
        Ok(output)
    }
}

/// Sparse quantized volumetric decoder
///
/// The payload is split into equal slices, one per cubic microblock, with
/// a `(min, max)` byte pair per microblock in a separate side-channel. An
/// all-zero slice marks an empty microblock. Every other slice holds packed
/// sample indices that dequantize linearly into `[min, max]`.
pub mod s3dc {
    use crate::block::Block;
    use crate::error::{BvpError, Result};
    use crate::format::Format;
    use crate::vector;
    use std::sync::Arc;

    /// Decode a quantized payload into a block of the given dimensions
    ///
    /// `ranges` is the side-channel of `(min, max)` pairs in microblock
    /// grid order. The microblock side length is derived from the ratio of
    /// voxel count to pair count and cross-checked against the format.
    pub fn decode(
        input: &[u8],
        ranges: &[u8],
        dimensions: &[i64],
        format: &Arc<Format>,
    ) -> Result<Block> {
        let bits = match format.index_bits {
            Some(b) if b == 2 || b == 4 => b,
            Some(b) => {
                return Err(BvpError::MalformedManifest(format!(
                    "index width must be 2 or 4 bits, got {}",
                    b
                )))
            }
            None => {
                return Err(BvpError::MalformedManifest(
                    "quantized payload requires a format with indexBits".to_string(),
                ))
            }
        };
        if format.count != 1 || format.size != 1 {
            return Err(BvpError::MalformedManifest(
                "quantized payloads hold single-channel 8-bit samples".to_string(),
            ));
        }
        if dimensions.len() != 3 {
            return Err(BvpError::MalformedManifest(format!(
                "quantized payloads are 3-dimensional, got {} axes",
                dimensions.len()
            )));
        }
        if ranges.is_empty() || ranges.len() % 2 != 0 {
            return Err(BvpError::MalformedPayload(format!(
                "range side-channel of {} bytes is not a sequence of pairs",
                ranges.len()
            )));
        }

        let pairs = (ranges.len() / 2) as i64;
        let voxels = vector::product(dimensions);
        if voxels % pairs != 0 || voxels / pairs < 1 {
            return Err(BvpError::MalformedPayload(format!(
                "{} range pairs do not tile {} voxels",
                pairs, voxels
            )));
        }
        let per_microblock = voxels / pairs;
        let side = (per_microblock as f64).cbrt().round() as i64;
        if side * side * side != per_microblock {
            return Err(BvpError::MalformedPayload(format!(
                "{} voxels per microblock is not a cube",
                per_microblock
            )));
        }
        if format.microblock_dimensions != [side, side, side] {
            return Err(BvpError::MalformedManifest(format!(
                "format microblocks {:?} disagree with derived side length {}",
                format.microblock_dimensions, side
            )));
        }
        if dimensions.iter().any(|&d| d % side != 0) {
            return Err(BvpError::MalformedPayload(format!(
                "dimensions {:?} are not tiled by side length {}",
                dimensions, side
            )));
        }

        let packed_bits = per_microblock * bits as i64;
        if packed_bits % 8 != 0 {
            return Err(BvpError::MalformedPayload(format!(
                "microblock of {} samples at {} bits does not pack to whole bytes",
                per_microblock, bits
            )));
        }
        let slice_len = (packed_bits / 8) as usize;
        if input.len() != slice_len * pairs as usize {
            return Err(BvpError::MalformedPayload(format!(
                "compressed stream of {} bytes, {} expected",
                input.len(),
                slice_len * pairs as usize
            )));
        }

        let grid: Vec<i64> = dimensions.iter().map(|&d| d / side).collect();
        let mask = (1u8 << bits) - 1;
        let per_byte = (8 / bits) as usize;
        let denom = (1u32 << bits) - 1;

        let mut out = Block::zeroed(dimensions.to_vec(), Arc::clone(format))?;
        for (i, grid_pos) in vector::lexi(&grid).enumerate() {
            let slice = &input[i * slice_len..(i + 1) * slice_len];
            if slice.iter().all(|&b| b == 0) {
                // empty microblock, the destination is already zeroed
                continue;
            }

            let min = ranges[2 * i];
            let max = ranges[2 * i + 1];
            if max < min {
                return Err(BvpError::MalformedPayload(format!(
                    "range pair {} has max {} below min {}",
                    i, max, min
                )));
            }
            let spread = (max - min) as u32;

            let mut samples = Vec::with_capacity(per_microblock as usize);
            for &byte in slice {
                for j in 0..per_byte {
                    let idx = (byte >> (j as u32 * bits)) & mask;
                    let value = min as u32 + (spread * idx as u32 + denom / 2) / denom;
                    samples.push(value as u8);
                }
            }

            let microblock = Block::new(vec![side; 3], Arc::clone(format), samples)?;
            let position: Vec<i64> = grid_pos.iter().map(|&p| p * side).collect();
            out.splice(&position, &microblock)?;
        }
        Ok(out)
    }
}
