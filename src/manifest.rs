//! Manifest document model
//!
//! A manifest is a single JSON document describing a dataset: a table of
//! sample formats, the block graph, and the named modalities that serve as
//! entry points into it. It is parsed once per dataset session and held
//! read-only afterwards.

use crate::codec::Encoding;
use crate::error::{BvpError, Result};
use crate::format::Format;
use crate::vector;
use serde::{Deserialize, Serialize};

/// Dataset-level information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    /// Format version string
    pub version: String,
}

/// One placement of a child block inside a composite block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placement {
    /// Index of the placed block
    pub block: usize,

    /// Offset in elements at which the child lands, one entry per axis
    pub position: Vec<i64>,
}

/// One entry of the manifest block table
///
/// A leaf block carries a payload entry name (plus an optional encoding
/// tag); a composite block carries placements instead. The two are
/// mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Extent of the block in elements, one entry per axis
    pub dimensions: Vec<i64>,

    /// Index into the manifest format table
    pub format: usize,

    /// Payload entry name for leaf blocks
    pub data: Option<String>,

    /// Payload encoding, absent means raw
    pub encoding: Option<Encoding>,

    /// Child placements for composite blocks
    pub placements: Option<Vec<Placement>>,
}

impl BlockDescriptor {
    /// True if this block carries a payload
    pub fn is_leaf(&self) -> bool {
        self.data.is_some()
    }

    /// Effective encoding of a leaf payload
    pub fn encoding_or_raw(&self) -> Encoding {
        self.encoding.clone().unwrap_or_default()
    }
}

/// A named entry point into the block graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modality {
    /// Modality name, unique within a manifest by convention
    pub name: String,

    /// Root block index of this modality
    pub block: usize,

    /// Physical scale of one element, consumed by rendering layers
    pub scale: Vec<f64>,
}

/// Parsed manifest of one dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub asset: Asset,
    pub formats: Vec<Format>,
    pub blocks: Vec<BlockDescriptor>,
    pub modalities: Vec<Modality>,
}

impl Manifest {
    /// Parse and validate a manifest document
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)?;
        manifest.validate()?;
        log::debug!(
            "loaded manifest v{}: {} formats, {} blocks, {} modalities",
            manifest.asset.version,
            manifest.formats.len(),
            manifest.blocks.len(),
            manifest.modalities.len()
        );
        Ok(manifest)
    }

    /// Build a manifest for a headerless single-channel byte volume
    ///
    /// The whole payload entry becomes one raw leaf block with a unit
    /// microblock grid, exposed as the "default" modality.
    pub fn for_raw_volume(entry: impl Into<String>, dimensions: [i64; 3]) -> Self {
        Self {
            asset: Asset {
                version: crate::BVP_FORMAT_VERSION.to_string(),
            },
            formats: vec![Format::new(
                "mono",
                1,
                crate::format::ElementKind::Unsigned,
                1,
                vec![1, 1, 1],
            )],
            blocks: vec![BlockDescriptor {
                dimensions: dimensions.to_vec(),
                format: 0,
                data: Some(entry.into()),
                encoding: None,
                placements: None,
            }],
            modalities: vec![Modality {
                name: "default".to_string(),
                block: 0,
                scale: vec![1.0, 1.0, 1.0],
            }],
        }
    }

    /// Look up a block descriptor by index
    pub fn block(&self, index: usize) -> Result<&BlockDescriptor> {
        self.blocks.get(index).ok_or(BvpError::UnknownBlock(index))
    }

    /// Look up a format table entry by index
    pub fn format(&self, index: usize) -> Result<&Format> {
        self.formats.get(index).ok_or_else(|| {
            BvpError::MalformedManifest(format!("format index {} out of range", index))
        })
    }

    /// Look up a modality by name
    pub fn modality(&self, name: &str) -> Result<&Modality> {
        self.modalities
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| BvpError::UnknownModality(name.to_string()))
    }

    /// Check the whole document for structural consistency
    ///
    /// Covers the format table, every block descriptor against its format,
    /// placement and modality indices, and freedom from placement cycles.
    pub fn validate(&self) -> Result<()> {
        for format in &self.formats {
            format.validate()?;
        }

        for (index, block) in self.blocks.iter().enumerate() {
            let format = self.format(block.format).map_err(|_| {
                BvpError::MalformedManifest(format!(
                    "block {} references unknown format {}",
                    index, block.format
                ))
            })?;

            if block.dimensions.is_empty() || block.dimensions.iter().any(|&d| d < 1) {
                return Err(BvpError::MalformedManifest(format!(
                    "block {} dimensions {:?} must be positive",
                    index, block.dimensions
                )));
            }
            if block.dimensions.len() != format.microblock_dimensions.len() {
                return Err(BvpError::MalformedManifest(format!(
                    "block {} has {} axes but format {} has {}",
                    index,
                    block.dimensions.len(),
                    block.format,
                    format.microblock_dimensions.len()
                )));
            }
            if vector::rem(&block.dimensions, &format.microblock_dimensions)?
                .iter()
                .any(|&r| r != 0)
            {
                return Err(BvpError::MalformedManifest(format!(
                    "block {} dimensions {:?} are not tiled by microblocks {:?}",
                    index, block.dimensions, format.microblock_dimensions
                )));
            }

            match (&block.data, &block.placements) {
                (Some(_), Some(_)) => {
                    return Err(BvpError::MalformedManifest(format!(
                        "block {} carries both data and placements",
                        index
                    )));
                }
                (None, None) => {
                    return Err(BvpError::MalformedManifest(format!(
                        "block {} carries neither data nor placements",
                        index
                    )));
                }
                _ => {}
            }
            if block.encoding.is_some() && block.data.is_none() {
                return Err(BvpError::MalformedManifest(format!(
                    "block {} has an encoding but no data",
                    index
                )));
            }

            if block.encoding == Some(Encoding::S3dc) {
                if index == 0 {
                    return Err(BvpError::MalformedManifest(
                        "block 0 cannot be quantized, its range side-channel \
                         must precede it"
                            .to_string(),
                    ));
                }
                if format.index_bits.is_none() {
                    return Err(BvpError::MalformedManifest(format!(
                        "block {} is quantized but format {} has no indexBits",
                        index, block.format
                    )));
                }
            }

            for placement in block.placements.as_deref().unwrap_or(&[]) {
                if placement.block >= self.blocks.len() {
                    return Err(BvpError::MalformedManifest(format!(
                        "block {} places unknown block {}",
                        index, placement.block
                    )));
                }
                if placement.position.len() != block.dimensions.len() {
                    return Err(BvpError::MalformedManifest(format!(
                        "block {} places block {} with a {}-axis position in a \
                         {}-axis frame",
                        index,
                        placement.block,
                        placement.position.len(),
                        block.dimensions.len()
                    )));
                }
            }
        }

        for modality in &self.modalities {
            if modality.block >= self.blocks.len() {
                return Err(BvpError::MalformedManifest(format!(
                    "modality '{}' names unknown block {}",
                    modality.name, modality.block
                )));
            }
        }

        self.topological_order()?;
        Ok(())
    }

    /// Order the block graph so that every block follows its children
    ///
    /// Fails with [`BvpError::CyclicPlacementGraph`] if a block transitively
    /// places itself.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Processing,
            Visited,
        }

        let mut marks = vec![Mark::Unvisited; self.blocks.len()];
        let mut sorted = Vec::with_capacity(self.blocks.len());

        for root in 0..self.blocks.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::Processing;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = stack.last_mut() {
                let (index, cursor) = *frame;
                let children = self.blocks[index].placements.as_deref().unwrap_or(&[]);
                if cursor < children.len() {
                    frame.1 += 1;
                    let child = children[cursor].block;
                    if child >= self.blocks.len() {
                        return Err(BvpError::MalformedManifest(format!(
                            "block {} places unknown block {}",
                            index, child
                        )));
                    }
                    match marks[child] {
                        Mark::Unvisited => {
                            marks[child] = Mark::Processing;
                            stack.push((child, 0));
                        }
                        Mark::Processing => {
                            return Err(BvpError::CyclicPlacementGraph(child));
                        }
                        Mark::Visited => {}
                    }
                } else {
                    marks[index] = Mark::Visited;
                    sorted.push(index);
                    stack.pop();
                }
            }
        }
        Ok(sorted)
    }

    /// One-line description of the manifest
    pub fn summary(&self) -> String {
        let leaves = self.blocks.iter().filter(|b| b.is_leaf()).count();
        format!(
            "BVP manifest v{}: {} formats, {} blocks ({} leaves), {} modalities",
            self.asset.version,
            self.formats.len(),
            self.blocks.len(),
            leaves,
            self.modalities.len()
        )
    }
}
