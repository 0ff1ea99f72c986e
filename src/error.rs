//! Error types for BVP operations

use thiserror::Error;

/// Main error type for BVP operations
#[derive(Error, Debug)]
pub enum BvpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Format mismatch: {0}")]
    FormatMismatch(String),

    #[error("Region start exceeds end: {0}")]
    StartAfterEnd(String),

    #[error("Region start out of bounds: {0}")]
    StartOutOfBounds(String),

    #[error("Region end out of bounds: {0}")]
    EndOutOfBounds(String),

    #[error("Region start not on the microblock grid: {0}")]
    MisalignedStart(String),

    #[error("Region extent not a whole number of microblocks: {0}")]
    NonIntegerMicroblockExtent(String),

    #[error("Unknown block index: {0}")]
    UnknownBlock(usize),

    #[error("Unknown modality: {0}")]
    UnknownModality(String),

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Payload unavailable: {0}")]
    PayloadUnavailable(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Cyclic placement graph involving block {0}")]
    CyclicPlacementGraph(usize),

    #[error("Overlapping placements: {0}")]
    OverlappingPlacements(String),
}

/// Specialized Result type for BVP operations
pub type Result<T> = std::result::Result<T, BvpError>;

impl From<serde_json::Error> for BvpError {
    fn from(err: serde_json::Error) -> Self {
        BvpError::MalformedManifest(err.to_string())
    }
}
