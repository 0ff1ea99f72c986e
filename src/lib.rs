//! BVP - Block-based Volume Pack
//!
//! A pure Rust reader for the BVP volumetric format: datasets are directed
//! graphs of fixed-granularity blocks, where leaves carry raw or compressed
//! payloads and composites assemble their children by placement.
//!
//! # Features
//!
//! - N-dimensional index arithmetic over microblock-tiled buffers
//! - Block extraction and splicing with alignment checking
//! - lz4mod and s3dc payload decoding
//! - Graph resolution with per-resolver memoization of shared children
//! - Async I/O throughout
//!
//! # Storage
//!
//! bvp focuses on the block format. Payloads arrive through the
//! [`ByteSource`] trait; in-memory and directory-backed sources ship with
//! the crate, and archive or object-store transports can implement the
//! trait in your application.
//!
//! # Example
//!
//! ```rust,ignore
//! use bvp::{BlockResolver, DirectorySource};
//! use std::sync::Arc;
//!
//! # async fn example() -> bvp::Result<()> {
//! // Open a dataset from an unpacked directory
//! let source = Arc::new(DirectorySource::new("/data/heart"));
//! let resolver = BlockResolver::open(source).await?;
//!
//! // Materialize one modality as a dense buffer
//! let block = resolver.resolve_modality("density").await?;
//! println!("{} bytes", block.byte_len());
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod codec;
pub mod error;
pub mod format;
pub mod manifest;
pub mod resolver;
pub mod source;
pub mod vector;

// Re-exports
pub use block::Block;
pub use codec::Encoding;
pub use error::{BvpError, Result};
pub use format::{ElementKind, Format, SampleType};
pub use manifest::{Asset, BlockDescriptor, Manifest, Modality, Placement};
pub use resolver::BlockResolver;
pub use source::{read_all, ByteSource, DirectorySource, MemorySource};

/// Version of the BVP reader implementation
pub const BVP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Manifest format version written for synthesized datasets
pub const BVP_FORMAT_VERSION: &str = "1.0";

/// Well-known manifest entry name inside a dataset
pub const MANIFEST_ENTRY: &str = "manifest.json";
