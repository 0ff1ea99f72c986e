//! Example: Build a small BVP dataset on disk and resolve it
//!
//! Run with: cargo run --example resolve_volume

use bvp::{
    Asset, BlockDescriptor, BlockResolver, DirectorySource, ElementKind, Format, Manifest,
    Modality, Placement,
};
use std::fs;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("BVP Rust Example: Resolve Volume");
    println!("=================================\n");

    // An 8x8x8 density field assembled from two 4x8x8 raw leaves
    let manifest = Manifest {
        asset: Asset {
            version: bvp::BVP_FORMAT_VERSION.to_string(),
        },
        formats: vec![Format::new("mono", 1, ElementKind::Unsigned, 1, vec![4, 4, 4])],
        blocks: vec![
            BlockDescriptor {
                dimensions: vec![8, 8, 8],
                format: 0,
                data: None,
                encoding: None,
                placements: Some(vec![
                    Placement {
                        block: 1,
                        position: vec![0, 0, 0],
                    },
                    Placement {
                        block: 2,
                        position: vec![4, 0, 0],
                    },
                ]),
            },
            BlockDescriptor {
                dimensions: vec![4, 8, 8],
                format: 0,
                data: Some("blocks/left.raw".to_string()),
                encoding: None,
                placements: None,
            },
            BlockDescriptor {
                dimensions: vec![4, 8, 8],
                format: 0,
                data: Some("blocks/right.raw".to_string()),
                encoding: None,
                placements: None,
            },
        ],
        modalities: vec![Modality {
            name: "density".to_string(),
            block: 0,
            scale: vec![1.0, 1.0, 1.0],
        }],
    };

    // Lay the dataset out in a temp directory the way an unpacked archive
    // would look: manifest.json next to a blocks/ directory
    let temp_dir = tempfile::tempdir()?;
    let blocks_dir = temp_dir.path().join("blocks");
    fs::create_dir_all(&blocks_dir)?;
    fs::write(
        temp_dir.path().join(bvp::MANIFEST_ENTRY),
        serde_json::to_vec_pretty(&manifest)?,
    )?;
    fs::write(blocks_dir.join("left.raw"), vec![0x40u8; 256])?;
    fs::write(blocks_dir.join("right.raw"), vec![0xC0u8; 256])?;
    println!("Dataset written to: {}\n", temp_dir.path().display());

    // Open the dataset and materialize the density modality
    let source = Arc::new(DirectorySource::new(temp_dir.path()));
    let resolver = BlockResolver::open(source).await?;
    println!("{}", resolver.manifest().summary());

    let block = resolver.resolve_modality("density").await?;
    println!(
        "✓ Resolved density: {:?} voxels, {} bytes",
        block.dimensions(),
        block.byte_len()
    );
    println!("  Memoized children: {}", resolver.cached_block_count());

    // Crop out the right half along a microblock boundary
    let crop = block.extract(&[4, 0, 0], &[8, 8, 8])?;
    println!(
        "✓ Extracted right half: {:?} voxels, first byte 0x{:02X}",
        crop.dimensions(),
        crop.data()[0]
    );

    // Splicing writes a region back into a larger block
    let mut canvas = block.clone();
    canvas.splice(&[0, 0, 0], &crop)?;
    println!("✓ Spliced the crop over the left half");

    println!("\n✓ Example complete!");
    Ok(())
}
