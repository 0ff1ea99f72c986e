//! Example: Resolve several modalities concurrently over one shared cache
//!
//! Run with: cargo run --example concurrent_modalities

use bvp::{BlockResolver, MemorySource};
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("BVP Async Concurrency Demo");
    println!("===========================\n");

    // Two modalities root in different composites but share leaf blocks,
    // so resolving them together decodes every payload exactly once
    let manifest = r#"{
        "asset": { "version": "1.0" },
        "formats": [{
            "family": "mono", "count": 1, "type": "u", "size": 1,
            "microblockDimensions": [2, 2, 2], "microblockSize": 8
        }],
        "blocks": [
            {
                "dimensions": [4, 2, 2], "format": 0,
                "placements": [
                    { "block": 2, "position": [0, 0, 0] },
                    { "block": 3, "position": [2, 0, 0] }
                ]
            },
            {
                "dimensions": [4, 2, 2], "format": 0,
                "placements": [
                    { "block": 3, "position": [0, 0, 0] },
                    { "block": 2, "position": [2, 0, 0] }
                ]
            },
            { "dimensions": [2, 2, 2], "format": 0, "data": "blocks/a.raw" },
            {
                "dimensions": [2, 2, 2], "format": 0,
                "data": "blocks/b.lz4", "encoding": "lz4mod"
            }
        ],
        "modalities": [
            { "name": "density", "block": 0, "scale": [1.0, 1.0, 1.0] },
            { "name": "emission", "block": 1, "scale": [1.0, 1.0, 1.0] }
        ]
    }"#;

    let source = Arc::new(
        MemorySource::new()
            .with_entry(bvp::MANIFEST_ENTRY, manifest.as_bytes().to_vec())
            .with_entry("blocks/a.raw", vec![0x11u8; 8])
            // lz4mod stream: one literal then a repeating match, decodes
            // to eight 0x07 bytes
            .with_entry("blocks/b.lz4", vec![0x17u8, 0x07, 0x01, 0x00]),
    );

    let resolver = BlockResolver::open(source).await?;
    println!("{}\n", resolver.manifest().summary());

    let names: Vec<String> = resolver
        .manifest()
        .modalities
        .iter()
        .map(|m| m.name.clone())
        .collect();
    println!("Launching {} concurrent resolves...", names.len());

    let start = Instant::now();
    let resolves: Vec<_> = names
        .iter()
        .map(|name| resolver.resolve_modality(name))
        .collect();
    let blocks = futures::future::try_join_all(resolves).await?;
    let elapsed = start.elapsed();

    for (name, block) in names.iter().zip(&blocks) {
        println!(
            "  ✓ {}: {:?} voxels, {} bytes, first byte 0x{:02X}",
            name,
            block.dimensions(),
            block.byte_len(),
            block.data()[0]
        );
    }
    println!(
        "\nResolved {} modalities in {:?} with {} memoized children",
        blocks.len(),
        elapsed,
        resolver.cached_block_count()
    );

    // Dropping the cache forces the next resolve to refetch payloads
    resolver.clear_cache();
    println!("Cache cleared: {} entries", resolver.cached_block_count());

    println!("\n✓ Example complete!");
    Ok(())
}
