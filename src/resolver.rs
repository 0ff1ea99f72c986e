//! Block graph resolution - main API for materializing volume data
//!
//! A manifest describes each volume as a directed graph: leaf blocks carry
//! encoded payloads, composite blocks assemble their children by placement.
//! [`BlockResolver`] walks that graph on demand, fetching and decoding leaf
//! payloads through a [`ByteSource`] and splicing children into zero-filled
//! composites. Children are memoized per resolver, so a block shared by
//! several parents is fetched and decoded once.

use crate::block::Block;
use crate::codec::{lz4mod, s3dc, Encoding};
use crate::error::{BvpError, Result};
use crate::format::Format;
use crate::manifest::{BlockDescriptor, Manifest, Placement};
use crate::source::ByteSource;
use crate::vector;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

/// A composite block in the middle of assembly
struct Frame {
    index: usize,
    block: Block,
    placements: Vec<Placement>,
    cursor: usize,
}

/// Outcome of starting work on one block
enum Started {
    /// Leaf payload decoded to completion
    Done(Block),
    /// Composite that still needs its placements resolved
    Composite(Frame),
}

/// Main interface for resolving manifest blocks into dense buffers
pub struct BlockResolver {
    manifest: Manifest,
    source: Arc<dyn ByteSource>,
    formats: Vec<Arc<Format>>,
    cache: Mutex<HashMap<usize, Arc<Block>>>,
    check_overlaps: bool,
}

impl BlockResolver {
    /// Create a resolver over an already parsed manifest
    pub fn new(manifest: Manifest, source: Arc<dyn ByteSource>) -> Self {
        let formats = manifest.formats.iter().cloned().map(Arc::new).collect();
        Self {
            manifest,
            source,
            formats,
            cache: Mutex::new(HashMap::new()),
            check_overlaps: false,
        }
    }

    /// Open a dataset by reading and parsing its manifest entry
    pub async fn open(source: Arc<dyn ByteSource>) -> Result<Self> {
        let bytes = source.read_entry(crate::MANIFEST_ENTRY).await?;
        let manifest = Manifest::from_slice(&bytes)?;
        Ok(Self::new(manifest, source))
    }

    /// Reject composites whose placements overlap
    ///
    /// Disjoint placements are a manifest convention, not something every
    /// producer enforces, so the check is opt-in.
    pub fn with_overlap_checking(mut self, enabled: bool) -> Self {
        self.check_overlaps = enabled;
        self
    }

    /// The manifest this resolver serves
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Number of memoized child blocks
    pub fn cached_block_count(&self) -> usize {
        self.cache.lock().len()
    }

    /// Drop all memoized child blocks
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    /// Materialize the root block of a named modality
    pub async fn resolve_modality(&self, name: &str) -> Result<Block> {
        let root = self.manifest.modality(name)?.block;
        self.resolve(root).await
    }

    /// Materialize the block at `index` into a dense buffer
    ///
    /// Composites are assembled iteratively with an explicit work stack, so
    /// deeply nested manifests cannot exhaust the call stack, and a block
    /// that transitively places itself is reported as
    /// [`BvpError::CyclicPlacementGraph`] instead of looping. The returned
    /// block is owned by the caller; memoized children stay with the
    /// resolver until [`clear_cache`](BlockResolver::clear_cache).
    pub async fn resolve(&self, index: usize) -> Result<Block> {
        log::debug!("resolving block {}", index);

        let mut visiting = HashSet::new();
        visiting.insert(index);

        let mut current = match self.start_block(index).await? {
            Started::Done(block) => return Ok(block),
            Started::Composite(frame) => frame,
        };
        let mut stack: Vec<Frame> = Vec::new();

        loop {
            if current.cursor < current.placements.len() {
                let placement = current.placements[current.cursor].clone();
                current.cursor += 1;

                if let Some(cached) = self.cached(placement.block) {
                    current.block.splice(&placement.position, &cached)?;
                    continue;
                }
                if visiting.contains(&placement.block) {
                    return Err(BvpError::CyclicPlacementGraph(placement.block));
                }

                match self.start_block(placement.block).await? {
                    Started::Done(block) => {
                        current.block.splice(&placement.position, &block)?;
                        self.insert_cached(placement.block, block);
                    }
                    Started::Composite(frame) => {
                        visiting.insert(placement.block);
                        stack.push(mem::replace(&mut current, frame));
                    }
                }
            } else {
                let done = current;
                visiting.remove(&done.index);
                match stack.pop() {
                    Some(mut parent) => {
                        // the placement that spawned this frame sits right
                        // before the parent's cursor
                        let placement = parent.placements[parent.cursor - 1].clone();
                        parent.block.splice(&placement.position, &done.block)?;
                        self.insert_cached(done.index, done.block);
                        current = parent;
                    }
                    None => return Ok(done.block),
                }
            }
        }
    }

    /// Look up a block and either decode its payload or open a frame for it
    async fn start_block(&self, index: usize) -> Result<Started> {
        let descriptor = self.manifest.block(index)?;
        let format = self.format_handle(descriptor.format)?;

        if let Some(entry) = descriptor.data.as_deref() {
            let block = self.decode_leaf(index, descriptor, entry, format).await?;
            return Ok(Started::Done(block));
        }

        let placements = descriptor.placements.clone().unwrap_or_default();
        if self.check_overlaps {
            self.ensure_disjoint(index, &placements)?;
        }
        let block = Block::zeroed(descriptor.dimensions.clone(), format)?;
        Ok(Started::Composite(Frame {
            index,
            block,
            placements,
            cursor: 0,
        }))
    }

    async fn decode_leaf(
        &self,
        index: usize,
        descriptor: &BlockDescriptor,
        entry: &str,
        format: Arc<Format>,
    ) -> Result<Block> {
        log::trace!("decoding block {} from '{}'", index, entry);
        match descriptor.encoding_or_raw() {
            Encoding::Raw => {
                let payload = self.fetch(entry).await?;
                Block::new(descriptor.dimensions.clone(), format, payload.to_vec())
            }
            Encoding::Lz4mod => {
                let payload = self.fetch(entry).await?;
                let bytes = lz4mod::decompress(&payload)?;
                Block::new(descriptor.dimensions.clone(), format, bytes)
            }
            Encoding::S3dc => {
                let (payload, ranges) =
                    futures::future::try_join(self.fetch(entry), self.sidecar_ranges(index))
                        .await?;
                s3dc::decode(&payload, &ranges, &descriptor.dimensions, &format)
            }
            Encoding::Other(tag) => Err(BvpError::UnsupportedEncoding(tag)),
        }
    }

    /// Fetch and decode the min/max side-channel of a quantized block,
    /// stored as the immediately preceding block entry
    async fn sidecar_ranges(&self, index: usize) -> Result<Vec<u8>> {
        if index == 0 {
            return Err(BvpError::MalformedManifest(
                "quantized block 0 has no preceding side-channel block".to_string(),
            ));
        }
        let sidecar = self.manifest.block(index - 1)?;
        let entry = sidecar.data.as_deref().ok_or_else(|| {
            BvpError::MalformedManifest(format!(
                "side-channel block {} carries no data",
                index - 1
            ))
        })?;
        let payload = self.fetch(entry).await?;
        match sidecar.encoding_or_raw() {
            Encoding::Raw => Ok(payload.to_vec()),
            Encoding::Lz4mod => lz4mod::decompress(&payload),
            other => Err(BvpError::MalformedManifest(format!(
                "side-channel block {} cannot be encoded as {}",
                index - 1,
                other
            ))),
        }
    }

    async fn fetch(&self, entry: &str) -> Result<Bytes> {
        self.source
            .read_entry(entry)
            .await
            .map_err(|err| BvpError::PayloadUnavailable(format!("{}: {}", entry, err)))
    }

    fn format_handle(&self, index: usize) -> Result<Arc<Format>> {
        self.formats.get(index).cloned().ok_or_else(|| {
            BvpError::MalformedManifest(format!("format index {} out of range", index))
        })
    }

    fn cached(&self, index: usize) -> Option<Arc<Block>> {
        self.cache.lock().get(&index).cloned()
    }

    fn insert_cached(&self, index: usize, block: Block) {
        // first writer wins so concurrent resolves agree on one instance
        let mut cache = self.cache.lock();
        cache.entry(index).or_insert_with(|| Arc::new(block));
    }

    fn ensure_disjoint(&self, index: usize, placements: &[Placement]) -> Result<()> {
        for (i, a) in placements.iter().enumerate() {
            let a_end = vector::add(&a.position, &self.manifest.block(a.block)?.dimensions)?;
            for b in placements.iter().skip(i + 1) {
                let b_end = vector::add(&b.position, &self.manifest.block(b.block)?.dimensions)?;
                let a_before = vector::lt(&a.position, &b_end)?;
                let b_before = vector::lt(&b.position, &a_end)?;
                if vector::all(&a_before) && vector::all(&b_before) {
                    return Err(BvpError::OverlappingPlacements(format!(
                        "blocks {} and {} overlap in block {}",
                        a.block, b.block, index
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ElementKind;
    use crate::manifest::{Asset, Modality};
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn leaf(dimensions: Vec<i64>, data: &str, encoding: Option<Encoding>) -> BlockDescriptor {
        BlockDescriptor {
            dimensions,
            format: 0,
            data: Some(data.to_string()),
            encoding,
            placements: None,
        }
    }

    fn composite(dimensions: Vec<i64>, placements: Vec<(usize, Vec<i64>)>) -> BlockDescriptor {
        BlockDescriptor {
            dimensions,
            format: 0,
            data: None,
            encoding: None,
            placements: Some(
                placements
                    .into_iter()
                    .map(|(block, position)| Placement { block, position })
                    .collect(),
            ),
        }
    }

    fn manifest_with(blocks: Vec<BlockDescriptor>) -> Manifest {
        Manifest {
            asset: Asset {
                version: "1.0".to_string(),
            },
            formats: vec![Format::new("mono", 1, ElementKind::Unsigned, 1, vec![2, 2, 2])],
            blocks,
            modalities: vec![Modality {
                name: "density".to_string(),
                block: 0,
                scale: vec![1.0, 1.0, 1.0],
            }],
        }
    }

    /// Source wrapper counting every entry fetch
    struct CountingSource {
        inner: MemorySource,
        reads: AtomicUsize,
    }

    impl CountingSource {
        fn new(inner: MemorySource) -> Self {
            Self {
                inner,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ByteSource for CountingSource {
        async fn read_entry(&self, name: &str) -> Result<Bytes> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read_entry(name).await
        }
    }

    #[tokio::test]
    async fn test_resolve_raw_leaf() {
        let payload: Vec<u8> = (0..64).collect();
        let source = MemorySource::new().with_entry("blocks/0.raw", payload.clone());
        let manifest = manifest_with(vec![leaf(vec![4, 4, 4], "blocks/0.raw", None)]);

        let resolver = BlockResolver::new(manifest, Arc::new(source));
        let block = resolver.resolve(0).await.unwrap();
        assert_eq!(block.dimensions(), &[4, 4, 4]);
        assert_eq!(block.data(), &payload[..]);
        // the root of a resolve is handed to the caller, not memoized
        assert_eq!(resolver.cached_block_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_lz4_leaf() {
        // 8 literals, stream ends after the run
        let mut encoded = vec![0x80];
        encoded.extend([9, 8, 7, 6, 5, 4, 3, 2]);
        let source = MemorySource::new().with_entry("blocks/0.lz4", encoded);
        let manifest = manifest_with(vec![leaf(
            vec![2, 2, 2],
            "blocks/0.lz4",
            Some(Encoding::Lz4mod),
        )]);

        let resolver = BlockResolver::new(manifest, Arc::new(source));
        let block = resolver.resolve(0).await.unwrap();
        assert_eq!(block.data(), &[9, 8, 7, 6, 5, 4, 3, 2]);
    }

    #[tokio::test]
    async fn test_composite_zero_fills_around_children() {
        let source = MemorySource::new().with_entry("blocks/1.raw", vec![9u8; 8]);
        let manifest = manifest_with(vec![
            composite(vec![4, 4, 4], vec![(1, vec![2, 2, 2])]),
            leaf(vec![2, 2, 2], "blocks/1.raw", None),
        ]);

        let resolver = BlockResolver::new(manifest, Arc::new(source));
        let block = resolver.resolve(0).await.unwrap();
        // child lands in microblock (1,1,1), the last of eight tiles
        assert!(block.data()[..56].iter().all(|&b| b == 0));
        assert_eq!(&block.data()[56..], &[9u8; 8]);
    }

    #[tokio::test]
    async fn test_shared_child_decoded_once() {
        let inner = MemorySource::new().with_entry("blocks/3.raw", vec![5u8; 8]);
        let source = Arc::new(CountingSource::new(inner));
        // 0 places 1 and 2, both of which place 3
        let manifest = manifest_with(vec![
            composite(vec![4, 4, 4], vec![(1, vec![0, 0, 0]), (2, vec![2, 2, 2])]),
            composite(vec![2, 2, 2], vec![(3, vec![0, 0, 0])]),
            composite(vec![2, 2, 2], vec![(3, vec![0, 0, 0])]),
            leaf(vec![2, 2, 2], "blocks/3.raw", None),
        ]);

        let resolver = BlockResolver::new(manifest, Arc::clone(&source) as Arc<dyn ByteSource>);
        let block = resolver.resolve(0).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        assert_eq!(&block.data()[..8], &[5u8; 8]);
        assert_eq!(&block.data()[56..], &[5u8; 8]);
        // children 1, 2 and 3 are memoized, the root is not
        assert_eq!(resolver.cached_block_count(), 3);

        // a second resolve is served from the cache entirely
        resolver.resolve(0).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);

        resolver.clear_cache();
        assert_eq!(resolver.cached_block_count(), 0);
        resolver.resolve(0).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cycle_detected_while_resolving() {
        let manifest = manifest_with(vec![
            composite(vec![2, 2, 2], vec![(1, vec![0, 0, 0])]),
            composite(vec![2, 2, 2], vec![(0, vec![0, 0, 0])]),
        ]);
        let resolver = BlockResolver::new(manifest, Arc::new(MemorySource::new()));
        assert!(matches!(
            resolver.resolve(0).await.unwrap_err(),
            BvpError::CyclicPlacementGraph(0)
        ));

        let manifest = manifest_with(vec![composite(vec![2, 2, 2], vec![(0, vec![0, 0, 0])])]);
        let resolver = BlockResolver::new(manifest, Arc::new(MemorySource::new()));
        assert!(matches!(
            resolver.resolve(0).await.unwrap_err(),
            BvpError::CyclicPlacementGraph(0)
        ));
    }

    #[tokio::test]
    async fn test_resolve_failure_kinds() {
        let manifest = manifest_with(vec![
            leaf(vec![2, 2, 2], "blocks/0.raw", None),
            leaf(vec![2, 2, 2], "blocks/1.bin", Some(Encoding::Other("zip".to_string()))),
        ]);
        let resolver = BlockResolver::new(manifest, Arc::new(MemorySource::new()));

        assert!(matches!(
            resolver.resolve(9).await.unwrap_err(),
            BvpError::UnknownBlock(9)
        ));
        assert!(matches!(
            resolver.resolve(0).await.unwrap_err(),
            BvpError::PayloadUnavailable(_)
        ));
        assert!(matches!(
            resolver.resolve(1).await.unwrap_err(),
            BvpError::UnsupportedEncoding(tag) if tag == "zip"
        ));
    }

    #[tokio::test]
    async fn test_overlap_checking_is_opt_in() {
        let source = Arc::new(
            MemorySource::new()
                .with_entry("blocks/1.raw", vec![1u8; 8])
                .with_entry("blocks/2.raw", vec![2u8; 8]),
        );
        let manifest = manifest_with(vec![
            composite(vec![4, 4, 4], vec![(1, vec![0, 0, 0]), (2, vec![0, 0, 0])]),
            leaf(vec![2, 2, 2], "blocks/1.raw", None),
            leaf(vec![2, 2, 2], "blocks/2.raw", None),
        ]);

        let lenient =
            BlockResolver::new(manifest.clone(), Arc::clone(&source) as Arc<dyn ByteSource>);
        let block = lenient.resolve(0).await.unwrap();
        // later placements win when overlaps go unchecked
        assert_eq!(&block.data()[..8], &[2u8; 8]);

        let strict = BlockResolver::new(manifest, source).with_overlap_checking(true);
        assert!(matches!(
            strict.resolve(0).await.unwrap_err(),
            BvpError::OverlappingPlacements(_)
        ));
    }

    #[tokio::test]
    async fn test_resolve_modality() {
        let source = MemorySource::new().with_entry("blocks/0.raw", vec![3u8; 8]);
        let manifest = manifest_with(vec![leaf(vec![2, 2, 2], "blocks/0.raw", None)]);
        let resolver = BlockResolver::new(manifest, Arc::new(source));

        let block = resolver.resolve_modality("density").await.unwrap();
        assert_eq!(block.data(), &[3u8; 8]);
        assert!(matches!(
            resolver.resolve_modality("absorption").await.unwrap_err(),
            BvpError::UnknownModality(_)
        ));
    }
}
