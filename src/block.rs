//! Block and BlockHeader — the in-memory (and, via `metadata.rs`, on-disk)
//! record of every compressed payload written into one column.
//!
//! A `Block` never carries its own timestamp; `BlockHeader` pairs each block
//! with the timestamp it was written at and keeps both an ordered list (for
//! range scans) and a lazily-built hash index (for point lookups).

use std::collections::HashMap;

use crate::codec::CodecTag;
use crate::error::Error;

/// One compressed payload written at one timestamp for one column.
///
/// `len == 0 <=> raw_len == 0` ("empty block"); an empty block occupies zero
/// bytes in the column file but still gets a metadata entry here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Byte position in the column file. Monotonically non-decreasing across
    /// the block list; for a non-empty block, `offset[i+1] == offset[i] + len[i]`.
    pub offset: u64,
    /// Bytes on disk after compression.
    pub len: u32,
    /// Bytes after decompression.
    pub raw_len: u32,
    pub codec: CodecTag,
}

impl Block {
    pub fn is_empty(&self) -> bool {
        debug_assert_eq!(self.len == 0, self.raw_len == 0, "len/raw_len empty-block invariant");
        self.len == 0
    }
}

/// For one column: the ordered sequence of (timestamp, Block) pairs plus the
/// next free byte offset in that column's file.
#[derive(Debug, Clone, Default)]
pub struct BlockHeader {
    timestamps: Vec<i64>,
    blocks: Vec<Block>,
    /// Next free byte in the column file; equals the sum of all block lengths.
    current_offset: u64,
    /// Lazily built; `None` until the first `block_at_time` call or a rebuild
    /// after deserialization.
    lookup: Option<HashMap<i64, usize>>,
}

impl BlockHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block for `ts`. The caller guarantees `ts` is strictly
    /// greater than the header's last timestamp.
    pub fn add_block(&mut self, ts: i64, block: Block) {
        debug_assert!(
            self.timestamps.last().map(|&last| ts > last).unwrap_or(true),
            "timestamps must be strictly increasing"
        );
        self.timestamps.push(ts);
        self.current_offset += block.len as u64;
        self.blocks.push(block);
        if let Some(lookup) = &mut self.lookup {
            lookup.insert(ts, self.blocks.len() - 1);
        }
    }

    fn ensure_lookup(&mut self) {
        if self.lookup.is_none() {
            let map = self.timestamps.iter().copied().enumerate().map(|(i, ts)| (ts, i)).collect();
            self.lookup = Some(map);
        }
    }

    /// Rebuild the lookup index unconditionally. Called after deserializing
    /// a `BlockHeader` whose in-memory lookup was never populated.
    pub fn rebuild_lookup(&mut self) {
        self.lookup = None;
        self.ensure_lookup();
    }

    /// O(1) lookup by exact timestamp.
    pub fn block_at_time(&mut self, ts: i64) -> Option<(usize, Block)> {
        self.ensure_lookup();
        let idx = *self.lookup.as_ref().unwrap().get(&ts)?;
        Some((idx, self.blocks[idx]))
    }

    /// Blocks strictly before `ts`, in time order.
    pub fn blocks_before(&self, ts: i64) -> &[Block] {
        let idx = self.timestamps.partition_point(|&t| t < ts);
        &self.blocks[..idx]
    }

    /// Blocks at-or-after `ts`, in time order.
    pub fn blocks_after(&self, ts: i64) -> &[Block] {
        let idx = self.timestamps.partition_point(|&t| t < ts);
        &self.blocks[idx..]
    }

    pub fn nblocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn current_offset(&self) -> u64 {
        self.current_offset
    }

    /// Set `current_offset` directly. Used when restoring a header whose
    /// blocks were deserialized with offsets reconstructed by prefix sum.
    pub fn set_current_offset(&mut self, offset: u64) {
        self.current_offset = offset;
    }

    pub fn has_timestamp(&self, ts: i64) -> bool {
        self.timestamps.binary_search(&ts).is_ok()
    }

    pub fn first_timestamp(&self) -> Option<i64> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.timestamps.last().copied()
    }
}

/// Validate that `value` fits in the on-disk 32-bit field named `field`.
pub fn check_u32_bound(field: &'static str, value: u64) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::ExceedsEncodingSize { field, value })
}
