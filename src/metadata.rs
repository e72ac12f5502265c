//! The directory-wide sidecar: `TrafficMetadata`, `Counters`, `Stats`, and
//! `Metadata` itself, plus the fixed binary layout written to `.blockmeta`.
//!
//! # On-disk layout (all integers big-endian)
//!
//! ```text
//! offset  size  field
//! 0       8     metadata version
//! 8       8     N = number of blocks
//! 16      8     Traffic.num_v4_entries
//! 24      8     Traffic.num_v6_entries
//! 32      8     Traffic.num_drops
//! 40      8     Counters.bytes_rcvd
//! 48      8     Counters.bytes_sent
//! 56      8     Counters.packets_rcvd
//! 64      8     Counters.packets_sent
//! ---- 72-byte fixed prefix ends here ----
//! for each column c in 0..ColIdxCount:
//!     8       column current_offset
//!     N * 9   { len:u32, raw_len:u32, codec:u8 }     (offsets reconstructed by prefix sum)
//! ---- per-block timestamp/traffic section ----
//! 8       first block absolute timestamp (seconds since epoch), present only if N > 0
//! N * 16  { num_v4_entries:u32, num_v6_entries:u32, num_drops:u32, delta_ts:u32 }
//! ```
//!
//! A directory with zero blocks serializes to exactly the 72-byte prefix.

use std::io::{Cursor, Read, Write};
use std::ops::{Add, AddAssign, Sub, SubAssign};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::block::{check_u32_bound, Block, BlockHeader};
use crate::codec::CodecTag;
use crate::columns::COL_IDX_COUNT;
use crate::error::Error;

pub const METADATA_VERSION: u64 = 1;
const FIXED_PREFIX_LEN: usize = 72;

/// Per-block summary. All three fields fit in 32 bits on the wire; kept as
/// `u32` in memory since negative values have no valid representation here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficMetadata {
    pub num_v4_entries: u32,
    pub num_v6_entries: u32,
    pub num_drops: u32,
}

impl Add for TrafficMetadata {
    type Output = TrafficMetadata;
    fn add(self, rhs: Self) -> Self {
        TrafficMetadata {
            num_v4_entries: self.num_v4_entries + rhs.num_v4_entries,
            num_v6_entries: self.num_v6_entries + rhs.num_v6_entries,
            num_drops: self.num_drops + rhs.num_drops,
        }
    }
}

impl AddAssign for TrafficMetadata {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Componentwise subtraction, saturating at zero per field. `TrafficMetadata`
/// has no negative representation (see the struct doc comment), so a
/// subtraction that would go negative floors to zero rather than panicking
/// (debug) or wrapping (release).
impl Sub for TrafficMetadata {
    type Output = TrafficMetadata;
    fn sub(self, rhs: Self) -> Self {
        TrafficMetadata {
            num_v4_entries: self.num_v4_entries.saturating_sub(rhs.num_v4_entries),
            num_v6_entries: self.num_v6_entries.saturating_sub(rhs.num_v6_entries),
            num_drops: self.num_drops.saturating_sub(rhs.num_drops),
        }
    }
}

impl SubAssign for TrafficMetadata {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// Aggregate byte/packet counters, 64 bits each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub bytes_rcvd: u64,
    pub bytes_sent: u64,
    pub packets_rcvd: u64,
    pub packets_sent: u64,
}

impl Add for Counters {
    type Output = Counters;
    fn add(self, rhs: Self) -> Self {
        Counters {
            bytes_rcvd: self.bytes_rcvd + rhs.bytes_rcvd,
            bytes_sent: self.bytes_sent + rhs.bytes_sent,
            packets_rcvd: self.packets_rcvd + rhs.packets_rcvd,
            packets_sent: self.packets_sent + rhs.packets_sent,
        }
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

/// Cumulative traffic totals across every block in a directory. Distinct
/// from `TrafficMetadata`: the wire format's fixed prefix reserves a full
/// 8 bytes (u64) per field here (see the offset table above), well beyond
/// what any single block's 32-bit summary ever needs, because enough
/// per-block entries accumulated over a busy day can exceed `u32::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficTotals {
    pub num_v4_entries: u64,
    pub num_v6_entries: u64,
    pub num_drops: u64,
}

impl AddAssign<TrafficMetadata> for TrafficTotals {
    fn add_assign(&mut self, rhs: TrafficMetadata) {
        self.num_v4_entries += rhs.num_v4_entries as u64;
        self.num_v6_entries += rhs.num_v6_entries as u64;
        self.num_drops += rhs.num_drops as u64;
    }
}

/// Cumulative totals across all blocks in a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub counters: Counters,
    pub traffic: TrafficTotals,
}

/// The directory-wide sidecar.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub version: u64,
    pub block_headers: [BlockHeader; COL_IDX_COUNT],
    /// One entry per block, shared across all columns (same length as any
    /// column's block list).
    pub block_traffic: Vec<TrafficMetadata>,
    pub stats: Stats,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            version: METADATA_VERSION,
            block_headers: Default::default(),
            block_traffic: Vec::new(),
            stats: Stats::default(),
        }
    }
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nblocks(&self) -> usize {
        self.block_traffic.len()
    }

    /// First/last block timestamp across the directory, derived from column
    /// 0's block header (every column shares the same timestamp sequence).
    /// `None` for an empty directory.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        let header = &self.block_headers[0];
        Some((header.first_timestamp()?, header.last_timestamp()?))
    }

    /// Append one block's worth of state: a Block per column (same
    /// timestamp for all), its TrafficMetadata, and fold in its Counters.
    pub fn record_write(
        &mut self,
        ts: i64,
        blocks: [Block; COL_IDX_COUNT],
        traffic: TrafficMetadata,
        counters: Counters,
    ) {
        for (header, block) in self.block_headers.iter_mut().zip(blocks) {
            header.add_block(ts, block);
        }
        self.block_traffic.push(traffic);
        self.stats.traffic += traffic;
        self.stats.counters += counters;
    }

    /// Serialize into the fixed `.blockmeta` binary layout.
    pub fn marshal(&self) -> Result<Vec<u8>, Error> {
        let n = self.nblocks();
        let mut buf = Vec::with_capacity(FIXED_PREFIX_LEN + n * (9 * COL_IDX_COUNT + 16) + 64);

        buf.write_u64::<BigEndian>(self.version)?;
        buf.write_u64::<BigEndian>(n as u64)?;
        buf.write_u64::<BigEndian>(self.stats.traffic.num_v4_entries)?;
        buf.write_u64::<BigEndian>(self.stats.traffic.num_v6_entries)?;
        buf.write_u64::<BigEndian>(self.stats.traffic.num_drops)?;
        buf.write_u64::<BigEndian>(self.stats.counters.bytes_rcvd)?;
        buf.write_u64::<BigEndian>(self.stats.counters.bytes_sent)?;
        buf.write_u64::<BigEndian>(self.stats.counters.packets_rcvd)?;
        buf.write_u64::<BigEndian>(self.stats.counters.packets_sent)?;
        debug_assert_eq!(buf.len(), FIXED_PREFIX_LEN);

        // A directory with zero blocks serializes to exactly the 72-byte
        // fixed prefix: no per-column section, no per-block section.
        if n > 0 {
            for header in &self.block_headers {
                debug_assert_eq!(header.nblocks(), n, "all columns must share the same block count");
                buf.write_u64::<BigEndian>(header.current_offset())?;
                for block in header.blocks() {
                    buf.write_u32::<BigEndian>(block.len)?;
                    buf.write_u32::<BigEndian>(block.raw_len)?;
                    buf.write_u8(block.codec.as_u8())?;
                }
            }

            let timestamps = self.block_headers[0].timestamps();
            buf.write_i64::<BigEndian>(timestamps[0])?;
            let mut prev = timestamps[0];
            for (i, &ts) in timestamps.iter().enumerate() {
                let delta = check_u32_bound("delta_ts", (ts - prev) as u64)?;
                let traffic = self.block_traffic[i];
                buf.write_u32::<BigEndian>(traffic.num_v4_entries)?;
                buf.write_u32::<BigEndian>(traffic.num_v6_entries)?;
                buf.write_u32::<BigEndian>(traffic.num_drops)?;
                buf.write_u32::<BigEndian>(delta)?;
                prev = ts;
            }
        }

        Ok(buf)
    }

    /// Write the marshaled form to `w`.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        w.write_all(&self.marshal()?)?;
        Ok(())
    }

    /// Deserialize from the fixed `.blockmeta` binary layout.
    pub fn unmarshal(data: &[u8]) -> Result<Self, Error> {
        if data.len() < FIXED_PREFIX_LEN {
            return Err(Error::InputSizeTooSmall {
                got: data.len(),
                want: FIXED_PREFIX_LEN,
            });
        }
        let mut cur = Cursor::new(data);

        let version = cur.read_u64::<BigEndian>()?;
        let n = cur.read_u64::<BigEndian>()? as usize;
        let traffic = TrafficTotals {
            num_v4_entries: cur.read_u64::<BigEndian>()?,
            num_v6_entries: cur.read_u64::<BigEndian>()?,
            num_drops: cur.read_u64::<BigEndian>()?,
        };
        let counters = Counters {
            bytes_rcvd: cur.read_u64::<BigEndian>()?,
            bytes_sent: cur.read_u64::<BigEndian>()?,
            packets_rcvd: cur.read_u64::<BigEndian>()?,
            packets_sent: cur.read_u64::<BigEndian>()?,
        };
        debug_assert_eq!(cur.position() as usize, FIXED_PREFIX_LEN);

        // A directory with zero blocks has no per-column or per-block
        // section at all: the fixed 72-byte prefix is the entire file.
        let mut column_records: Vec<(u64, Vec<(u32, u32, u8)>)> = vec![(0, Vec::new()); COL_IDX_COUNT];
        let mut block_traffic = Vec::with_capacity(n);
        let mut timestamps = Vec::with_capacity(n);
        if n > 0 {
            column_records.clear();
            for _ in 0..COL_IDX_COUNT {
                let current_offset = cur.read_u64::<BigEndian>()?;
                let mut records = Vec::with_capacity(n);
                for _ in 0..n {
                    let len = cur.read_u32::<BigEndian>()?;
                    let raw_len = cur.read_u32::<BigEndian>()?;
                    let codec = cur.read_u8()?;
                    records.push((len, raw_len, codec));
                }
                column_records.push((current_offset, records));
            }

            let first_ts = cur.read_i64::<BigEndian>()?;
            let mut ts = first_ts;
            for i in 0..n {
                let num_v4_entries = cur.read_u32::<BigEndian>()?;
                let num_v6_entries = cur.read_u32::<BigEndian>()?;
                let num_drops = cur.read_u32::<BigEndian>()?;
                let delta_ts = cur.read_u32::<BigEndian>()?;
                if i > 0 {
                    ts += delta_ts as i64;
                }
                timestamps.push(ts);
                block_traffic.push(TrafficMetadata {
                    num_v4_entries,
                    num_v6_entries,
                    num_drops,
                });
            }
        }

        let mut block_headers: [BlockHeader; COL_IDX_COUNT] = Default::default();
        for (col, (current_offset, records)) in column_records.into_iter().enumerate() {
            let mut header = BlockHeader::new();
            let mut offset = 0u64;
            for (i, (len, raw_len, codec)) in records.into_iter().enumerate() {
                let block = Block {
                    offset,
                    len,
                    raw_len,
                    codec: CodecTag::from_u8(codec)?,
                };
                offset += len as u64;
                header.add_block(timestamps[i], block);
            }
            header.set_current_offset(current_offset);
            header.rebuild_lookup();
            block_headers[col] = header;
        }

        Ok(Metadata {
            version,
            block_headers,
            block_traffic,
            stats: Stats { counters, traffic },
        })
    }

    /// Read and deserialize a `.blockmeta` file body from `r`.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, Error> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Self::unmarshal(&data)
    }
}
