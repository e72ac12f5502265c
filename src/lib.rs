//! # godb — columnar on-disk storage for per-host network-flow time series
//!
//! Format guarantees (frozen for v1):
//! - All sidecar integers are big-endian; never negotiated
//! - Codec identity is a frozen, closed one-byte tag set: `Null=1`, `Zstd=2`,
//!   `Lz4=3`, and a permanently retired `Lz4CustomDeprecated=0` that fails on
//!   both encode and decode
//! - Column files carry no per-file header; all offsets and lengths live in
//!   the directory's `.blockmeta` sidecar, committed atomically at close
//! - Every stored block satisfies `len <= raw_len` (the Null-fallback
//!   rewrite enforces this when a codec would otherwise expand the payload)
//! - One writer, many readers per directory; never both at once

pub mod block;
pub mod codec;
pub mod columns;
pub mod error;
pub mod gpdir;
pub mod gpfile;
pub mod metadata;
pub mod path;
pub mod pool;

// Flat re-exports for the most common types.
pub use block::{Block, BlockHeader};
pub use codec::{get_codec, Codec, CodecTag};
pub use columns::{Column, COL_IDX_COUNT};
pub use error::{Error, Result};
pub use gpdir::{derive_dir_mode, GPDir, GPDirOptions};
pub use gpfile::GPFile;
pub use metadata::{Counters, Metadata, Stats, TrafficMetadata, TrafficTotals};
pub use path::{day_start, dir_path, marshal_suffix, parse_suffix};
pub use pool::{shared, BufferPool};
