//! Encoder registry: a frozen, closed set of block codecs.
//!
//! # Identity
//! Every codec is identified by a single-byte tag written into the block's
//! sidecar entry. The mapping is frozen for the v1 on-disk format and MUST
//! NOT be renumbered:
//!
//! ```text
//! 0 = Lz4CustomDeprecated   (rejected on encode AND decode)
//! 1 = Null                  (identity / fallback)
//! 2 = Zstd
//! 3 = Lz4
//! ```
//!
//! The source repository this format was distilled from carried more than
//! one historical numbering for these tags across versions; this crate picks
//! the numbering above and freezes it (see DESIGN.md).
//!
//! # Concurrency
//! Codec instances are not thread-safe. Each writing column file owns one.

use crate::error::Error;

/// On-disk codec tag. Mirrors the frozen mapping above exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecTag {
    Lz4CustomDeprecated = 0,
    Null = 1,
    Zstd = 2,
    Lz4 = 3,
}

impl CodecTag {
    pub fn from_u8(v: u8) -> std::result::Result<Self, Error> {
        match v {
            0 => Ok(CodecTag::Lz4CustomDeprecated),
            1 => Ok(CodecTag::Null),
            2 => Ok(CodecTag::Zstd),
            3 => Ok(CodecTag::Lz4),
            other => Err(Error::CodecUnsupported(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecTag::Lz4CustomDeprecated => "lz4-custom-deprecated",
            CodecTag::Null => "null",
            CodecTag::Zstd => "zstd",
            CodecTag::Lz4 => "lz4",
        }
    }
}

/// Contract shared by every codec. `scratch` is a caller-owned buffer the
/// codec may grow and reuse across calls to avoid per-block allocation.
pub trait Codec {
    fn tag(&self) -> CodecTag;

    /// Compress `src` into `sink`, growing `scratch` as needed. Returns the
    /// number of bytes written to `sink`.
    fn compress(
        &mut self,
        src: &[u8],
        scratch: &mut Vec<u8>,
        sink: &mut Vec<u8>,
    ) -> std::result::Result<usize, Error>;

    /// Decompress `src` into `out`. Fails if the decoded length does not
    /// equal `out.len()`.
    fn decompress(&mut self, src: &[u8], out: &mut [u8]) -> std::result::Result<usize, Error>;

    /// Tuning hint. Codecs that ignore levels accept silently.
    fn set_level(&mut self, level: i32);

    /// Release any native context. A no-op for pure-Rust codecs.
    fn close(&mut self) {}
}

// ── Null codec ───────────────────────────────────────────────────────────

/// Byte-for-byte identity. Used both as an explicit encoding and as the
/// fallback rewrite target when a real codec would expand the payload.
pub struct NullCodec;

impl Codec for NullCodec {
    fn tag(&self) -> CodecTag {
        CodecTag::Null
    }

    fn compress(
        &mut self,
        src: &[u8],
        _scratch: &mut Vec<u8>,
        sink: &mut Vec<u8>,
    ) -> std::result::Result<usize, Error> {
        sink.extend_from_slice(src);
        Ok(src.len())
    }

    fn decompress(&mut self, src: &[u8], out: &mut [u8]) -> std::result::Result<usize, Error> {
        if src.len() < out.len() {
            return Err(Error::DecodeLengthMismatch {
                expected: out.len() as u32,
                actual: src.len(),
            });
        }
        out.copy_from_slice(&src[..out.len()]);
        Ok(out.len())
    }

    fn set_level(&mut self, _level: i32) {}
}

// ── Zstd codec ───────────────────────────────────────────────────────────

pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new() -> Self {
        Self { level: 3 }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for ZstdCodec {
    fn tag(&self) -> CodecTag {
        CodecTag::Zstd
    }

    fn compress(
        &mut self,
        src: &[u8],
        _scratch: &mut Vec<u8>,
        sink: &mut Vec<u8>,
    ) -> std::result::Result<usize, Error> {
        let before = sink.len();
        zstd::stream::copy_encode(src, &mut *sink, self.level).map_err(Error::Io)?;
        Ok(sink.len() - before)
    }

    fn decompress(&mut self, src: &[u8], out: &mut [u8]) -> std::result::Result<usize, Error> {
        let decoded = zstd::stream::decode_all(src).map_err(Error::Io)?;
        if decoded.len() != out.len() {
            return Err(Error::DecodeLengthMismatch {
                expected: out.len() as u32,
                actual: decoded.len(),
            });
        }
        out.copy_from_slice(&decoded);
        Ok(decoded.len())
    }

    fn set_level(&mut self, level: i32) {
        self.level = level;
    }
}

// ── Lz4 codec ────────────────────────────────────────────────────────────

pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn tag(&self) -> CodecTag {
        CodecTag::Lz4
    }

    fn compress(
        &mut self,
        src: &[u8],
        scratch: &mut Vec<u8>,
        sink: &mut Vec<u8>,
    ) -> std::result::Result<usize, Error> {
        let max_len = lz4_flex::block::get_maximum_output_size(src.len());
        scratch.clear();
        scratch.resize(max_len, 0);
        let n = lz4_flex::compress_into(src, scratch)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        sink.extend_from_slice(&scratch[..n]);
        Ok(n)
    }

    fn decompress(&mut self, src: &[u8], out: &mut [u8]) -> std::result::Result<usize, Error> {
        let n = lz4_flex::decompress_into(src, out)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        if n != out.len() {
            return Err(Error::DecodeLengthMismatch {
                expected: out.len() as u32,
                actual: n,
            });
        }
        Ok(n)
    }

    fn set_level(&mut self, _level: i32) {}
}

// ── Deprecated codec ─────────────────────────────────────────────────────

/// Recognized but permanently retired. Always fails, on both directions.
pub struct Lz4CustomDeprecatedCodec;

impl Codec for Lz4CustomDeprecatedCodec {
    fn tag(&self) -> CodecTag {
        CodecTag::Lz4CustomDeprecated
    }

    fn compress(
        &mut self,
        _src: &[u8],
        _scratch: &mut Vec<u8>,
        _sink: &mut Vec<u8>,
    ) -> std::result::Result<usize, Error> {
        Err(Error::CodecDeprecated(CodecTag::Lz4CustomDeprecated.name()))
    }

    fn decompress(&mut self, _src: &[u8], _out: &mut [u8]) -> std::result::Result<usize, Error> {
        Err(Error::CodecDeprecated(CodecTag::Lz4CustomDeprecated.name()))
    }

    fn set_level(&mut self, _level: i32) {}
}

/// Resolve a tag to a fresh codec instance.
pub fn get_codec(tag: CodecTag) -> Box<dyn Codec> {
    match tag {
        CodecTag::Null => Box::new(NullCodec),
        CodecTag::Zstd => Box::new(ZstdCodec::new()),
        CodecTag::Lz4 => Box::new(Lz4Codec),
        CodecTag::Lz4CustomDeprecated => Box::new(Lz4CustomDeprecatedCodec),
    }
}
