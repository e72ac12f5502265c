//! GPFile — a single column file, opened in read OR write mode, never both.
//!
//! All header/offset bookkeeping is delegated to an externally owned
//! `BlockHeader`; this type only knows how to push bytes through a codec and
//! onto (or off of) disk.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::block::{check_u32_bound, Block};
use crate::codec::{get_codec, Codec, CodecTag};
use crate::error::Error;
use crate::pool::BufferPool;

/// An in-memory stand-in for a real file handle: the read-all optimization
/// for query paths that need random access across many blocks without
/// repeated syscalls. Borrows its buffer from a pool for its lifetime.
pub struct MemFile {
    data: Vec<u8>,
    pos: u64,
}

impl MemFile {
    pub fn new(data: Vec<u8>) -> Self {
        MemFile { data, pos: 0 }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Read for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos as usize;
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = std::cmp::min(buf.len(), self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for MemFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::End(p) => self.data.len() as i64 + p,
            SeekFrom::Current(p) => self.pos as i64 + p,
        };
        if new_pos < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before byte 0"));
        }
        self.pos = new_pos as u64;
        Ok(self.pos)
    }
}

enum ReadBackend {
    File(File),
    Mem(MemFile),
}

impl Read for ReadBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ReadBackend::File(f) => f.read(buf),
            ReadBackend::Mem(m) => m.read(buf),
        }
    }
}

impl Seek for ReadBackend {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            ReadBackend::File(f) => f.seek(pos),
            ReadBackend::Mem(m) => m.seek(pos),
        }
    }
}

enum Backend {
    Write {
        inner: BufWriter<File>,
        codec: Box<dyn Codec>,
        default_tag: CodecTag,
        scratch: Vec<u8>,
        sink: Vec<u8>,
    },
    Read {
        inner: ReadBackend,
        last_pos: Option<u64>,
        decoder: Box<dyn Codec>,
        decoder_tag: CodecTag,
    },
}

/// One open column file.
pub struct GPFile {
    path: PathBuf,
    backend: Backend,
    pool: &'static BufferPool,
}

impl GPFile {
    /// Open for writing: create-if-missing, seek to `current_offset` so any
    /// interrupted tail write is overwritten by the next append. Compression
    /// scratch/sink buffers are borrowed from `pool` once and reused across
    /// every `write_block` call on this file; they are returned on `close`.
    pub fn open_write(
        path: &Path,
        current_offset: u64,
        codec_tag: CodecTag,
        level: i32,
        pool: &'static BufferPool,
    ) -> Result<Self, Error> {
        let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        let mut inner = BufWriter::new(file);
        inner.seek(SeekFrom::Start(current_offset))?;
        let mut codec = get_codec(codec_tag);
        codec.set_level(level);
        Ok(GPFile {
            path: path.to_path_buf(),
            backend: Backend::Write {
                inner,
                codec,
                default_tag: codec_tag,
                scratch: pool.get(4096),
                sink: pool.get(4096),
            },
            pool,
        })
    }

    /// Open for reading. If `slurp` is set, the whole file is read once into
    /// a pooled in-memory buffer so subsequent reads never touch disk.
    pub fn open_read(
        path: &Path,
        default_tag: CodecTag,
        slurp: bool,
        pool: &'static BufferPool,
    ) -> Result<Self, Error> {
        let mut file = File::open(path)?;
        let backend = if slurp {
            let len = file.metadata()?.len() as usize;
            let mut buf = pool.get(len);
            buf.resize(len, 0);
            file.read_exact(&mut buf)?;
            ReadBackend::Mem(MemFile::new(buf))
        } else {
            ReadBackend::File(file)
        };
        let decoder = get_codec(default_tag);
        Ok(GPFile {
            path: path.to_path_buf(),
            backend: Backend::Read { inner: backend, last_pos: None, decoder, decoder_tag: default_tag },
            pool,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compress-append `payload` at the current write position. Returns the
    /// `Block` metadata entry the caller should push into the BlockHeader.
    pub fn write_block(&mut self, payload: &[u8]) -> Result<Block, Error> {
        let (inner, codec, default_tag, scratch, sink) = match &mut self.backend {
            Backend::Write { inner, codec, default_tag, scratch, sink } => {
                (inner, codec, *default_tag, scratch, sink)
            }
            Backend::Read { .. } => return Err(Error::ModeMismatch("write_block called on a reader")),
        };

        let offset = inner.stream_position()?;
        let raw_len = check_u32_bound("raw_len", payload.len() as u64)?;

        if payload.is_empty() {
            return Ok(Block { offset, len: 0, raw_len: 0, codec: CodecTag::Null });
        }

        sink.clear();
        codec.compress(payload, scratch, sink)?;

        let (final_tag, final_len) = if sink.len() > payload.len() {
            inner.write_all(payload)?;
            (CodecTag::Null, payload.len())
        } else {
            inner.write_all(sink)?;
            (default_tag, sink.len())
        };
        inner.flush()?;

        let len = check_u32_bound("len", final_len as u64)?;
        Ok(Block { offset, len, raw_len, codec: final_tag })
    }

    /// Decompress the block described by `block` into a freshly-sized
    /// buffer. Seeks only if the requested offset differs from the last
    /// read position (sequential-read optimization).
    pub fn read_block(&mut self, block: &Block) -> Result<Vec<u8>, Error> {
        if block.raw_len == 0 {
            return Ok(Vec::new());
        }
        let (inner, last_pos, decoder, decoder_tag) = match &mut self.backend {
            Backend::Read { inner, last_pos, decoder, decoder_tag } => (inner, last_pos, decoder, decoder_tag),
            Backend::Write { .. } => return Err(Error::ModeMismatch("read_block called on a writer")),
        };

        if *last_pos != Some(block.offset) {
            inner.seek(SeekFrom::Start(block.offset))?;
        }

        let mut src = vec![0u8; block.len as usize];
        inner.read_exact(&mut src)?;
        *last_pos = Some(block.offset + block.len as u64);

        let mut out = vec![0u8; block.raw_len as usize];
        if block.codec == *decoder_tag {
            decoder.decompress(&src, &mut out)?;
        } else {
            let mut fresh = get_codec(block.codec);
            fresh.decompress(&src, &mut out)?;
        }
        Ok(out)
    }

    pub fn close(mut self) -> Result<(), Error> {
        match &mut self.backend {
            Backend::Write { inner, codec, scratch, sink, .. } => {
                inner.flush()?;
                codec.close();
                self.pool.put(std::mem::take(scratch));
                self.pool.put(std::mem::take(sink));
            }
            Backend::Read { inner, decoder, .. } => {
                decoder.close();
                if let ReadBackend::Mem(mem) = inner {
                    let reclaimed = std::mem::replace(mem, MemFile::new(Vec::new()));
                    self.pool.put(reclaimed.into_inner());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_roundtrips_a_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sip.gpf");

        let mut writer = GPFile::open_write(&path, 0, CodecTag::Lz4, 0, crate::pool::shared()).unwrap();
        let block = writer.write_block(b"\x01\x02\x03\x04").unwrap();
        writer.close().unwrap();

        let mut reader = GPFile::open_read(&path, CodecTag::Lz4, false, crate::pool::shared()).unwrap();
        let out = reader.read_block(&block).unwrap();
        assert_eq!(out, b"\x01\x02\x03\x04");
    }

    #[test]
    fn empty_payload_produces_zero_length_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dip.gpf");
        let mut writer = GPFile::open_write(&path, 0, CodecTag::Zstd, 3, crate::pool::shared()).unwrap();
        let block = writer.write_block(b"").unwrap();
        assert_eq!(block.len, 0);
        assert_eq!(block.raw_len, 0);
        assert_eq!(block.codec, CodecTag::Null);
    }

    #[test]
    fn expansion_falls_back_to_null() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dport.gpf");
        // Highly incompressible + short enough that LZ4 framing overhead expands it.
        let payload = b"\x01\x02\x03\x04";
        let mut writer = GPFile::open_write(&path, 0, CodecTag::Lz4, 0, crate::pool::shared()).unwrap();
        let block = writer.write_block(payload).unwrap();
        assert!(block.len <= block.raw_len);
        writer.close().unwrap();

        let mut reader = GPFile::open_read(&path, CodecTag::Lz4, true, crate::pool::shared()).unwrap();
        let out = reader.read_block(&block).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn write_mode_rejects_read_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proto.gpf");
        let mut writer = GPFile::open_write(&path, 0, CodecTag::Null, 0, crate::pool::shared()).unwrap();
        let block = Block { offset: 0, len: 4, raw_len: 4, codec: CodecTag::Null };
        assert!(matches!(writer.read_block(&block), Err(Error::ModeMismatch(_))));
    }
}
