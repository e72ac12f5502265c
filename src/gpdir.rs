//! GPDir — one capture-interface, one-calendar-day directory: owns the
//! lazily-opened column files and the Metadata sidecar for its lifetime.

use std::fs::{self, Permissions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::block::Block;
use crate::codec::CodecTag;
use crate::columns::{Column, COL_IDX_COUNT};
use crate::error::Error;
use crate::gpfile::GPFile;
use crate::metadata::{Counters, Metadata, TrafficMetadata};
use crate::path::{day_start, dir_path, find_day_dir_by_prefix, marshal_suffix, month_dir};
use crate::pool::{shared, BufferPool};

const SIDECAR_NAME: &str = ".blockmeta";

/// Tuning knobs recognized by `open_dir_writer` / `open_dir_reader`.
#[derive(Debug, Clone)]
pub struct GPDirOptions {
    pub codec: CodecTag,
    pub level: i32,
    /// Permission bits requested for files; the directory mode is derived
    /// from this by propagating read to execute per class.
    pub file_mode: u32,
    /// Slurp whole column files into a pooled in-memory buffer on read.
    pub read_all: bool,
}

impl Default for GPDirOptions {
    fn default() -> Self {
        GPDirOptions { codec: CodecTag::Lz4, level: 0, file_mode: 0o644, read_all: false }
    }
}

enum Mode {
    Write,
    Read,
}

/// One open directory: (interface, calendar day).
pub struct GPDir {
    root: PathBuf,
    iface: String,
    path: PathBuf,
    mode: Mode,
    options: GPDirOptions,
    metadata: Metadata,
    columns: [Option<GPFile>; COL_IDX_COUNT],
    pool: &'static BufferPool,
}

/// Propagate read to execute within each user/group/other class so any
/// readable directory is also traversable.
pub fn derive_dir_mode(file_mode: u32) -> u32 {
    const CLASSES: [u32; 3] = [0o400, 0o040, 0o004]; // read bit, per class
    let mut mode = file_mode;
    for &read_bit in &CLASSES {
        if file_mode & read_bit != 0 {
            mode |= read_bit >> 2; // read -> execute within the same class
        }
    }
    mode
}

impl GPDir {
    /// Open (creating if necessary) the day directory for `ts` in write
    /// mode. Absent sidecar starts fresh; present sidecar is deserialized.
    pub fn open_dir_writer(root: &Path, iface: &str, ts: i64, options: GPDirOptions) -> Result<Self, Error> {
        let path = dir_path(root, iface, ts, None);
        let dir_mode = derive_dir_mode(options.file_mode);
        fs::create_dir_all(&path)?;
        fs::set_permissions(&path, Permissions::from_mode(dir_mode))?;

        let sidecar_path = path.join(SIDECAR_NAME);
        let metadata = match fs::read(&sidecar_path) {
            Ok(bytes) => Metadata::unmarshal(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Metadata::new(),
            Err(e) => return Err(Error::Io(e)),
        };

        debug!("opened {:?} for writing ({} existing blocks)", path, metadata.nblocks());
        Ok(GPDir {
            root: root.to_path_buf(),
            iface: iface.to_string(),
            path,
            mode: Mode::Write,
            options,
            metadata,
            columns: Default::default(),
            pool: shared(),
        })
    }

    /// Open the day directory for `ts` in read mode. If `maybe_suffix` is
    /// `None` and the plain `<daystart>` path is missing, recover by
    /// prefix-searching the parent month directory.
    pub fn open_dir_reader(
        root: &Path,
        iface: &str,
        ts: i64,
        maybe_suffix: Option<&str>,
        options: GPDirOptions,
    ) -> Result<Self, Error> {
        let mut path = dir_path(root, iface, ts, maybe_suffix);
        let mut sidecar_path = path.join(SIDECAR_NAME);

        if !sidecar_path.exists() {
            let daystart = day_start(ts);
            let month = month_dir(root, iface, ts);
            let mut entries: Vec<String> = fs::read_dir(&month)
                .map_err(|_| Error::MissingSidecar(path.display().to_string()))?
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .collect();
            entries.sort();
            let found = find_day_dir_by_prefix(&entries, daystart)
                .map(|s| s.to_string())
                .ok_or_else(|| Error::MissingSidecar(path.display().to_string()))?;
            warn!("sidecar missing at {:?}, recovered via month-prefix search to {}", path, found);
            path = month.join(found);
            sidecar_path = path.join(SIDECAR_NAME);
            if !sidecar_path.exists() {
                return Err(Error::MissingSidecar(path.display().to_string()));
            }
        }

        let bytes = fs::read(&sidecar_path)?;
        let metadata = Metadata::unmarshal(&bytes)?;
        debug!("opened {:?} for reading ({} blocks)", path, metadata.nblocks());

        Ok(GPDir {
            root: root.to_path_buf(),
            iface: iface.to_string(),
            path,
            mode: Mode::Read,
            options,
            metadata,
            columns: Default::default(),
            pool: shared(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn open_column(&mut self, col: Column) -> Result<(), Error> {
        if self.columns[col.index()].is_some() {
            return Ok(());
        }
        let file_path = self.path.join(col.file_name());
        let file = match self.mode {
            Mode::Write => {
                let current_offset = self.metadata.block_headers[col.index()].current_offset();
                GPFile::open_write(&file_path, current_offset, self.options.codec, self.options.level, self.pool)?
            }
            Mode::Read => GPFile::open_read(&file_path, self.options.codec, self.options.read_all, self.pool)?,
        };
        self.columns[col.index()] = Some(file);
        Ok(())
    }

    /// Write one timestamp's worth of blocks across every column.
    pub fn write_blocks(
        &mut self,
        ts: i64,
        traffic: TrafficMetadata,
        counters: Counters,
        payloads: [&[u8]; COL_IDX_COUNT],
    ) -> Result<(), Error> {
        if !matches!(self.mode, Mode::Write) {
            return Err(Error::ModeMismatch("write_blocks called on a reader"));
        }
        if self.metadata.block_headers[0].has_timestamp(ts) {
            return Err(Error::DuplicateTimestamp(ts));
        }

        let mut blocks: [Block; COL_IDX_COUNT] = [Block { offset: 0, len: 0, raw_len: 0, codec: CodecTag::Null }; COL_IDX_COUNT];
        for col in Column::ALL {
            self.open_column(col)?;
            let file = self.columns[col.index()].as_mut().expect("just opened");
            blocks[col.index()] = file.write_block(payloads[col.index()])?;
        }

        self.metadata.record_write(ts, blocks, traffic, counters);
        Ok(())
    }

    /// Read the block at index `i` for column `col`, opening the column
    /// lazily if needed.
    pub fn read_block_at_index(&mut self, col: Column, i: usize) -> Result<Vec<u8>, Error> {
        if !matches!(self.mode, Mode::Read) {
            return Err(Error::ModeMismatch("read_block_at_index called on a writer"));
        }
        self.open_column(col)?;
        let block = self.metadata.block_headers[col.index()]
            .blocks()
            .get(i)
            .copied()
            .ok_or(Error::NotOpen)?;
        let file = self.columns[col.index()].as_mut().expect("just opened");
        file.read_block(&block)
    }

    /// Close every open column file and, in write mode, atomically commit
    /// the metadata sidecar and any suffix rename.
    pub fn close(mut self) -> Result<(), Error> {
        let mut errs = Vec::new();
        for slot in self.columns.iter_mut() {
            if let Some(file) = slot.take() {
                if let Err(e) = file.close() {
                    warn!("column close failed for {:?}: {}", self.path, e);
                    errs.push(e.to_string());
                }
            }
        }

        if !errs.is_empty() {
            let err = Error::ColumnCloseFailed(errs);
            if matches!(self.mode, Mode::Write) {
                warn!("aborting close of {:?} before metadata commit: {}", self.path, err);
            }
            return Err(err);
        }

        if !matches!(self.mode, Mode::Write) {
            return Ok(());
        }

        let tmp = tempfile::Builder::new().prefix(".blockmeta.tmp").tempfile_in(&self.path)?;
        let bytes = self.metadata.marshal()?;
        {
            let mut f = tmp.as_file();
            f.write_all(&bytes)?;
            f.flush()?;
        }
        fs::set_permissions(tmp.path(), Permissions::from_mode(self.options.file_mode))?;
        tmp.persist(self.path.join(SIDECAR_NAME)).map_err(|e| Error::Io(e.error))?;

        let new_suffix = marshal_suffix(&self.metadata.stats)?;
        let current_suffix = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split_once('_'))
            .map(|(_, s)| s.to_string());

        if current_suffix.as_deref() != Some(new_suffix.as_str()) {
            let ts = day_start_of_path(&self.path)?;
            let new_path = dir_path(&self.root, &self.iface, ts, Some(&new_suffix));
            if new_path != self.path {
                if let Err(e) = fs::rename(&self.path, &new_path) {
                    warn!("suffix rename of {:?} to {:?} failed, will recover via prefix search: {}", self.path, new_path, e);
                } else {
                    debug!("renamed {:?} to {:?}", self.path, new_path);
                }
            }
        }

        Ok(())
    }
}

fn day_start_of_path(path: &Path) -> Result<i64, Error> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidDirName(path.display().to_string()))?;
    crate::path::parse_dir_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn payloads(byte: u8) -> [Vec<u8>; COL_IDX_COUNT] {
        std::array::from_fn(|_| vec![byte; 4])
    }

    fn as_refs(v: &[Vec<u8>; COL_IDX_COUNT]) -> [&[u8]; COL_IDX_COUNT] {
        std::array::from_fn(|i| v[i].as_slice())
    }

    #[test]
    fn single_block_roundtrip() {
        let root = tempdir().unwrap();
        let options = GPDirOptions { codec: CodecTag::Lz4, ..Default::default() };

        let mut writer = GPDir::open_dir_writer(root.path(), "eth0", 1_000_000, options.clone()).unwrap();
        let data = payloads(7);
        writer
            .write_blocks(
                1_000_000,
                TrafficMetadata { num_v4_entries: 2, num_v6_entries: 1, num_drops: 0 },
                Counters { bytes_rcvd: 1, bytes_sent: 1, packets_rcvd: 1, packets_sent: 1 },
                as_refs(&data),
            )
            .unwrap();
        writer.close().unwrap();

        let mut reader = GPDir::open_dir_reader(root.path(), "eth0", 1_000_000, None, options).unwrap();
        assert_eq!(reader.metadata().nblocks(), 1);
        for col in Column::ALL {
            let out = reader.read_block_at_index(col, 0).unwrap();
            assert_eq!(out, vec![7u8; 4]);
        }
        assert_eq!(reader.metadata().stats.traffic.num_v4_entries, 2);
    }

    #[test]
    fn duplicate_timestamp_is_rejected() {
        let root = tempdir().unwrap();
        let options = GPDirOptions::default();
        let mut writer = GPDir::open_dir_writer(root.path(), "eth0", 42, options).unwrap();
        let data = payloads(1);
        writer
            .write_blocks(42, TrafficMetadata::default(), Counters::default(), as_refs(&data))
            .unwrap();
        let err = writer
            .write_blocks(42, TrafficMetadata::default(), Counters::default(), as_refs(&data))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateTimestamp(42)));
    }

    #[test]
    fn suffix_rename_reflects_totals() {
        let root = tempdir().unwrap();
        let options = GPDirOptions::default();
        let mut writer = GPDir::open_dir_writer(root.path(), "eth0", 1_700_000_000, options.clone()).unwrap();
        let data = payloads(3);
        writer
            .write_blocks(
                1_700_000_000,
                TrafficMetadata { num_v4_entries: 10, num_v6_entries: 5, num_drops: 0 },
                Counters { bytes_rcvd: 100, bytes_sent: 200, packets_rcvd: 1, packets_sent: 2 },
                as_refs(&data),
            )
            .unwrap();
        writer.close().unwrap();

        let month = month_dir(root.path(), "eth0", 1_700_000_000);
        let mut found_suffixed = false;
        for entry in fs::read_dir(&month).unwrap() {
            let name = entry.unwrap().file_name().into_string().unwrap();
            if name.contains('_') {
                let stats = crate::path::parse_suffix(name.split_once('_').unwrap().1).unwrap();
                assert_eq!(stats.traffic.num_v4_entries, 10);
                assert_eq!(stats.counters.bytes_rcvd, 100);
                found_suffixed = true;
            }
        }
        assert!(found_suffixed);

        // Reader should recover the suffixed directory without being told the suffix.
        let mut reader = GPDir::open_dir_reader(root.path(), "eth0", 1_700_000_000, None, options).unwrap();
        assert_eq!(reader.metadata().nblocks(), 1);
        let _ = reader.read_block_at_index(Column::Sip, 0).unwrap();
    }

    #[test]
    fn derive_dir_mode_propagates_read_to_execute() {
        assert_eq!(derive_dir_mode(0o644), 0o755);
        assert_eq!(derive_dir_mode(0o600), 0o700);
        assert_eq!(derive_dir_mode(0o000), 0o000);
        assert_eq!(derive_dir_mode(0o444), 0o555);
    }

    #[test]
    fn crash_between_flush_and_close_leaves_last_committed_state() {
        let root = tempdir().unwrap();
        let options = GPDirOptions::default();

        let mut w1 = GPDir::open_dir_writer(root.path(), "eth0", 1, options.clone()).unwrap();
        let data = payloads(1);
        w1.write_blocks(1, TrafficMetadata::default(), Counters::default(), as_refs(&data)).unwrap();
        w1.write_blocks(2, TrafficMetadata::default(), Counters::default(), as_refs(&data)).unwrap();
        w1.close().unwrap();

        let mut w2 = GPDir::open_dir_writer(root.path(), "eth0", 3, options.clone()).unwrap();
        w2.write_blocks(3, TrafficMetadata::default(), Counters::default(), as_refs(&data)).unwrap();
        drop(w2); // simulate process death: no close()

        let reader = GPDir::open_dir_reader(root.path(), "eth0", 1, None, options.clone()).unwrap();
        assert_eq!(reader.metadata().nblocks(), 2);

        let mut w3 = GPDir::open_dir_writer(root.path(), "eth0", 4, options.clone()).unwrap();
        w3.write_blocks(4, TrafficMetadata::default(), Counters::default(), as_refs(&data)).unwrap();
        w3.write_blocks(5, TrafficMetadata::default(), Counters::default(), as_refs(&data)).unwrap();
        w3.close().unwrap();

        let reader = GPDir::open_dir_reader(root.path(), "eth0", 1, None, options).unwrap();
        assert_eq!(reader.metadata().nblocks(), 4);
        assert_eq!(reader.metadata().block_headers[0].timestamps(), &[1, 2, 4, 5]);
    }
}
