//! Memory dump files as a physical address space.
//!
//! The dump is mapped as a private copy-on-write mapping: writes are visible
//! to later reads through the same connector but never reach the file.

use super::{read_batch, write_batch};
use crate::config::IoConfig;
use crate::connector::args::{parse_number, ConnectorArgs};
use crate::error::{MemError, Result};
use crate::mem::{BatchStatus, PhysicalMemory, PhysicalMemoryMetadata, ReadData, WriteData};
use memmap2::{MmapMut, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct FileMemory {
    path: PathBuf,
    map: RwLock<MmapMut>,
    base: u64,
    size: u64,
    readonly: bool,
    parallel_threshold: usize,
}

impl FileMemory {
    /// Map `path` with physical address `base` at file offset zero.
    pub fn open<P: AsRef<Path>>(path: P, base: u64, readonly: bool, io: &IoConfig) -> Result<Self> {
        let path = path.as_ref();
        let init_err = |message: String| MemError::BackendInit {
            backend: "file".into(),
            message,
        };

        let file = File::open(path)
            .map_err(|e| init_err(format!("cannot open {}: {e}", path.display())))?;
        let size = file.metadata()?.len();

        debug!(path = %path.display(), size, base, readonly, "opening memory dump");

        if size == 0 {
            return Err(init_err(format!("{} is empty", path.display())));
        }
        if size > io.max_dump_size {
            warn!(
                path = %path.display(),
                size,
                limit = io.max_dump_size,
                "dump file is too large"
            );
            return Err(init_err(format!(
                "{} is {size:#x} bytes, limit is {:#x}",
                path.display(),
                io.max_dump_size
            )));
        }
        if base.checked_add(size).is_none() {
            return Err(init_err(format!("base {base:#x} + size overflows")));
        }

        // Safety: the map is private, so later changes to the file by other
        // processes are the only hazard, same as for any dump reader.
        let map = unsafe { MmapOptions::new().map_copy(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            map: RwLock::new(map),
            base,
            size,
            readonly,
            parallel_threshold: io.parallel_threshold,
        })
    }

    /// Build from an argument string: `path` (or the positional value),
    /// optional `base` and `readonly`.
    pub fn from_args(args: &str, io: &IoConfig) -> Result<Self> {
        let args = ConnectorArgs::parse(args)?;
        let path = args
            .get_or_default("path")
            .ok_or_else(|| MemError::InvalidArgs("missing `path`".into()))?;
        let base = match args.get("base") {
            Some(v) => parse_number(v)?,
            None => 0,
        };
        let readonly = args.get_bool("readonly")?.unwrap_or(false);
        Self::open(path, base, readonly, io)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn base(&self) -> u64 {
        self.base
    }
}

impl PhysicalMemory for FileMemory {
    fn phys_read_raw_list(&self, data: &mut [ReadData<'_>]) -> BatchStatus {
        let map = self.map.read().unwrap_or_else(PoisonError::into_inner);
        read_batch(&map, self.base, data, self.parallel_threshold)
    }

    fn phys_write_raw_list(&self, data: &[WriteData<'_>]) -> BatchStatus {
        if self.readonly {
            // empty entries succeed even on a read-only map
            return data
                .iter()
                .map(|entry| {
                    if entry.buf.is_empty() {
                        Ok(())
                    } else {
                        Err(MemError::ReadOnly {
                            backend: "file".into(),
                        })
                    }
                })
                .collect();
        }
        let mut map = self.map.write().unwrap_or_else(PoisonError::into_inner);
        write_batch(&mut map, self.base, data)
    }

    fn metadata(&self) -> PhysicalMemoryMetadata {
        PhysicalMemoryMetadata::new(self.size, self.readonly)
    }
}
