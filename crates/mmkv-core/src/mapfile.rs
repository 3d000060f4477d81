//! Memory-mapped data file.
//!
//! The whole file is kept mapped read-write; capacity grows by doubling
//! from one page and the mapping is rebuilt after every resize. In
//! multi-process mode another process may resize the file underneath us,
//! so [`MapFile::refresh`] re-checks the on-disk size before use.

use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::MmapMut;

use crate::error::Result;

pub(crate) const PAGE_SIZE: u64 = 4096;

pub(crate) struct MapFile {
    file: File,
    map: MmapMut,
    capacity: u64,
}

impl MapFile {
    /// Open or create the data file and map it. Returns the map and
    /// whether the file was empty (freshly created).
    pub(crate) fn open(path: &Path) -> Result<(Self, bool)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        let created = len == 0;
        if len < PAGE_SIZE {
            file.set_len(PAGE_SIZE)?;
        }
        let capacity = file.metadata()?.len();
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok((
            Self {
                file,
                map,
                capacity,
            },
            created,
        ))
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.capacity
    }

    pub(crate) fn file(&self) -> &File {
        &self.file
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.map
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }

    pub(crate) fn write_at(&mut self, offset: u64, data: &[u8]) {
        let start = offset as usize;
        self.map[start..start + data.len()].copy_from_slice(data);
    }

    /// Grow capacity (doubling, page-aligned) until `needed` bytes fit.
    pub(crate) fn ensure_capacity(&mut self, needed: u64) -> Result<()> {
        if needed <= self.capacity {
            return Ok(());
        }
        let mut capacity = self.capacity.max(PAGE_SIZE);
        while capacity < needed {
            capacity *= 2;
        }
        self.resize(capacity)
    }

    /// Truncate to the smallest page multiple holding `needed` bytes.
    pub(crate) fn shrink_to(&mut self, needed: u64) -> Result<()> {
        let capacity = needed.div_ceil(PAGE_SIZE).max(1) * PAGE_SIZE;
        if capacity == self.capacity {
            return Ok(());
        }
        self.resize(capacity)
    }

    /// Re-map when another process resized the file.
    pub(crate) fn refresh(&mut self) -> Result<bool> {
        let len = self.file.metadata()?.len();
        if len == self.capacity || len < PAGE_SIZE {
            return Ok(false);
        }
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        self.capacity = len;
        Ok(true)
    }

    pub(crate) fn zero_range(&mut self, start: u64, end: u64) {
        let start = start as usize;
        let end = end.min(self.capacity) as usize;
        if start < end {
            self.map[start..end].fill(0);
        }
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    fn resize(&mut self, capacity: u64) -> Result<()> {
        self.file.set_len(capacity)?;
        self.map = unsafe { MmapMut::map_mut(&self.file)? };
        self.capacity = capacity;
        Ok(())
    }
}
