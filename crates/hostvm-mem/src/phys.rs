use serde::{Deserialize, Serialize};

use crate::{MemoryError, MemoryResult};

/// Storage behind a [`crate::MemoryBus`].
///
/// Addresses are `u64` so the guest address space does not depend on the host's `usize`.
pub trait GuestMemory: Send {
    fn size(&self) -> u64;

    /// Reads `dst.len()` bytes starting at `addr`.
    fn read_into(&self, addr: u64, dst: &mut [u8]) -> MemoryResult<()>;

    /// Writes all of `src` starting at `addr`.
    fn write_from(&mut self, addr: u64, src: &[u8]) -> MemoryResult<()>;

    /// Zeroes the whole region.
    fn clear(&mut self);
}

/// Which [`GuestMemory`] backend a bus should be built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBacking {
    Dense,
    #[default]
    Sparse,
}

impl MemoryBacking {
    pub fn allocate(self, size: u64) -> MemoryResult<Box<dyn GuestMemory>> {
        Ok(match self {
            MemoryBacking::Dense => Box::new(DenseMemory::new(size)?),
            MemoryBacking::Sparse => Box::new(SparseMemory::new(size)?),
        })
    }
}

/// Allocates `len` zeroed elements, reporting allocation failure instead of aborting.
fn zeroed<T: Clone + Default>(len: usize, size: u64) -> MemoryResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| MemoryError::AllocationFailed { size })?;
    v.resize(len, T::default());
    Ok(v)
}

pub(crate) fn check_range(size: u64, addr: u64, len: usize) -> MemoryResult<()> {
    let end = addr
        .checked_add(len as u64)
        .ok_or(MemoryError::OutOfRange { addr, len, size })?;
    if end > size {
        return Err(MemoryError::OutOfRange { addr, len, size });
    }
    Ok(())
}

/// Guest memory backed by one contiguous host allocation.
#[derive(Debug, Clone)]
pub struct DenseMemory {
    data: Box<[u8]>,
}

impl DenseMemory {
    pub fn new(size: u64) -> MemoryResult<Self> {
        let size_usize = usize::try_from(size).map_err(|_| MemoryError::SizeTooLarge { size })?;
        Ok(Self {
            data: zeroed(size_usize, size)?.into_boxed_slice(),
        })
    }

    #[inline]
    fn range_to_usize(&self, addr: u64, len: usize) -> MemoryResult<(usize, usize)> {
        check_range(self.size(), addr, len)?;
        // `check_range` bounds `addr + len` by the allocation length, which is a `usize`.
        let start = addr as usize;
        Ok((start, start + len))
    }
}

impl GuestMemory for DenseMemory {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_into(&self, addr: u64, dst: &mut [u8]) -> MemoryResult<()> {
        let (start, end) = self.range_to_usize(addr, dst.len())?;
        dst.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_from(&mut self, addr: u64, src: &[u8]) -> MemoryResult<()> {
        let (start, end) = self.range_to_usize(addr, src.len())?;
        self.data[start..end].copy_from_slice(src);
        Ok(())
    }

    fn clear(&mut self) {
        self.data.fill(0);
    }
}

/// Guest memory backed by lazily-allocated fixed-size chunks.
///
/// Unwritten chunks read as zero. Clearing drops every chunk instead of zero-filling.
#[derive(Debug, Clone)]
pub struct SparseMemory {
    size: u64,
    chunk_size: usize,
    chunks: Vec<Option<Box<[u8]>>>,
}

impl SparseMemory {
    pub const DEFAULT_CHUNK_SIZE: usize = 2 * 1024 * 1024;

    pub fn new(size: u64) -> MemoryResult<Self> {
        Self::with_chunk_size(size, Self::DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(size: u64, chunk_size: usize) -> MemoryResult<Self> {
        if chunk_size == 0 {
            return Err(MemoryError::InvalidChunkSize { chunk_size });
        }
        let chunk_size_u64 = chunk_size as u64;
        let chunk_count_u64 = size
            .checked_add(chunk_size_u64 - 1)
            .ok_or(MemoryError::SizeTooLarge { size })?
            / chunk_size_u64;
        let chunk_count =
            usize::try_from(chunk_count_u64).map_err(|_| MemoryError::SizeTooLarge { size })?;
        Ok(Self {
            size,
            chunk_size,
            chunks: zeroed(chunk_count, size)?,
        })
    }

    /// Number of chunks that currently hold a host allocation.
    pub fn allocated_chunks(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_some()).count()
    }

    #[inline]
    fn chunk_index(&self, addr: u64) -> (usize, usize) {
        let chunk_size_u64 = self.chunk_size as u64;
        let chunk = addr / chunk_size_u64;
        let offset = addr - chunk * chunk_size_u64;
        // Callers range-check `addr` first, so `chunk < chunks.len()` and `offset < chunk_size`.
        (chunk as usize, offset as usize)
    }

    #[inline]
    fn ensure_chunk(&mut self, chunk: usize) -> MemoryResult<&mut [u8]> {
        let chunk_size = self.chunk_size;
        let size = self.size;
        let slot = self.chunks.get_mut(chunk).ok_or(MemoryError::OutOfRange {
            addr: (chunk as u64) * (chunk_size as u64),
            len: 1,
            size,
        })?;
        if slot.is_none() {
            *slot = Some(zeroed(chunk_size, size)?.into_boxed_slice());
        }
        Ok(&mut slot.get_or_insert_with(Box::default)[..])
    }
}

impl GuestMemory for SparseMemory {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_into(&self, addr: u64, dst: &mut [u8]) -> MemoryResult<()> {
        check_range(self.size, addr, dst.len())?;
        let mut remaining = dst;
        let mut cur = addr;

        while !remaining.is_empty() {
            let (chunk_idx, chunk_off) = self.chunk_index(cur);
            let take = (self.chunk_size - chunk_off).min(remaining.len());

            match self.chunks.get(chunk_idx).and_then(|c| c.as_ref()) {
                Some(chunk) => {
                    remaining[..take].copy_from_slice(&chunk[chunk_off..chunk_off + take])
                }
                None => remaining[..take].fill(0),
            }

            cur += take as u64;
            remaining = &mut remaining[take..];
        }

        Ok(())
    }

    fn write_from(&mut self, addr: u64, src: &[u8]) -> MemoryResult<()> {
        check_range(self.size, addr, src.len())?;
        let mut remaining = src;
        let mut cur = addr;

        while !remaining.is_empty() {
            let (chunk_idx, chunk_off) = self.chunk_index(cur);
            let take = (self.chunk_size - chunk_off).min(remaining.len());

            let chunk = self.ensure_chunk(chunk_idx)?;
            chunk[chunk_off..chunk_off + take].copy_from_slice(&remaining[..take]);

            cur += take as u64;
            remaining = &remaining[take..];
        }

        Ok(())
    }

    fn clear(&mut self) {
        self.chunks.iter_mut().for_each(|c| *c = None);
    }
}
