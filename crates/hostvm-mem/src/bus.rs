use core::fmt;

use crate::{GuestMemory, MemoryBacking, MemoryResult};

/// Fixed-size, byte-addressable guest memory region.
///
/// Multi-byte accessors are little-endian. Every access is checked against [`MemoryBus::size`].
pub struct MemoryBus {
    mem: Box<dyn GuestMemory>,
}

impl MemoryBus {
    pub fn new(size: u64, backing: MemoryBacking) -> MemoryResult<Self> {
        Ok(Self::with_backend(backing.allocate(size)?))
    }

    pub fn with_backend(mem: Box<dyn GuestMemory>) -> Self {
        Self { mem }
    }

    pub fn size(&self) -> u64 {
        self.mem.size()
    }

    pub fn read_into(&self, addr: u64, dst: &mut [u8]) -> MemoryResult<()> {
        self.mem.read_into(addr, dst)
    }

    pub fn write_from(&mut self, addr: u64, src: &[u8]) -> MemoryResult<()> {
        self.mem.write_from(addr, src)
    }

    pub fn read_u8(&self, addr: u64) -> MemoryResult<u8> {
        let mut buf = [0u8; 1];
        self.read_into(addr, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&self, addr: u64) -> MemoryResult<u16> {
        let mut buf = [0u8; 2];
        self.read_into(addr, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&self, addr: u64) -> MemoryResult<u32> {
        let mut buf = [0u8; 4];
        self.read_into(addr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&self, addr: u64) -> MemoryResult<u64> {
        let mut buf = [0u8; 8];
        self.read_into(addr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_u8(&mut self, addr: u64, value: u8) -> MemoryResult<()> {
        self.write_from(addr, &[value])
    }

    pub fn write_u16(&mut self, addr: u64, value: u16) -> MemoryResult<()> {
        self.write_from(addr, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, addr: u64, value: u32) -> MemoryResult<()> {
        self.write_from(addr, &value.to_le_bytes())
    }

    pub fn write_u64(&mut self, addr: u64, value: u64) -> MemoryResult<()> {
        self.write_from(addr, &value.to_le_bytes())
    }

    /// Fills `len` bytes starting at `addr` with `value`.
    pub fn fill(&mut self, addr: u64, len: usize, value: u8) -> MemoryResult<()> {
        const STRIDE: usize = 4096;
        crate::phys::check_range(self.size(), addr, len)?;

        let block = [value; STRIDE];
        let mut done = 0usize;
        while done < len {
            let take = (len - done).min(STRIDE);
            self.write_from(addr + done as u64, &block[..take])?;
            done += take;
        }
        Ok(())
    }

    /// Zeroes the entire region.
    pub fn zero(&mut self) {
        self.mem.clear();
    }
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryError;

    #[test]
    fn little_endian_typed_accesses() {
        let mut bus = MemoryBus::new(64, MemoryBacking::Dense).unwrap();
        bus.write_u32(0, 0x1122_3344).unwrap();

        let mut raw = [0u8; 4];
        bus.read_into(0, &mut raw).unwrap();
        assert_eq!(raw, [0x44, 0x33, 0x22, 0x11]);
        assert_eq!(bus.read_u16(0).unwrap(), 0x3344);
        assert_eq!(bus.read_u8(3).unwrap(), 0x11);

        bus.write_u64(8, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(bus.read_u64(8).unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn last_word_is_accessible_but_one_past_is_not() {
        let mut bus = MemoryBus::new(16, MemoryBacking::Sparse).unwrap();
        bus.write_u32(12, 0xDEAD_BEEF).unwrap();
        assert_eq!(bus.read_u32(12).unwrap(), 0xDEAD_BEEF);
        assert_eq!(
            bus.read_u32(13),
            Err(MemoryError::OutOfRange {
                addr: 13,
                len: 4,
                size: 16
            })
        );
    }

    #[test]
    fn fill_is_bounds_checked_before_writing() {
        let mut bus = MemoryBus::new(32, MemoryBacking::Dense).unwrap();
        assert!(bus.fill(16, 17, 0xAA).is_err());
        assert_eq!(bus.read_u8(16).unwrap(), 0);

        bus.fill(16, 16, 0xAA).unwrap();
        assert_eq!(bus.read_u8(31).unwrap(), 0xAA);
        assert_eq!(bus.read_u8(15).unwrap(), 0);
    }

    #[test]
    fn zero_clears_everything() {
        let mut bus = MemoryBus::new(32, MemoryBacking::Sparse).unwrap();
        bus.fill(0, 32, 0x55).unwrap();
        bus.zero();
        let mut buf = [0xFFu8; 32];
        bus.read_into(0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 32]);
    }
}
