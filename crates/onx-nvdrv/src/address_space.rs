//! Device virtual address-space tracking
//!
//! Ordered index of the ranges a channel has mapped into its device
//! address space. Ranges never overlap, and lookups walk the ordered
//! index rather than scanning.

use std::collections::BTreeMap;

use crate::error::{DeviceError, DeviceResult};
use crate::{DeviceAddr, HostAddr};

/// One mapped region of the device address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMapping {
    start_addr: DeviceAddr,
    end_addr: DeviceAddr,
    host_addr: HostAddr,
    is_allocated: bool,
}

impl BufferMapping {
    pub fn start_addr(&self) -> DeviceAddr {
        self.start_addr
    }

    pub fn end_addr(&self) -> DeviceAddr {
        self.end_addr
    }

    pub fn size(&self) -> u64 {
        self.end_addr - self.start_addr
    }

    /// Corresponding address in the emulator's address space, 0 if unset
    pub fn host_addr(&self) -> HostAddr {
        self.host_addr
    }

    /// Whether this mapping owns its backing region and must release it
    /// when unmapped
    pub fn is_allocated(&self) -> bool {
        self.is_allocated
    }

    /// Range containment; ranges are half-open
    pub fn contains(&self, addr: DeviceAddr) -> bool {
        addr >= self.start_addr && addr < self.end_addr
    }
}

/// Ordered index of live mappings, keyed by start address
#[derive(Debug, Default)]
pub struct AddressSpace {
    mappings: BTreeMap<DeviceAddr, BufferMapping>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the mapping whose range contains `addr`.
    ///
    /// Locates the nearest mapping at or before the address, then tests
    /// containment; O(log n) in the number of live mappings.
    pub fn find(&self, addr: DeviceAddr) -> Option<&BufferMapping> {
        let (_, mapping) = self.mappings.range(..=addr).next_back()?;
        mapping.contains(addr).then_some(mapping)
    }

    /// Insert a new mapping.
    ///
    /// The caller chooses a non-overlapping range; an overlap is a
    /// contract violation and is reported, never spliced in.
    pub fn add(
        &mut self,
        start: DeviceAddr,
        size: u64,
        host_addr: HostAddr,
        is_allocated: bool,
    ) -> DeviceResult<()> {
        debug_assert!(size > 0);
        let end = start + size;
        if let Some((_, prev)) = self.mappings.range(..=start).next_back() {
            if prev.end_addr > start {
                return Err(DeviceError::Overlap(start));
            }
        }
        if let Some((&next_start, _)) = self.mappings.range(start..).next() {
            if next_start < end {
                return Err(DeviceError::Overlap(start));
            }
        }
        self.mappings.insert(
            start,
            BufferMapping {
                start_addr: start,
                end_addr: end,
                host_addr,
                is_allocated,
            },
        );
        Ok(())
    }

    /// Remove the mapping that starts exactly at `start`, returning it.
    ///
    /// Addresses inside a range but not at its start are not found; unmap
    /// always targets a mapping's start address, and the returned mapping
    /// carries the size the caller needs to release the host-side region.
    pub fn remove(&mut self, start: DeviceAddr) -> Option<BufferMapping> {
        self.mappings.remove(&start)
    }

    /// Upper bound of the occupied address space, 0 when empty
    pub fn highest_end(&self) -> DeviceAddr {
        self.mappings.values().next_back().map_or(0, |m| m.end_addr)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_hits_containing_range() {
        let mut space = AddressSpace::new();
        space.add(0x1000, 0x2000, 0x9000, false).unwrap();
        space.add(0x4000, 0x1000, 0xA000, true).unwrap();

        let mapping = space.find(0x1000).unwrap();
        assert_eq!(mapping.start_addr(), 0x1000);
        assert_eq!(mapping.host_addr(), 0x9000);

        // Interior and last byte of the first range
        assert_eq!(space.find(0x2FFF).unwrap().start_addr(), 0x1000);
        // End is exclusive
        assert!(space.find(0x3000).is_none());

        // Second range, not the first
        let mapping = space.find(0x4800).unwrap();
        assert_eq!(mapping.start_addr(), 0x4000);
        assert!(mapping.is_allocated());

        // Outside all live ranges
        assert!(space.find(0x0FFF).is_none());
        assert!(space.find(0x5000).is_none());
    }

    #[test]
    fn test_overlap_is_reported() {
        let mut space = AddressSpace::new();
        space.add(0x1000, 0x1000, 0, false).unwrap();

        assert_eq!(
            space.add(0x1800, 0x1000, 0, false),
            Err(DeviceError::Overlap(0x1800))
        );
        assert_eq!(
            space.add(0x800, 0x1000, 0, false),
            Err(DeviceError::Overlap(0x800))
        );
        assert_eq!(
            space.add(0x1000, 0x10, 0, false),
            Err(DeviceError::Overlap(0x1000))
        );
        assert_eq!(space.len(), 1);

        // Adjacent ranges touch but do not overlap
        space.add(0x2000, 0x1000, 0, false).unwrap();
        space.add(0x0, 0x1000, 0, false).unwrap();
        assert_eq!(space.len(), 3);
    }

    #[test]
    fn test_remove_targets_start_address_only() {
        let mut space = AddressSpace::new();
        space.add(0x1000, 0x2000, 0x9000, true).unwrap();

        // Interior addresses are not a match for removal
        assert!(space.remove(0x1004).is_none());
        assert_eq!(space.len(), 1);

        let removed = space.remove(0x1000).unwrap();
        assert_eq!(removed.size(), 0x2000);
        assert!(removed.is_allocated());
        assert!(space.find(0x1000).is_none());
        assert!(space.is_empty());

        // Second removal of the same start address finds nothing
        assert!(space.remove(0x1000).is_none());
    }

    #[test]
    fn test_highest_end_tracks_occupancy() {
        let mut space = AddressSpace::new();
        assert_eq!(space.highest_end(), 0);

        space.add(0x1000, 0x1000, 0, false).unwrap();
        space.add(0x8000, 0x2000, 0, false).unwrap();
        assert_eq!(space.highest_end(), 0xA000);

        space.remove(0x8000);
        assert_eq!(space.highest_end(), 0x2000);
    }

    #[test]
    fn test_add_remove_sequences_preserve_containment() {
        let mut space = AddressSpace::new();
        let ranges: &[(DeviceAddr, u64)] =
            &[(0x1000, 0x1000), (0x3000, 0x800), (0x5000, 0x4000), (0xA000, 0x10)];
        for &(start, size) in ranges {
            space.add(start, size, start + 0x10_0000, false).unwrap();
        }

        for &(start, size) in ranges {
            for probe in [start, start + size / 2, start + size - 1] {
                let found = space.find(probe).unwrap();
                assert_eq!(found.start_addr(), start);
            }
            assert!(space.find(start + size).is_none());
        }

        space.remove(0x3000);
        assert!(space.find(0x3400).is_none());
        assert_eq!(space.find(0x5000).unwrap().start_addr(), 0x5000);
    }
}
