//! Memory-object table shared by the host-channel devices
//!
//! Registry of opaque handles the ioctl layer resolves buffer references
//! through. One table is shared by many device sessions; it is internally
//! synchronized and resolution is a single atomic call. A resolved host
//! address stays valid while the object is registered.

use std::collections::HashMap;
use std::sync::Arc;

use onx_core::{nvmap_debug, nvmap_trace};
use parking_lot::RwLock;

use crate::HostAddr;

/// One registered memory object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NvmapObject {
    /// Opaque handle the guest refers to the object by
    pub id: u32,
    /// Backing address in the emulator's address space
    pub address: HostAddr,
    /// Backing size in bytes
    pub size: u64,
    /// Table owns the backing region; owned regions are released when the
    /// last mapping of the object is unmapped
    pub allocated: bool,
}

/// Handle registry shared across device instances
#[derive(Debug, Default)]
pub struct NvmapTable {
    inner: RwLock<TableInner>,
}

#[derive(Debug, Default)]
struct TableInner {
    objects: HashMap<u32, NvmapObject>,
    next_id: u32,
}

impl NvmapTable {
    /// Create a table handle suitable for sharing across device sessions
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a memory object, returning its handle.
    ///
    /// Handle 0 is never issued; the guest uses it as an invalid marker.
    pub fn register(&self, address: HostAddr, size: u64, allocated: bool) -> u32 {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.objects.insert(
            id,
            NvmapObject {
                id,
                address,
                size,
                allocated,
            },
        );
        nvmap_debug!(
            "registered handle 0x{:08x}: addr=0x{:x} size=0x{:x} allocated={}",
            id,
            address,
            size,
            allocated
        );
        id
    }

    /// Resolve a handle to its object descriptor
    pub fn get(&self, id: u32) -> Option<NvmapObject> {
        self.inner.read().objects.get(&id).copied()
    }

    /// Drop a handle and release its backing region.
    ///
    /// Returns false for handles the table does not know, which callers
    /// treat as already freed.
    pub fn free(&self, id: u32) -> bool {
        let removed = self.inner.write().objects.remove(&id);
        match removed {
            Some(object) => {
                nvmap_debug!("freed handle 0x{:08x} (size=0x{:x})", id, object.size);
                true
            }
            None => {
                nvmap_trace!("free of unknown handle 0x{:08x}", id);
                false
            }
        }
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        self.inner.read().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let table = NvmapTable::new();
        let id = table.register(0x1000, 0x2000, false);
        assert_ne!(id, 0);

        let object = table.get(id).unwrap();
        assert_eq!(object.address, 0x1000);
        assert_eq!(object.size, 0x2000);
        assert!(!object.allocated);

        assert!(table.get(id + 1).is_none());
    }

    #[test]
    fn test_handles_are_unique() {
        let table = NvmapTable::new();
        let a = table.register(0x1000, 0x1000, false);
        let b = table.register(0x2000, 0x1000, true);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_free_drops_handle() {
        let table = NvmapTable::new();
        let id = table.register(0x1000, 0x1000, true);

        assert!(table.free(id));
        assert!(table.get(id).is_none());
        assert!(table.is_empty());

        // Double free is benign
        assert!(!table.free(id));
    }
}
