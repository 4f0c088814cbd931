//! Memory access seams between the controller and the enclosing machine.
//!
//! Two directions matter here:
//! - [`MmioHandler`]: guest-visible register accesses arriving on the emulated bus.
//! - [`MemoryBus`]: bus-master (DMA) accesses issued by the host-controller core.

use std::cell::RefCell;
use std::rc::Rc;

/// Guest physical memory as seen by a bus-master device.
///
/// Reads take `&mut self` because a DMA target may be backed by MMIO with side effects.
pub trait MemoryBus {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]);
    fn write_physical(&mut self, paddr: u64, buf: &[u8]);

    fn read_u32(&mut self, paddr: u64) -> u32 {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf);
        u32::from_le_bytes(buf)
    }

    fn write_u32(&mut self, paddr: u64, val: u32) {
        self.write_physical(paddr, &val.to_le_bytes());
    }
}

/// A memory bus shared between the machine and the devices that master it.
pub type SharedMemoryBus = Rc<RefCell<dyn MemoryBus>>;

/// Handler for a memory-mapped register window.
///
/// `offset` is relative to the start of the window; `size` is the access width in bytes.
pub trait MmioHandler {
    fn read(&mut self, offset: u64, size: usize) -> u64;
    fn write(&mut self, offset: u64, size: usize, value: u64);
}

/// A window of `size` bytes onto another bus, starting at `base`.
///
/// Accesses that fall past the end of the window, or that would wrap the target's address space,
/// read as all-ones and drop writes.
pub struct AliasRegion {
    name: &'static str,
    target: SharedMemoryBus,
    base: u64,
    size: u64,
}

impl AliasRegion {
    pub fn new(name: &'static str, target: SharedMemoryBus, base: u64, size: u64) -> Self {
        Self {
            name,
            target,
            base,
            size,
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Target address for an access of `len` bytes at `offset`, if the access lies inside the
    /// window and does not wrap the target's address space.
    fn translate(&self, offset: u64, len: usize) -> Option<u64> {
        let end = offset.checked_add(len as u64)?;
        if end > self.size {
            return None;
        }
        let addr = self.base.checked_add(offset)?;
        addr.checked_add(len as u64)?;
        Some(addr)
    }
}

impl std::fmt::Debug for AliasRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AliasRegion")
            .field("name", &self.name)
            .field("base", &format_args!("{:#x}", self.base))
            .field("size", &format_args!("{:#x}", self.size))
            .finish_non_exhaustive()
    }
}

impl MemoryBus for AliasRegion {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        match self.translate(paddr, buf.len()) {
            Some(addr) => self.target.borrow_mut().read_physical(addr, buf),
            None => buf.fill(0xFF),
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        if let Some(addr) = self.translate(paddr, buf.len()) {
            self.target.borrow_mut().write_physical(addr, buf);
        }
    }
}

/// All-ones value for an access of `size` bytes (open bus).
pub fn all_ones(size: usize) -> u64 {
    if size == 0 {
        return 0;
    }
    if size >= 8 {
        return u64::MAX;
    }
    (1u64 << (size * 8)) - 1
}
