//! DMA target resolution for the host-controller core.
//!
//! The machine normally links a DMA memory bus before realize. When it does not, the controller
//! installs its own alias onto system memory so the core always has somewhere to master into.

use std::cell::RefCell;
use std::rc::Rc;

use crate::memory::{AliasRegion, MemoryBus, SharedMemoryBus};

/// Physical base of the fallback DMA window.
pub const FALLBACK_DMA_BASE: u64 = 0x8_0000_0000;
/// Size of the fallback DMA window (full 32-bit span).
pub const FALLBACK_DMA_SIZE: u64 = u32::MAX as u64;

const FALLBACK_DMA_NAME: &str = "apple.otg.dma-mr";

/// The memory the host-controller core uses for bus-master transfers.
#[derive(Clone)]
pub enum DmaTarget {
    /// Bus supplied by the machine. The controller never tears it down.
    External(SharedMemoryBus),
    /// Alias onto system memory created (and owned) by the controller.
    Fallback(Rc<RefCell<AliasRegion>>),
}

impl DmaTarget {
    pub fn is_fallback(&self) -> bool {
        matches!(self, DmaTarget::Fallback(_))
    }

    /// `(base, size)` of the fallback alias, if this is one.
    pub fn fallback_window(&self) -> Option<(u64, u64)> {
        match self {
            DmaTarget::Fallback(alias) => {
                let alias = alias.borrow();
                Some((alias.base(), alias.size()))
            }
            DmaTarget::External(_) => None,
        }
    }

    /// The bus handed to the host-controller core.
    pub fn bus(&self) -> SharedMemoryBus {
        match self {
            DmaTarget::External(bus) => bus.clone(),
            DmaTarget::Fallback(alias) => {
                let bus: Rc<RefCell<dyn MemoryBus>> = alias.clone();
                bus
            }
        }
    }
}

impl std::fmt::Debug for DmaTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DmaTarget::External(_) => f.write_str("DmaTarget::External"),
            DmaTarget::Fallback(alias) => f
                .debug_tuple("DmaTarget::Fallback")
                .field(&*alias.borrow())
                .finish(),
        }
    }
}

/// Picks the external bus when present, otherwise builds the fallback alias onto `system_memory`.
pub fn resolve_dma_target(
    external: Option<SharedMemoryBus>,
    system_memory: &SharedMemoryBus,
) -> DmaTarget {
    if let Some(bus) = external {
        return DmaTarget::External(bus);
    }

    tracing::warn!(
        "apple.otg: no DMA memory region linked; redirecting all DMA accesses to {:#x}",
        FALLBACK_DMA_BASE
    );
    DmaTarget::Fallback(Rc::new(RefCell::new(AliasRegion::new(
        FALLBACK_DMA_NAME,
        system_memory.clone(),
        FALLBACK_DMA_BASE,
        FALLBACK_DMA_SIZE,
    ))))
}
