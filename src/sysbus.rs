//! The surface a system-bus peripheral presents to the enclosing machine.

use std::rc::Rc;

use crate::error::Result;
use crate::irq::IrqLine;
use crate::memory::SharedMemoryBus;

/// One MMIO window exposed by a device, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioRegionInfo {
    pub name: &'static str,
    pub size: u64,
}

pub trait SysBusDevice {
    /// Human-readable device description.
    fn description(&self) -> &'static str;

    fn mmio_regions(&self) -> Vec<MmioRegionInfo>;

    /// Reads from MMIO window `region` (an index into [`Self::mmio_regions`]).
    fn mmio_read(&mut self, region: usize, offset: u64, size: usize) -> u64;
    fn mmio_write(&mut self, region: usize, offset: u64, size: usize, value: u64);

    /// Sets a string-typed configuration property. Only valid before realize.
    fn set_property(&mut self, name: &str, value: &str) -> Result<()>;

    fn connect_irq(&mut self, irq: Rc<dyn IrqLine>);

    /// Brings the device up. `system_memory` is the machine's main memory bus.
    fn realize(&mut self, system_memory: &SharedMemoryBus) -> Result<()>;

    fn reset(&mut self);
}
