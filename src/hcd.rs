//! Seam between the OTG wrapper and the USB host-controller core it fronts.
//!
//! The wrapper creates the core, links its DMA bus and interrupt line, forwards reset, and exposes
//! a window onto its registers. Everything else (transfer scheduling, descriptor walking) is the
//! core's business.

use std::rc::Rc;

use crate::error::HcdError;
use crate::irq::IrqLine;
use crate::memory::SharedMemoryBus;

/// Identity of the device a core plugs into its backend's USB bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbBusPort {
    pub device: &'static str,
}

pub trait HostControllerCore {
    fn mmio_read(&mut self, offset: u64, size: usize) -> u64;
    fn mmio_write(&mut self, offset: u64, size: usize, value: u64);

    /// Links the bus used for bus-master transfers. Must happen before [`Self::realize`].
    fn set_dma_target(&mut self, bus: SharedMemoryBus);

    fn connect_irq(&mut self, irq: Rc<dyn IrqLine>);

    fn realize(&mut self) -> Result<(), HcdError>;

    fn reset(&mut self);

    /// The device this core attaches to its backend's bus.
    fn usb_port(&self) -> UsbBusPort;
}
