//! Minimal Synopsys DWC2 core model used as the default host-controller core.
//!
//! Only the pieces the OTG wrapper interacts with are modeled: a register file with a power-on
//! image, the global interrupt status/mask pair driving the interrupt line, and the DMA/IRQ links.

use std::rc::Rc;

use crate::error::HcdError;
use crate::hcd::{HostControllerCore, UsbBusPort};
use crate::irq::IrqLine;
use crate::memory::SharedMemoryBus;

/// Size of the DWC2 register space (core registers, host channels, FIFO windows).
pub const DWC2_MMIO_SIZE: u64 = 0x2_0000;

pub mod regs {
    pub const GOTGCTL: u64 = 0x000;
    pub const GAHBCFG: u64 = 0x008;
    pub const GUSBCFG: u64 = 0x00C;
    pub const GRSTCTL: u64 = 0x010;
    pub const GINTSTS: u64 = 0x014;
    pub const GINTMSK: u64 = 0x018;
    pub const GSNPSID: u64 = 0x040;

    pub const GAHBCFG_GLBL_INTR_EN: u32 = 1 << 0;
    pub const GINTSTS_CURMODE_HOST: u32 = 1 << 0;
    pub const GINTSTS_SOF: u32 = 1 << 3;
    pub const GINTSTS_PORT: u32 = 1 << 24;

    /// "OT" + core release 2.94a.
    pub const GSNPSID_VALUE: u32 = 0x4F54_294A;
}

pub struct Dwc2Core {
    regs: Vec<u8>,
    dma: Option<SharedMemoryBus>,
    irq: Option<Rc<dyn IrqLine>>,
    realized: bool,
}

impl Dwc2Core {
    pub fn new() -> Self {
        let mut core = Self {
            regs: vec![0; DWC2_MMIO_SIZE as usize],
            dma: None,
            irq: None,
            realized: false,
        };
        core.power_on();
        core
    }

    pub fn is_realized(&self) -> bool {
        self.realized
    }

    /// Latches interrupt causes in GINTSTS (e.g. port change reported by the backend).
    pub fn raise_interrupt(&mut self, causes: u32) {
        let sts = self.reg32(regs::GINTSTS) | causes;
        self.set_reg32(regs::GINTSTS, sts);
        self.update_irq();
    }

    pub fn irq_level(&self) -> bool {
        let global = self.reg32(regs::GAHBCFG) & regs::GAHBCFG_GLBL_INTR_EN != 0;
        let pending = self.reg32(regs::GINTSTS) & self.reg32(regs::GINTMSK);
        // CURMODE is a status bit, never an interrupt cause.
        global && (pending & !regs::GINTSTS_CURMODE_HOST) != 0
    }

    fn power_on(&mut self) {
        self.regs.fill(0);
        self.set_reg32(regs::GSNPSID, regs::GSNPSID_VALUE);
        self.set_reg32(regs::GINTSTS, regs::GINTSTS_CURMODE_HOST);
    }

    fn update_irq(&self) {
        if let Some(irq) = self.irq.as_ref() {
            irq.set_level(self.irq_level());
        }
    }

    fn reg32(&self, offset: u64) -> u32 {
        let o = offset as usize;
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.regs[o..o + 4]);
        u32::from_le_bytes(b)
    }

    fn set_reg32(&mut self, offset: u64, value: u32) {
        let o = offset as usize;
        self.regs[o..o + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn in_range(offset: u64, size: usize) -> bool {
        offset
            .checked_add(size as u64)
            .is_some_and(|end| end <= DWC2_MMIO_SIZE)
    }
}

impl Default for Dwc2Core {
    fn default() -> Self {
        Self::new()
    }
}

impl HostControllerCore for Dwc2Core {
    fn mmio_read(&mut self, offset: u64, size: usize) -> u64 {
        if size == 0 || size > 8 || !Self::in_range(offset, size) {
            return 0;
        }
        let o = offset as usize;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&self.regs[o..o + size]);
        u64::from_le_bytes(buf)
    }

    fn mmio_write(&mut self, offset: u64, size: usize, value: u64) {
        if size == 0 || size > 8 || !Self::in_range(offset, size) {
            return;
        }

        match (offset, size) {
            (regs::GINTSTS, 4) => {
                // Write-1-to-clear; CURMODE is read-only.
                let clear = (value as u32) & !regs::GINTSTS_CURMODE_HOST;
                let sts = self.reg32(regs::GINTSTS) & !clear;
                self.set_reg32(regs::GINTSTS, sts);
            }
            (regs::GSNPSID, 4) => {}
            _ => {
                let o = offset as usize;
                self.regs[o..o + size].copy_from_slice(&value.to_le_bytes()[..size]);
            }
        }
        self.update_irq();
    }

    fn set_dma_target(&mut self, bus: SharedMemoryBus) {
        self.dma = Some(bus);
    }

    fn connect_irq(&mut self, irq: Rc<dyn IrqLine>) {
        irq.set_level(self.irq_level());
        self.irq = Some(irq);
    }

    fn realize(&mut self) -> Result<(), HcdError> {
        if self.realized {
            return Err(HcdError::AlreadyRealized);
        }
        if self.dma.is_none() {
            return Err(HcdError::NoDmaTarget);
        }
        self.realized = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.power_on();
        self.update_irq();
    }

    fn usb_port(&self) -> UsbBusPort {
        UsbBusPort { device: "dwc2" }
    }
}
