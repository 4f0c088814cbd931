#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use aero_otg::dt::{DtNode, DtProp};
use aero_otg::hcd::{HostControllerCore, UsbBusPort};
use aero_otg::irq::IrqLine;
use aero_otg::memory::{MemoryBus, SharedMemoryBus};
use aero_otg::HcdError;

/// Default DWC2 alias window used by most tests.
pub const HCD_WINDOW: u64 = 0x1_0000;

/// Sparse byte-addressed memory; unwritten bytes read as zero.
///
/// Sparse so the fallback DMA window at 32 GiB can be exercised without allocating it.
#[derive(Default)]
pub struct TestMemory {
    bytes: HashMap<u64, u8>,
    pub writes: Vec<(u64, Vec<u8>)>,
}

impl TestMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> (Rc<RefCell<TestMemory>>, SharedMemoryBus) {
        let mem = Rc::new(RefCell::new(TestMemory::new()));
        let bus: SharedMemoryBus = mem.clone();
        (mem, bus)
    }

    pub fn byte(&self, addr: u64) -> u8 {
        self.bytes.get(&addr).copied().unwrap_or(0)
    }
}

impl MemoryBus for TestMemory {
    fn read_physical(&mut self, paddr: u64, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().enumerate() {
            *b = self.byte(paddr + i as u64);
        }
    }

    fn write_physical(&mut self, paddr: u64, buf: &[u8]) {
        for (i, b) in buf.iter().enumerate() {
            self.bytes.insert(paddr + i as u64, *b);
        }
        self.writes.push((paddr, buf.to_vec()));
    }
}

/// Interrupt line that records every level it is driven to.
#[derive(Default)]
pub struct RecordingIrq {
    pub levels: RefCell<Vec<bool>>,
}

impl RecordingIrq {
    pub fn last(&self) -> Option<bool> {
        self.levels.borrow().last().copied()
    }
}

impl IrqLine for RecordingIrq {
    fn set_level(&self, level: bool) {
        self.levels.borrow_mut().push(level);
    }
}

/// OTG node whose `usb-device` child declares a DWC2 window of `size` bytes.
pub fn otg_node(size: u64) -> DtNode {
    DtNode::new("otgphyctrl").with_child(
        DtNode::new("usb-device").with_prop(DtProp::from_u64_cells("reg", &[0x3_9000_0000, size])),
    )
}

/// Shared log of calls made into a [`FakeCore`].
pub type CallLog = Rc<RefCell<Vec<&'static str>>>;

/// Scriptable host-controller core.
///
/// Writing a non-zero value to offset 0 raises its interrupt; writing zero lowers it.
pub struct FakeCore {
    pub log: CallLog,
    pub fail_realize: Option<HcdError>,
    pub dma: Rc<RefCell<Option<SharedMemoryBus>>>,
    irq: Option<Rc<dyn IrqLine>>,
    regs: [u8; 0x100],
}

impl FakeCore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_realize: None,
            dma: Rc::new(RefCell::new(None)),
            irq: None,
            regs: [0; 0x100],
        }
    }

    pub fn failing(log: CallLog, err: HcdError) -> Self {
        Self {
            fail_realize: Some(err),
            ..Self::new(log)
        }
    }
}

impl HostControllerCore for FakeCore {
    fn mmio_read(&mut self, offset: u64, size: usize) -> u64 {
        let o = offset as usize;
        let mut buf = [0u8; 8];
        if o + size <= self.regs.len() {
            buf[..size].copy_from_slice(&self.regs[o..o + size]);
        }
        u64::from_le_bytes(buf)
    }

    fn mmio_write(&mut self, offset: u64, size: usize, value: u64) {
        let o = offset as usize;
        if o + size <= self.regs.len() {
            self.regs[o..o + size].copy_from_slice(&value.to_le_bytes()[..size]);
        }
        if offset == 0 {
            if let Some(irq) = self.irq.as_ref() {
                irq.set_level(value != 0);
            }
        }
    }

    fn set_dma_target(&mut self, bus: SharedMemoryBus) {
        self.log.borrow_mut().push("set_dma_target");
        *self.dma.borrow_mut() = Some(bus);
    }

    fn connect_irq(&mut self, irq: Rc<dyn IrqLine>) {
        self.log.borrow_mut().push("connect_irq");
        self.irq = Some(irq);
    }

    fn realize(&mut self) -> Result<(), HcdError> {
        self.log.borrow_mut().push("realize");
        match self.fail_realize.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.log.borrow_mut().push("reset");
    }

    fn usb_port(&self) -> UsbBusPort {
        UsbBusPort { device: "fake-hcd" }
    }
}

/// In-memory sink for `tracing` output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs `f` with a subscriber writing WARN-and-above events into the returned buffer.
pub fn capture_warnings<R>(f: impl FnOnce() -> R) -> (R, String) {
    let buf = LogBuffer::default();
    let writer = buf.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, buf.contents())
}
