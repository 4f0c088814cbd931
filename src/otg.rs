//! Apple Synopsys USB OTG controller.
//!
//! The controller exposes three MMIO windows, in this order:
//! - the USB 2.0 PHY control/status registers ([`PHY_REGS_SIZE`] bytes)
//! - the USB-control registers ([`USBCTL_REGS_SIZE`] bytes)
//! - an alias onto the DWC2 core's registers, sized by the `usb-device` node's `reg` property
//!
//! Both register files are raw storage. The only modeled behavior is the cable-connected bit in
//! `USB20PHY_OTGSIG`, preset at construction. USB traffic never passes through the wrapper: it
//! flows between the DWC2 core and whichever backend was selected at realize.

use std::rc::Rc;

use serde::Deserialize;

use crate::backend::{select_backend, HostBackend};
use crate::dma::{resolve_dma_target, DmaTarget};
use crate::dt::DtNode;
use crate::dwc2::Dwc2Core;
use crate::error::{OtgError, Result};
use crate::hcd::HostControllerCore;
use crate::irq::{IrqLine, PassthroughIrq};
use crate::memory::{all_ones, MmioHandler, SharedMemoryBus};
use crate::regs::{phy, PhyRegs, UsbCtlRegs, PHY_REGS_SIZE, USBCTL_REGS_SIZE};
use crate::snapshot::{
    IoSnapshot, SnapshotError, SnapshotReader, SnapshotResult, SnapshotVersion, SnapshotWriter,
};
use crate::sysbus::{MmioRegionInfo, SysBusDevice};

pub const TYPE_APPLE_OTG: &str = "apple.otg";
pub const APPLE_OTG_DESCRIPTION: &str = "Apple Synopsys USB OTG Controller";

/// Child of the OTG node describing the DWC2 core's register window.
pub const USB_DEVICE_NODE: &str = "usb-device";
const REG_PROP: &str = "reg";

const TAG_PHY: u16 = 1;
const TAG_USBCTL: u16 = 2;

/// Guest-visible configuration, fixed before realize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OtgConfig {
    /// Replay USB traffic from a fuzz input instead of relaying to a real device.
    #[serde(alias = "usbfuzz")]
    pub use_fuzz_backend: bool,
    /// Path of the fuzz input. Ignored unless `use_fuzz_backend` is set.
    #[serde(alias = "usbfuzz-input")]
    pub fuzz_input_source: Option<String>,
    /// Emit a `trace!` event for every register access.
    pub trace_mmio: bool,
}

impl OtgConfig {
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "use-fuzz-backend" | "usbfuzz" => self.use_fuzz_backend = parse_bool(name, value)?,
            "fuzz-input-source" | "usbfuzz-input" => {
                self.fuzz_input_source = (!value.is_empty()).then(|| value.to_owned());
            }
            "trace-mmio" => self.trace_mmio = parse_bool(name, value)?,
            _ => return Err(OtgError::UnknownProperty(name.to_owned())),
        }
        Ok(())
    }
}

fn parse_bool(property: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(OtgError::InvalidPropertyValue {
            property: property.to_owned(),
            value: value.to_owned(),
        }),
    }
}

/// The controller's MMIO windows, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtgRegion {
    Phy,
    UsbCtl,
    HostController,
}

impl OtgRegion {
    pub const ALL: [OtgRegion; 3] = [
        OtgRegion::Phy,
        OtgRegion::UsbCtl,
        OtgRegion::HostController,
    ];

    pub fn index(self) -> usize {
        match self {
            OtgRegion::Phy => 0,
            OtgRegion::UsbCtl => 1,
            OtgRegion::HostController => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            OtgRegion::Phy => "apple.otg.phy",
            OtgRegion::UsbCtl => "apple.otg.usbctl",
            OtgRegion::HostController => "apple.otg.dwc2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioAccessKind {
    Read,
    Write,
}

/// One register access, as reported to the trace hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioAccess {
    pub region: OtgRegion,
    pub kind: MmioAccessKind,
    pub offset: u64,
    pub size: usize,
    pub value: u64,
}

pub type MmioTraceHook = Box<dyn FnMut(&MmioAccess)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BringUp {
    Unrealized,
    Realized,
    Failed,
}

pub struct AppleOtg {
    config: OtgConfig,
    phy: PhyRegs,
    usbctl: UsbCtlRegs,
    hcd: Box<dyn HostControllerCore>,
    hcd_window: u64,
    dma_link: Option<SharedMemoryBus>,
    dma: Option<DmaTarget>,
    backend: Option<HostBackend>,
    irq: PassthroughIrq,
    trace_hook: Option<MmioTraceHook>,
    state: BringUp,
}

impl AppleOtg {
    /// Builds an unrealized controller around a fresh DWC2 core.
    ///
    /// `node` must have a `usb-device` child whose `reg` property holds an `(address, size)` pair
    /// of little-endian 64-bit cells; the size bounds the DWC2 alias window.
    pub fn create(node: &DtNode) -> Result<Self> {
        Self::with_core(node, Box::new(Dwc2Core::new()))
    }

    /// Like [`Self::create`], but fronting the given host-controller core.
    pub fn with_core(node: &DtNode, hcd: Box<dyn HostControllerCore>) -> Result<Self> {
        let hcd_window = hcd_window_size(node)?;

        let mut phy_regs = PhyRegs::new();
        phy_regs.set_bits_u32(phy::REG_OTGSIG, phy::OTGSIG_CABLE_CONNECTED);

        tracing::debug!(
            node = %node.name,
            hcd_window,
            "apple.otg created"
        );

        Ok(Self {
            config: OtgConfig::default(),
            phy: phy_regs,
            usbctl: UsbCtlRegs::new(),
            hcd,
            hcd_window,
            dma_link: None,
            dma: None,
            backend: None,
            irq: PassthroughIrq::new(),
            trace_hook: None,
            state: BringUp::Unrealized,
        })
    }

    pub fn config(&self) -> &OtgConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: OtgConfig) -> Result<()> {
        self.ensure_unrealized()?;
        self.config = config;
        Ok(())
    }

    /// Links the memory bus the DWC2 core masters into. When nothing is linked by realize, the
    /// controller aliases a fixed window of system memory instead.
    pub fn set_dma_memory_bus(&mut self, bus: Option<SharedMemoryBus>) -> Result<()> {
        self.ensure_unrealized()?;
        self.dma_link = bus;
        Ok(())
    }

    /// Installs (or removes) a hook observing every register access.
    pub fn set_trace_hook(&mut self, hook: Option<MmioTraceHook>) {
        self.trace_hook = hook;
    }

    pub fn is_realized(&self) -> bool {
        self.state == BringUp::Realized
    }

    pub fn phy_regs(&self) -> &PhyRegs {
        &self.phy
    }

    pub fn usbctl_regs(&self) -> &UsbCtlRegs {
        &self.usbctl
    }

    /// Size of the DWC2 alias window, from the hardware description.
    pub fn hcd_window_size(&self) -> u64 {
        self.hcd_window
    }

    pub fn dma_target(&self) -> Option<&DmaTarget> {
        self.dma.as_ref()
    }

    pub fn backend(&self) -> Option<&HostBackend> {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> Option<&mut HostBackend> {
        self.backend.as_mut()
    }

    pub fn host_controller(&self) -> &dyn HostControllerCore {
        self.hcd.as_ref()
    }

    pub fn host_controller_mut(&mut self) -> &mut dyn HostControllerCore {
        self.hcd.as_mut()
    }

    /// Current level of the controller's interrupt output.
    pub fn irq_level(&self) -> bool {
        self.irq.level()
    }

    pub fn connect_irq(&mut self, irq: Rc<dyn IrqLine>) {
        self.irq.connect(Some(irq));
    }

    pub fn mmio_regions(&self) -> [MmioRegionInfo; 3] {
        [
            MmioRegionInfo {
                name: OtgRegion::Phy.name(),
                size: PHY_REGS_SIZE as u64,
            },
            MmioRegionInfo {
                name: OtgRegion::UsbCtl.name(),
                size: USBCTL_REGS_SIZE as u64,
            },
            MmioRegionInfo {
                name: OtgRegion::HostController.name(),
                size: self.hcd_window,
            },
        ]
    }

    /// MMIO handler view of one of the controller's windows.
    pub fn mmio(&mut self, region: OtgRegion) -> OtgMmio<'_> {
        OtgMmio { otg: self, region }
    }

    pub fn read(&mut self, region: OtgRegion, offset: u64, size: usize) -> u64 {
        let value = match region {
            OtgRegion::Phy => {
                self.note_clipped(region, self.phy.contains(offset, size), offset, size);
                self.phy.read(offset, size)
            }
            OtgRegion::UsbCtl => {
                self.note_clipped(region, self.usbctl.contains(offset, size), offset, size);
                self.usbctl.read(offset, size)
            }
            OtgRegion::HostController => {
                if self.in_hcd_window(offset, size) {
                    self.hcd.mmio_read(offset, size)
                } else {
                    all_ones(size)
                }
            }
        };
        self.trace(MmioAccess {
            region,
            kind: MmioAccessKind::Read,
            offset,
            size,
            value,
        });
        value
    }

    pub fn write(&mut self, region: OtgRegion, offset: u64, size: usize, value: u64) {
        self.trace(MmioAccess {
            region,
            kind: MmioAccessKind::Write,
            offset,
            size,
            value,
        });
        match region {
            OtgRegion::Phy => {
                self.note_clipped(region, self.phy.contains(offset, size), offset, size);
                self.phy.write(offset, size, value);
            }
            OtgRegion::UsbCtl => {
                self.note_clipped(region, self.usbctl.contains(offset, size), offset, size);
                self.usbctl.write(offset, size, value);
            }
            OtgRegion::HostController => {
                if self.in_hcd_window(offset, size) {
                    self.hcd.mmio_write(offset, size, value);
                }
            }
        }
    }

    /// Brings up the DMA link, the DWC2 core and the selected backend, in that order.
    ///
    /// The backend configuration is validated before the core is touched. Any failure is
    /// terminal: no backend is committed and the controller refuses further realize attempts.
    /// Once the core has been handed a DMA target the controller keeps owning it, even if a later
    /// step fails.
    pub fn realize(&mut self, system_memory: &SharedMemoryBus) -> Result<()> {
        match self.state {
            BringUp::Realized => return Err(OtgError::AlreadyRealized),
            BringUp::Failed => return Err(OtgError::BringUpFailed),
            BringUp::Unrealized => {}
        }

        match self.bring_up(system_memory) {
            Ok(backend) => {
                tracing::debug!(
                    backend = ?backend.kind(),
                    dma_fallback = self.dma.as_ref().is_some_and(DmaTarget::is_fallback),
                    "apple.otg realized"
                );
                self.backend = Some(backend);
                self.state = BringUp::Realized;
                Ok(())
            }
            Err(err) => {
                self.state = BringUp::Failed;
                Err(err)
            }
        }
    }

    fn bring_up(&mut self, system_memory: &SharedMemoryBus) -> Result<HostBackend> {
        let mut backend = select_backend(
            self.config.use_fuzz_backend,
            self.config.fuzz_input_source.as_deref(),
        )?;

        let dma = resolve_dma_target(self.dma_link.clone(), system_memory);
        self.hcd.set_dma_target(dma.bus());
        self.dma = Some(dma);
        self.hcd.realize()?;
        self.hcd.connect_irq(Rc::new(self.irq.clone()));

        let b = backend.as_backend_mut();
        b.realize()?;

        let bus = b.bus_mut();
        bus.attach(self.hcd.usb_port())?;
        bus.realize_attachment()?;

        Ok(backend)
    }

    /// Resets the DWC2 core, then the backend.
    ///
    /// The PHY and USB-control register files are left as the guest last wrote them, and the
    /// cable-connected bit is not re-asserted: it is only preset at construction.
    pub fn reset(&mut self) {
        self.hcd.reset();
        if let Some(backend) = self.backend.as_mut() {
            backend.as_backend_mut().reset();
        }
        tracing::debug!("apple.otg reset");
    }

    fn ensure_unrealized(&self) -> Result<()> {
        if self.state != BringUp::Unrealized {
            return Err(OtgError::ConfigAfterRealize);
        }
        Ok(())
    }

    fn in_hcd_window(&self, offset: u64, size: usize) -> bool {
        offset
            .checked_add(size as u64)
            .is_some_and(|end| end <= self.hcd_window)
    }

    fn note_clipped(&self, region: OtgRegion, in_range: bool, offset: u64, size: usize) {
        if !in_range {
            tracing::debug!(
                region = region.name(),
                offset,
                size,
                "register access clipped at end of window"
            );
        }
    }

    fn trace(&mut self, access: MmioAccess) {
        if self.config.trace_mmio {
            tracing::trace!(
                region = access.region.name(),
                kind = ?access.kind,
                offset = access.offset,
                size = access.size,
                value = access.value,
                "apple.otg mmio"
            );
        }
        if let Some(hook) = self.trace_hook.as_mut() {
            hook(&access);
        }
    }
}

impl std::fmt::Debug for AppleOtg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppleOtg")
            .field("config", &self.config)
            .field("phy", &self.phy)
            .field("usbctl", &self.usbctl)
            .field("hcd_window", &format_args!("{:#x}", self.hcd_window))
            .field("dma", &self.dma)
            .field("backend", &self.backend)
            .field("irq_level", &self.irq.level())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn hcd_window_size(node: &DtNode) -> Result<u64> {
    let child = node
        .child(USB_DEVICE_NODE)
        .ok_or_else(|| OtgError::MissingNode {
            parent: node.name.clone(),
            child: USB_DEVICE_NODE,
        })?;
    let reg = child.prop(REG_PROP).ok_or_else(|| OtgError::MissingProperty {
        node: child.name.clone(),
        property: REG_PROP,
    })?;
    reg.u64_cell(1).ok_or_else(|| OtgError::InvalidProperty {
        node: child.name.clone(),
        property: REG_PROP,
        reason: "expected an (address, size) pair of 64-bit cells",
    })
}

/// [`MmioHandler`] for one of an [`AppleOtg`]'s windows.
pub struct OtgMmio<'a> {
    otg: &'a mut AppleOtg,
    region: OtgRegion,
}

impl MmioHandler for OtgMmio<'_> {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        self.otg.read(self.region, offset, size)
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        self.otg.write(self.region, offset, size, value)
    }
}

impl IoSnapshot for AppleOtg {
    const DEVICE_ID: [u8; 4] = *b"AOTG";
    const DEVICE_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

    fn save_state(&self) -> Vec<u8> {
        let mut w = SnapshotWriter::new(Self::DEVICE_ID, Self::DEVICE_VERSION);
        w.field_bytes(TAG_PHY, self.phy.as_bytes().to_vec());
        w.field_bytes(TAG_USBCTL, self.usbctl.as_bytes().to_vec());
        w.finish()
    }

    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()> {
        let r = SnapshotReader::parse(bytes, Self::DEVICE_ID)?;
        r.ensure_device_major(Self::DEVICE_VERSION.major)?;

        // Validate everything before touching live state.
        let mut phy = self.phy.clone();
        if let Some(buf) = r.bytes(TAG_PHY) {
            if !phy.load(buf) {
                return Err(SnapshotError::InvalidFieldEncoding("phy register file length"));
            }
        }
        let mut usbctl = self.usbctl.clone();
        if let Some(buf) = r.bytes(TAG_USBCTL) {
            if !usbctl.load(buf) {
                return Err(SnapshotError::InvalidFieldEncoding(
                    "usbctl register file length",
                ));
            }
        }

        self.phy = phy;
        self.usbctl = usbctl;
        Ok(())
    }
}

impl SysBusDevice for AppleOtg {
    fn description(&self) -> &'static str {
        APPLE_OTG_DESCRIPTION
    }

    fn mmio_regions(&self) -> Vec<MmioRegionInfo> {
        AppleOtg::mmio_regions(self).to_vec()
    }

    fn mmio_read(&mut self, region: usize, offset: u64, size: usize) -> u64 {
        match OtgRegion::from_index(region) {
            Some(region) => self.read(region, offset, size),
            None => all_ones(size),
        }
    }

    fn mmio_write(&mut self, region: usize, offset: u64, size: usize, value: u64) {
        if let Some(region) = OtgRegion::from_index(region) {
            self.write(region, offset, size, value);
        }
    }

    fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        self.ensure_unrealized()?;
        self.config.set_property(name, value)
    }

    fn connect_irq(&mut self, irq: Rc<dyn IrqLine>) {
        AppleOtg::connect_irq(self, irq);
    }

    fn realize(&mut self, system_memory: &SharedMemoryBus) -> Result<()> {
        AppleOtg::realize(self, system_memory)
    }

    fn reset(&mut self) {
        AppleOtg::reset(self);
    }
}
