//! Raw register files backing the OTG wrapper's two MMIO windows.
//!
//! Neither window decodes fields: the guest driver only needs its writes to read back, plus the
//! cable-connected status bit that is preset at construction. The named PHY offsets below are
//! documentation for tests and traces.

/// Size of the USB 2.0 PHY control/status window.
pub const PHY_REGS_SIZE: usize = 0x20;
/// Size of the opaque USB-control window.
pub const USBCTL_REGS_SIZE: usize = 0x1000;

pub mod phy {
    pub const REG_CTL: u64 = 0x00;
    pub const REG_OTGSIG: u64 = 0x04;
    pub const REG_CFG0: u64 = 0x08;
    pub const REG_CFG1: u64 = 0x0C;
    pub const REG_BATCTL: u64 = 0x10;
    pub const REG_TEST: u64 = 0x1C;

    /// OTGSIG bit 8: VBUS/cable present.
    pub const OTGSIG_CABLE_CONNECTED: u32 = 1 << 8;
}

/// A named register inside the PHY window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyField {
    pub name: &'static str,
    pub offset: u64,
    pub width: usize,
}

pub const PHY_FIELDS: [PhyField; 6] = [
    PhyField {
        name: "USB20PHY_CTL",
        offset: phy::REG_CTL,
        width: 4,
    },
    PhyField {
        name: "USB20PHY_OTGSIG",
        offset: phy::REG_OTGSIG,
        width: 4,
    },
    PhyField {
        name: "USB20PHY_CFG0",
        offset: phy::REG_CFG0,
        width: 4,
    },
    PhyField {
        name: "USB20PHY_CFG1",
        offset: phy::REG_CFG1,
        width: 4,
    },
    PhyField {
        name: "USB20PHY_BATCTL",
        offset: phy::REG_BATCTL,
        width: 4,
    },
    PhyField {
        name: "USB20PHY_TEST",
        offset: phy::REG_TEST,
        width: 4,
    },
];

/// Looks up the named PHY register at `offset`, if any.
pub fn phy_field_at(offset: u64) -> Option<&'static PhyField> {
    PHY_FIELDS.iter().find(|f| f.offset == offset)
}

/// Fixed-size byte-addressed register storage.
///
/// Accesses are little-endian copies of the low `size` bytes. Accesses that run past the end of
/// the block are clipped: the in-range bytes are transferred, the rest are dropped on write and
/// read back as zero.
#[derive(Clone, PartialEq, Eq)]
pub struct RegisterBlock<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> RegisterBlock<N> {
    pub const SIZE: usize = N;

    pub fn new() -> Self {
        Self { bytes: [0; N] }
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Replaces the whole block. Returns `false` (leaving the block untouched) on length mismatch.
    pub fn load(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() != N {
            return false;
        }
        self.bytes.copy_from_slice(bytes);
        true
    }

    /// Whether an access of `size` bytes at `offset` lies entirely inside the block.
    pub fn contains(&self, offset: u64, size: usize) -> bool {
        offset
            .checked_add(size as u64)
            .is_some_and(|end| end <= N as u64)
    }

    pub fn read(&self, offset: u64, size: usize) -> u64 {
        if size == 0 || size > 8 {
            return 0;
        }
        let mut buf = [0u8; 8];
        for (i, b) in buf.iter_mut().take(size).enumerate() {
            if let Some(src) = self.byte_index(offset, i) {
                *b = self.bytes[src];
            }
        }
        u64::from_le_bytes(buf)
    }

    pub fn write(&mut self, offset: u64, size: usize, value: u64) {
        if size == 0 || size > 8 {
            return;
        }
        for (i, b) in value.to_le_bytes().iter().take(size).enumerate() {
            if let Some(dst) = self.byte_index(offset, i) {
                self.bytes[dst] = *b;
            }
        }
    }

    pub fn read_u32(&self, offset: u64) -> u32 {
        self.read(offset, 4) as u32
    }

    /// ORs `mask` into the 32-bit register at `offset`.
    pub fn set_bits_u32(&mut self, offset: u64, mask: u32) {
        let value = self.read_u32(offset) | mask;
        self.write(offset, 4, u64::from(value));
    }

    fn byte_index(&self, offset: u64, i: usize) -> Option<usize> {
        let idx = usize::try_from(offset.checked_add(i as u64)?).ok()?;
        (idx < N).then_some(idx)
    }
}

impl<const N: usize> Default for RegisterBlock<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for RegisterBlock<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let nonzero = self.bytes.iter().filter(|&&b| b != 0).count();
        f.debug_struct("RegisterBlock")
            .field("size", &N)
            .field("nonzero_bytes", &nonzero)
            .finish()
    }
}

pub type PhyRegs = RegisterBlock<PHY_REGS_SIZE>;
pub type UsbCtlRegs = RegisterBlock<USBCTL_REGS_SIZE>;
