//! Apple Synopsys USB OTG controller front-end.
//!
//! The OTG block on Apple SoCs is a thin wrapper around a Synopsys DWC2 host-controller core: a
//! small PHY control/status register file, an opaque USB-control register file, and an alias
//! window onto the DWC2 register space. This crate models that wrapper and wires the DWC2 core to
//! one of two USB host backends (a network relay to a real device, or a fuzz-input replayer).
//!
//! Entry points:
//! - [`otg::AppleOtg::create`] builds a controller from a hardware-description node.
//! - [`registry::register_apple_otg`] adds the device type to a [`registry::DeviceRegistry`].
#![forbid(unsafe_code)]

pub mod backend;
pub mod dma;
pub mod dt;
pub mod dwc2;
pub mod error;
pub mod hcd;
pub mod irq;
pub mod memory;
pub mod otg;
pub mod registry;
pub mod regs;
pub mod snapshot;
pub mod sysbus;

pub use error::{BackendError, HcdError, OtgError, Result};
pub use otg::{AppleOtg, OtgConfig, OtgRegion};
pub use registry::{register_apple_otg, DeviceRegistry};
