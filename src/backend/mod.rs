//! USB host backends: what the host-controller core talks to downstream.
//!
//! Exactly one backend exists per controller. [`HostBackend`] is a two-case tagged enum; each case
//! owns its backend and is only reached through the active variant.

pub mod fuzz;
pub mod network;

use crate::error::{BackendError, OtgError};
use crate::hcd::UsbBusPort;

pub use fuzz::FuzzHostBackend;
pub use network::{NetworkHostBackend, RelayState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Network,
    Fuzz,
}

/// A single-port USB bus owned by a backend. The host-controller core is its only device.
#[derive(Debug)]
pub struct UsbBus {
    name: &'static str,
    attached: Option<UsbBusPort>,
    realized: bool,
}

impl UsbBus {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attached: None,
            realized: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn attached(&self) -> Option<UsbBusPort> {
        self.attached
    }

    /// Whether the attached device has been realized on this bus.
    pub fn is_realized(&self) -> bool {
        self.realized
    }

    pub fn attach(&mut self, port: UsbBusPort) -> Result<(), BackendError> {
        if let Some(existing) = self.attached {
            return Err(BackendError::BusOccupied {
                bus: self.name,
                device: existing.device,
            });
        }
        self.attached = Some(port);
        Ok(())
    }

    pub fn realize_attachment(&mut self) -> Result<(), BackendError> {
        if self.attached.is_none() {
            return Err(BackendError::NothingAttached(self.name));
        }
        self.realized = true;
        Ok(())
    }
}

pub trait UsbHostBackend {
    fn kind(&self) -> BackendKind;

    fn realize(&mut self) -> Result<(), BackendError>;

    fn reset(&mut self);

    fn bus(&self) -> &UsbBus;
    fn bus_mut(&mut self) -> &mut UsbBus;
}

#[derive(Debug)]
pub enum HostBackend {
    Network(NetworkHostBackend),
    Fuzz(FuzzHostBackend),
}

impl HostBackend {
    pub fn kind(&self) -> BackendKind {
        self.as_backend().kind()
    }

    pub fn as_backend(&self) -> &dyn UsbHostBackend {
        match self {
            HostBackend::Network(b) => b,
            HostBackend::Fuzz(b) => b,
        }
    }

    pub fn as_backend_mut(&mut self) -> &mut dyn UsbHostBackend {
        match self {
            HostBackend::Network(b) => b,
            HostBackend::Fuzz(b) => b,
        }
    }

    pub fn as_network(&self) -> Option<&NetworkHostBackend> {
        match self {
            HostBackend::Network(b) => Some(b),
            HostBackend::Fuzz(_) => None,
        }
    }

    pub fn as_fuzz(&self) -> Option<&FuzzHostBackend> {
        match self {
            HostBackend::Fuzz(b) => Some(b),
            HostBackend::Network(_) => None,
        }
    }

    pub fn as_fuzz_mut(&mut self) -> Option<&mut FuzzHostBackend> {
        match self {
            HostBackend::Fuzz(b) => Some(b),
            HostBackend::Network(_) => None,
        }
    }
}

/// Instantiates the backend selected by the controller's configuration.
///
/// The fuzz backend needs a replay source; an absent or empty `fuzz_input` is a configuration
/// error. The input is ignored when the network backend is selected.
pub fn select_backend(
    use_fuzz: bool,
    fuzz_input: Option<&str>,
) -> Result<HostBackend, OtgError> {
    if !use_fuzz {
        return Ok(HostBackend::Network(NetworkHostBackend::new()));
    }

    let input = fuzz_input
        .filter(|s| !s.is_empty())
        .ok_or(OtgError::MissingFuzzInput)?;
    let mut backend = FuzzHostBackend::new();
    backend.set_input(input);
    Ok(HostBackend::Fuzz(backend))
}
