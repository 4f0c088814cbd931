//! Network-relay backend: forwards the core's USB traffic to a real device on another host.
//!
//! The relay protocol runs on its own schedule inside the backend. The OTG wrapper only creates
//! the backend, plugs the core into its bus and forwards reset.

use super::{BackendKind, UsbBus, UsbHostBackend};
use crate::error::BackendError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Created but not yet realized.
    Idle,
    /// Realized; waiting for (or serving) a remote device.
    Listening,
}

#[derive(Debug)]
pub struct NetworkHostBackend {
    bus: UsbBus,
    state: RelayState,
    resets: u32,
}

impl NetworkHostBackend {
    pub fn new() -> Self {
        Self {
            bus: UsbBus::new("usb-tcp-host.0"),
            state: RelayState::Idle,
            resets: 0,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Number of times the relay session has been dropped by a bus reset.
    pub fn resets(&self) -> u32 {
        self.resets
    }
}

impl Default for NetworkHostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbHostBackend for NetworkHostBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Network
    }

    fn realize(&mut self) -> Result<(), BackendError> {
        self.state = RelayState::Listening;
        Ok(())
    }

    fn reset(&mut self) {
        self.resets = self.resets.wrapping_add(1);
    }

    fn bus(&self) -> &UsbBus {
        &self.bus
    }

    fn bus_mut(&mut self) -> &mut UsbBus {
        &mut self.bus
    }
}
