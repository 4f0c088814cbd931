//! Fuzz-replay backend: feeds the core device responses taken from a fuzz input file.
//!
//! The input is loaded once at realize. Reset rewinds replay to the start of the input so a
//! guest-initiated bus reset replays the same stimulus.

use std::fs;
use std::path::{Path, PathBuf};

use super::{BackendKind, UsbBus, UsbHostBackend};
use crate::error::BackendError;

#[derive(Debug)]
pub struct FuzzHostBackend {
    bus: UsbBus,
    input: Option<PathBuf>,
    data: Vec<u8>,
    cursor: usize,
    realized: bool,
}

impl FuzzHostBackend {
    pub fn new() -> Self {
        Self {
            bus: UsbBus::new("usb-fuzz-host.0"),
            input: None,
            data: Vec::new(),
            cursor: 0,
            realized: false,
        }
    }

    /// Sets the replay source. Takes effect at realize.
    pub fn set_input(&mut self, path: impl Into<PathBuf>) {
        self.input = Some(path.into());
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn input_len(&self) -> usize {
        self.data.len()
    }

    /// Returns up to `len` bytes of replay data, or `None` once the input is exhausted.
    pub fn next_input(&mut self, len: usize) -> Result<Option<&[u8]>, BackendError> {
        if !self.realized {
            return Err(BackendError::NotRealized);
        }
        if self.cursor >= self.data.len() {
            return Ok(None);
        }
        let end = self.cursor.saturating_add(len).min(self.data.len());
        let chunk = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(Some(chunk))
    }
}

impl Default for FuzzHostBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbHostBackend for FuzzHostBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fuzz
    }

    fn realize(&mut self) -> Result<(), BackendError> {
        // `select_backend` rejects a missing input before we get here; an empty path still fails
        // below as an unreadable file.
        let path = self.input.clone().unwrap_or_default();
        let data = fs::read(&path).map_err(|source| BackendError::FuzzInput {
            path: path.clone(),
            source,
        })?;
        if data.is_empty() {
            return Err(BackendError::EmptyFuzzInput { path });
        }

        tracing::debug!(path = %path.display(), len = data.len(), "usb fuzz input loaded");
        self.data = data;
        self.cursor = 0;
        self.realized = true;
        Ok(())
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn bus(&self) -> &UsbBus {
        &self.bus
    }

    fn bus_mut(&mut self) -> &mut UsbBus {
        &mut self.bus
    }
}
