use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::snapshot::SnapshotError;

pub type Result<T> = std::result::Result<T, OtgError>;

/// Errors surfaced while constructing, configuring or bringing up an [`crate::AppleOtg`].
///
/// Construction and configuration errors are fatal to the enclosing machine; downstream bring-up
/// failures are wrapped transparently so the underlying component's message is preserved.
#[derive(Debug, Error)]
pub enum OtgError {
    #[error("hardware description node `{parent}` has no `{child}` child")]
    MissingNode { parent: String, child: &'static str },

    #[error("hardware description node `{node}` has no `{property}` property")]
    MissingProperty { node: String, property: &'static str },

    #[error("hardware description property `{node}.{property}` is invalid: {reason}")]
    InvalidProperty {
        node: String,
        property: &'static str,
        reason: &'static str,
    },

    #[error("fuzz backend selected but no fuzz input source was configured")]
    MissingFuzzInput,

    #[error("unknown device property `{0}`")]
    UnknownProperty(String),

    #[error("invalid value `{value}` for device property `{property}`")]
    InvalidPropertyValue { property: String, value: String },

    #[error("device properties cannot change after realize")]
    ConfigAfterRealize,

    #[error("device is already realized")]
    AlreadyRealized,

    #[error("a previous bring-up of this device failed")]
    BringUpFailed,

    #[error("unknown device type `{0}`")]
    UnknownDeviceType(String),

    #[error("device type `{0}` is already registered")]
    DuplicateDeviceType(&'static str),

    #[error(transparent)]
    HostController(#[from] HcdError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Failures reported by a USB host backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to read fuzz input `{}`: {source}", path.display())]
    FuzzInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("fuzz input `{}` is empty", path.display())]
    EmptyFuzzInput { path: PathBuf },

    #[error("USB bus `{bus}` already has `{device}` attached")]
    BusOccupied { bus: &'static str, device: &'static str },

    #[error("USB bus `{0}` has no attached device to realize")]
    NothingAttached(&'static str),

    #[error("backend is not realized")]
    NotRealized,
}

/// Failures reported by the host-controller core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HcdError {
    #[error("host controller has no DMA target")]
    NoDmaTarget,

    #[error("host controller is already realized")]
    AlreadyRealized,

    #[error("host controller bring-up failed: {0}")]
    BringUp(String),
}
