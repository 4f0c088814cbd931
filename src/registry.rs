//! Explicit device-type registry.
//!
//! The platform builds a registry once during machine initialization and registers the device
//! types it supports; nothing is registered implicitly at load time.

use std::collections::BTreeMap;

use crate::dt::DtNode;
use crate::error::{OtgError, Result};
use crate::otg::{AppleOtg, APPLE_OTG_DESCRIPTION, TYPE_APPLE_OTG};
use crate::sysbus::SysBusDevice;

pub type DeviceFactory = fn(&DtNode) -> Result<Box<dyn SysBusDevice>>;

#[derive(Clone, Copy)]
pub struct DeviceTypeInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub create: DeviceFactory,
}

impl std::fmt::Debug for DeviceTypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceTypeInfo")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    types: BTreeMap<&'static str, DeviceTypeInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: DeviceTypeInfo) -> Result<()> {
        if self.types.contains_key(info.name) {
            return Err(OtgError::DuplicateDeviceType(info.name));
        }
        self.types.insert(info.name, info);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DeviceTypeInfo> {
        self.types.get(name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }

    pub fn create(&self, name: &str, node: &DtNode) -> Result<Box<dyn SysBusDevice>> {
        let info = self
            .get(name)
            .ok_or_else(|| OtgError::UnknownDeviceType(name.to_owned()))?;
        (info.create)(node)
    }
}

fn create_apple_otg(node: &DtNode) -> Result<Box<dyn SysBusDevice>> {
    Ok(Box::new(AppleOtg::create(node)?))
}

/// Registers the `apple.otg` device type.
pub fn register_apple_otg(registry: &mut DeviceRegistry) -> Result<()> {
    registry.register(DeviceTypeInfo {
        name: TYPE_APPLE_OTG,
        description: APPLE_OTG_DESCRIPTION,
        create: create_apple_otg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dt::DtProp;

    fn otg_node() -> DtNode {
        DtNode::new("otgphyctrl").with_child(
            DtNode::new("usb-device").with_prop(DtProp::from_u64_cells("reg", &[0, 0x1000])),
        )
    }

    #[test]
    fn new_registry_is_empty() {
        let registry = DeviceRegistry::new();
        assert_eq!(registry.type_names().count(), 0);
        assert!(matches!(
            registry.create(TYPE_APPLE_OTG, &otg_node()),
            Err(OtgError::UnknownDeviceType(_))
        ));
    }

    #[test]
    fn registered_type_creates_devices() {
        let mut registry = DeviceRegistry::new();
        register_apple_otg(&mut registry).unwrap();

        assert_eq!(registry.type_names().collect::<Vec<_>>(), vec!["apple.otg"]);
        let dev = registry.create("apple.otg", &otg_node()).unwrap();
        assert_eq!(dev.description(), "Apple Synopsys USB OTG Controller");
        assert_eq!(dev.mmio_regions().len(), 3);
        assert_eq!(dev.mmio_regions()[2].size, 0x1000);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = DeviceRegistry::new();
        register_apple_otg(&mut registry).unwrap();
        assert!(matches!(
            register_apple_otg(&mut registry),
            Err(OtgError::DuplicateDeviceType("apple.otg"))
        ));
    }

    #[test]
    fn construction_errors_propagate_through_factory() {
        let mut registry = DeviceRegistry::new();
        register_apple_otg(&mut registry).unwrap();
        assert!(matches!(
            registry.create("apple.otg", &DtNode::new("otgphyctrl")),
            Err(OtgError::MissingNode {
                child: "usb-device",
                ..
            })
        ));
    }
}
