//! In-memory hardware-description tree.
//!
//! Parsing the firmware device tree is the platform's job; devices only see already-built nodes
//! and look up children and raw property bytes by name.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtProp {
    pub name: String,
    pub value: Vec<u8>,
}

impl DtProp {
    pub fn new(name: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Builds a property from little-endian 64-bit cells.
    pub fn from_u64_cells(name: impl Into<String>, cells: &[u64]) -> Self {
        let value = cells.iter().flat_map(|c| c.to_le_bytes()).collect();
        Self::new(name, value)
    }

    /// Returns the `index`th little-endian 64-bit cell, if the property is long enough.
    pub fn u64_cell(&self, index: usize) -> Option<u64> {
        let start = index.checked_mul(8)?;
        let bytes = self.value.get(start..start.checked_add(8)?)?;
        let mut cell = [0u8; 8];
        cell.copy_from_slice(bytes);
        Some(u64::from_le_bytes(cell))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DtNode {
    pub name: String,
    pub props: Vec<DtProp>,
    pub children: Vec<DtNode>,
}

impl DtNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_prop(mut self, prop: DtProp) -> Self {
        self.props.push(prop);
        self
    }

    pub fn with_child(mut self, child: DtNode) -> Self {
        self.children.push(child);
        self
    }

    /// First direct child named `name`.
    pub fn child(&self, name: &str) -> Option<&DtNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn prop(&self, name: &str) -> Option<&DtProp> {
        self.props.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_cells_are_little_endian() {
        let prop = DtProp::from_u64_cells("reg", &[0x1000, 0x0010_0000]);
        assert_eq!(prop.value.len(), 16);
        assert_eq!(prop.u64_cell(0), Some(0x1000));
        assert_eq!(prop.u64_cell(1), Some(0x0010_0000));
        assert_eq!(prop.u64_cell(2), None);
    }

    #[test]
    fn short_property_has_no_cell() {
        let prop = DtProp::new("reg", vec![0; 12]);
        assert_eq!(prop.u64_cell(0), Some(0));
        assert_eq!(prop.u64_cell(1), None);
    }

    #[test]
    fn lookup_only_searches_direct_children() {
        let tree = DtNode::new("otgphyctrl").with_child(
            DtNode::new("wrapper").with_child(DtNode::new("usb-device")),
        );
        assert!(tree.child("usb-device").is_none());
        assert!(tree.child("wrapper").is_some());
    }
}
