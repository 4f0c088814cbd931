//! Deterministic snapshot encoding for device state.
//!
//! Device state is encoded as a small tag-length-value (TLV) blob:
//! - a fixed header (format magic + version, device id + device version)
//! - fields sorted by tag, so identical state always produces identical bytes
//! - unknown tags are skipped on load, which keeps minor-version additions forward compatible

pub mod codec;

use std::collections::BTreeMap;

use thiserror::Error;

pub type SnapshotResult<T> = std::result::Result<T, SnapshotError>;

const SNAPSHOT_MAGIC: [u8; 4] = *b"AERO";
const FORMAT_VERSION: SnapshotVersion = SnapshotVersion::new(1, 0);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unexpected end of snapshot data")]
    UnexpectedEof,

    #[error("invalid snapshot magic")]
    InvalidMagic,

    #[error("unsupported snapshot format version {major}.{minor}")]
    UnsupportedFormatVersion { major: u16, minor: u16 },

    #[error("snapshot device id mismatch (expected {expected:?}, found {found:?})")]
    DeviceIdMismatch { expected: [u8; 4], found: [u8; 4] },

    #[error("unsupported device major version {found} (expected {expected})")]
    UnsupportedDeviceMajorVersion { found: u16, expected: u16 },

    #[error("duplicate snapshot field tag {0}")]
    DuplicateFieldTag(u16),

    #[error("invalid field encoding: {0}")]
    InvalidFieldEncoding(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotVersion {
    pub major: u16,
    pub minor: u16,
}

impl SnapshotVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub format_version: SnapshotVersion,
    pub device_id: [u8; 4],
    pub device_version: SnapshotVersion,
}

/// Snapshotting contract for emulated devices.
///
/// Implementations must keep `DEVICE_ID` stable and only add new TLV fields within a major
/// version.
pub trait IoSnapshot {
    const DEVICE_ID: [u8; 4];
    const DEVICE_VERSION: SnapshotVersion;

    fn save_state(&self) -> Vec<u8>;
    fn load_state(&mut self, bytes: &[u8]) -> SnapshotResult<()>;
}

pub struct SnapshotWriter {
    device_id: [u8; 4],
    device_version: SnapshotVersion,
    fields: BTreeMap<u16, Vec<u8>>,
}

impl SnapshotWriter {
    pub fn new(device_id: [u8; 4], device_version: SnapshotVersion) -> Self {
        Self {
            device_id,
            device_version,
            fields: BTreeMap::new(),
        }
    }

    /// Adds a field. Writing the same tag twice keeps the last value.
    pub fn field_bytes(&mut self, tag: u16, bytes: Vec<u8>) {
        self.fields.insert(tag, bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        let mut e = codec::Encoder::new()
            .bytes(&SNAPSHOT_MAGIC)
            .u16(FORMAT_VERSION.major)
            .u16(FORMAT_VERSION.minor)
            .bytes(&self.device_id)
            .u16(self.device_version.major)
            .u16(self.device_version.minor);

        for (tag, bytes) in self.fields {
            // Device fields are small register files; a field never approaches 4 GiB.
            e = e.u16(tag).u32(bytes.len() as u32).bytes(&bytes);
        }
        e.finish()
    }
}

#[derive(Debug)]
pub struct SnapshotReader<'a> {
    header: SnapshotHeader,
    fields: BTreeMap<u16, &'a [u8]>,
}

impl<'a> SnapshotReader<'a> {
    pub fn parse(bytes: &'a [u8], expected_device_id: [u8; 4]) -> SnapshotResult<Self> {
        let mut d = codec::Decoder::new(bytes);

        if d.bytes(4)? != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic);
        }
        let format_version = SnapshotVersion::new(d.u16()?, d.u16()?);
        if format_version.major != FORMAT_VERSION.major {
            return Err(SnapshotError::UnsupportedFormatVersion {
                major: format_version.major,
                minor: format_version.minor,
            });
        }

        let mut device_id = [0u8; 4];
        device_id.copy_from_slice(d.bytes(4)?);
        if device_id != expected_device_id {
            return Err(SnapshotError::DeviceIdMismatch {
                expected: expected_device_id,
                found: device_id,
            });
        }
        let device_version = SnapshotVersion::new(d.u16()?, d.u16()?);

        let mut fields = BTreeMap::new();
        while !d.is_empty() {
            let tag = d.u16()?;
            let len = d.u32()? as usize;
            let value = d.bytes(len)?;
            if fields.insert(tag, value).is_some() {
                return Err(SnapshotError::DuplicateFieldTag(tag));
            }
        }

        Ok(Self {
            header: SnapshotHeader {
                format_version,
                device_id,
                device_version,
            },
            fields,
        })
    }

    pub fn header(&self) -> SnapshotHeader {
        self.header
    }

    pub fn ensure_device_major(&self, major: u16) -> SnapshotResult<()> {
        if self.header.device_version.major != major {
            return Err(SnapshotError::UnsupportedDeviceMajorVersion {
                found: self.header.device_version.major,
                expected: major,
            });
        }
        Ok(())
    }

    pub fn bytes(&self, tag: u16) -> Option<&'a [u8]> {
        self.fields.get(&tag).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: [u8; 4] = *b"TEST";

    #[test]
    fn fields_are_emitted_in_tag_order() {
        let mut a = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0));
        a.field_bytes(2, vec![0xbb]);
        a.field_bytes(1, vec![0xaa]);

        let mut b = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0));
        b.field_bytes(1, vec![0xaa]);
        b.field_bytes(2, vec![0xbb]);

        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn reader_rejects_foreign_device_id() {
        let w = SnapshotWriter::new(*b"XHCP", SnapshotVersion::new(1, 0));
        let err = SnapshotReader::parse(&w.finish(), ID).unwrap_err();
        assert_eq!(
            err,
            SnapshotError::DeviceIdMismatch {
                expected: ID,
                found: *b"XHCP"
            }
        );
    }

    #[test]
    fn reader_rejects_truncated_field() {
        let mut w = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0));
        w.field_bytes(7, vec![1, 2, 3, 4]);
        let mut bytes = w.finish();
        bytes.pop();

        let err = SnapshotReader::parse(&bytes, ID).unwrap_err();
        assert_eq!(err, SnapshotError::UnexpectedEof);
    }

    #[test]
    fn reader_rejects_duplicate_tags() {
        let mut bytes = SnapshotWriter::new(ID, SnapshotVersion::new(1, 0)).finish();
        for _ in 0..2 {
            bytes.extend_from_slice(&3u16.to_le_bytes());
            bytes.extend_from_slice(&1u32.to_le_bytes());
            bytes.push(0);
        }

        let err = SnapshotReader::parse(&bytes, ID).unwrap_err();
        assert_eq!(err, SnapshotError::DuplicateFieldTag(3));
    }

    #[test]
    fn device_major_mismatch_is_reported() {
        let w = SnapshotWriter::new(ID, SnapshotVersion::new(2, 5));
        let bytes = w.finish();
        let r = SnapshotReader::parse(&bytes, ID).unwrap();
        assert_eq!(r.header().device_version, SnapshotVersion::new(2, 5));
        assert_eq!(
            r.ensure_device_major(1),
            Err(SnapshotError::UnsupportedDeviceMajorVersion {
                found: 2,
                expected: 1
            })
        );
    }
}
