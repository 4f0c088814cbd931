mod util;

use aero_otg::regs::{phy, PHY_REGS_SIZE, USBCTL_REGS_SIZE};
use aero_otg::snapshot::{
    IoSnapshot, SnapshotError, SnapshotReader, SnapshotVersion, SnapshotWriter,
};
use aero_otg::{AppleOtg, OtgRegion};
use util::{otg_node, HCD_WINDOW};

const HEADER_LEN: usize = 16;

fn dirty_otg() -> AppleOtg {
    let mut otg = AppleOtg::create(&otg_node(HCD_WINDOW)).unwrap();
    otg.write(OtgRegion::Phy, phy::REG_OTGSIG, 4, 0);
    otg.write(OtgRegion::Phy, phy::REG_CFG1, 4, 0x0bad_f00d);
    otg.write(OtgRegion::UsbCtl, 0xff8, 8, 0x8877_6655_4433_2211);
    otg
}

#[test]
fn snapshot_restores_both_register_files() {
    let src = dirty_otg();
    let bytes = src.save_state();

    let mut dst = AppleOtg::create(&otg_node(HCD_WINDOW)).unwrap();
    dst.load_state(&bytes).unwrap();

    assert_eq!(dst.phy_regs(), src.phy_regs());
    assert_eq!(dst.usbctl_regs(), src.usbctl_regs());
    assert_eq!(dst.read(OtgRegion::Phy, phy::REG_OTGSIG, 4), 0);
    assert_eq!(dst.read(OtgRegion::UsbCtl, 0xff8, 8), 0x8877_6655_4433_2211);
    assert_eq!(dst.save_state(), bytes);
}

#[test]
fn snapshot_lays_out_phy_before_usbctl() {
    let bytes = dirty_otg().save_state();

    let r = SnapshotReader::parse(&bytes, *b"AOTG").unwrap();
    assert_eq!(r.header().device_version, SnapshotVersion::new(1, 0));
    assert_eq!(r.bytes(1).map(<[u8]>::len), Some(PHY_REGS_SIZE));
    assert_eq!(r.bytes(2).map(<[u8]>::len), Some(USBCTL_REGS_SIZE));

    let phy_tag = u16::from_le_bytes([bytes[HEADER_LEN], bytes[HEADER_LEN + 1]]);
    let usbctl_at = HEADER_LEN + 6 + PHY_REGS_SIZE;
    let usbctl_tag = u16::from_le_bytes([bytes[usbctl_at], bytes[usbctl_at + 1]]);
    assert_eq!((phy_tag, usbctl_tag), (1, 2));
    assert_eq!(bytes.len(), usbctl_at + 6 + USBCTL_REGS_SIZE);
}

#[test]
fn wrong_length_register_file_is_rejected_without_side_effects() {
    let mut w = SnapshotWriter::new(*b"AOTG", SnapshotVersion::new(1, 0));
    w.field_bytes(1, vec![0xff; PHY_REGS_SIZE]);
    w.field_bytes(2, vec![0xff; 4]);
    let bytes = w.finish();

    let mut otg = dirty_otg();
    let before = otg.save_state();
    assert_eq!(
        otg.load_state(&bytes),
        Err(SnapshotError::InvalidFieldEncoding("usbctl register file length"))
    );
    assert_eq!(otg.save_state(), before);
}

#[test]
fn snapshot_from_another_device_is_rejected() {
    let w = SnapshotWriter::new(*b"XHCI", SnapshotVersion::new(1, 0));
    let mut otg = AppleOtg::create(&otg_node(HCD_WINDOW)).unwrap();
    assert!(matches!(
        otg.load_state(&w.finish()),
        Err(SnapshotError::DeviceIdMismatch { .. })
    ));
}

#[test]
fn newer_major_version_is_rejected() {
    let mut w = SnapshotWriter::new(*b"AOTG", SnapshotVersion::new(2, 0));
    w.field_bytes(1, vec![0; PHY_REGS_SIZE]);
    let mut otg = AppleOtg::create(&otg_node(HCD_WINDOW)).unwrap();
    assert_eq!(
        otg.load_state(&w.finish()),
        Err(SnapshotError::UnsupportedDeviceMajorVersion {
            found: 2,
            expected: 1
        })
    );
}

#[test]
fn unknown_tags_are_skipped() {
    let mut w = SnapshotWriter::new(*b"AOTG", SnapshotVersion::new(1, 3));
    w.field_bytes(1, vec![0x5a; PHY_REGS_SIZE]);
    w.field_bytes(99, vec![1, 2, 3]);
    let mut otg = AppleOtg::create(&otg_node(HCD_WINDOW)).unwrap();
    otg.load_state(&w.finish()).unwrap();

    assert_eq!(otg.read(OtgRegion::Phy, 0, 4), 0x5a5a_5a5a);
    assert!(otg.usbctl_regs().as_bytes().iter().all(|&b| b == 0));
}
