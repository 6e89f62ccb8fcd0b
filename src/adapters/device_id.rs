//! Chip identity derived from the factory MAC address.
//!
//! The control server keys devices on `0x` followed by the last three MAC
//! bytes as eight lowercase hex digits (`0x00aabbcc`).  The value is stable
//! across reboots because the MAC is burned into eFuse.

use core::fmt::Write;

use crate::config::ChipId;

pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: `mac` is a valid 6-byte out-buffer.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

pub fn chip_id(mac: &MacAddress) -> ChipId {
    let low = u32::from_be_bytes([0, mac[3], mac[4], mac[5]]);
    let mut id = ChipId::new();
    // "0x" + 8 digits always fits in 16 bytes.
    let _ = write!(id, "0x{:08x}", low);
    id
}
