/// Result of the most recent successful discovery cycles.
///
/// Owned by the discovery loop. Each list is replaced wholesale and kept
/// sorted ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Device identifiers, e.g. `/dev/ttyACM0` or `COM3`
    pub available_devices: Vec<String>,

    /// Firmware image file names (not full paths)
    pub available_firmware_images: Vec<String>,
}

impl ResourceSnapshot {
    /// Firmware images in the order they are shown to the user.
    ///
    /// Reverse of the sorted discovery order, so the newest convention-named
    /// image (e.g. `fw_v2.bin` after `fw_v1.bin`) comes first.
    pub fn firmware_display_order(&self) -> Vec<String> {
        self.available_firmware_images.iter().rev().cloned().collect()
    }
}
