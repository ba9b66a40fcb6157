//! USB gadget provisioning through configfs
//!
//! Creates a single-configuration composite gadget exposing one boot
//! keyboard function (`hid.usb0`) and binds it to the first USB device
//! controller. Requires root and the `libcomposite` module.

use crate::device::DeviceError;
use crate::keyboard::state::REPORT_LEN;
use log::info;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

/// Standard boot keyboard report descriptor: modifier byte, reserved byte,
/// 5 LED outputs, six key slots
#[rustfmt::skip]
pub const BOOT_KEYBOARD_REPORT_DESC: &[u8] = &[
    0x05, 0x01, // Usage Page (Generic Desktop)
    0x09, 0x06, // Usage (Keyboard)
    0xA1, 0x01, // Collection (Application)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0xE0, //   Usage Minimum (224)
    0x29, 0xE7, //   Usage Maximum (231)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x01, //   Logical Maximum (1)
    0x75, 0x01, //   Report Size (1)
    0x95, 0x08, //   Report Count (8)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x08, //   Report Size (8)
    0x81, 0x01, //   Input (Constant)
    0x95, 0x05, //   Report Count (5)
    0x75, 0x01, //   Report Size (1)
    0x05, 0x08, //   Usage Page (LEDs)
    0x19, 0x01, //   Usage Minimum (1)
    0x29, 0x05, //   Usage Maximum (5)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0x95, 0x01, //   Report Count (1)
    0x75, 0x03, //   Report Size (3)
    0x91, 0x01, //   Output (Constant)
    0x95, 0x06, //   Report Count (6)
    0x75, 0x08, //   Report Size (8)
    0x15, 0x00, //   Logical Minimum (0)
    0x25, 0x65, //   Logical Maximum (101)
    0x05, 0x07, //   Usage Page (Key Codes)
    0x19, 0x00, //   Usage Minimum (0)
    0x29, 0x65, //   Usage Maximum (101)
    0x81, 0x00, //   Input (Data, Array)
    0xC0,       // End Collection
];

/// Gadget identity and where to create it
#[derive(Debug, Clone)]
pub struct GadgetConfig {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub product: String,
    pub serial: String,
    pub max_power_ma: u16,
    /// Usually `/sys/kernel/config/usb_gadget`
    pub configfs_root: PathBuf,
    /// Usually `/sys/class/udc`
    pub udc_root: PathBuf,
}

impl Default for GadgetConfig {
    fn default() -> Self {
        Self {
            name: "joystick_hid".to_string(),
            vendor_id: 0x1d6b,  // Linux Foundation
            product_id: 0x0104, // Multifunction Composite Gadget
            manufacturer: "Joystick Converter".to_string(),
            product: "HID Keyboard Converter".to_string(),
            serial: "fedcba9876543210".to_string(),
            max_power_ma: 250,
            configfs_root: PathBuf::from("/sys/kernel/config/usb_gadget"),
            udc_root: PathBuf::from("/sys/class/udc"),
        }
    }
}

impl GadgetConfig {
    pub fn gadget_dir(&self) -> PathBuf {
        self.configfs_root.join(&self.name)
    }
}

/// Result of a provisioning attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GadgetStatus {
    /// The gadget directory was already there; nothing was touched
    AlreadyConfigured,
    /// Created and bound to the named controller
    Bound { udc: String },
}

/// Provision the default gadget. Fails early when not running as root.
pub fn setup_usb_gadget() -> Result<GadgetStatus, DeviceError> {
    if !nix::unistd::Uid::effective().is_root() {
        return Err(DeviceError::PermissionDenied(
            "USB gadget setup requires root privileges".to_string(),
        ));
    }
    provision(&GadgetConfig::default())
}

/// Create and bind the gadget described by `config`
pub fn provision(config: &GadgetConfig) -> Result<GadgetStatus, DeviceError> {
    let gadget = config.gadget_dir();
    if gadget.exists() {
        info!("USB gadget already configured at {}", gadget.display());
        return Ok(GadgetStatus::AlreadyConfigured);
    }

    // Pick the controller before writing anything
    let udc = first_udc(&config.udc_root)?;

    fs::create_dir_all(&gadget)?;
    write_attr(&gadget, "idVendor", &format!("{:#06x}", config.vendor_id))?;
    write_attr(&gadget, "idProduct", &format!("{:#06x}", config.product_id))?;
    write_attr(&gadget, "bcdDevice", "0x0100")?;
    write_attr(&gadget, "bcdUSB", "0x0200")?;

    let strings = gadget.join("strings/0x409");
    fs::create_dir_all(&strings)?;
    write_attr(&strings, "serialnumber", &config.serial)?;
    write_attr(&strings, "manufacturer", &config.manufacturer)?;
    write_attr(&strings, "product", &config.product)?;

    let usb_config = gadget.join("configs/c.1");
    let config_strings = usb_config.join("strings/0x409");
    fs::create_dir_all(&config_strings)?;
    write_attr(&config_strings, "configuration", "Config 1: Keyboard")?;
    write_attr(&usb_config, "MaxPower", &config.max_power_ma.to_string())?;

    let function = gadget.join("functions/hid.usb0");
    fs::create_dir_all(&function)?;
    write_attr(&function, "protocol", "1")?; // keyboard
    write_attr(&function, "subclass", "1")?; // boot interface
    write_attr(&function, "report_length", &REPORT_LEN.to_string())?;
    fs::write(function.join("report_desc"), BOOT_KEYBOARD_REPORT_DESC)?;

    let link = usb_config.join("hid.usb0");
    if fs::symlink_metadata(&link).is_err() {
        symlink(&function, &link)?;
    }

    write_attr(&gadget, "UDC", &udc)?;
    info!("USB gadget {} bound to {}", config.name, udc);

    Ok(GadgetStatus::Bound { udc })
}

fn first_udc(udc_root: &Path) -> Result<String, DeviceError> {
    let mut names: Vec<String> = fs::read_dir(udc_root)
        .map_err(|_| DeviceError::NoUdc)?
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    names.into_iter().next().ok_or(DeviceError::NoUdc)
}

fn write_attr(dir: &Path, name: &str, value: &str) -> Result<(), DeviceError> {
    fs::write(dir.join(name), value)?;
    Ok(())
}
