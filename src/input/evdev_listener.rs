//! evdev-backed gamepad input for Linux
//!
//! Opens one `/dev/input/event*` node and yields its events. Also handles
//! gamepad auto-detection: the first device that reports both buttons and
//! absolute axes is taken to be a gamepad.

use super::RawInputEvent;
use crate::device::{DeviceError, InputSource};
use evdev::{Device, EventType};
use log::{debug, info, warn};
use nix::libc;
use std::io;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Rough classification from the device's event capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Buttons and absolute axes
    Gamepad,
    /// Buttons only
    KeyboardOrMouse,
    /// Absolute axes only
    TouchpadOrTablet,
    Unknown,
}

impl DeviceKind {
    pub fn from_capabilities(has_buttons: bool, has_axes: bool) -> Self {
        match (has_buttons, has_axes) {
            (true, true) => DeviceKind::Gamepad,
            (true, false) => DeviceKind::KeyboardOrMouse,
            (false, true) => DeviceKind::TouchpadOrTablet,
            (false, false) => DeviceKind::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeviceKind::Gamepad => "Gamepad/Joystick",
            DeviceKind::KeyboardOrMouse => "Keyboard/Mouse",
            DeviceKind::TouchpadOrTablet => "Touchpad/Tablet",
            DeviceKind::Unknown => "Unknown",
        }
    }
}

/// Identification of an input device
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub phys: Option<String>,
    pub unique: Option<String>,
    pub kind: DeviceKind,
}

impl DeviceInfo {
    fn from_device(path: &Path, device: &Device) -> Self {
        let events = device.supported_events();
        Self {
            path: path.to_path_buf(),
            name: device.name().unwrap_or("Unknown").to_string(),
            phys: device.physical_path().map(str::to_string),
            unique: device.unique_name().map(str::to_string),
            kind: DeviceKind::from_capabilities(
                events.contains(EventType::KEY),
                events.contains(EventType::ABSOLUTE),
            ),
        }
    }
}

/// All input devices we are allowed to open, sorted by path
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut devices: Vec<DeviceInfo> = evdev::enumerate()
        .map(|(path, device)| DeviceInfo::from_device(&path, &device))
        .collect();
    devices.sort_by(|a, b| a.path.cmp(&b.path));
    devices
}

/// Path of the first gamepad-like device
pub fn find_gamepad() -> Result<PathBuf, DeviceError> {
    match list_devices()
        .into_iter()
        .find(|info| info.kind == DeviceKind::Gamepad)
    {
        Some(info) => {
            info!("Found gamepad: {} at {}", info.name, info.path.display());
            Ok(info.path)
        }
        None => {
            warn!("No gamepad device found");
            Err(DeviceError::NoDevices)
        }
    }
}

/// Wait until `fd` is readable. Returns false on timeout.
fn wait_readable(fd: RawFd, timeout: Duration) -> Result<bool, DeviceError> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;

    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err.into());
    }
    if rc == 0 {
        return Ok(false);
    }

    if pfd.revents & libc::POLLIN == 0
        && pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0
    {
        return Err(DeviceError::Disconnected("input device hung up".to_string()));
    }
    Ok(true)
}

/// One opened evdev device
pub struct EvdevSource {
    device: Device,
    info: DeviceInfo,
}

impl EvdevSource {
    /// Open a specific event node
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DeviceError::NotFound(path.display().to_string()));
        }

        let device = Device::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                DeviceError::PermissionDenied(path.display().to_string())
            }
            _ => DeviceError::from(e),
        })?;
        let info = DeviceInfo::from_device(path, &device);
        info!("Connected to {} at {}", info.name, info.path.display());
        debug!("Device kind: {}", info.kind.label());

        Ok(Self { device, info })
    }

    /// Open `path` if given, otherwise the first detected gamepad
    pub fn open_or_detect(path: Option<&Path>) -> Result<Self, DeviceError> {
        match path {
            Some(path) => Self::open(path),
            None => Self::open(find_gamepad()?),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }
}

impl InputSource for EvdevSource {
    fn read_events(&mut self, timeout: Duration) -> Result<Vec<RawInputEvent>, DeviceError> {
        if !wait_readable(self.device.as_raw_fd(), timeout)? {
            return Ok(Vec::new());
        }

        let events = self
            .device
            .fetch_events()?
            .map(|ev| RawInputEvent::new(ev.event_type().0, ev.code(), ev.value()))
            .collect();
        Ok(events)
    }

    fn label(&self) -> String {
        format!("{} ({})", self.info.name, self.info.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_capabilities() {
        assert_eq!(DeviceKind::from_capabilities(true, true), DeviceKind::Gamepad);
        assert_eq!(
            DeviceKind::from_capabilities(true, false),
            DeviceKind::KeyboardOrMouse
        );
        assert_eq!(
            DeviceKind::from_capabilities(false, true),
            DeviceKind::TouchpadOrTablet
        );
        assert_eq!(DeviceKind::from_capabilities(false, false), DeviceKind::Unknown);
        assert_eq!(DeviceKind::Gamepad.label(), "Gamepad/Joystick");
    }

    #[test]
    fn open_missing_node() {
        let result = EvdevSource::open("/dev/input/does-not-exist");
        assert!(matches!(result, Err(DeviceError::NotFound(_))));
    }

    #[test]
    fn list_devices_does_not_panic() {
        // May be empty without permissions
        let devices = list_devices();
        assert!(devices.windows(2).all(|w| w[0].path <= w[1].path));
    }
}
