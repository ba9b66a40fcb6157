//! Device seams shared by the input and output sides

use crate::input::RawInputEvent;
use crate::keyboard::HidReport;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type for input and output device operations
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No suitable input device found
    #[error("No gamepad devices found")]
    NoDevices,
    /// Device node does not exist
    #[error("Device not found: {0}")]
    NotFound(String),
    /// Permission denied accessing device
    #[error("Permission denied accessing {0}")]
    PermissionDenied(String),
    /// Device went away while in use
    #[error("Device disconnected: {0}")]
    Disconnected(String),
    /// No USB device controller to bind a gadget to
    #[error("No UDC (USB Device Controller) found")]
    NoUdc,
    /// The host stopped draining reports; the report was not delivered
    #[error("Host is not reading reports from {0}")]
    HostNotReading(String),
    /// The sink accepted only part of a report
    #[error("Short write: {written} of 8 bytes")]
    ShortWrite { written: usize },
    /// IO error
    #[error("IO error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for DeviceError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::PermissionDenied {
            DeviceError::PermissionDenied("device".to_string())
        } else if is_disconnect(&e) {
            DeviceError::Disconnected(e.to_string())
        } else {
            DeviceError::Io(e)
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof
    ) {
        return true;
    }

    #[cfg(target_os = "linux")]
    {
        use nix::libc;
        matches!(e.raw_os_error(), Some(libc::ENODEV) | Some(libc::ESHUTDOWN))
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// A blocking source of raw input events
pub trait InputSource {
    /// Wait up to `timeout` for the next batch of events.
    ///
    /// An empty batch means the timeout elapsed. Events come back in the
    /// order the kernel delivered them.
    fn read_events(&mut self, timeout: Duration) -> Result<Vec<RawInputEvent>, DeviceError>;

    /// Human-readable label for logs
    fn label(&self) -> String {
        "input".to_string()
    }
}

impl<T: InputSource + ?Sized> InputSource for Box<T> {
    fn read_events(&mut self, timeout: Duration) -> Result<Vec<RawInputEvent>, DeviceError> {
        (**self).read_events(timeout)
    }

    fn label(&self) -> String {
        (**self).label()
    }
}

/// Write-only destination for keyboard reports
pub trait ReportSink {
    /// Write one report. `Ok` means the report was delivered.
    fn write_report(&mut self, report: &HidReport) -> Result<(), DeviceError>;

    /// Write the last report before closing. Sinks that can stall should
    /// wait longer here than in `write_report`.
    fn write_final(&mut self, report: &HidReport) -> Result<(), DeviceError> {
        self.write_report(report)
    }
}

impl<T: ReportSink + ?Sized> ReportSink for Box<T> {
    fn write_report(&mut self, report: &HidReport) -> Result<(), DeviceError> {
        (**self).write_report(report)
    }

    fn write_final(&mut self, report: &HidReport) -> Result<(), DeviceError> {
        (**self).write_final(report)
    }
}

/// Cooperative cancellation flag, checked between blocking reads
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
