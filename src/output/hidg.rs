//! Report sinks: the HID gadget node and in-process stand-ins

use crate::device::{DeviceError, ReportSink};
use crate::keyboard::HidReport;
use log::{info, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[cfg(target_os = "linux")]
pub use gadget_node::{
    wait_for_node, HidGadget, DEFAULT_FINAL_TIMEOUT, DEFAULT_HIDG_PATH, DEFAULT_WRITE_TIMEOUT,
};

#[cfg(target_os = "linux")]
mod gadget_node {
    use super::*;
    use nix::libc;
    use std::fs::{File, OpenOptions};
    use std::io::{self, Write};
    use std::os::unix::fs::OpenOptionsExt;
    use std::path::{Path, PathBuf};
    use std::thread;
    use std::time::{Duration, Instant};

    /// Device node created by the `hid.usb0` gadget function
    pub const DEFAULT_HIDG_PATH: &str = "/dev/hidg0";

    /// How long a regular report may wait for the host to drain the queue
    pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(10);
    /// How long the last report before closing may wait
    pub const DEFAULT_FINAL_TIMEOUT: Duration = Duration::from_secs(1);
    const RETRY_DELAY: Duration = Duration::from_millis(1);

    /// Writes reports to a `/dev/hidgN` node
    pub struct HidGadget {
        file: File,
        path: PathBuf,
        write_timeout: Duration,
        final_timeout: Duration,
    }

    impl HidGadget {
        pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceError> {
            let path = path.as_ref();
            if !path.exists() {
                return Err(DeviceError::NotFound(path.display().to_string()));
            }

            let file = OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
                .map_err(|e| match e.kind() {
                    io::ErrorKind::PermissionDenied => {
                        DeviceError::PermissionDenied(path.display().to_string())
                    }
                    _ => DeviceError::from(e),
                })?;

            info!("Connected to HID device: {}", path.display());
            Ok(Self {
                file,
                path: path.to_path_buf(),
                write_timeout: DEFAULT_WRITE_TIMEOUT,
                final_timeout: DEFAULT_FINAL_TIMEOUT,
            })
        }

        /// Override how long writes wait for a stalled host
        pub fn with_timeouts(mut self, write_timeout: Duration, final_timeout: Duration) -> Self {
            self.write_timeout = write_timeout;
            self.final_timeout = final_timeout;
            self
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Write one report, retrying while the host's queue is full
        fn write_within(&mut self, report: &HidReport, timeout: Duration) -> Result<(), DeviceError> {
            let deadline = Instant::now() + timeout;
            loop {
                match self.file.write(report.as_bytes()) {
                    Ok(n) if n == report.as_bytes().len() => {
                        trace!("Sent {:?}", report);
                        return Ok(());
                    }
                    Ok(n) => return Err(DeviceError::ShortWrite { written: n }),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        if Instant::now() >= deadline {
                            return Err(DeviceError::HostNotReading(
                                self.path.display().to_string(),
                            ));
                        }
                        thread::sleep(RETRY_DELAY);
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    impl ReportSink for HidGadget {
        fn write_report(&mut self, report: &HidReport) -> Result<(), DeviceError> {
            self.write_within(report, self.write_timeout)
        }

        fn write_final(&mut self, report: &HidReport) -> Result<(), DeviceError> {
            self.write_within(report, self.final_timeout)
        }
    }

    /// Wait for a device node to appear, e.g. right after binding the gadget
    pub fn wait_for_node(path: impl AsRef<Path>, timeout: Duration) -> bool {
        let path = path.as_ref();
        let start = Instant::now();
        while !path.exists() {
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(50));
        }
        true
    }
}

/// Logs reports instead of sending them (dry run)
#[derive(Debug, Default)]
pub struct LogSink {
    sent: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl ReportSink for LogSink {
    fn write_report(&mut self, report: &HidReport) -> Result<(), DeviceError> {
        self.sent += 1;
        info!("HID report {:?}", report);
        Ok(())
    }
}

/// Records every report in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<Mutex<Vec<HidReport>>>,
    fail_after: Option<usize>,
    stalled: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that accepts `n` reports, then reports a disconnect
    pub fn failing_after(n: usize) -> Self {
        Self {
            reports: Arc::default(),
            fail_after: Some(n),
            stalled: Arc::default(),
        }
    }

    /// While stalled, writes fail the way a gadget does when the host
    /// stops polling. Shared between clones.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn reports(&self) -> Vec<HidReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<HidReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }
}

impl ReportSink for MemorySink {
    fn write_report(&mut self, report: &HidReport) -> Result<(), DeviceError> {
        if self.stalled.load(Ordering::SeqCst) {
            return Err(DeviceError::HostNotReading("memory sink".to_string()));
        }
        let mut reports = self.reports.lock().unwrap_or_else(PoisonError::into_inner);
        if self.fail_after.is_some_and(|n| reports.len() >= n) {
            return Err(DeviceError::Disconnected("memory sink closed".to_string()));
        }
        reports.push(*report);
        Ok(())
    }
}
