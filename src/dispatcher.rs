//! The conversion loop: input events in, HID reports out
//!
//! Every event is fully handled (normalize, translate, update key state,
//! write the report) before the next one is read, so reports leave in
//! exactly the order their input events arrived.

use crate::config::MappingHandle;
use crate::device::{CancelToken, DeviceError, InputSource, ReportSink};
use crate::input::{normalize, NormalizedEvent, RawInputEvent};
use crate::keyboard::remap::translate_entry;
use crate::keyboard::{apply, HidReport, KeyState, TranslateStats};
use log::{debug, error, info, trace, warn};
use std::time::Duration;

/// Upper bound on how long the loop waits before rechecking cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters for one dispatcher
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Raw events read from the input
    pub events_seen: u64,
    /// Events discarded because they are neither buttons nor axes
    pub events_filtered: u64,
    /// Reports accepted by the sink
    pub reports_sent: u64,
    /// Writes refused because the host was not reading; retried later
    pub reports_deferred: u64,
    pub translate: TranslateStats,
}

/// Owns the key state and the report sink
pub struct Dispatcher<S: ReportSink> {
    mappings: MappingHandle,
    sink: S,
    state: KeyState,
    stats: DispatchStats,
    /// Latest report the host has not taken yet
    pending: Option<HidReport>,
    /// Set once an all-zero report has been delivered and nothing since
    released: bool,
}

impl<S: ReportSink> Dispatcher<S> {
    pub fn new(mappings: MappingHandle, sink: S) -> Self {
        let table = mappings.snapshot();
        info!(
            "Dispatcher ready: {} mappings for {}",
            table.len(),
            table.device_name()
        );
        for name in table.event_names() {
            debug!("Registered handler for {}", name);
        }

        Self {
            mappings,
            sink,
            state: KeyState::new(),
            stats: DispatchStats::default(),
            pending: None,
            released: false,
        }
    }

    pub fn state(&self) -> &KeyState {
        &self.state
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn mappings(&self) -> &MappingHandle {
        &self.mappings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Handle one raw event. Returns the report written, if any.
    pub fn process(&mut self, raw: &RawInputEvent) -> Result<Option<HidReport>, DeviceError> {
        self.stats.events_seen += 1;

        let event = normalize(raw);
        if !event.class.is_mappable() {
            self.stats.events_filtered += 1;
            return Ok(None);
        }

        self.process_normalized(&event)
    }

    /// Handle one already-normalized button or axis event
    pub fn process_normalized(
        &mut self,
        event: &NormalizedEvent,
    ) -> Result<Option<HidReport>, DeviceError> {
        let table = self.mappings.snapshot();
        let entry = table.lookup(&event.name);
        let action = match entry {
            Some(entry) => translate_entry(entry, event.value),
            None => {
                debug!("No mapping for {}", event);
                None
            }
        };
        self.stats.translate.record(entry.is_some(), action.as_ref());

        let Some(action) = action else {
            return Ok(None);
        };

        let report = apply(&action, &mut self.state);
        trace!("{} -> {:?}", event, report);
        self.send(report)?;
        Ok(Some(report))
    }

    /// Read and dispatch events until cancelled or a device fails.
    ///
    /// Always ends with all keys released on the sink.
    pub fn run<I>(&mut self, source: &mut I, cancel: &CancelToken) -> Result<(), DeviceError>
    where
        I: InputSource + ?Sized,
    {
        info!("Starting event loop on {}", source.label());

        let result = self.event_loop(source, cancel);
        if let Err(e) = &result {
            error!("Event loop stopped: {}", e);
        }

        let released = self.shutdown();
        result.and(released)
    }

    fn event_loop<I>(&mut self, source: &mut I, cancel: &CancelToken) -> Result<(), DeviceError>
    where
        I: InputSource + ?Sized,
    {
        while !cancel.is_cancelled() {
            self.flush_pending()?;
            for raw in source.read_events(POLL_INTERVAL)? {
                self.process(&raw)?;
            }
        }
        info!("Event loop cancelled");
        Ok(())
    }

    /// Report not yet taken by the host, if any
    pub fn pending(&self) -> Option<HidReport> {
        self.pending
    }

    /// Retry the report the host refused last time
    pub fn flush_pending(&mut self) -> Result<(), DeviceError> {
        match self.pending {
            Some(report) => self.send(report),
            None => Ok(()),
        }
    }

    /// Release every key and deliver the all-zero report. Does nothing if
    /// that already happened and no report was sent since.
    ///
    /// Fails if the sink did not take the report; calling again (or
    /// dropping the dispatcher) retries.
    pub fn shutdown(&mut self) -> Result<(), DeviceError> {
        if self.released {
            return Ok(());
        }

        let report = self.state.reset();
        self.pending = None;
        self.sink.write_final(&report)?;
        self.stats.reports_sent += 1;
        self.released = true;
        info!("All keys released");
        Ok(())
    }

    /// Swap in a new output device. Key state is reset and the new sink
    /// starts from an all-zero report.
    pub fn reconnect_sink(&mut self, sink: S) -> Result<(), DeviceError> {
        self.sink = sink;
        self.released = false;
        self.shutdown()?;
        info!("Output device reconnected");
        Ok(())
    }

    /// Every report is a full snapshot, so a refused one is simply kept
    /// until it goes through or a newer report replaces it.
    fn send(&mut self, report: HidReport) -> Result<(), DeviceError> {
        self.released = false;
        match self.sink.write_report(&report) {
            Ok(()) => {
                self.stats.reports_sent += 1;
                self.pending = None;
                Ok(())
            }
            Err(DeviceError::HostNotReading(path)) => {
                if self.pending.is_none() {
                    warn!("Host not reading {}, holding {:?}", path, report);
                }
                self.stats.reports_deferred += 1;
                self.pending = Some(report);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send report: {}", e);
                self.state.reset();
                self.pending = None;
                if self.sink.write_final(&HidReport::EMPTY).is_ok() {
                    self.released = true;
                }
                Err(e)
            }
        }
    }
}

impl<S: ReportSink> Drop for Dispatcher<S> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Could not release keys on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DpadOrientation, MappingEntry, MappingTable};
    use crate::input::{EV_ABS, EV_KEY, EV_SYN};
    use crate::keyboard::HidUsage;
    use crate::output::MemorySink;
    use std::collections::VecDeque;

    /// Plays back fixed batches, then cancels the loop
    struct ScriptedSource {
        batches: VecDeque<Result<Vec<RawInputEvent>, DeviceError>>,
        cancel: CancelToken,
    }

    impl ScriptedSource {
        fn new(events: Vec<RawInputEvent>, cancel: &CancelToken) -> Self {
            Self {
                batches: VecDeque::from(vec![Ok(events)]),
                cancel: cancel.clone(),
            }
        }
    }

    impl InputSource for ScriptedSource {
        fn read_events(&mut self, _timeout: Duration) -> Result<Vec<RawInputEvent>, DeviceError> {
            match self.batches.pop_front() {
                Some(batch) => batch,
                None => {
                    self.cancel.cancel();
                    Ok(Vec::new())
                }
            }
        }
    }

    fn handle() -> MappingHandle {
        let mut table = MappingTable::new("unused.json");
        table.upsert("BTN_A", MappingEntry::key("SPACE"));
        table.upsert("BTN_B", MappingEntry::key("ESC"));
        table.upsert(
            "ABS_HAT0X",
            MappingEntry::dpad(DpadOrientation::Horizontal, "RIGHT", "LEFT"),
        );
        MappingHandle::new(table)
    }

    fn key(code: u16, value: i32) -> RawInputEvent {
        RawInputEvent::new(EV_KEY, code, value)
    }

    const BTN_A: u16 = 0x130;
    const BTN_B: u16 = 0x131;
    const BTN_C: u16 = 0x132;

    #[test]
    fn button_press_and_release() {
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());

        let pressed = dispatcher.process(&key(BTN_A, 1)).unwrap().unwrap();
        assert_eq!(pressed.as_bytes(), &[0, 0, 0x2C, 0, 0, 0, 0, 0]);
        let released = dispatcher.process(&key(BTN_A, 0)).unwrap().unwrap();
        assert_eq!(released, HidReport::EMPTY);

        assert_eq!(sink.reports(), vec![pressed, released]);
    }

    #[test]
    fn sync_and_unmapped_events_emit_nothing() {
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());

        assert_eq!(dispatcher.process(&RawInputEvent::new(EV_SYN, 0, 0)).unwrap(), None);
        assert_eq!(dispatcher.process(&key(BTN_C, 1)).unwrap(), None);

        assert!(sink.reports().is_empty());
        assert_eq!(dispatcher.stats().events_seen, 2);
        assert_eq!(dispatcher.stats().events_filtered, 1);
        assert_eq!(dispatcher.stats().translate.unmapped, 1);
    }

    #[test]
    fn run_processes_in_order_and_releases_at_end() {
        let cancel = CancelToken::new();
        let mut source = ScriptedSource::new(
            vec![
                key(BTN_A, 1),
                RawInputEvent::new(EV_SYN, 0, 0),
                key(BTN_B, 1),
                RawInputEvent::new(EV_ABS, 0x10, 1),
            ],
            &cancel,
        );
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());

        dispatcher.run(&mut source, &cancel).unwrap();

        let reports: Vec<[u8; 8]> = sink.reports().iter().map(|r| *r.as_bytes()).collect();
        assert_eq!(
            reports,
            vec![
                [0, 0, 0x2C, 0, 0, 0, 0, 0],
                [0, 0, 0x2C, 0x29, 0, 0, 0, 0],
                [0, 0, 0x2C, 0x29, 0x4F, 0, 0, 0],
                [0; 8],
            ]
        );
        assert!(dispatcher.state().is_idle());
    }

    #[test]
    fn sink_failure_stops_loop_and_resets_state() {
        let cancel = CancelToken::new();
        let mut source =
            ScriptedSource::new(vec![key(BTN_A, 1), key(BTN_B, 1), key(BTN_A, 0)], &cancel);
        let sink = MemorySink::failing_after(1);
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());

        let result = dispatcher.run(&mut source, &cancel);

        assert!(matches!(result, Err(DeviceError::Disconnected(_))));
        assert!(dispatcher.state().is_idle());
        assert_eq!(sink.reports().len(), 1);
        // Loop ended on the error, not by running out of input
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn input_failure_still_releases_keys() {
        let cancel = CancelToken::new();
        let mut source = ScriptedSource {
            batches: VecDeque::from(vec![
                Ok(vec![key(BTN_A, 1)]),
                Err(DeviceError::Disconnected("unplugged".to_string())),
            ]),
            cancel: cancel.clone(),
        };
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());

        assert!(dispatcher.run(&mut source, &cancel).is_err());
        assert_eq!(sink.last(), Some(HidReport::EMPTY));
        assert!(dispatcher.state().is_idle());
    }

    #[test]
    fn drop_releases_held_keys() {
        let sink = MemorySink::new();
        {
            let mut dispatcher = Dispatcher::new(handle(), sink.clone());
            dispatcher.process(&key(BTN_A, 1)).unwrap();
        }
        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[1], HidReport::EMPTY);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());
        dispatcher.shutdown().unwrap();
        dispatcher.shutdown().unwrap();
        drop(dispatcher);

        assert_eq!(sink.reports(), vec![HidReport::EMPTY]);
    }

    #[test]
    fn mapping_changes_apply_to_next_event() {
        let sink = MemorySink::new();
        let mappings = handle();
        let mut dispatcher = Dispatcher::new(mappings.clone(), sink.clone());

        let mut table = (*mappings.snapshot()).clone();
        table.upsert("BTN_A", MappingEntry::key("ENTER"));
        mappings.replace(table);

        let report = dispatcher.process(&key(BTN_A, 1)).unwrap().unwrap();
        assert_eq!(report.keys().collect::<Vec<_>>(), vec![HidUsage(0x28)]);
    }

    #[test]
    fn stalled_host_gets_release_once_it_reads_again() {
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());
        dispatcher.process(&key(BTN_A, 1)).unwrap();

        sink.set_stalled(true);
        dispatcher.process(&key(BTN_A, 0)).unwrap();
        assert_eq!(dispatcher.pending(), Some(HidReport::EMPTY));
        assert_eq!(dispatcher.stats().reports_deferred, 1);

        // Still stalled: nothing lost, nothing claimed
        dispatcher.flush_pending().unwrap();
        assert_eq!(sink.reports().len(), 1);

        sink.set_stalled(false);
        dispatcher.flush_pending().unwrap();
        assert_eq!(dispatcher.pending(), None);
        assert_eq!(sink.last(), Some(HidReport::EMPTY));
    }

    #[test]
    fn shutdown_fails_until_release_is_delivered() {
        let sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), sink.clone());
        dispatcher.process(&key(BTN_A, 1)).unwrap();

        sink.set_stalled(true);
        assert!(matches!(
            dispatcher.shutdown(),
            Err(DeviceError::HostNotReading(_))
        ));
        assert_eq!(sink.last(), Some(HidReport::new(0, &[HidUsage(0x2C)])));

        // Dropping retries the release
        sink.set_stalled(false);
        drop(dispatcher);
        assert_eq!(sink.last(), Some(HidReport::EMPTY));
    }

    #[test]
    fn reconnect_starts_from_zero_report() {
        let old_sink = MemorySink::new();
        let mut dispatcher = Dispatcher::new(handle(), old_sink.clone());
        dispatcher.process(&key(BTN_A, 1)).unwrap();

        let new_sink = MemorySink::new();
        dispatcher.reconnect_sink(new_sink.clone()).unwrap();

        assert!(dispatcher.state().is_idle());
        assert_eq!(new_sink.reports(), vec![HidReport::EMPTY]);

        dispatcher.process(&key(BTN_B, 1)).unwrap();
        assert_eq!(new_sink.reports().len(), 2);
        assert_eq!(old_sink.reports().len(), 1);
    }
}
