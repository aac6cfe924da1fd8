//! The Orchestrator (spec.md §4.9, component C9) — owns every
//! long-lived piece (the process-stat table, the scheduler, the
//! event-source subscription) and decides between event-driven and
//! polling mode.
//!
//! `run()` always reaches `shutdown()`, including on error or Ctrl+C,
//! so no scan worker is ever abandoned mid-flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::actuator;
use crate::dispatcher::Dispatcher;
use crate::domain::{CoreError, HHParams, Report};
use crate::eventsource::EventSource;
use crate::inspector::Inspector;
use crate::polling;
use crate::report;
use crate::scheduler::{ReportSink, Scheduler};
use crate::stat_table::ProcessStatTable;

/// Wires a finished `Report` to the report aggregator's write/stdout
/// policy and then the post-scan actuator, in that order (spec.md
/// §4.5 -> §4.7).
struct PublishingSink;

impl ReportSink for PublishingSink {
    fn handle(&self, scan_report: Report, config: &HHParams) {
        report::publish(&scan_report, config);
        actuator::act_on(&scan_report, config);
    }
}

pub struct Orchestrator {
    config: Arc<HHParams>,
    table: Arc<ProcessStatTable>,
    scheduler: Arc<Scheduler>,
    inspector: Arc<dyn Inspector>,
    shutdown_requested: Arc<AtomicBool>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: HHParams, inspector: Arc<dyn Inspector>) -> Self {
        let config = Arc::new(config);
        let table = Arc::new(ProcessStatTable::new());
        let sink: Arc<dyn ReportSink> = Arc::new(PublishingSink);
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&table),
            Arc::clone(&config),
            Arc::clone(&inspector),
            sink,
        ));
        Orchestrator { config, table, scheduler, inspector, shutdown_requested: Arc::new(AtomicBool::new(false)) }
    }

    /// Install a Ctrl+C handler that flips the shutdown flag. Polling
    /// mode checks it between passes; event-driven mode checks it
    /// after the event-source subscription returns (which itself only
    /// happens once the trace session is torn down).
    fn install_ctrlc_handler(&self) {
        let flag = Arc::clone(&self.shutdown_requested);
        if let Err(e) = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        }) {
            warn!("failed to install Ctrl+C handler: {e}");
        }
    }

    /// Run either the event-driven or polling front-end, per
    /// `config.etw_scan`, to completion.
    ///
    /// # Errors
    /// Returns an error only for event-source subscription failures
    /// (spec.md §7 kind 1); everything else is contained and logged.
    pub fn run(&self, event_source: Box<dyn EventSource>) -> Result<(), CoreError> {
        self.install_ctrlc_handler();

        let result = if self.config.etw_scan {
            self.run_event_driven(event_source)
        } else {
            self.run_polling();
            Ok(())
        };

        self.shutdown();
        result
    }

    fn run_event_driven(&self, event_source: Box<dyn EventSource>) -> Result<(), CoreError> {
        let (tx, rx) = crossbeam_channel::unbounded();

        let subscriber = std::thread::Builder::new()
            .name("event-source".into())
            .spawn(move || event_source.subscribe(tx))
            .map_err(|e| CoreError::EventSourceInit(e.to_string()))?;

        let config = Arc::clone(&self.config);
        let table = Arc::clone(&self.table);
        let scheduler = Arc::clone(&self.scheduler);
        let shutdown_requested = Arc::clone(&self.shutdown_requested);

        while !shutdown_requested.load(Ordering::SeqCst) {
            match rx.recv_timeout(std::time::Duration::from_millis(200)) {
                Ok(event) => {
                    let dispatcher = Dispatcher::new(&config, &table, &scheduler);
                    dispatcher.dispatch(event);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            }
        }

        match subscriber.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                error!("event source thread panicked");
                Err(CoreError::EventSourceInit("event source thread panicked".into()))
            }
        }
    }

    fn run_polling(&self) {
        polling::run(&self.config, self.inspector.as_ref());
    }

    /// Join every outstanding scan worker. Safe to call more than once.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
        info!("orchestrator shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Finding, Pid};
    use crate::eventsource::testing::ChannelEventSource;
    use crate::inspector::testing::FixtureInspector;

    #[test]
    fn event_driven_run_dispatches_every_event_then_shuts_down() {
        let inspector = Arc::new(FixtureInspector::new());
        inspector.set_response(Pid(1), Finding::default());

        let mut config = HHParams { out_dir: std::env::temp_dir(), etw_scan: true, ..HHParams::default() };
        // Restrict the watch list to the started PID so the parent
        // (pid 0, not a real scan target here) is filtered out and
        // exactly one scan happens.
        config.pids_list.insert(Pid(1));
        let orchestrator = Orchestrator::new(config, Arc::clone(&inspector) as Arc<dyn Inspector>);

        let events = vec![crate::domain::Event::ProcessStart {
            pid: Pid(1),
            parent_pid: Pid(0),
            image_file_name: "a.exe".into(),
        }];
        let source = Box::new(ChannelEventSource::new(events));

        orchestrator.run(source).unwrap();
        assert_eq!(inspector.call_count(), 1);
    }

    #[test]
    fn polling_run_completes_without_an_event_source() {
        let inspector = Arc::new(FixtureInspector::new());
        let config = HHParams {
            out_dir: std::env::temp_dir(),
            etw_scan: false,
            loop_scanning: false,
            ..HHParams::default()
        };
        let orchestrator = Orchestrator::new(config, Arc::clone(&inspector) as Arc<dyn Inspector>);
        let source = Box::new(ChannelEventSource::new(vec![]));
        orchestrator.run(source).unwrap();
    }
}
