//! Event dispatcher (spec.md §4.6, component C6) — routes each `Event`
//! variant from the `EventSource` onto the `Scheduler`, gated by the
//! watch-list filter.
//!
//! Runs on whatever thread calls `dispatch` — for the ETW path that's
//! the consumer thread draining the `crossbeam_channel` the
//! `EventSource` writes onto (spec.md §5).

use log::debug;

use crate::domain::{Event, HHParams, Pid};
use crate::filter;
use crate::scheduler::Scheduler;
use crate::stat_table::{now_secs, ProcessStatTable};

/// A started process is never treated as a delayed image load (spec.md
/// §9 open question: "a PID never seen via `ProcessStart` has no
/// `start_time` to compare against — resolved as 'not delayed',
/// i.e. scan it").
const DELAYED_LOAD_GRACE_SECS: u64 = 1;

pub struct Dispatcher<'a> {
    config: &'a HHParams,
    table: &'a ProcessStatTable,
    scheduler: &'a Scheduler,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(config: &'a HHParams, table: &'a ProcessStatTable, scheduler: &'a Scheduler) -> Self {
        Dispatcher { config, table, scheduler }
    }

    /// Route one `Event` per spec.md §4.6's table.
    pub fn dispatch(&self, event: Event) {
        match event {
            Event::ProcessStart { pid, parent_pid, image_file_name } => {
                self.table.touch_start(pid, now_secs());
                let name = crate::domain::basename_lower(&image_file_name);
                if filter::is_watched(self.config, pid, Some(&name)) {
                    self.scheduler.request_scan(pid);
                }
                // A freshly started child is a classic hollowing
                // target for its parent to have already primed; a
                // watched parent is worth a follow-up look too.
                if filter::is_watched(self.config, parent_pid, None) {
                    self.scheduler.request_scan(parent_pid);
                }
            }

            Event::ProcessStop { pid } => {
                self.table.mark_stop(pid);
            }

            Event::ImageLoad { pid, file_name } => {
                let name = crate::domain::basename_lower(&file_name);
                if !filter::is_watched(self.config, pid, Some(&name)) {
                    return;
                }
                if self.is_delayed_load(pid) {
                    debug!("dropping image-load scan for pid {pid}: within delayed-load grace window");
                    return;
                }
                self.scheduler.request_scan(pid);
            }

            Event::TcpIp { pid, kind: _ } => {
                if filter::is_watched(self.config, pid, None) {
                    self.scheduler.request_scan(pid);
                }
            }

            Event::VirtualAlloc { pid, base_address } => {
                if filter::is_watched(self.config, pid, None) {
                    self.scheduler.allocation_gated_scan(pid, base_address);
                }
            }

            Event::HandleDuplicate { target_pid } => {
                if filter::is_watched(self.config, target_pid, None) {
                    self.scheduler.request_scan(target_pid);
                }
            }
        }
    }

    /// A PID with no recorded `start_time` was never observed via
    /// `ProcessStart` — per the resolved open question, treat it as
    /// not delayed (i.e. scan it). Otherwise, an image load within
    /// `DELAYED_LOAD_GRACE_SECS` of process start is assumed to be
    /// ordinary module loading, not a delayed-load injection.
    fn is_delayed_load(&self, pid: Pid) -> bool {
        let (start_time, _, _) = self.table.snapshot(pid);
        if start_time == 0 {
            return false;
        }
        now_secs().saturating_sub(start_time) <= DELAYED_LOAD_GRACE_SECS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Finding;
    use crate::inspector::testing::FixtureInspector;
    use crate::scheduler::ReportSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        count: AtomicUsize,
    }
    impl ReportSink for CountingSink {
        fn handle(&self, _report: crate::domain::Report, _config: &HHParams) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn harness() -> (HHParams, ProcessStatTable, Scheduler, Arc<FixtureInspector>, Arc<CountingSink>) {
        let config = HHParams { out_dir: std::env::temp_dir(), ..HHParams::default() };
        let table = ProcessStatTable::new();
        let inspector = Arc::new(FixtureInspector::new());
        let sink = Arc::new(CountingSink { count: AtomicUsize::new(0) });
        let scheduler = Scheduler::new(
            Arc::new(ProcessStatTable::new()),
            Arc::new(config.clone()),
            Arc::clone(&inspector) as Arc<dyn crate::inspector::Inspector>,
            Arc::clone(&sink) as Arc<dyn ReportSink>,
        );
        (config, table, scheduler, inspector, sink)
    }

    #[test]
    fn process_start_records_start_time_and_triggers_scan() {
        let (config, table, scheduler, inspector, sink) = harness();
        inspector.set_response(Pid(10), Finding::default());
        let dispatcher = Dispatcher::new(&config, &table, &scheduler);
        dispatcher.dispatch(Event::ProcessStart {
            pid: Pid(10),
            parent_pid: Pid(4),
            image_file_name: "evil.exe".into(),
        });
        scheduler.shutdown();
        let (start, _, _) = table.snapshot(Pid(10));
        assert_ne!(start, 0);
        // Both the started PID and its (also watched, under default
        // config) parent get a scan request.
        assert_eq!(sink.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn process_stop_marks_stop() {
        let (config, table, scheduler, _inspector, _sink) = harness();
        table.touch_start(Pid(5), now_secs());
        let dispatcher = Dispatcher::new(&config, &table, &scheduler);
        dispatcher.dispatch(Event::ProcessStop { pid: Pid(5) });
        let (start, _, _) = table.snapshot(Pid(5));
        assert_eq!(start, 0);
    }

    #[test]
    fn image_load_dropped_within_grace_window_of_start() {
        let (config, table, scheduler, inspector, sink) = harness();
        inspector.set_response(Pid(20), Finding::default());
        table.touch_start(Pid(20), now_secs());
        let dispatcher = Dispatcher::new(&config, &table, &scheduler);
        dispatcher.dispatch(Event::ImageLoad { pid: Pid(20), file_name: "foo.dll".into() });
        scheduler.shutdown();
        assert_eq!(sink.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn image_load_for_untracked_pid_is_not_delayed() {
        let (config, table, scheduler, inspector, sink) = harness();
        inspector.set_response(Pid(21), Finding::default());
        let dispatcher = Dispatcher::new(&config, &table, &scheduler);
        dispatcher.dispatch(Event::ImageLoad { pid: Pid(21), file_name: "foo.dll".into() });
        scheduler.shutdown();
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn filtered_out_pid_never_reaches_scheduler() {
        let mut config = HHParams { out_dir: std::env::temp_dir(), ..HHParams::default() };
        config.pids_list.insert(Pid(999));
        let table = ProcessStatTable::new();
        let inspector = Arc::new(FixtureInspector::new());
        let sink = Arc::new(CountingSink { count: AtomicUsize::new(0) });
        let scheduler = Scheduler::new(
            Arc::new(ProcessStatTable::new()),
            Arc::new(config.clone()),
            Arc::clone(&inspector) as Arc<dyn crate::inspector::Inspector>,
            Arc::clone(&sink) as Arc<dyn ReportSink>,
        );
        let dispatcher = Dispatcher::new(&config, &table, &scheduler);
        dispatcher.dispatch(Event::TcpIp { pid: Pid(1), kind: crate::domain::TcpIpKind::Connect });
        scheduler.shutdown();
        assert_eq!(sink.count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handle_duplicate_targets_the_target_pid() {
        let (config, table, scheduler, inspector, sink) = harness();
        inspector.set_response(Pid(30), Finding::default());
        let dispatcher = Dispatcher::new(&config, &table, &scheduler);
        dispatcher.dispatch(Event::HandleDuplicate { target_pid: Pid(30) });
        scheduler.shutdown();
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
    }
}
