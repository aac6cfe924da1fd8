//! The scan scheduler (spec.md §4.3, component C3) — the central
//! choke point every scan request funnels through.
//!
//! Enforces debounce, single-flight per PID, and the allocation
//! cooldown, then spawns a worker thread running the Scanner wrapper.

use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::domain::{HHParams, Pid};
use crate::inspector::Inspector;
use crate::scanner;
use crate::stat_table::{now_secs, ProcessStatTable};
use crate::winapi;

/// Debounce/cooldown window (spec.md §4.3: "while a scan is in
/// flight, and for one second after it finishes, suppress
/// duplicates"; "arm `cooldown_until = now + 1 second`").
pub const DEBOUNCE_SECS: u64 = 1;

/// What to do with a finished `Report`: render/log/write it and run
/// the post-scan actuator. Kept as a trait object so `Scheduler`
/// doesn't need to know about the Report aggregator or actuator
/// directly — the `Orchestrator` wires the real one in.
pub trait ReportSink: Send + Sync {
    fn handle(&self, report: crate::domain::Report, config: &HHParams);
}

/// Serializes scan requests and owns the worker pool (one thread per
/// in-flight scan).
pub struct Scheduler {
    table: Arc<ProcessStatTable>,
    config: Arc<HHParams>,
    latch: Mutex<()>,
    inspector: Arc<dyn Inspector>,
    sink: Arc<dyn ReportSink>,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        table: Arc<ProcessStatTable>,
        config: Arc<HHParams>,
        inspector: Arc<dyn Inspector>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        Scheduler { table, config, latch: Mutex::new(()), inspector, sink }
    }

    /// spec.md §4.3 `request_scan`.
    pub fn request_scan(&self, pid: Pid) {
        let _guard = self.latch.lock().unwrap();
        let now = now_secs();

        let (_, last_scan_start, last_scan_end) = self.table.snapshot(pid);

        // Debounce: a scan is in flight, or finished within the last
        // DEBOUNCE_SECS.
        if last_scan_start != 0
            && (last_scan_end == 0 || now.saturating_sub(last_scan_end) <= DEBOUNCE_SECS)
        {
            return;
        }

        self.table.begin_scan(pid, now);

        let snapshot = self.config.snapshot_for(pid);
        let table = Arc::clone(&self.table);
        let inspector = Arc::clone(&self.inspector);
        let sink = Arc::clone(&self.sink);

        let handle = std::thread::Builder::new().name(format!("scan-{pid}")).spawn(move || {
            scanner::run_scan(pid, &snapshot, inspector.as_ref(), sink.as_ref());
            table.end_scan(pid, now_secs());
        });

        match handle {
            Ok(handle) => {
                self.table.set_worker(pid, handle);
                info!("scan requested for pid {pid}");
            }
            Err(e) => {
                // spec.md §4.3 failure semantics: worker spawn failure
                // rolls back the scan-start so the next event can retry.
                warn!("failed to spawn scan worker for pid {pid}: {e}");
                self.table.rollback_scan_start(pid);
            }
        }
    }

    /// spec.md §4.3 allocation-gated scan, invoked only from
    /// `VirtualAlloc` events.
    pub fn allocation_gated_scan(&self, pid: Pid, base_address: u64) {
        {
            let _guard = self.latch.lock().unwrap();
            let now = now_secs();
            let cooldown_until = self.table.cooldown_until(pid);
            if cooldown_until > now {
                return;
            }
            if cooldown_until != 0 && cooldown_until <= now {
                self.table.clear_cooldown(pid);
            }
        }

        let executable = match winapi::query_regions_for_allocation(pid, base_address) {
            Ok(regions) => regions.iter().any(winapi::MemoryRegion::is_executable),
            Err(e) => {
                warn!("failed to query memory regions for pid {pid}: {e}");
                false
            }
        };
        if !executable {
            return;
        }

        {
            let _guard = self.latch.lock().unwrap();
            self.table.set_cooldown_until(pid, now_secs() + DEBOUNCE_SECS);
        }

        self.request_scan(pid);
    }

    /// Join every outstanding worker (spec.md §4.3 `shutdown()`).
    pub fn shutdown(&self) {
        self.table.join_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Finding;
    use crate::inspector::testing::FixtureInspector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink {
        count: AtomicUsize,
    }

    impl ReportSink for CountingSink {
        fn handle(&self, _report: crate::domain::Report, _config: &HHParams) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn make_scheduler() -> (Scheduler, Arc<FixtureInspector>, Arc<CountingSink>) {
        let table = Arc::new(ProcessStatTable::new());
        let config = Arc::new(HHParams { out_dir: std::env::temp_dir(), ..HHParams::default() });
        let inspector = Arc::new(FixtureInspector::new());
        let sink = Arc::new(CountingSink { count: AtomicUsize::new(0) });
        let scheduler =
            Scheduler::new(table, config, Arc::clone(&inspector) as Arc<dyn Inspector>, Arc::clone(&sink) as Arc<dyn ReportSink>);
        (scheduler, inspector, sink)
    }

    #[test]
    fn single_flight_drops_request_while_scan_in_progress() {
        let (scheduler, inspector, _sink) = make_scheduler();
        inspector.set_response(Pid(1), Finding::default());

        // Simulate "scan in progress" directly on the table to avoid a
        // timing-dependent race with the spawned worker thread.
        scheduler.table.begin_scan(Pid(1), now_secs());
        scheduler.request_scan(Pid(1));
        // Debounced: last_scan_end is still 0 (in progress), so the
        // second request must not begin a fresh scan.
        let (_, start, end) = scheduler.table.snapshot(Pid(1));
        assert_eq!(end, 0);
        let _ = start;
    }

    #[test]
    fn debounce_drops_request_within_one_second_of_scan_end() {
        let (scheduler, _inspector, _sink) = make_scheduler();
        let now = now_secs();
        scheduler.table.begin_scan(Pid(1), now);
        scheduler.table.end_scan(Pid(1), now);
        scheduler.request_scan(Pid(1));
        // No new scan should have started: last_scan_start unchanged.
        let (_, start, _) = scheduler.table.snapshot(Pid(1));
        assert_eq!(start, now);
    }

    #[test]
    fn request_scan_runs_and_completes() {
        let (scheduler, inspector, sink) = make_scheduler();
        inspector.set_response(Pid(7), Finding::default());
        scheduler.request_scan(Pid(7));
        scheduler.shutdown();
        assert_eq!(inspector.call_count(), 1);
        assert_eq!(sink.count.load(Ordering::SeqCst), 1);
        let (_, _, end) = scheduler.table.snapshot(Pid(7));
        assert_ne!(end, 0);
    }

    #[test]
    fn allocation_cooldown_blocks_until_elapsed() {
        let (scheduler, _inspector, _sink) = make_scheduler();
        scheduler.table.set_cooldown_until(Pid(1), now_secs() + 1000);
        // Cooldown far in the future: the gate must short-circuit
        // before even querying memory (which would error on a
        // nonexistent test PID, proving it wasn't reached here would
        // require instrumentation; this test instead checks state is
        // unchanged after the call).
        scheduler.allocation_gated_scan(Pid(1), 0x1000);
        let (_, start, _) = scheduler.table.snapshot(Pid(1));
        assert_eq!(start, 0);
    }
}
