//! Per-PID scan state (spec.md §4.1, component C1).
//!
//! Keyed by `Pid` in a concurrent map rather than the source's
//! fixed-size array — see spec.md §9 ("Fixed-size PID table → keyed
//! map"): a 65536-slot array indexed by raw PID is unsafe on systems
//! where PIDs exceed that bound.

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::{Pid, WallClockSecs};

/// State tracked for one live PID. Exactly one `worker` may be active
/// at a time (spec.md §3 invariant).
#[derive(Default)]
pub struct ProcessStat {
    pub start_time: WallClockSecs,
    pub cooldown_until: WallClockSecs,
    pub last_scan_start: WallClockSecs,
    pub last_scan_end: WallClockSecs,
    pub worker: Option<JoinHandle<()>>,
}

impl ProcessStat {
    fn reset_fields(&mut self, start_time: WallClockSecs) {
        self.start_time = start_time;
        self.cooldown_until = 0;
        self.last_scan_start = 0;
        self.last_scan_end = 0;
    }
}

/// Returns the current wall clock as Unix seconds.
#[must_use]
pub fn now_secs() -> WallClockSecs {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// The ProcessStat table. Safe for concurrent use by the dispatcher
/// thread and scan worker threads: every mutating operation takes the
/// table-wide lock for the duration of the mutation only. A worker
/// handle is always `take()`n out and joined *after* the guard is
/// dropped — a still-running worker's own completion path (`end_scan`)
/// needs this same lock, so joining while holding it can deadlock.
#[derive(Default)]
pub struct ProcessStatTable {
    inner: Mutex<HashMap<Pid, ProcessStat>>,
}

impl ProcessStatTable {
    #[must_use]
    pub fn new() -> Self {
        ProcessStatTable::default()
    }

    /// Set `start_time`; zero all other fields; join-and-release any
    /// prior worker. A PID that just STARTed cannot have an
    /// outstanding scan from a prior incarnation (spec.md §4.1).
    pub fn touch_start(&self, pid: Pid, now: WallClockSecs) {
        let prior = {
            let mut table = self.inner.lock().unwrap();
            table.entry(pid).or_default().worker.take()
        };
        if let Some(handle) = prior {
            let _ = handle.join();
        }
        let mut table = self.inner.lock().unwrap();
        table.entry(pid).or_default().reset_fields(now);
    }

    /// Join-and-release the worker and clear fields. Must not fail if
    /// no worker exists (spec.md §4.1).
    pub fn mark_stop(&self, pid: Pid) {
        let handle = {
            let mut table = self.inner.lock().unwrap();
            table.remove(&pid).and_then(|mut stat| stat.worker.take())
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Set `last_scan_start = now`, `last_scan_end = 0`.
    pub fn begin_scan(&self, pid: Pid, now: WallClockSecs) {
        let mut table = self.inner.lock().unwrap();
        let entry = table.entry(pid).or_default();
        entry.last_scan_start = now;
        entry.last_scan_end = 0;
    }

    /// Set `last_scan_end = now`.
    pub fn end_scan(&self, pid: Pid, now: WallClockSecs) {
        let mut table = self.inner.lock().unwrap();
        let entry = table.entry(pid).or_default();
        entry.last_scan_end = now;
    }

    /// Replace the worker handle, first joining whatever was there.
    pub fn set_worker(&self, pid: Pid, handle: JoinHandle<()>) {
        let prior = {
            let mut table = self.inner.lock().unwrap();
            table.entry(pid).or_default().worker.take()
        };
        if let Some(prior) = prior {
            let _ = prior.join();
        }
        let mut table = self.inner.lock().unwrap();
        table.entry(pid).or_default().worker = Some(handle);
    }

    pub fn clear_worker(&self, pid: Pid) {
        let mut table = self.inner.lock().unwrap();
        if let Some(entry) = table.get_mut(&pid) {
            entry.worker = None;
        }
    }

    /// Snapshot of the fields `Scheduler::request_scan` needs to make
    /// its debounce decision, without holding the lock across the
    /// caller's own logic.
    #[must_use]
    pub fn snapshot(&self, pid: Pid) -> (WallClockSecs, WallClockSecs, WallClockSecs) {
        let table = self.inner.lock().unwrap();
        table
            .get(&pid)
            .map(|s| (s.start_time, s.last_scan_start, s.last_scan_end))
            .unwrap_or((0, 0, 0))
    }

    #[must_use]
    pub fn cooldown_until(&self, pid: Pid) -> WallClockSecs {
        let table = self.inner.lock().unwrap();
        table.get(&pid).map(|s| s.cooldown_until).unwrap_or(0)
    }

    pub fn set_cooldown_until(&self, pid: Pid, until: WallClockSecs) {
        let mut table = self.inner.lock().unwrap();
        let entry = table.entry(pid).or_default();
        entry.cooldown_until = until;
    }

    pub fn clear_cooldown(&self, pid: Pid) {
        let mut table = self.inner.lock().unwrap();
        if let Some(entry) = table.get_mut(&pid) {
            entry.cooldown_until = 0;
        }
    }

    /// Roll back a `begin_scan` that could not actually spawn a
    /// worker (spec.md §4.3 failure semantics: "the request is
    /// abandoned; `last_scan_start` is rolled back so the next event
    /// can retry").
    pub fn rollback_scan_start(&self, pid: Pid) {
        let mut table = self.inner.lock().unwrap();
        if let Some(entry) = table.get_mut(&pid) {
            entry.last_scan_start = 0;
        }
    }

    /// Number of PIDs currently holding a live worker handle. Used by
    /// tests to assert the no-leak property (spec.md §8).
    #[must_use]
    pub fn active_worker_count(&self) -> usize {
        let table = self.inner.lock().unwrap();
        table.values().filter(|s| s.worker.is_some()).count()
    }

    /// Join every outstanding worker (spec.md §4.3 `shutdown()`).
    pub fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut table = self.inner.lock().unwrap();
            table.values_mut().filter_map(|stat| stat.worker.take()).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_start_resets_fields() {
        let table = ProcessStatTable::new();
        table.begin_scan(Pid(1), 100);
        table.touch_start(Pid(1), 200);
        let (start, last_start, last_end) = table.snapshot(Pid(1));
        assert_eq!(start, 200);
        assert_eq!(last_start, 0);
        assert_eq!(last_end, 0);
    }

    #[test]
    fn touch_start_joins_prior_worker() {
        let table = ProcessStatTable::new();
        table.set_worker(Pid(1), std::thread::spawn(|| {}));
        table.touch_start(Pid(1), 1);
        assert_eq!(table.active_worker_count(), 0);
    }

    #[test]
    fn mark_stop_is_noop_without_prior_start() {
        let table = ProcessStatTable::new();
        table.mark_stop(Pid(999)); // must not panic
    }

    #[test]
    fn begin_and_end_scan_round_trip() {
        let table = ProcessStatTable::new();
        table.begin_scan(Pid(5), 10);
        let (_, start, end) = table.snapshot(Pid(5));
        assert_eq!(start, 10);
        assert_eq!(end, 0);
        table.end_scan(Pid(5), 20);
        let (_, start, end) = table.snapshot(Pid(5));
        assert_eq!(start, 10);
        assert_eq!(end, 20);
    }

    #[test]
    fn set_worker_joins_previous_handle() {
        let table = ProcessStatTable::new();
        table.set_worker(Pid(1), std::thread::spawn(|| {}));
        table.set_worker(Pid(1), std::thread::spawn(|| {}));
        assert_eq!(table.active_worker_count(), 1);
    }

    #[test]
    fn join_all_clears_every_worker() {
        let table = ProcessStatTable::new();
        table.set_worker(Pid(1), std::thread::spawn(|| {}));
        table.set_worker(Pid(2), std::thread::spawn(|| {}));
        table.join_all();
        assert_eq!(table.active_worker_count(), 0);
    }

    #[test]
    fn rollback_scan_start_clears_field() {
        let table = ProcessStatTable::new();
        table.begin_scan(Pid(1), 50);
        table.rollback_scan_start(Pid(1));
        let (_, start, _) = table.snapshot(Pid(1));
        assert_eq!(start, 0);
    }
}
