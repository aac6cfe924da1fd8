//! The `Inspector` boundary (spec.md §1, §6): the PE-integrity scanner
//! that the core invokes as `inspect(pid, options) -> Finding`.
//!
//! Its internals are explicitly out of scope per spec.md — the real
//! tool ships a separate, much larger component for this. What lives
//! here is the trait boundary plus a deliberately thin production
//! adapter (`WinPeInspector`) that does just enough real work (open
//! the process, compare its mapped main-module image against the
//! on-disk file) to exercise the rest of the pipeline end to end; it
//! is not a substitute for the full scanner.

use crate::domain::{Finding, InspectorOptions, Pid};

/// Contract for the memory-integrity scanner (spec.md §6).
///
/// Implementations must be safe to call concurrently for distinct
/// PIDs (spec.md §6: "Synchronous; thread-safe across distinct
/// PIDs").
pub trait Inspector: Send + Sync {
    fn inspect(&self, pid: Pid, options: &InspectorOptions) -> Finding;
}

/// Production adapter. See the module doc: intentionally minimal.
#[derive(Debug, Default)]
pub struct WinPeInspector;

impl Inspector for WinPeInspector {
    fn inspect(&self, pid: Pid, options: &InspectorOptions) -> Finding {
        match crate::winapi::inspect_process_image(pid) {
            Ok(verdict) => {
                let mut finding = Finding { pid, ..Finding::default() };
                finding.replaced = verdict.image_mismatch;
                finding.hdr_modified = verdict.header_modified;
                finding.is_managed = verdict.is_managed;
                finding.suspicious =
                    finding.replaced || finding.hdr_modified || finding.implanted_shc;
                if options.opts.pattern.is_some() {
                    finding.other.push("pattern-scan-not-implemented".into());
                }
                finding
            }
            Err(_) => Finding::access_error(pid),
        }
    }
}

/// Test double with a scripted response table, used by Scheduler and
/// Orchestrator unit tests so they do not depend on real process
/// access.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::{Finding, Inspector, InspectorOptions, Pid};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FixtureInspector {
        responses: Mutex<HashMap<Pid, Finding>>,
        pub calls: Mutex<Vec<Pid>>,
    }

    impl FixtureInspector {
        #[must_use]
        pub fn new() -> Self {
            FixtureInspector::default()
        }

        pub fn set_response(&self, pid: Pid, finding: Finding) {
            self.responses.lock().unwrap().insert(pid, finding);
        }

        #[must_use]
        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Inspector for FixtureInspector {
        fn inspect(&self, pid: Pid, _options: &InspectorOptions) -> Finding {
            self.calls.lock().unwrap().push(pid);
            self.responses
                .lock()
                .unwrap()
                .get(&pid)
                .cloned()
                .unwrap_or_else(|| Finding { pid, ..Finding::default() })
        }
    }
}
