//! Post-scan actuator (spec.md §4.7, component C7) — suspends or
//! terminates suspicious processes once a `Report` comes back from a
//! scan, gated by `HHParams::suspend_suspicious` / `kill_suspicious`.
//!
//! Actuator failures never propagate past this module (spec.md §4.7:
//! "may fail silently from the perspective of the scan pipeline") —
//! they're logged and swallowed so one process the OS won't let us
//! touch doesn't stop the rest of the report from being handled.

use log::warn;

use crate::domain::{ActuatorError, HHParams, Pid, Report};
use crate::winapi;

/// Apply the configured response to every suspicious PID in `report`,
/// returning every failure encountered (spec.md §4.7's error kind) so
/// callers that want to do more than log can.
pub fn act_on(report: &Report, config: &HHParams) -> Vec<ActuatorError> {
    let mut failures = Vec::new();
    if !config.kill_suspicious && !config.suspend_suspicious {
        return failures;
    }

    for pid in &report.suspicious {
        let outcome = if config.kill_suspicious {
            winapi::terminate_process(*pid).map_err(|e| ActuatorError::TerminateFailed(*pid, e.to_string()))
        } else if config.suspend_suspicious {
            winapi::suspend_process(*pid).map_err(|e| ActuatorError::SuspendFailed(*pid, e.to_string()))
        } else {
            Ok(())
        };

        if let Err(e) = outcome {
            warn!("post-scan actuator failed for pid {pid}: {e}");
            failures.push(e);
        }
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Finding;

    #[test]
    fn act_on_is_a_noop_when_neither_response_is_enabled() {
        let mut report = Report::new(0);
        report.push(Pid(1), "a.exe".into(), Finding { pid: Pid(1), suspicious: true, ..Finding::default() });
        let config = HHParams::default();
        // Neither suspend nor kill is enabled; this must not attempt
        // any OS call (which would fail on a nonexistent test PID and
        // only be caught by the warn! log, not a panic — this test
        // instead just asserts it returns without panicking).
        act_on(&report, &config);
    }

    #[test]
    fn act_on_skips_processes_that_are_not_suspicious() {
        let mut report = Report::new(0);
        report.push(Pid(2), "clean.exe".into(), Finding::default());
        let config = HHParams { kill_suspicious: true, ..HHParams::default() };
        assert!(report.suspicious.is_empty());
        act_on(&report, &config);
    }
}
