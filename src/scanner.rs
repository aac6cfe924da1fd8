//! The Scanner wrapper (spec.md §4.4, component C4) — runs on its own
//! worker thread, invokes the Inspector, and hands the resulting
//! `Report` to whatever `ReportSink` the Scheduler was built with.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::domain::{HHParams, InspectorOptions, Pid, Report};
use crate::inspector::Inspector;
use crate::scheduler::ReportSink;
use crate::winapi;

/// Resolve the output directory for one scan (spec.md §4.4 step 1).
#[must_use]
pub fn resolve_output_dir(config: &HHParams, now: u64) -> std::path::PathBuf {
    if config.unique_dir {
        config.out_dir.join(format!("scan_{now}"))
    } else {
        config.out_dir.clone()
    }
}

/// Run one scan against `config`'s singleton `pids_list` PID.
///
/// `config` is expected to be a per-PID snapshot
/// (`HHParams::snapshot_for`); this function scans whichever single
/// PID the caller passed regardless, so the two stay in sync by
/// construction in `Scheduler::request_scan`.
pub fn run_scan(pid: Pid, config: &HHParams, inspector: &dyn Inspector, sink: &dyn ReportSink) {
    let now_wall = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let output_dir = resolve_output_dir(config, now_wall);

    let options = InspectorOptions { output_dir: output_dir.clone(), opts: config.inspector_opts.clone() };

    let mut report = Report::new(now_wall);
    report.output_dir = output_dir;

    let finding = inspector.inspect(pid, &options);
    let image_name = winapi::process_image_path(pid)
        .ok()
        .map(|p| crate::domain::basename_lower(&p))
        .unwrap_or_else(|| format!("pid-{pid}"));

    report.push(pid, image_name, finding);
    report.finish();

    sink.handle(report, config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_output_dir_plain_when_not_unique() {
        let config = HHParams { out_dir: "/tmp/out".into(), unique_dir: false, ..HHParams::default() };
        assert_eq!(resolve_output_dir(&config, 100), std::path::PathBuf::from("/tmp/out"));
    }

    #[test]
    fn resolve_output_dir_timestamped_when_unique() {
        let config = HHParams { out_dir: "/tmp/out".into(), unique_dir: true, ..HHParams::default() };
        assert_eq!(
            resolve_output_dir(&config, 100),
            std::path::PathBuf::from("/tmp/out/scan_100")
        );
    }

    struct NullSink;
    impl ReportSink for NullSink {
        fn handle(&self, report: crate::domain::Report, _config: &HHParams) {
            assert_eq!(report.findings.len(), 1);
        }
    }

    #[test]
    fn run_scan_produces_a_single_finding_report() {
        use crate::inspector::testing::FixtureInspector;
        let inspector = FixtureInspector::new();
        inspector.set_response(Pid(1), crate::domain::Finding::default());
        let config = HHParams { out_dir: "/tmp".into(), ..HHParams::default() }.snapshot_for(Pid(1));
        run_scan(Pid(1), &config, &inspector, &NullSink);
        assert_eq!(inspector.call_count(), 1);
    }
}
