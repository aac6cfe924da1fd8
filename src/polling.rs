//! Polling front-end (spec.md §4.8, component C8) — the non-ETW
//! scanning mode: enumerate every running process, filter, and scan
//! each one directly on the calling thread instead of going through
//! the `Scheduler`.
//!
//! Used when `HHParams::etw_scan` is `false`; no debounce/cooldown
//! applies here since there is no event stream to debounce against —
//! one pass already visits each PID exactly once.

use log::{info, warn};

use crate::actuator;
use crate::domain::{HHParams, Pid, Report};
use crate::filter;
use crate::inspector::Inspector;
use crate::report;
use crate::winapi;

/// Run one full enumerate-filter-scan pass, returning the aggregated
/// `Report`. The caller decides whether to loop (`HHParams::loop_scanning`).
pub fn run_pass(config: &HHParams, inspector: &dyn Inspector) -> Report {
    let now_wall = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let mut out = Report::new(now_wall);
    out.output_dir = crate::scanner::resolve_output_dir(config, now_wall);

    let pids = match winapi::enumerate_pids() {
        Ok(pids) => pids,
        Err(e) => {
            warn!("process enumeration failed: {e}");
            out.finish();
            return out;
        }
    };

    for pid in pids {
        let image_path = winapi::process_image_path(pid).ok();
        let image_name = image_path.as_deref().map(crate::domain::basename_lower);

        if !filter::is_watched(config, pid, image_name.as_deref()) {
            continue;
        }

        if let Some(threshold) = config.ptimes {
            let creation_time = winapi::process_creation_time(pid).unwrap_or(now_wall);
            if !filter::passes_time_threshold(Some(threshold), now_wall, creation_time) {
                continue;
            }
        }

        let options = crate::domain::InspectorOptions {
            output_dir: out.output_dir.clone(),
            opts: config.inspector_opts.clone(),
        };
        let finding = inspector.inspect(pid, &options);
        out.push(pid, image_name.unwrap_or_else(|| format!("pid-{pid}")), finding);
    }

    out.finish();
    info!("polling pass complete: scanned {} process(es)", out.findings.len());
    out
}

/// Run polling mode to completion: one pass, or forever if
/// `config.loop_scanning` is set. Each pass is published and actuated
/// exactly like the event-driven path's per-scan `Report`.
pub fn run(config: &HHParams, inspector: &dyn Inspector) {
    loop {
        let pass = run_pass(config, inspector);
        report::publish(&pass, config);
        actuator::act_on(&pass, config);

        if !config.loop_scanning {
            break;
        }
    }
}
