//! Report aggregator (spec.md §4.5, component C5) — pure formatting
//! over a `Report`, plus the write/stdout policy spec.md §4.5 and §7
//! require.

use std::io::Write;
use std::sync::Mutex;

use log::error;
use serde::Serialize;

use crate::domain::{Finding, HHParams, Report, ReportError};

/// Render the human-readable multi-line summary (spec.md §4.5
/// "Text"). Rendering the same `Report` twice must yield
/// byte-identical output (spec.md §8 idempotence law) — this function
/// reads only from `Report` and `HHParams`, never from wall-clock
/// "now", so that property holds by construction.
#[must_use]
pub fn render_text(report: &Report, config: &HHParams) -> String {
    let mut out = String::new();
    let datetime = format_local_ish(report.start_wall_clock);
    out.push_str(&format!("Scan started: {datetime} ({})\n", report.start_wall_clock));

    let elapsed_ms = report.elapsed_ms();
    out.push_str(&format!("Elapsed: {}\n", format_elapsed(elapsed_ms)));

    out.push_str(&format!("Scanned: {}\n", report.findings.len()));
    out.push_str(&format!("Suspicious: {}\n", report.suspicious.len()));

    if !report.suspicious.is_empty() {
        out.push_str("\nSuspicious processes:\n");
        for pid in &report.suspicious {
            let name = report.image_name_for(*pid).unwrap_or("<unknown>");
            out.push_str(&format!("  pid={pid} name={name}\n"));
        }
    }

    if !config.quiet || !report.suspicious.is_empty() {
        out.push_str("\nAll scanned:\n");
        for (pid, finding) in &report.findings {
            let name = report.image_name_for(*pid).unwrap_or("<unknown>");
            out.push_str(&format!("  pid={pid} name={name} {}\n", describe_finding(finding)));
        }
    }

    out
}

fn describe_finding(finding: &Finding) -> String {
    let mut flags = Vec::new();
    if finding.suspicious {
        flags.push("suspicious");
    }
    if finding.replaced {
        flags.push("replaced");
    }
    if finding.hdr_modified {
        flags.push("hdr_modified");
    }
    if finding.errors {
        flags.push("errors");
    }
    if flags.is_empty() {
        "clean".to_string()
    } else {
        flags.join(",")
    }
}

fn format_elapsed(ms: u64) -> String {
    let secs = ms / 1000;
    let minutes = secs / 60;
    if minutes > 0 {
        format!("{ms}ms ({secs}s, {minutes}m)")
    } else if secs > 0 {
        format!("{ms}ms ({secs}s)")
    } else {
        format!("{ms}ms")
    }
}

/// A deliberately simple, deterministic local-time-ish rendering: no
/// timezone database dependency, just a UTC breakdown of the Unix
/// timestamp. Good enough for a log line; not meant to match any
/// particular locale's formatting.
fn format_local_ish(unix_secs: u64) -> String {
    const SECS_PER_DAY: u64 = 86_400;
    let days_since_epoch = unix_secs / SECS_PER_DAY;
    let secs_of_day = unix_secs % SECS_PER_DAY;
    let (y, m, d) = civil_from_days(days_since_epoch as i64);
    format!(
        "{y:04}-{m:02}-{d:02} {:02}:{:02}:{:02}Z",
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

/// Howard Hinnant's `civil_from_days` algorithm (public-domain,
/// widely ported): converts a day count since the Unix epoch into a
/// proleptic-Gregorian (year, month, day) tuple without pulling in a
/// full calendar/timezone crate.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[derive(Serialize)]
struct JsonReport {
    scan_date_time: String,
    scan_timestamp: u64,
    scan_time_ms: u64,
    scanned_count: usize,
    suspicious_count: usize,
    suspicious: Vec<JsonSuspicious>,
}

/// Detection flags are rendered as `0`/`1` integers, not JSON booleans,
/// matching the original scanner's `std::dec`-streamed report fields
/// (spec.md §8 scenario 6: `suspicious[0].replaced=1`).
#[derive(Serialize)]
struct JsonSuspicious {
    pid: u32,
    is_managed: u8,
    name: String,
    replaced: u8,
    hdr_modified: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    patched: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    iat_hooked: Option<u8>,
    implanted_pe: u8,
    implanted_shc: u8,
    unreachable_file: u8,
    other: Vec<String>,
}

/// Render the JSON summary (spec.md §4.5 "JSON"). `hook_scanning` and
/// `iat_scanning` gate the optional `patched`/`iat_hooked` fields per
/// spec.md's "(only if hook-scanning enabled)" / "(only if
/// IAT-scanning enabled)".
///
/// # Errors
/// Returns an error if the report cannot be serialized.
pub fn render_json(
    report: &Report,
    hook_scanning: bool,
    iat_scanning: bool,
) -> Result<String, ReportError> {
    let suspicious = report
        .suspicious
        .iter()
        .map(|pid| {
            let finding = report.finding_for(*pid).cloned().unwrap_or_default();
            let name = report.image_name_for(*pid).unwrap_or("<unknown>").to_string();
            JsonSuspicious {
                pid: pid.0,
                is_managed: u8::from(finding.is_managed),
                name,
                replaced: u8::from(finding.replaced),
                hdr_modified: u8::from(finding.hdr_modified),
                patched: hook_scanning.then_some(u8::from(finding.patched)),
                iat_hooked: iat_scanning.then_some(u8::from(finding.iat_hooked)),
                implanted_pe: u8::from(finding.implanted_pe),
                implanted_shc: u8::from(finding.implanted_shc),
                unreachable_file: u8::from(finding.unreachable_file),
                other: finding.other,
            }
        })
        .collect();

    let out = JsonReport {
        scan_date_time: format_local_ish(report.start_wall_clock),
        scan_timestamp: report.start_wall_clock,
        scan_time_ms: report.elapsed_ms(),
        scanned_count: report.findings.len(),
        suspicious_count: report.suspicious.len(),
        suspicious,
    };

    serde_json::to_string_pretty(&out).map_err(ReportError::from)
}

/// Protects concurrent writers from interleaving stdout lines (spec.md
/// §5's "Stdout latch").
pub static STDOUT_LATCH: Mutex<()> = Mutex::new(());

/// Apply the write/stdout policy from spec.md §4.5 and §7:
/// - always append the text summary to `log.txt` when `config.log`,
/// - write `summary.txt` inside the scan's output directory when
///   anything was suspicious,
/// - print to stdout unless quiet and zero suspicious findings.
///
/// Write failures are logged to stderr and otherwise swallowed (spec.md
/// §7 kind 5): they must never take down a scan that already
/// succeeded in memory.
pub fn publish(report: &Report, config: &HHParams) {
    let text = render_text(report, config);

    if config.log {
        if let Err(e) = append_log(&text) {
            error!("failed to append to log.txt: {e}");
        }
    }

    if !report.suspicious.is_empty() {
        if let Err(e) = write_summary(report, config, &text) {
            error!("failed to write summary.txt: {e}");
        }
    }

    if !(config.quiet && report.suspicious.is_empty()) {
        let _guard = STDOUT_LATCH.lock().unwrap();
        if config.json_output {
            match render_json(
                report,
                config.inspector_opts.inline_hooks,
                config.inspector_opts.iat_hooks,
            ) {
                Ok(json) => println!("{json}"),
                Err(e) => error!("failed to render JSON report: {e}"),
            }
        } else {
            print!("{text}");
        }
    }
}

fn append_log(text: &str) -> Result<(), ReportError> {
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open("log.txt")?;
    writeln!(file, "{text}")?;
    Ok(())
}

fn write_summary(report: &Report, _config: &HHParams, text: &str) -> Result<(), ReportError> {
    std::fs::create_dir_all(&report.output_dir)?;
    std::fs::write(report.output_dir.join("summary.txt"), text)?;
    Ok(())
}
