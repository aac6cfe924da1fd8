//! Core domain types shared across the orchestrator.
//!
//! These are thin newtypes over OS primitives (`Pid`) plus the plain
//! data structures the rest of the crate passes around: scan
//! configuration, the Inspector's verdict, and the aggregated report.

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// OS-assigned process identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pid(pub u32);

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in whole seconds. `0` means "unset" (spec.md §3:
/// both `last_scan_start`/`last_scan_end` being `0` means "never
/// scanned").
pub type WallClockSecs = u64;

/// Detection level requested of the Inspector, forwarded verbatim as
/// part of `InspectorOptions`. Recognized names mirror the pass-through
/// scanner flags in spec.md §6 (`iat`, `hooks`, `shellc`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectorOpts {
    pub iat_hooks: bool,
    pub inline_hooks: bool,
    pub shellcode: bool,
    pub obfuscation: bool,
    pub threads: bool,
    pub data_sections: bool,
    pub dotnet: bool,
    pub dump_mode: bool,
    pub implanted_pe: bool,
    pub minidump: bool,
    pub reflective: bool,
    pub cache: bool,
    pub output_filter: Option<String>,
    pub pattern: Option<String>,
}

/// Per-scan options handed to `Inspector::inspect` (spec.md §4.4 step 1/2).
#[derive(Debug, Clone)]
pub struct InspectorOptions {
    pub output_dir: std::path::PathBuf,
    pub opts: InspectorOpts,
}

/// Verdict produced by the Inspector for a single PID (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finding {
    pub pid: Pid,
    pub suspicious: bool,
    pub replaced: bool,
    pub hdr_modified: bool,
    pub patched: bool,
    pub iat_hooked: bool,
    pub implanted_pe: bool,
    pub implanted_shc: bool,
    pub unreachable_file: bool,
    pub errors: bool,
    pub is_managed: bool,
    pub other: Vec<String>,
}

impl Default for Pid {
    fn default() -> Self {
        Pid(0)
    }
}

impl Finding {
    /// A Finding carrying only the `errors` flag, used when the target
    /// process could not be opened (spec.md §4.4: "the rest of the
    /// pipeline continues normally").
    #[must_use]
    pub fn access_error(pid: Pid) -> Self {
        Finding { pid, errors: true, ..Finding::default() }
    }
}

/// Collected result of one scan pass over one or more PIDs (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub findings: Vec<(Pid, Finding)>,
    pub image_names: Vec<(Pid, String)>,
    pub suspicious: Vec<Pid>,
    pub start: Option<Instant>,
    pub end: Option<Instant>,
    pub start_wall_clock: WallClockSecs,
    /// The directory the Inspector actually dumped artefacts into for
    /// this scan (spec.md §4.4 step 1), resolved once up front so
    /// `report::publish` writes `summary.txt` into that same directory
    /// rather than re-resolving it against a later wall-clock "now".
    pub output_dir: std::path::PathBuf,
}

impl Report {
    #[must_use]
    pub fn new(start_wall_clock: WallClockSecs) -> Self {
        Report { start: Some(Instant::now()), start_wall_clock, ..Report::default() }
    }

    /// Append one PID's Finding and image name, updating the
    /// suspicious-PID list if the Finding warrants it.
    pub fn push(&mut self, pid: Pid, image_name: String, finding: Finding) {
        if finding.suspicious {
            self.suspicious.push(pid);
        }
        self.image_names.push((pid, image_name));
        self.findings.push((pid, finding));
    }

    pub fn finish(&mut self) {
        self.end = Some(Instant::now());
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        match (self.start, self.end) {
            (Some(s), Some(e)) => e.saturating_duration_since(s).as_millis() as u64,
            _ => 0,
        }
    }

    #[must_use]
    pub fn image_name_for(&self, pid: Pid) -> Option<&str> {
        self.image_names.iter().find(|(p, _)| *p == pid).map(|(_, name)| name.as_str())
    }

    #[must_use]
    pub fn finding_for(&self, pid: Pid) -> Option<&Finding> {
        self.findings.iter().find(|(p, _)| *p == pid).map(|(_, f)| f)
    }
}

/// Events emitted by the kernel trace subscription (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ProcessStart { pid: Pid, parent_pid: Pid, image_file_name: String },
    ProcessStop { pid: Pid },
    ImageLoad { pid: Pid, file_name: String },
    TcpIp { pid: Pid, kind: TcpIpKind },
    VirtualAlloc { pid: Pid, base_address: u64 },
    HandleDuplicate { target_pid: Pid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpIpKind {
    Connect,
    Accept,
    Send,
    Receive,
}

/// Scan-time configuration (spec.md §3 `HHParams`).
#[derive(Debug, Clone)]
pub struct HHParams {
    pub out_dir: std::path::PathBuf,
    pub unique_dir: bool,
    pub loop_scanning: bool,
    pub etw_scan: bool,
    pub suspend_suspicious: bool,
    pub kill_suspicious: bool,
    pub quiet: bool,
    pub log: bool,
    pub json_output: bool,
    pub ptimes: Option<u64>,
    pub names_list: HashSet<String>,
    pub pids_list: HashSet<Pid>,
    pub ignored_names_list: HashSet<String>,
    pub inspector_opts: InspectorOpts,
}

impl Default for HHParams {
    fn default() -> Self {
        HHParams {
            out_dir: std::path::PathBuf::from("."),
            unique_dir: false,
            loop_scanning: false,
            etw_scan: true,
            suspend_suspicious: false,
            kill_suspicious: false,
            quiet: false,
            log: false,
            json_output: false,
            ptimes: None,
            names_list: HashSet::new(),
            pids_list: HashSet::new(),
            ignored_names_list: HashSet::new(),
            inspector_opts: InspectorOpts::default(),
        }
    }
}

impl HHParams {
    /// Snapshot used by a single worker: `pids_list` replaced with the
    /// singleton `{pid}`, `names_list` cleared (spec.md §4.3 step 5 —
    /// "a worker only touches its own PID").
    #[must_use]
    pub fn snapshot_for(&self, pid: Pid) -> HHParams {
        let mut snap = self.clone();
        snap.pids_list = HashSet::from([pid]);
        snap.names_list = HashSet::new();
        snap
    }
}

/// Strip path components and lowercase, per spec.md §4.2 ("Image-name
/// comparisons are case-insensitive and performed against the
/// basename only").
#[must_use]
pub fn basename_lower(path: &str) -> String {
    let base = path.rsplit(['\\', '/']).next().unwrap_or(path);
    base.to_lowercase()
}
