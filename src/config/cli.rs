//! Command-line argument parsing (spec.md §6), grounded on the flag
//! names and defaults from the scanner's own parameter table
//! (`iat`, `hooks`, `shellc`, `pname`, `pignore`, `ptimes`, ...).

use std::path::PathBuf;

use clap::Parser;

use crate::domain::{HHParams, InspectorOpts, Pid};

/// Event-driven memory-integrity scan orchestrator for Windows
/// processes.
#[derive(Parser, Debug)]
#[command(name = "hollowwatch", version, about)]
pub struct Args {
    /// Scan only this PID (repeatable).
    #[arg(long = "pid")]
    pub pid: Vec<u32>,

    /// Scan only processes whose image name matches (repeatable).
    #[arg(long = "pname")]
    pub pname: Vec<String>,

    /// Never scan processes whose image name matches (repeatable).
    #[arg(long = "pignore")]
    pub pignore: Vec<String>,

    /// Never scan processes whose module name matches (repeatable,
    /// forwarded to the Inspector).
    #[arg(long = "mignore")]
    pub mignore: Vec<String>,

    /// Only scan processes at least this many seconds old.
    #[arg(long)]
    pub ptimes: Option<u64>,

    /// Subscribe to live ETW process events instead of one-shot polling.
    #[arg(long)]
    pub etw: bool,

    /// Keep scanning passes running after the first (polling mode only).
    #[arg(long = "loop")]
    pub loop_scanning: bool,

    /// Suspend every suspicious process after its scan completes.
    #[arg(long)]
    pub suspend: bool,

    /// Terminate every suspicious process after its scan completes.
    #[arg(long)]
    pub kill: bool,

    /// Suppress stdout output for scans that found nothing.
    #[arg(long)]
    pub quiet: bool,

    /// Append every scan's text report to log.txt.
    #[arg(long)]
    pub log: bool,

    /// Print reports as JSON instead of the text format.
    #[arg(long)]
    pub json: bool,

    /// JSON detail level (reserved for future per-field verbosity tiers).
    #[arg(long, default_value_t = 0)]
    pub jlvl: u32,

    /// Output directory for per-scan dumps and summaries.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Give every scan pass its own timestamped subdirectory under `dir`.
    #[arg(long)]
    pub uniqd: bool,

    /// Path to an ETW profile INI file (spec.md §6); defaults to
    /// watching every provider when absent.
    #[arg(long)]
    pub etw_profile: Option<PathBuf>,

    // --- Inspector pass-through flags (spec.md §6) ---
    #[arg(long = "iat")]
    pub iat: bool,
    #[arg(long)]
    pub hooks: bool,
    #[arg(long = "shellc")]
    pub shellc: bool,
    #[arg(long = "obfusc")]
    pub obfusc: bool,
    #[arg(long)]
    pub threads: bool,
    #[arg(long)]
    pub data: bool,
    #[arg(long = "dnet")]
    pub dnet: bool,
    #[arg(long = "dmode")]
    pub dmode: bool,
    #[arg(long = "imp")]
    pub imp: bool,
    #[arg(long = "minidmp")]
    pub minidmp: bool,
    #[arg(long = "refl")]
    pub refl: bool,
    #[arg(long)]
    pub cache: bool,
    #[arg(long = "ofilter")]
    pub ofilter: Option<String>,
    #[arg(long)]
    pub pattern: Option<String>,
}

impl Args {
    /// Fold parsed CLI flags into the scan-time configuration.
    #[must_use]
    pub fn into_params(self) -> HHParams {
        HHParams {
            out_dir: self.dir,
            unique_dir: self.uniqd,
            loop_scanning: self.loop_scanning,
            etw_scan: self.etw,
            suspend_suspicious: self.suspend,
            kill_suspicious: self.kill,
            quiet: self.quiet,
            log: self.log,
            json_output: self.json,
            ptimes: self.ptimes,
            names_list: self.pname.into_iter().collect(),
            pids_list: self.pid.into_iter().map(Pid).collect(),
            ignored_names_list: self.pignore.into_iter().collect(),
            inspector_opts: InspectorOpts {
                iat_hooks: self.iat,
                inline_hooks: self.hooks,
                shellcode: self.shellc,
                obfuscation: self.obfusc,
                threads: self.threads,
                data_sections: self.data,
                dotnet: self.dnet,
                dump_mode: self.dmode,
                implanted_pe: self.imp,
                minidump: self.minidmp,
                reflective: self.refl,
                cache: self.cache,
                output_filter: self.ofilter,
                pattern: self.pattern,
            },
        }
    }
}
