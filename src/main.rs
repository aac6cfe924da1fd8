use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use hollowwatch::config::Args;
use hollowwatch::eventsource::EtwEventSource;
use hollowwatch::inspector::{Inspector, WinPeInspector};
use hollowwatch::orchestrator::Orchestrator;

/// spec.md §7: "every fatal initialization error is printed to stderr
/// prefixed with `[ERROR]`"; exit codes are 0 on clean shutdown,
/// non-zero on initialization failure.
fn main() -> std::process::ExitCode {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("[ERROR] {e:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

fn run() -> Result<()> {
    let args = Args::parse();
    let etw_profile_path = args.etw_profile.clone();
    let config = args.into_params();

    if !hollowwatch::winapi::is_elevated() {
        warn!(
            "not running elevated; process enumeration and the Inspector boundary may be unable \
             to open some processes"
        );
    }

    std::fs::create_dir_all(&config.out_dir)
        .context("failed to create the scan output directory")?;

    let etw_profile = match etw_profile_path {
        Some(path) => hollowwatch::config::ini::load(&path)
            .with_context(|| format!("failed to load ETW profile from {}", path.display()))?,
        None => Default::default(),
    };

    info!("hollowwatch starting (etw={}, loop={})", config.etw_scan, config.loop_scanning);

    let inspector: Arc<dyn Inspector> = Arc::new(WinPeInspector);
    let orchestrator = Orchestrator::new(config, inspector);
    let event_source = Box::new(EtwEventSource::new(etw_profile));

    orchestrator.run(event_source).context("orchestrator run failed")?;

    Ok(())
}
