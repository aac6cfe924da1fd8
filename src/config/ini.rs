//! ETW profile INI loading/saving (spec.md §6), ported line-for-line
//! in spirit from the original `ETWProfile::fillSettings`/`loadIni`/
//! `saveIni`: `;`/`#` strip comments, `KEY=value` pairs, booleans
//! recognized case-insensitively as true/yes/on/1 vs false/no/off/0,
//! falling back to the field's current value on anything else.

use std::io::Write as _;
use std::path::Path;

use crate::domain::ConfigError;
use crate::eventsource::etw::EtwProfile;

const DELIM: char = '=';

fn strip_comment(line: &str) -> &str {
    match line.find(['#', ';']) {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    let v = value.trim();
    if v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes") || v.eq_ignore_ascii_case("on") || v == "1" {
        return true;
    }
    if v.eq_ignore_ascii_case("false") || v.eq_ignore_ascii_case("no") || v.eq_ignore_ascii_case("off") || v == "0" {
        return false;
    }
    default
}

fn apply_line(profile: &mut EtwProfile, key: &str, value: &str) {
    if key.eq_ignore_ascii_case("WATCH_PROCESS_START") {
        profile.watch_process_start = parse_bool(value, profile.watch_process_start);
    } else if key.eq_ignore_ascii_case("WATCH_IMG_LOAD") {
        profile.watch_img_load = parse_bool(value, profile.watch_img_load);
    } else if key.eq_ignore_ascii_case("WATCH_ALLOCATION") {
        profile.watch_allocation = parse_bool(value, profile.watch_allocation);
    } else if key.eq_ignore_ascii_case("WATCH_TCP_IP") {
        profile.watch_tcp_ip = parse_bool(value, profile.watch_tcp_ip);
    } else if key.eq_ignore_ascii_case("WATCH_OBJ_MGR") {
        profile.watch_obj_mgr = parse_bool(value, profile.watch_obj_mgr);
    }
}

/// Parse an ETW profile INI document, starting from `EtwProfile::default()`
/// and overriding whatever keys are present.
#[must_use]
pub fn parse(contents: &str) -> EtwProfile {
    let mut profile = EtwProfile::default();
    for line in contents.lines() {
        let line = strip_comment(line);
        let Some((key, value)) = line.split_once(DELIM) else { continue };
        apply_line(&mut profile, key.trim(), value.trim());
    }
    profile
}

/// Load an ETW profile from an INI file on disk.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn load(path: &Path) -> Result<EtwProfile, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(parse(&contents))
}

fn bool_str(v: bool) -> &'static str {
    if v {
        "True"
    } else {
        "False"
    }
}

/// Render an ETW profile back into INI form.
#[must_use]
pub fn render(profile: &EtwProfile) -> String {
    format!(
        "WATCH_PROCESS_START={}\nWATCH_IMG_LOAD={}\nWATCH_ALLOCATION={}\nWATCH_TCP_IP={}\nWATCH_OBJ_MGR={}\n",
        bool_str(profile.watch_process_start),
        bool_str(profile.watch_img_load),
        bool_str(profile.watch_allocation),
        bool_str(profile.watch_tcp_ip),
        bool_str(profile.watch_obj_mgr),
    )
}

/// Save an ETW profile to an INI file on disk.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save(path: &Path, profile: &EtwProfile) -> Result<(), ConfigError> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(render(profile).as_bytes())?;
    Ok(())
}
