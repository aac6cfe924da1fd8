//! Watch-list predicate (spec.md §4.2, component C2).
//!
//! Pure over `(Pid, image name)` and the allow/deny lists in
//! `HHParams`; holds no state of its own.

use crate::domain::{basename_lower, HHParams, Pid};

/// Decide whether a PID/image-name should be scanned (spec.md §4.2).
#[must_use]
pub fn is_watched(params: &HHParams, pid: Pid, image_name: Option<&str>) -> bool {
    if params.names_list.is_empty()
        && params.pids_list.is_empty()
        && params.ignored_names_list.is_empty()
    {
        return true;
    }

    if params.pids_list.contains(&pid) {
        return true;
    }

    if let Some(name) = image_name {
        let name = basename_lower(name);
        if params.names_list.iter().any(|n| basename_lower(n) == name) {
            return true;
        }
        // The ignore list only matters when there is no explicit name
        // allow list: with one in effect, only its members pass, and
        // a name merely absent from the ignore list is not enough.
        if params.names_list.is_empty()
            && !params.ignored_names_list.is_empty()
            && !params.ignored_names_list.iter().any(|n| basename_lower(n) == name)
        {
            return true;
        }
    }

    false
}

/// Decide whether a PID is old enough to scan (spec.md §4.2).
/// `process_creation_time` is the OS-reported creation time in Unix
/// seconds; callers resolve it via `crate::winapi::process_creation_time`.
#[must_use]
pub fn passes_time_threshold(
    ptimes: Option<u64>,
    now: u64,
    process_creation_time: u64,
) -> bool {
    match ptimes {
        None => true,
        Some(threshold) => now.saturating_sub(process_creation_time) >= threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params_with(
        names: &[&str],
        pids: &[u32],
        ignored: &[&str],
    ) -> HHParams {
        HHParams {
            names_list: names.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            pids_list: pids.iter().map(|p| Pid(*p)).collect::<HashSet<_>>(),
            ignored_names_list: ignored.iter().map(|s| s.to_string()).collect::<HashSet<_>>(),
            ..HHParams::default()
        }
    }

    #[test]
    fn empty_lists_watch_everything() {
        let params = HHParams::default();
        assert!(is_watched(&params, Pid(1), Some("anything.exe")));
        assert!(is_watched(&params, Pid(1), None));
    }

    #[test]
    fn pid_allow_list_wins() {
        let params = params_with(&[], &[42], &[]);
        assert!(is_watched(&params, Pid(42), None));
        assert!(!is_watched(&params, Pid(43), None));
    }

    #[test]
    fn name_allow_list_is_case_insensitive_basename() {
        let params = params_with(&["foo.exe"], &[], &[]);
        assert!(is_watched(&params, Pid(1), Some(r"C:\Path\FOO.EXE")));
        assert!(!is_watched(&params, Pid(1), Some("bar.exe")));
    }

    #[test]
    fn ignore_list_wins_only_when_not_on_allow_list() {
        // spec.md §8 scenario 5
        let params = params_with(&["foo.exe"], &[], &["bar.exe"]);
        assert!(is_watched(&params, Pid(1), Some("foo.exe")));
        assert!(!is_watched(&params, Pid(1), Some("bar.exe")));
        assert!(!is_watched(&params, Pid(1), Some("baz.exe")));
    }

    #[test]
    fn ptimes_undefined_always_passes() {
        assert!(passes_time_threshold(None, 1000, 999));
    }

    #[test]
    fn ptimes_rejects_young_process() {
        assert!(!passes_time_threshold(Some(10), 1005, 1000));
    }

    #[test]
    fn ptimes_accepts_old_enough_process() {
        assert!(passes_time_threshold(Some(10), 1011, 1000));
    }
}
