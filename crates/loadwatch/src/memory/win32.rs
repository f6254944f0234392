//! Windows process access through the Win32 debug and memory APIs

use std::ffi::c_void;
use std::mem::size_of;

use tracing::debug;
use windows::Win32::Foundation::{BOOL, CloseHandle, HANDLE, STILL_ACTIVE};
use windows::Win32::System::Diagnostics::Debug::{
    FlushInstructionCache, ReadProcessMemory, WriteProcessMemory,
};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, PROCESSENTRY32W, Process32FirstW,
    Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Memory::{
    MEM_COMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
    VirtualAllocEx, VirtualFreeEx, VirtualProtectEx,
};
use windows::Win32::System::Threading::{
    GetCurrentProcess, GetExitCodeProcess, IsWow64Process, OpenProcess, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

use super::process::{
    ProcessInfo, ProcessProvider, ReadMemory, RemoteProcess, WriteMemory, to_address,
};
use crate::error::{Error, Result};

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

/// Closes a Toolhelp snapshot on drop
struct Snapshot(HANDLE);

impl Drop for Snapshot {
    fn drop(&mut self) {
        // SAFETY: the handle came from CreateToolhelp32Snapshot and is closed once.
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

fn host_os_is_64bit() -> bool {
    if cfg!(target_pointer_width = "64") {
        return true;
    }
    let mut wow64 = BOOL::default();
    // SAFETY: GetCurrentProcess returns a pseudo handle valid for this call.
    unsafe { IsWow64Process(GetCurrentProcess(), &mut wow64) }.is_ok() && wow64.as_bool()
}

/// Lists processes with Toolhelp and opens them with read/write/alloc rights
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProvider;

impl ProcessProvider for SystemProcessProvider {
    type Process = ProcessHandle;

    fn processes(&self) -> Result<Vec<ProcessInfo>> {
        // SAFETY: a process snapshot has no preconditions.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| Error::ProcessListFailed(e.to_string()))?;
        let snapshot = Snapshot(snapshot);

        let mut entry = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };
        let mut found = Vec::new();

        // SAFETY: entry.dwSize is initialised as the API requires.
        let mut next = unsafe { Process32FirstW(snapshot.0, &mut entry) };
        while next.is_ok() {
            found.push(ProcessInfo::new(
                entry.th32ProcessID,
                wide_to_string(&entry.szExeFile),
            ));
            // SAFETY: same snapshot and entry as above.
            next = unsafe { Process32NextW(snapshot.0, &mut entry) };
        }

        Ok(found)
    }

    fn open(&self, info: &ProcessInfo) -> Result<ProcessHandle> {
        ProcessHandle::open(info.pid)
    }
}

/// An open handle to a target process
#[derive(Debug)]
pub struct ProcessHandle {
    handle: HANDLE,
    pid: u32,
}

impl ProcessHandle {
    pub fn open(pid: u32) -> Result<Self> {
        let access =
            PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION;
        // SAFETY: OpenProcess validates the pid and returns an owned handle.
        let opened = unsafe { OpenProcess(access, false, pid) };
        let handle = opened.map_err(|e| Error::ProcessOpenFailed {
            pid,
            message: e.to_string(),
        })?;
        Ok(Self { handle, pid })
    }

    fn protect(
        &self,
        address: u32,
        len: usize,
        protection: PAGE_PROTECTION_FLAGS,
    ) -> Option<PAGE_PROTECTION_FLAGS> {
        let mut old = PAGE_PROTECTION_FLAGS::default();
        // SAFETY: the range is only re-protected, never dereferenced locally.
        let changed = unsafe {
            VirtualProtectEx(
                self.handle,
                address as usize as *const c_void,
                len,
                protection,
                &mut old,
            )
        };
        changed.ok().map(|_| old)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is owned by this value and closed once.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

impl ReadMemory for ProcessHandle {
    fn read_bytes(&self, address: u32, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        let mut read = 0usize;
        // SAFETY: buffer holds exactly `len` writable bytes.
        unsafe {
            ReadProcessMemory(
                self.handle,
                address as usize as *const c_void,
                buffer.as_mut_ptr().cast(),
                len,
                Some(&mut read),
            )
        }
        .map_err(|e| Error::MemoryReadFailed {
            address,
            message: e.to_string(),
        })?;

        if read != len {
            return Err(Error::MemoryReadFailed {
                address,
                message: format!("partial read ({} of {} bytes)", read, len),
            });
        }
        Ok(buffer)
    }
}

impl WriteMemory for ProcessHandle {
    fn write_bytes(&self, address: u32, data: &[u8]) -> Result<()> {
        let old = self.protect(address, data.len(), PAGE_EXECUTE_READWRITE);
        let mut written = 0usize;
        // SAFETY: data is a valid slice for the duration of the call.
        let result = unsafe {
            WriteProcessMemory(
                self.handle,
                address as usize as *const c_void,
                data.as_ptr().cast(),
                data.len(),
                Some(&mut written),
            )
        };
        if let Some(old) = old {
            self.protect(address, data.len(), old);
        }

        result.map_err(|e| Error::MemoryWriteFailed {
            address,
            message: e.to_string(),
        })?;
        if written != data.len() {
            return Err(Error::MemoryWriteFailed {
                address,
                message: format!("partial write ({} of {} bytes)", written, data.len()),
            });
        }

        let target = address as usize as *const c_void;
        // SAFETY: flushing a remote range has no local memory effects.
        let flushed = unsafe { FlushInstructionCache(self.handle, Some(target), data.len()) };
        if let Err(e) = flushed {
            debug!("FlushInstructionCache failed at {:#x}: {}", address, e);
        }
        Ok(())
    }

    fn allocate(&self, size: usize) -> Result<u32> {
        // SAFETY: VirtualAllocEx returns null on failure and touches no local memory.
        let ptr = unsafe {
            VirtualAllocEx(
                self.handle,
                None,
                size,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };
        if ptr.is_null() {
            return Err(Error::AllocationFailed {
                size,
                message: std::io::Error::last_os_error().to_string(),
            });
        }

        match to_address(ptr as usize as u64) {
            Ok(address) => Ok(address),
            Err(e) => {
                // SAFETY: ptr was just allocated in this process.
                let freed = unsafe { VirtualFreeEx(self.handle, ptr, 0, MEM_RELEASE) };
                if let Err(free_err) = freed {
                    debug!("Failed to release unaddressable block: {}", free_err);
                }
                Err(e)
            }
        }
    }

    fn free(&self, address: u32) -> Result<()> {
        let block = address as usize as *mut c_void;
        // SAFETY: callers only free addresses returned by allocate.
        let freed = unsafe { VirtualFreeEx(self.handle, block, 0, MEM_RELEASE) };
        freed.map_err(|e| Error::FreeFailed {
            address,
            message: e.to_string(),
        })
    }
}

impl RemoteProcess for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&self) -> bool {
        let mut code = 0u32;
        // SAFETY: code is a valid out pointer.
        match unsafe { GetExitCodeProcess(self.handle, &mut code) } {
            Ok(()) => code != STILL_ACTIVE.0 as u32,
            Err(_) => true,
        }
    }

    fn is_64bit(&self) -> Result<bool> {
        let mut wow64 = BOOL::default();
        // SAFETY: wow64 is a valid out pointer.
        let queried = unsafe { IsWow64Process(self.handle, &mut wow64) };
        queried.map_err(|e| Error::ProcessOpenFailed {
            pid: self.pid,
            message: e.to_string(),
        })?;
        if wow64.as_bool() {
            return Ok(false);
        }
        Ok(host_os_is_64bit())
    }

    fn main_module_base(&self) -> Result<u32> {
        let flags = TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32;
        // SAFETY: a module snapshot has no preconditions beyond a valid pid.
        let created = unsafe { CreateToolhelp32Snapshot(flags, self.pid) };
        let snapshot = created.map_err(|e| Error::ProcessOpenFailed {
            pid: self.pid,
            message: e.to_string(),
        })?;
        let snapshot = Snapshot(snapshot);

        let mut entry = MODULEENTRY32W {
            dwSize: size_of::<MODULEENTRY32W>() as u32,
            ..Default::default()
        };
        // The first module of a snapshot is the main executable.
        // SAFETY: entry.dwSize is initialised as the API requires.
        let first = unsafe { Module32FirstW(snapshot.0, &mut entry) };
        first.map_err(|e| Error::ProcessOpenFailed {
            pid: self.pid,
            message: e.to_string(),
        })?;

        to_address(entry.modBaseAddr as usize as u64)
    }
}
