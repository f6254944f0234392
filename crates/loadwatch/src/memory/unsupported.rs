//! Placeholder process access for platforms without a target to attach to

use super::process::{ProcessInfo, ProcessProvider, ReadMemory, RemoteProcess, WriteMemory};
use crate::error::{Error, Result};

fn unsupported<T>() -> Result<T> {
    Err(Error::Unsupported(
        "process instrumentation is only supported on Windows".to_string(),
    ))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessProvider;

impl ProcessProvider for SystemProcessProvider {
    type Process = ProcessHandle;

    fn processes(&self) -> Result<Vec<ProcessInfo>> {
        unsupported()
    }

    fn open(&self, _info: &ProcessInfo) -> Result<ProcessHandle> {
        unsupported()
    }
}

/// Never constructed on this platform
#[derive(Debug)]
pub struct ProcessHandle {
    pid: u32,
}

impl ProcessHandle {
    pub fn open(_pid: u32) -> Result<Self> {
        unsupported()
    }
}

impl ReadMemory for ProcessHandle {
    fn read_bytes(&self, _address: u32, _len: usize) -> Result<Vec<u8>> {
        unsupported()
    }
}

impl WriteMemory for ProcessHandle {
    fn write_bytes(&self, _address: u32, _data: &[u8]) -> Result<()> {
        unsupported()
    }

    fn allocate(&self, _size: usize) -> Result<u32> {
        unsupported()
    }

    fn free(&self, _address: u32) -> Result<()> {
        unsupported()
    }
}

impl RemoteProcess for ProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&self) -> bool {
        true
    }

    fn is_64bit(&self) -> Result<bool> {
        unsupported()
    }

    fn main_module_base(&self) -> Result<u32> {
        unsupported()
    }
}
