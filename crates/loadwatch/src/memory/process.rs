use crate::error::{Error, Result};

/// Read access to a remote 32-bit address space
pub trait ReadMemory {
    fn read_bytes(&self, address: u32, len: usize) -> Result<Vec<u8>>;

    fn read_u8(&self, address: u32) -> Result<u8> {
        let bytes = self.read_bytes(address, 1)?;
        Ok(bytes[0])
    }

    fn read_u32(&self, address: u32) -> Result<u32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// Write and allocation access to a remote 32-bit address space
pub trait WriteMemory {
    /// Write `data` at `address`, including into code pages
    fn write_bytes(&self, address: u32, data: &[u8]) -> Result<()>;

    /// Allocate `size` bytes of executable memory and return its address
    fn allocate(&self, size: usize) -> Result<u32>;

    /// Release a block returned by [`WriteMemory::allocate`]
    fn free(&self, address: u32) -> Result<()>;
}

/// An opened process that can be inspected and patched
pub trait RemoteProcess: ReadMemory + WriteMemory {
    fn pid(&self) -> u32;

    fn has_exited(&self) -> bool;

    fn is_64bit(&self) -> Result<bool>;

    /// Load address of the process's main module
    fn main_module_base(&self) -> Result<u32>;
}

/// Basic process information from a process listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

impl ProcessInfo {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }

    /// Case-insensitive substring match on the executable name
    pub fn name_contains(&self, needle: &str) -> bool {
        self.name
            .to_ascii_lowercase()
            .contains(&needle.to_ascii_lowercase())
    }
}

/// Source of live processes
pub trait ProcessProvider {
    type Process: RemoteProcess;

    fn processes(&self) -> Result<Vec<ProcessInfo>>;

    fn open(&self, info: &ProcessInfo) -> Result<Self::Process>;
}

/// Convert a host pointer value into a 32-bit target address
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
pub(crate) fn to_address(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::AddressOutOfRange(value))
}
