//! In-memory stand-in for a target process, used by tests
//!
//! A [`MockProcess`] is a cheap shared handle: clones observe and mutate the
//! same simulated address space, so a test can keep one clone while the
//! engine owns another.

use std::cell::RefCell;
use std::rc::Rc;

use super::process::{ProcessInfo, ProcessProvider, ReadMemory, RemoteProcess, WriteMemory};
use crate::error::{Error, Result};

/// First address handed out by [`WriteMemory::allocate`]
pub const MOCK_ALLOC_BASE: u32 = 0x0100_0000;
const ALLOC_ALIGN: u32 = 0x1000;

#[derive(Debug)]
struct Region {
    base: u32,
    bytes: Vec<u8>,
    allocated: bool,
}

impl Region {
    fn contains(&self, address: u32, len: usize) -> bool {
        let start = u64::from(address);
        let base = u64::from(self.base);
        start >= base && start + len as u64 <= base + self.bytes.len() as u64
    }

    fn range(&self, address: u32, len: usize) -> std::ops::Range<usize> {
        let start = (address - self.base) as usize;
        start..start + len
    }
}

#[derive(Debug)]
struct MockState {
    info: ProcessInfo,
    is_64bit: bool,
    module_base: u32,
    regions: Vec<Region>,
    next_alloc: u32,
    exited: bool,
    fail_reads: bool,
    failing_writes: Vec<usize>,
    writes: usize,
}

impl MockState {
    fn region(&self, address: u32, len: usize) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(address, len))
    }

    fn region_mut(&mut self, address: u32, len: usize) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.contains(address, len))
    }
}

/// Simulated 32-bit process
#[derive(Debug, Clone)]
pub struct MockProcess {
    state: Rc<RefCell<MockState>>,
}

impl MockProcess {
    fn info(&self) -> ProcessInfo {
        self.state.borrow().info.clone()
    }

    /// Mark the process as exited; all further I/O fails
    pub fn kill(&self) {
        self.state.borrow_mut().exited = true;
    }

    /// Make every read fail while the process stays alive
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.borrow_mut().fail_reads = fail;
    }

    /// Fail the write with the given zero-based index (counted from now)
    ///
    /// Failed writes are not counted, so queueing the same index twice fails
    /// two attempts in a row.
    pub fn fail_write_at(&self, index: usize) {
        let mut state = self.state.borrow_mut();
        let at = state.writes + index;
        state.failing_writes.push(at);
    }

    /// Write test data directly, ignoring injected failures
    pub fn poke(&self, address: u32, data: &[u8]) {
        let mut state = self.state.borrow_mut();
        let region = state
            .region_mut(address, data.len())
            .unwrap_or_else(|| panic!("poke outside mapped memory at {:#x}", address));
        let range = region.range(address, data.len());
        region.bytes[range].copy_from_slice(data);
    }

    /// Read test data directly, ignoring injected failures
    pub fn peek(&self, address: u32, len: usize) -> Vec<u8> {
        let state = self.state.borrow();
        let region = state
            .region(address, len)
            .unwrap_or_else(|| panic!("peek outside mapped memory at {:#x}", address));
        region.bytes[region.range(address, len)].to_vec()
    }

    /// Whether `address` is the start of a live allocation
    pub fn is_allocated(&self, address: u32) -> bool {
        self.state
            .borrow()
            .regions
            .iter()
            .any(|r| r.allocated && r.base == address)
    }

    /// Number of live allocations
    pub fn allocation_count(&self) -> usize {
        self.state
            .borrow()
            .regions
            .iter()
            .filter(|r| r.allocated)
            .count()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.state.borrow().writes
    }
}

impl ReadMemory for MockProcess {
    fn read_bytes(&self, address: u32, len: usize) -> Result<Vec<u8>> {
        let state = self.state.borrow();
        let fail = |message: &str| Error::MemoryReadFailed {
            address,
            message: message.to_string(),
        };
        if state.exited {
            return Err(fail("process has exited"));
        }
        if state.fail_reads {
            return Err(fail("injected read failure"));
        }
        let region = state.region(address, len).ok_or_else(|| fail("unmapped"))?;
        Ok(region.bytes[region.range(address, len)].to_vec())
    }
}

impl WriteMemory for MockProcess {
    fn write_bytes(&self, address: u32, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let fail = |message: &str| Error::MemoryWriteFailed {
            address,
            message: message.to_string(),
        };
        if state.exited {
            return Err(fail("process has exited"));
        }
        let writes = state.writes;
        if let Some(pos) = state.failing_writes.iter().position(|&at| at == writes) {
            state.failing_writes.remove(pos);
            return Err(fail("injected write failure"));
        }
        let region = state
            .region_mut(address, data.len())
            .ok_or_else(|| fail("unmapped"))?;
        let range = region.range(address, data.len());
        region.bytes[range].copy_from_slice(data);
        state.writes += 1;
        Ok(())
    }

    fn allocate(&self, size: usize) -> Result<u32> {
        let mut state = self.state.borrow_mut();
        if state.exited {
            return Err(Error::AllocationFailed {
                size,
                message: "process has exited".to_string(),
            });
        }
        let base = state.next_alloc;
        let span = (size as u32).div_ceil(ALLOC_ALIGN).max(1) * ALLOC_ALIGN;
        state.next_alloc = base + span;
        state.regions.push(Region {
            base,
            bytes: vec![0; size],
            allocated: true,
        });
        Ok(base)
    }

    fn free(&self, address: u32) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let index = state
            .regions
            .iter()
            .position(|r| r.allocated && r.base == address)
            .ok_or_else(|| Error::FreeFailed {
                address,
                message: "not an allocation".to_string(),
            })?;
        state.regions.remove(index);
        Ok(())
    }
}

impl RemoteProcess for MockProcess {
    fn pid(&self) -> u32 {
        self.state.borrow().info.pid
    }

    fn has_exited(&self) -> bool {
        self.state.borrow().exited
    }

    fn is_64bit(&self) -> Result<bool> {
        Ok(self.state.borrow().is_64bit)
    }

    fn main_module_base(&self) -> Result<u32> {
        let state = self.state.borrow();
        if state.exited {
            return Err(Error::ProcessExited);
        }
        Ok(state.module_base)
    }
}

/// Builder for [`MockProcess`]
#[derive(Debug)]
pub struct MockProcessBuilder {
    state: MockState,
}

impl MockProcessBuilder {
    pub fn new(pid: u32, name: &str) -> Self {
        Self {
            state: MockState {
                info: ProcessInfo::new(pid, name),
                is_64bit: false,
                module_base: 0,
                regions: Vec::new(),
                next_alloc: MOCK_ALLOC_BASE,
                exited: false,
                fail_reads: false,
                failing_writes: Vec::new(),
                writes: 0,
            },
        }
    }

    pub fn is_64bit(mut self, is_64bit: bool) -> Self {
        self.state.is_64bit = is_64bit;
        self
    }

    /// Map a zeroed main module image of `size` bytes at `base`
    pub fn module(mut self, base: u32, size: usize) -> Self {
        self.state.module_base = base;
        self.region(base, vec![0; size])
    }

    /// Map an arbitrary region
    pub fn region(mut self, base: u32, bytes: Vec<u8>) -> Self {
        self.state.regions.push(Region {
            base,
            bytes,
            allocated: false,
        });
        self
    }

    /// Write bytes into an already mapped region
    pub fn write(mut self, address: u32, data: &[u8]) -> Self {
        let region = self
            .state
            .region_mut(address, data.len())
            .unwrap_or_else(|| panic!("write outside mapped memory at {:#x}", address));
        let range = region.range(address, data.len());
        region.bytes[range].copy_from_slice(data);
        self
    }

    pub fn write_u32(self, address: u32, value: u32) -> Self {
        self.write(address, &value.to_le_bytes())
    }

    pub fn build(self) -> MockProcess {
        MockProcess {
            state: Rc::new(RefCell::new(self.state)),
        }
    }
}

/// Provider over a mutable set of mock processes
#[derive(Debug, Default)]
pub struct MockProvider {
    processes: RefCell<Vec<MockProcess>>,
    fail_listing: RefCell<bool>,
}

impl MockProvider {
    pub fn new(processes: Vec<MockProcess>) -> Self {
        Self {
            processes: RefCell::new(processes),
            fail_listing: RefCell::new(false),
        }
    }

    pub fn add(&self, process: MockProcess) {
        self.processes.borrow_mut().push(process);
    }

    pub fn set_fail_listing(&self, fail: bool) {
        *self.fail_listing.borrow_mut() = fail;
    }
}

impl ProcessProvider for MockProvider {
    type Process = MockProcess;

    fn processes(&self) -> Result<Vec<ProcessInfo>> {
        if *self.fail_listing.borrow() {
            return Err(Error::ProcessListFailed("injected failure".to_string()));
        }
        Ok(self
            .processes
            .borrow()
            .iter()
            .filter(|p| !p.has_exited())
            .map(MockProcess::info)
            .collect())
    }

    fn open(&self, info: &ProcessInfo) -> Result<MockProcess> {
        self.processes
            .borrow()
            .iter()
            .find(|p| p.pid() == info.pid && !p.has_exited())
            .cloned()
            .ok_or_else(|| Error::ProcessOpenFailed {
                pid: info.pid,
                message: "no such process".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process() -> MockProcess {
        MockProcessBuilder::new(7, "mc2.exe")
            .module(0x0040_0000, 0x100)
            .write_u32(0x0040_0010, 0xDEAD_BEEF)
            .build()
    }

    #[test]
    fn test_read_mapped_memory() {
        let process = process();
        assert_eq!(process.read_u32(0x0040_0010).unwrap(), 0xDEAD_BEEF);
        assert!(process.read_bytes(0x0040_00FF, 2).is_err());
        assert!(process.read_bytes(0x0030_0000, 1).is_err());
    }

    #[test]
    fn test_clones_share_memory() {
        let process = process();
        let other = process.clone();
        other.write_bytes(0x0040_0000, &[1, 2, 3]).unwrap();
        assert_eq!(process.peek(0x0040_0000, 3), vec![1, 2, 3]);
        assert_eq!(process.write_count(), 1);
    }

    #[test]
    fn test_allocate_and_free() {
        let process = process();
        let a = process.allocate(0x10).unwrap();
        let b = process.allocate(0x1001).unwrap();
        assert_eq!(a, MOCK_ALLOC_BASE);
        assert_eq!(b, MOCK_ALLOC_BASE + 0x1000);
        assert_eq!(process.allocation_count(), 2);

        process.free(a).unwrap();
        assert!(!process.is_allocated(a));
        assert!(process.is_allocated(b));
        assert!(process.free(a).is_err());
        assert!(process.free(0x0040_0000).is_err());
    }

    #[test]
    fn test_kill_fails_io() {
        let process = process();
        process.kill();
        assert!(process.has_exited());
        assert!(process.read_u8(0x0040_0000).is_err());
        assert!(process.write_bytes(0x0040_0000, &[0]).is_err());
    }

    #[test]
    fn test_fail_write_at_fails_once() {
        let process = process();
        process.fail_write_at(1);
        assert!(process.write_bytes(0x0040_0000, &[1]).is_ok());
        assert!(process.write_bytes(0x0040_0001, &[2]).is_err());
        assert!(process.write_bytes(0x0040_0002, &[3]).is_ok());
        assert_eq!(process.peek(0x0040_0000, 3), vec![1, 0, 3]);
    }

    #[test]
    fn test_same_index_queued_twice_fails_twice() {
        let process = process();
        process.fail_write_at(0);
        process.fail_write_at(0);
        assert!(process.write_bytes(0x0040_0000, &[1]).is_err());
        assert!(process.write_bytes(0x0040_0000, &[1]).is_err());
        assert!(process.write_bytes(0x0040_0000, &[1]).is_ok());
        assert_eq!(process.write_count(), 1);
    }

    #[test]
    fn test_provider_hides_exited_processes() {
        let process = process();
        let provider = MockProvider::new(vec![process.clone()]);
        assert_eq!(provider.processes().unwrap().len(), 1);

        process.kill();
        assert!(provider.processes().unwrap().is_empty());
        assert!(provider.open(&ProcessInfo::new(7, "mc2.exe")).is_err());
    }
}
