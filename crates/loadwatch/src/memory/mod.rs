mod process;

#[cfg(target_os = "windows")]
mod win32;

#[cfg(not(target_os = "windows"))]
mod unsupported;

// Mock process for testing (always available for unit and integration tests)
#[doc(hidden)]
pub mod mock;

pub use process::{ProcessInfo, ProcessProvider, ReadMemory, RemoteProcess, WriteMemory};

#[cfg(not(target_os = "windows"))]
pub use unsupported::{ProcessHandle, SystemProcessProvider};
#[cfg(target_os = "windows")]
pub use win32::{ProcessHandle, SystemProcessProvider};

#[doc(hidden)]
pub use mock::{MockProcess, MockProcessBuilder, MockProvider};
