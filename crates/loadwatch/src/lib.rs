//! Runtime instrumentation of Midnight Club 2 for load-time removal
//!
//! The engine attaches to a running 32-bit game process, wraps the five
//! functions that run while the game is loading with small generated
//! trampolines, and turns the flag byte those trampolines maintain (plus the
//! game's own modal-screen flag) into a single "is loading" signal.
//!
//! - [`asm`]: x86-32 code buffers with relocation bookkeeping
//! - [`install`]: placing buffers into the target and verifying live code
//! - [`variant`] / [`locate`]: recognising supported builds
//! - [`watcher`]: edge-triggered polling of target memory
//! - [`hooks`]: the attach/poll/detach state machine

pub mod asm;
pub mod config;
pub mod error;
pub mod hooks;
pub mod install;
pub mod locate;
pub mod memory;
pub mod signal;
pub mod trampoline;
pub mod variant;
pub mod watcher;

pub use config::{EngineConfig, EngineConfigBuilder, Settings};
pub use error::{Error, Result};
pub use hooks::{Attachment, HookEngine, LoadListener};
pub use memory::{ProcessInfo, ProcessProvider, ReadMemory, RemoteProcess, WriteMemory};
pub use variant::{BinaryVariant, HookSite};
