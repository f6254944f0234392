//! Hook engine: finds the game, patches it, and reports loading transitions
//!
//! The engine is a two-state machine driven by [`HookEngine::update`]:
//!
//! - **Detached**: each tick scans for a supported process and tries to patch
//!   it. A failed attempt leaves the process untouched and is retried on the
//!   next tick.
//! - **Attached**: each tick polls the loading flag written by the injected
//!   wrappers and the game's modal flag, and forwards every change of the
//!   derived signal to the [`LoadListener`].
//!
//! Losing the process (exit or any I/O failure) drops back to Detached and
//! always reports "not loading", so a host timer never stays paused.
//!
//! ## Example
//!
//! ```ignore
//! use loadwatch::hooks::HookEngine;
//! use loadwatch::memory::SystemProcessProvider;
//!
//! let mut engine = HookEngine::new(SystemProcessProvider, |loading: bool| {
//!     println!("loading: {}", loading);
//! });
//! loop {
//!     engine.update();
//!     std::thread::sleep(std::time::Duration::from_millis(15));
//! }
//! ```

mod session;

use tracing::{info, warn};

use self::session::Session;
use crate::config::EngineConfig;
use crate::locate::find_target;
use crate::memory::{ProcessProvider, RemoteProcess};

/// Receiver of loading-state changes
pub trait LoadListener {
    fn on_loading(&mut self, loading: bool);
}

impl<F: FnMut(bool)> LoadListener for F {
    fn on_loading(&mut self, loading: bool) {
        self(loading)
    }
}

/// Read-only description of the current attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub pid: u32,
    /// Name of the detected build
    pub variant: &'static str,
    pub module_base: u32,
    /// Address of the injected head block
    pub head: u32,
    /// Address of the loading flag byte
    pub flag: u32,
}

enum HookState<P: ProcessProvider> {
    Detached,
    Attached(Box<Session<P::Process>>),
}

/// Drives attach, polling and teardown for one target process at a time
pub struct HookEngine<P: ProcessProvider, L: LoadListener> {
    provider: P,
    listener: L,
    config: EngineConfig,
    state: HookState<P>,
}

impl<P: ProcessProvider, L: LoadListener> HookEngine<P, L> {
    /// Create an engine with default configuration
    pub fn new(provider: P, listener: L) -> Self {
        Self::with_config(provider, listener, EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(provider: P, listener: L, config: EngineConfig) -> Self {
        Self {
            provider,
            listener,
            config,
            state: HookState::Detached,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.state, HookState::Attached(_))
    }

    /// Current derived signal, `false` while detached
    pub fn is_loading(&self) -> bool {
        match &self.state {
            HookState::Attached(session) => session.is_loading(),
            HookState::Detached => false,
        }
    }

    pub fn attachment(&self) -> Option<Attachment> {
        match &self.state {
            HookState::Attached(session) => Some(session.attachment()),
            HookState::Detached => None,
        }
    }

    /// Run one tick: attach when detached, poll when attached
    ///
    /// Never fails; problems with the target are handled by detaching.
    pub fn update(&mut self) {
        let polled = match &mut self.state {
            HookState::Detached => None,
            HookState::Attached(session) => Some(session.poll(&mut self.listener)),
        };

        match polled {
            None => self.try_attach(),
            Some(Ok(())) => {}
            Some(Err(e)) => {
                if e.is_process_lost() {
                    info!("Lost target process: {}", e);
                } else {
                    warn!("Detaching after unexpected error: {}", e);
                }
                self.state = HookState::Detached;
                self.listener.on_loading(false);
            }
        }
    }

    /// Unpatch the target and detach
    ///
    /// Safe to call any number of times; also runs when the engine is dropped.
    pub fn shutdown(&mut self) {
        let state = std::mem::replace(&mut self.state, HookState::Detached);
        if let HookState::Attached(session) = state {
            session.restore();
            self.listener.on_loading(false);
        }
    }

    fn try_attach(&mut self) {
        let Some(candidate) = find_target(&self.provider, &self.config.process_name) else {
            return;
        };
        let pid = candidate.process.pid();
        let variant = candidate.variant.name;

        match Session::attach(candidate) {
            Ok(session) => {
                let attachment = session.attachment();
                info!(
                    "Hooked process {} ({} build, module {:#x}, head {:#x})",
                    pid, variant, attachment.module_base, attachment.head
                );
                self.state = HookState::Attached(Box::new(session));
            }
            Err(e) => warn!("Failed to hook process {}: {}", pid, e),
        }
    }
}

impl<P: ProcessProvider, L: LoadListener> Drop for HookEngine<P, L> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
