use tracing::{debug, info, warn};

use super::{Attachment, LoadListener};
use crate::error::{Error, Result};
use crate::install::Installer;
use crate::locate::{Candidate, SiteSnapshot};
use crate::memory::RemoteProcess;
use crate::signal::LoadSignal;
use crate::trampoline::{build_head, redirect};
use crate::variant::BinaryVariant;
use crate::watcher::WatcherList;

/// Inputs of the loading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Loading,
    Modal,
}

/// A patched process and everything needed to observe and unpatch it
pub(super) struct Session<P: RemoteProcess> {
    process: P,
    variant: &'static BinaryVariant,
    module_base: u32,
    snapshots: Vec<SiteSnapshot>,
    head: u32,
    flag: u32,
    watchers: WatcherList<Input, u8>,
    signal: LoadSignal,
    primed: bool,
}

impl<P: RemoteProcess> Session<P> {
    /// Install the head block and redirect every site into it
    ///
    /// On failure everything written so far is put back and the head is
    /// released before the error is returned. The head stays allocated if
    /// any site could not be put back.
    pub(super) fn attach(candidate: Candidate<P>) -> Result<Self> {
        let Candidate {
            process,
            variant,
            module_base,
            snapshots,
        } = candidate;

        let mut head = build_head(&snapshots);
        let (head_address, flag) = {
            let installer = Installer::new(&process);
            let head_address = installer.install(&mut head.code)?;

            for (index, (layout, snapshot)) in head.sites.iter().zip(&snapshots).enumerate() {
                let jump = redirect(snapshot.code.base(), head.wrapper_address(layout));
                if let Err(e) = installer.write_install(&jump) {
                    rollback(&installer, &snapshots[..=index], head_address);
                    return Err(e);
                }
                debug!(
                    "Redirected {} at {:#x} to {:#x}",
                    snapshot.site,
                    jump.base(),
                    head.wrapper_address(layout)
                );
            }
            (head_address, head.flag_address())
        };

        let mut watchers = WatcherList::new();
        watchers.add(Input::Loading, flag);
        watchers.add(Input::Modal, module_base.wrapping_add(variant.disclaimer));

        Ok(Self {
            process,
            variant,
            module_base,
            snapshots,
            head: head_address,
            flag,
            watchers,
            signal: LoadSignal::new(),
            primed: false,
        })
    }

    pub(super) fn attachment(&self) -> Attachment {
        Attachment {
            pid: self.process.pid(),
            variant: self.variant.name,
            module_base: self.module_base,
            head: self.head,
            flag: self.flag,
        }
    }

    pub(super) fn is_loading(&self) -> bool {
        self.signal.current()
    }

    /// Poll both flags once and forward signal changes
    ///
    /// Any error means the process can no longer be trusted.
    pub(super) fn poll<L>(&mut self, listener: &mut L) -> Result<()>
    where
        L: LoadListener + ?Sized,
    {
        if self.process.has_exited() {
            return Err(Error::ProcessExited);
        }

        let signal = &mut self.signal;
        self.watchers.update_all(&self.process, |input, transition| {
            debug!("{:?} flag {} -> {}", input, transition.old, transition.new);
            let changed = match input {
                Input::Loading => signal.set_loading(transition.new),
                Input::Modal => signal.set_modal(transition.new),
            };
            if let Some(loading) = changed {
                listener.on_loading(loading);
            }
        })?;

        if !self.primed {
            // First poll only initialises the watchers; seed the signal from it
            self.primed = true;
            let loading = self.observed(Input::Loading);
            let modal = self.observed(Input::Modal);
            let seeded = [self.signal.set_loading(loading), self.signal.set_modal(modal)];
            for value in seeded.into_iter().flatten() {
                listener.on_loading(value);
            }
        }
        Ok(())
    }

    fn observed(&self, input: Input) -> u8 {
        self.watchers
            .get(input)
            .and_then(|watcher| watcher.current())
            .unwrap_or_default()
    }

    /// Put the original code back and release the head block
    ///
    /// Does nothing to a process that has exited. Failures are logged only.
    pub(super) fn restore(self) {
        if self.process.has_exited() {
            debug!("Process {} exited, nothing to restore", self.process.pid());
            return;
        }
        let installer = Installer::new(&self.process);
        if rollback(&installer, &self.snapshots, self.head) {
            info!("Restored process {}", self.process.pid());
        } else {
            warn!("Process {} was only partially restored", self.process.pid());
        }
    }
}

/// Write every snapshot back, then free the head if nothing can still jump into it
///
/// Returns whether every site was restored.
fn rollback<P>(installer: &Installer<'_, P>, snapshots: &[SiteSnapshot], head: u32) -> bool
where
    P: RemoteProcess,
{
    let mut restored = true;
    for snapshot in snapshots {
        if let Err(e) = installer.write_install(&snapshot.code) {
            warn!("Failed to restore {} entry: {}", snapshot.site, e);
            restored = false;
        }
    }
    if !restored {
        warn!("Keeping head block at {:#x} for unrestored sites", head);
        return false;
    }
    if let Err(e) = installer.free_install(head) {
        debug!("Failed to free head block at {:#x}: {}", head, e);
    }
    true
}
