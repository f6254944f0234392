//! Finding a patchable target process
//!
//! A process qualifies when its name matches, it is a live 32-bit process,
//! its build signature is known, and the code at every hook site still reads
//! exactly as the unpatched build does. The last check rejects both foreign
//! builds and a Steam executable whose code section is still encrypted.

use strum::IntoEnumIterator;
use tracing::debug;

use crate::asm::{CodeBuffer, Register};
use crate::error::Result;
use crate::install::Installer;
use crate::memory::{ProcessInfo, ProcessProvider, RemoteProcess};
use crate::variant::{BinaryVariant, HookSite, detect_variant};

/// Stack space reserved by the game entry's prologue
const GAME_FRAME: i32 = 0x28;

/// Expected original code at `site`, placed at the site's live address
pub fn preamble(site: HookSite, variant: &BinaryVariant, module_base: u32) -> CodeBuffer {
    let mut buffer = CodeBuffer::at(module_base.wrapping_add(variant.entry(site)));
    match variant.string(site) {
        None => {
            buffer.sub_ri(Register::Esp, GAME_FRAME, false);
            buffer.push_reg(Register::Esi);
            buffer.mov_rr(Register::Esi, Register::Ecx);
        }
        Some(string) => {
            buffer.push_reg(Register::Esi);
            buffer.push_imm(module_base.wrapping_add(string));
        }
    }
    buffer
}

/// Original bytes of one hook site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteSnapshot {
    pub site: HookSite,
    pub code: CodeBuffer,
}

/// A verified process, ready to be patched
#[derive(Debug)]
pub struct Candidate<P> {
    pub process: P,
    pub variant: &'static BinaryVariant,
    pub module_base: u32,
    pub snapshots: Vec<SiteSnapshot>,
}

/// Check one opened process
///
/// `Ok(None)` means the process is not a supported, unpatched build.
pub fn probe<P: RemoteProcess>(process: P) -> Result<Option<Candidate<P>>> {
    let pid = process.pid();
    if process.has_exited() {
        debug!("Process {} has exited", pid);
        return Ok(None);
    }
    if process.is_64bit()? {
        debug!("Process {} is 64-bit", pid);
        return Ok(None);
    }

    let module_base = process.main_module_base()?;
    let Some(variant) = detect_variant(&process, module_base)? else {
        debug!("Process {} is not a known build", pid);
        return Ok(None);
    };

    let installer = Installer::new(&process);
    let mut snapshots = Vec::new();
    for site in HookSite::iter() {
        let code = preamble(site, variant, module_base);
        if !installer.verify_install(&code)? {
            debug!(
                "Process {}: {} entry at {:#x} does not match",
                pid,
                site,
                code.base()
            );
            return Ok(None);
        }
        snapshots.push(SiteSnapshot { site, code });
    }

    Ok(Some(Candidate {
        process,
        variant,
        module_base,
        snapshots,
    }))
}

/// Scan the provider's processes and return the first that qualifies
///
/// Listing, open and read failures reject the affected candidate and are
/// never surfaced.
pub fn find_target<P: ProcessProvider>(
    provider: &P,
    process_name: &str,
) -> Option<Candidate<P::Process>> {
    let processes = match provider.processes() {
        Ok(list) => list,
        Err(e) => {
            debug!("Process listing failed: {}", e);
            return None;
        }
    };

    processes
        .iter()
        .filter(|info| info.name_contains(process_name))
        .find_map(|info| open_and_probe(provider, info))
}

fn open_and_probe<P: ProcessProvider>(
    provider: &P,
    info: &ProcessInfo,
) -> Option<Candidate<P::Process>> {
    let result = provider.open(info).and_then(probe);
    match result {
        Ok(candidate) => candidate,
        Err(e) => {
            debug!("Rejected {} ({}): {}", info.name, info.pid, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockProcess, MockProcessBuilder, MockProvider};
    use crate::variant::{RETAIL, SIGNATURE_OFFSET, STEAM};

    const BASE: u32 = 0x0040_0000;
    const IMAGE: usize = 0x0026_3000;

    fn image(pid: u32, name: &str, variant: &BinaryVariant) -> MockProcessBuilder {
        let mut builder = MockProcessBuilder::new(pid, name)
            .module(BASE, IMAGE)
            .write_u32(BASE + SIGNATURE_OFFSET, variant.signature);
        for site in HookSite::iter() {
            let code = preamble(site, variant, BASE);
            builder = builder.write(code.base(), code.as_bytes());
        }
        builder
    }

    #[test]
    fn test_game_preamble_bytes() {
        let code = preamble(HookSite::Game, &RETAIL, BASE);
        assert_eq!(code.base(), BASE + 0x3B80);
        assert_eq!(code.as_bytes(), &[0x83, 0xEC, 0x28, 0x56, 0x8B, 0xF1]);
    }

    #[test]
    fn test_string_preamble_bytes() {
        let code = preamble(HookSite::Movie, &STEAM, BASE);
        assert_eq!(code.base(), BASE + 0x3860);
        let mut expected = vec![0x56, 0x68];
        expected.extend_from_slice(&(BASE + 0x0022_D980).to_le_bytes());
        assert_eq!(code.as_bytes(), expected.as_slice());

        let retail = preamble(HookSite::Movie, &RETAIL, BASE);
        assert_eq!(&retail.as_bytes()[2..], &(BASE + 0x0022_D984).to_le_bytes());
    }

    #[test]
    fn test_probe_accepts_both_builds() {
        for variant in [&RETAIL, &STEAM] {
            let candidate = probe(image(1, "mc2.exe", variant).build())
                .unwrap()
                .expect("supported build");
            assert_eq!(candidate.variant, variant);
            assert_eq!(candidate.module_base, BASE);
            assert_eq!(candidate.snapshots.len(), 5);
            assert_eq!(candidate.snapshots[0].site, HookSite::Game);
        }
    }

    #[test]
    fn test_probe_rejects_encrypted_code() {
        let process = image(1, "mc2.exe", &STEAM).build();
        let frontend = BASE + STEAM.frontend;
        process.poke(frontend, &[0x9A, 0x3C]);
        assert!(probe(process).unwrap().is_none());
    }

    #[test]
    fn test_probe_rejects_wrong_variant_strings() {
        // Retail code with the Steam signature pushes different addresses
        let process = image(1, "mc2.exe", &RETAIL)
            .write_u32(BASE + SIGNATURE_OFFSET, STEAM.signature)
            .build();
        assert!(probe(process).unwrap().is_none());
    }

    #[test]
    fn test_probe_rejects_64bit_and_unknown() {
        let wide = image(1, "mc2.exe", &RETAIL).is_64bit(true).build();
        assert!(probe(wide).unwrap().is_none());

        let unknown = image(1, "mc2.exe", &RETAIL)
            .write_u32(BASE + SIGNATURE_OFFSET, 0x1234_5678)
            .build();
        assert!(probe(unknown).unwrap().is_none());
    }

    #[test]
    fn test_probe_propagates_read_failure() {
        let process = image(1, "mc2.exe", &RETAIL).build();
        process.set_fail_reads(true);
        assert!(probe(process).is_err());
    }

    #[test]
    fn test_find_target_filters_by_name() {
        let other: MockProcess = image(1, "notepad.exe", &RETAIL).build();
        let game = image(2, "MC2.EXE", &RETAIL).build();
        let provider = MockProvider::new(vec![other, game]);

        let candidate = find_target(&provider, "mc2").expect("game found");
        assert_eq!(candidate.process.pid(), 2);
        assert!(find_target(&provider, "mc3").is_none());
    }

    #[test]
    fn test_find_target_skips_bad_candidates() {
        let broken = image(1, "mc2.exe", &RETAIL).build();
        broken.set_fail_reads(true);
        let good = image(2, "mc2.exe", &STEAM).build();
        let provider = MockProvider::new(vec![broken, good]);

        let candidate = find_target(&provider, "mc2").expect("second candidate");
        assert_eq!(candidate.process.pid(), 2);
        assert_eq!(candidate.variant, &STEAM);
    }

    #[test]
    fn test_find_target_tolerates_listing_failure() {
        let provider = MockProvider::new(vec![image(1, "mc2.exe", &RETAIL).build()]);
        provider.set_fail_listing(true);
        assert!(find_target(&provider, "mc2").is_none());
        provider.set_fail_listing(false);
        assert!(find_target(&provider, "mc2").is_some());
    }
}
