//! Layout of the injected head block
//!
//! ```text
//! +0          loading flag (1 byte, starts idle)
//! copy[i]     original preamble of site i, then jmp site_i + len
//! wrapper[i]  mov byte [flag], 1
//!             call copy[i] (forwarding the site's stack arguments)
//!             mov byte [flag], end_value
//!             ret args * 4
//! ```
//!
//! The whole block is built unplaced and moved in one go when it is
//! installed, so every label below is an offset into the block.

use crate::asm::CodeBuffer;
use crate::locate::SiteSnapshot;
use crate::signal::{FLAG_BUSY, FLAG_IDLE};
use crate::variant::HookSite;

/// Offset of the loading flag inside the head block
pub const FLAG_OFFSET: usize = 0;

/// Where one site's pieces live inside the head block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteLayout {
    pub site: HookSite,
    /// Start of the relocated original preamble
    pub copy: usize,
    /// Start of the flag-setting wrapper the site is redirected to
    pub wrapper: usize,
}

/// An assembled head block and its labels
#[derive(Debug, Clone)]
pub struct HeadBlock {
    pub code: CodeBuffer,
    pub sites: Vec<SiteLayout>,
}

impl HeadBlock {
    pub fn flag_address(&self) -> u32 {
        self.code.local_to_address(FLAG_OFFSET)
    }

    pub fn wrapper_address(&self, layout: &SiteLayout) -> u32 {
        self.code.local_to_address(layout.wrapper)
    }
}

/// Append the relocated preamble followed by a jump back into the original
pub fn write_copy(head: &mut CodeBuffer, snapshot: &CodeBuffer) -> usize {
    let start = head.write_gen(snapshot);
    head.jump_abs(snapshot.end_address());
    start
}

/// Append a wrapper that raises `flag` around a call to `target`
pub fn write_wrapper(head: &mut CodeBuffer, flag: usize, target: usize, site: HookSite) -> usize {
    let args = site.stack_args();
    let start = head.mov_byte_local(flag, FLAG_BUSY);
    head.call_std_local(target, args);
    head.mov_byte_local(flag, site.end_value());
    head.ret_n(u16::from(args) * 4);
    start
}

/// Build the full head block for a set of verified sites
pub fn build_head(snapshots: &[SiteSnapshot]) -> HeadBlock {
    let mut code = CodeBuffer::new();
    let flag = code.data_u8(FLAG_IDLE);
    debug_assert_eq!(flag, FLAG_OFFSET);

    let copies: Vec<usize> = snapshots
        .iter()
        .map(|snapshot| write_copy(&mut code, &snapshot.code))
        .collect();

    let sites = snapshots
        .iter()
        .zip(copies)
        .map(|(snapshot, copy)| SiteLayout {
            site: snapshot.site,
            copy,
            wrapper: write_wrapper(&mut code, flag, copy, snapshot.site),
        })
        .collect();

    HeadBlock { code, sites }
}

/// The 5-byte `jmp` written over a site's entry point
pub fn redirect(site_address: u32, wrapper_address: u32) -> CodeBuffer {
    let mut code = CodeBuffer::at(site_address);
    code.jump_abs(wrapper_address);
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locate::preamble;
    use crate::signal::FLAG_AMBIGUOUS;
    use crate::variant::RETAIL;
    use strum::IntoEnumIterator;

    const BASE: u32 = 0x0040_0000;
    const HEAD: u32 = 0x0100_0000;

    fn snapshots() -> Vec<SiteSnapshot> {
        HookSite::iter()
            .map(|site| SiteSnapshot {
                site,
                code: preamble(site, &RETAIL, BASE),
            })
            .collect()
    }

    fn read_u32(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn rel32_target(code: &CodeBuffer, offset: usize) -> u32 {
        code.local_to_address(offset + 4)
            .wrapping_add(read_u32(code.as_bytes(), offset))
    }

    fn placed_head() -> HeadBlock {
        let mut head = build_head(&snapshots());
        head.code.set_install(HEAD);
        head
    }

    #[test]
    fn test_flag_is_first_byte() {
        let head = placed_head();
        assert_eq!(head.code.as_bytes()[0], FLAG_IDLE);
        assert_eq!(head.flag_address(), HEAD);
        assert_eq!(head.sites.len(), 5);
    }

    #[test]
    fn test_copy_replays_preamble_and_jumps_back() {
        let head = placed_head();
        let bytes = head.code.as_bytes();
        for (layout, snapshot) in head.sites.iter().zip(snapshots()) {
            let len = snapshot.code.len();
            let copy = &bytes[layout.copy..layout.copy + len];
            assert_eq!(copy, snapshot.code.as_bytes());
            assert_eq!(bytes[layout.copy + len], 0xE9);
            assert_eq!(
                rel32_target(&head.code, layout.copy + len + 1),
                snapshot.code.end_address()
            );
        }
    }

    #[test]
    fn test_game_wrapper_forwards_argument() {
        let head = placed_head();
        let game = head.sites[0];
        assert_eq!(game.site, HookSite::Game);
        let bytes = head.code.as_bytes();
        let w = game.wrapper;

        assert_eq!(&bytes[w..w + 2], &[0xC6, 0x05]);
        assert_eq!(read_u32(bytes, w + 2), HEAD);
        assert_eq!(bytes[w + 6], FLAG_BUSY);
        assert_eq!(&bytes[w + 7..w + 11], &[0xFF, 0x74, 0x24, 0x04]);
        assert_eq!(bytes[w + 11], 0xE8);
        assert_eq!(
            rel32_target(&head.code, w + 12),
            head.code.local_to_address(game.copy)
        );
        assert_eq!(&bytes[w + 16..w + 18], &[0xC6, 0x05]);
        assert_eq!(read_u32(bytes, w + 18), HEAD);
        assert_eq!(bytes[w + 22], FLAG_IDLE);
        assert_eq!(&bytes[w + 23..w + 26], &[0xC2, 0x04, 0x00]);
    }

    #[test]
    fn test_frontend_wrapper_leaves_flag_ambiguous() {
        let head = placed_head();
        let frontend = head
            .sites
            .iter()
            .find(|l| l.site == HookSite::Frontend)
            .copied()
            .unwrap();
        let bytes = head.code.as_bytes();
        let w = frontend.wrapper;

        assert_eq!(bytes[w + 6], FLAG_BUSY);
        assert_eq!(bytes[w + 7], 0xE8);
        assert_eq!(
            rel32_target(&head.code, w + 8),
            head.code.local_to_address(frontend.copy)
        );
        assert_eq!(bytes[w + 18], FLAG_AMBIGUOUS);
        assert_eq!(bytes[w + 19], 0xC3);
    }

    #[test]
    fn test_head_moves_as_one_block() {
        let mut a = build_head(&snapshots());
        let mut b = a.clone();
        a.code.set_install(HEAD);
        b.code.set_install(0x2000_0000);
        b.code.set_install(HEAD);
        assert_eq!(a.code.as_bytes(), b.code.as_bytes());
    }

    #[test]
    fn test_redirect_targets_wrapper() {
        let head = placed_head();
        let layout = head.sites[1];
        let site = BASE + RETAIL.movie;
        let code = redirect(site, head.wrapper_address(&layout));
        assert_eq!(code.len(), 5);
        assert_eq!(code.base(), site);
        assert_eq!(code.as_bytes()[0], 0xE9);
        assert_eq!(rel32_target(&code, 1), HEAD + layout.wrapper as u32);
    }
}
