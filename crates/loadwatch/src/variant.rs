//! Known builds of the target executable and their offset tables
//!
//! All offsets are relative to the main module's load address. The two
//! distributions share code offsets and differ only in where a few string
//! constants sit in the data section.

use strum::{Display, EnumIter, IntoStaticStr};
use tracing::debug;

use crate::error::Result;
use crate::memory::ReadMemory;
use crate::signal::{FLAG_AMBIGUOUS, FLAG_IDLE};

/// Offset of the 4-byte build signature
pub const SIGNATURE_OFFSET: u32 = 0x0023_0000;

/// Function entry points that get wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum HookSite {
    Game,
    Movie,
    Frontend,
    RaceEditor,
    CarViewer,
}

impl HookSite {
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Stack arguments the function takes (callee-cleaned)
    pub fn stack_args(self) -> u8 {
        match self {
            Self::Game => 1,
            _ => 0,
        }
    }

    /// Flag value written when the wrapped call returns
    ///
    /// The frontend path also runs while a modal screen is up during play, so
    /// it leaves the flag ambiguous instead of clearing it.
    pub fn end_value(self) -> u8 {
        match self {
            Self::Frontend => FLAG_AMBIGUOUS,
            _ => FLAG_IDLE,
        }
    }
}

/// Offset table for one build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryVariant {
    pub name: &'static str,
    pub signature: u32,
    pub game: u32,
    pub movie: u32,
    pub frontend: u32,
    pub race_editor: u32,
    pub car_viewer: u32,
    /// Static byte that is non-zero while the disclaimer/modal screen is up
    pub disclaimer: u32,
    pub movie_str: u32,
    pub frontend_str: u32,
    pub race_editor_str: u32,
    pub car_viewer_str: u32,
}

impl BinaryVariant {
    pub fn entry(&self, site: HookSite) -> u32 {
        match site {
            HookSite::Game => self.game,
            HookSite::Movie => self.movie,
            HookSite::Frontend => self.frontend,
            HookSite::RaceEditor => self.race_editor,
            HookSite::CarViewer => self.car_viewer,
        }
    }

    /// String constant pushed by the site's preamble, if it pushes one
    pub fn string(&self, site: HookSite) -> Option<u32> {
        match site {
            HookSite::Game => None,
            HookSite::Movie => Some(self.movie_str),
            HookSite::Frontend => Some(self.frontend_str),
            HookSite::RaceEditor => Some(self.race_editor_str),
            HookSite::CarViewer => Some(self.car_viewer_str),
        }
    }
}

pub static RETAIL: BinaryVariant = BinaryVariant {
    name: "retail",
    signature: 0x6F72_7241,
    game: 0x0000_3B80,
    movie: 0x0000_3860,
    frontend: 0x0000_38E0,
    race_editor: 0x0000_3AE0,
    car_viewer: 0x0000_3B30,
    disclaimer: 0x0026_22B0,
    movie_str: 0x0022_D984,
    frontend_str: 0x0022_D9D8,
    race_editor_str: 0x0022_D9E4,
    car_viewer_str: 0x0022_D9F4,
};

pub static STEAM: BinaryVariant = BinaryVariant {
    name: "steam",
    signature: 0x5F73_7475,
    game: 0x0000_3B80,
    movie: 0x0000_3860,
    frontend: 0x0000_38E0,
    race_editor: 0x0000_3AE0,
    car_viewer: 0x0000_3B30,
    disclaimer: 0x0026_22B0,
    movie_str: 0x0022_D980,
    frontend_str: 0x0022_D9D4,
    race_editor_str: 0x0022_D9E0,
    car_viewer_str: 0x0022_D9F0,
};

pub static VARIANTS: [&BinaryVariant; 2] = [&RETAIL, &STEAM];

pub fn variant_for_signature(signature: u32) -> Option<&'static BinaryVariant> {
    VARIANTS
        .iter()
        .copied()
        .find(|variant| variant.signature == signature)
}

/// Read the build signature of the module at `module_base` and look it up
pub fn detect_variant<R: ReadMemory + ?Sized>(
    reader: &R,
    module_base: u32,
) -> Result<Option<&'static BinaryVariant>> {
    let signature = reader.read_u32(module_base.wrapping_add(SIGNATURE_OFFSET))?;
    let variant = variant_for_signature(signature);
    match variant {
        Some(v) => debug!("Build signature {:#010x}: {}", signature, v.name),
        None => debug!("Unknown build signature {:#010x}", signature),
    }
    Ok(variant)
}
