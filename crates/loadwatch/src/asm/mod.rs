//! Minimal x86-32 assembler for generated trampolines
//!
//! A [`CodeBuffer`] is encoded as if it were loaded at its current base
//! address (0 while unplaced). Every address-valued field is recorded as a
//! [`Relocation`] so the buffer can later be moved with
//! [`CodeBuffer::set_install`] or merged into another buffer with
//! [`CodeBuffer::write_gen`] without re-assembling it.
//!
//! Every emitting operation returns the offset at which its instruction
//! starts, which callers use as a label.

mod reloc;

pub use reloc::{RelocKind, Relocation};

/// Base address of a buffer that has not been placed yet
pub const UNPLACED: u32 = 0;

/// 32-bit general purpose registers, in encoding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    Eax = 0,
    Ecx = 1,
    Edx = 2,
    Ebx = 3,
    Esp = 4,
    Ebp = 5,
    Esi = 6,
    Edi = 7,
}

impl Register {
    pub fn code(self) -> u8 {
        self as u8
    }
}

fn fits_i8(value: i32) -> bool {
    i8::try_from(value).is_ok()
}

/// Growable machine-code buffer with relocation bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    relocations: Vec<Relocation>,
    base: u32,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer already placed at `base`
    pub fn at(base: u32) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn is_placed(&self) -> bool {
        self.base != UNPLACED
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    /// Absolute address of a local offset at the current base
    pub fn local_to_address(&self, local: usize) -> u32 {
        self.base.wrapping_add(local as u32)
    }

    /// Absolute address one past the last byte
    pub fn end_address(&self) -> u32 {
        self.local_to_address(self.len())
    }

    /// Drop all code and relocations and return to the unplaced state
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.relocations.clear();
        self.base = UNPLACED;
    }

    /// Move the buffer to `address`, fixing up every relocated field
    pub fn set_install(&mut self, address: u32) -> u32 {
        let delta = address.wrapping_sub(self.base);
        self.base = address;
        if delta != 0 {
            for reloc in &self.relocations {
                reloc.apply(&mut self.bytes, delta);
            }
        }
        self.base
    }

    /// Append `child`, rebasing its fields to the position it now occupies
    ///
    /// The child's relocations are carried over so the merged code keeps
    /// moving correctly with this buffer.
    pub fn write_gen(&mut self, child: &CodeBuffer) -> usize {
        let start = self.here();
        let delta = self.local_to_address(start).wrapping_sub(child.base);
        self.bytes.extend_from_slice(&child.bytes);
        for reloc in &child.relocations {
            let reloc = reloc.shifted(start);
            if delta != 0 {
                reloc.apply(&mut self.bytes, delta);
            }
            self.relocations.push(reloc);
        }
        start
    }

    // Data

    pub fn data_u8(&mut self, value: u8) -> usize {
        let start = self.here();
        self.bytes.push(value);
        start
    }

    pub fn data_u16(&mut self, value: u16) -> usize {
        self.emit(&value.to_le_bytes())
    }

    pub fn data_u32(&mut self, value: u32) -> usize {
        self.emit(&value.to_le_bytes())
    }

    // Instructions

    /// `sub reg, imm`
    pub fn sub_ri(&mut self, reg: Register, imm: i32, force32: bool) -> usize {
        let start = self.here();
        if !force32 && fits_i8(imm) {
            self.emit(&[0x83, 0xE8 + reg.code(), imm as i8 as u8]);
        } else {
            self.emit(&[0x81, 0xE8 + reg.code()]);
            self.data_u32(imm as u32);
        }
        start
    }

    /// `mov dest, src` using the `8B /r` form
    pub fn mov_rr(&mut self, dest: Register, src: Register) -> usize {
        self.emit(&[0x8B, 0xC0 | (dest.code() << 3) | src.code()])
    }

    /// `push dword [esp + disp]`
    pub fn push_stack(&mut self, disp: i32, force32: bool) -> usize {
        let start = self.here();
        if !force32 && fits_i8(disp) {
            self.emit(&[0xFF, 0x74, 0x24, disp as i8 as u8]);
        } else {
            self.emit(&[0xFF, 0xB4, 0x24]);
            self.data_u32(disp as u32);
        }
        start
    }

    pub fn push_reg(&mut self, reg: Register) -> usize {
        self.emit(&[0x50 + reg.code()])
    }

    /// `push imm32` with a value that never moves
    pub fn push_imm(&mut self, value: u32) -> usize {
        let start = self.emit(&[0x68]);
        self.data_u32(value);
        start
    }

    /// `push imm32` of the address of `local` in this buffer
    pub fn push_local(&mut self, local: usize) -> usize {
        let start = self.push_imm(self.local_to_address(local));
        self.relocate_last(RelocKind::SelfRelative);
        start
    }

    /// Forward `args` stack arguments and `call` a label in this buffer
    pub fn call_std_local(&mut self, dest: usize, args: u8) -> usize {
        self.emit_call(dest as u32, args)
    }

    /// Forward `args` stack arguments and `call` an absolute address
    pub fn call_std_abs(&mut self, dest: u32, args: u8) -> usize {
        let start = self.emit_call(dest.wrapping_sub(self.base), args);
        self.relocate_last(RelocKind::External);
        start
    }

    /// `jmp` to a label in this buffer, short when it fits and is not forced
    pub fn jump_local(&mut self, dest: usize, force32: bool) -> usize {
        self.emit_jump(dest as u32, force32)
    }

    /// `jmp rel32` to an absolute address
    pub fn jump_abs(&mut self, dest: u32) -> usize {
        let start = self.emit_jump(dest.wrapping_sub(self.base), true);
        self.relocate_last(RelocKind::External);
        start
    }

    /// `mov byte [addr], value` with a fixed absolute address
    pub fn mov_byte_abs(&mut self, addr: u32, value: u8) -> usize {
        let start = self.emit(&[0xC6, 0x05]);
        self.data_u32(addr);
        self.data_u8(value);
        start
    }

    /// `mov byte [local], value` targeting a byte of this buffer
    pub fn mov_byte_local(&mut self, local: usize, value: u8) -> usize {
        let start = self.mov_byte_abs(self.local_to_address(local), value);
        self.relocations
            .push(Relocation::new(start + 2, RelocKind::SelfRelative));
        start
    }

    pub fn ret(&mut self) -> usize {
        self.emit(&[0xC3])
    }

    /// `ret imm16`, or a plain `ret` when nothing has to be popped
    pub fn ret_n(&mut self, pop: u16) -> usize {
        if pop == 0 {
            return self.ret();
        }
        let start = self.emit(&[0xC2]);
        self.data_u16(pop);
        start
    }

    // Helpers

    fn here(&self) -> usize {
        self.bytes.len()
    }

    fn emit(&mut self, bytes: &[u8]) -> usize {
        let start = self.here();
        self.bytes.extend_from_slice(bytes);
        start
    }

    /// Register the trailing 4 bytes as a relocated field
    fn relocate_last(&mut self, kind: RelocKind) {
        let offset = self.here() - Relocation::WIDTH;
        self.relocations.push(Relocation::new(offset, kind));
    }

    /// `target` is relative to this buffer's base, mod 2^32
    fn emit_call(&mut self, target: u32, args: u8) -> usize {
        let start = self.here();
        let disp = i32::from(args) * 4;
        for _ in 0..args {
            self.push_stack(disp, false);
        }
        self.bytes.push(0xE8);
        let next = (self.here() + Relocation::WIDTH) as u32;
        self.data_u32(target.wrapping_sub(next));
        start
    }

    /// `target` is relative to this buffer's base, mod 2^32
    fn emit_jump(&mut self, target: u32, force32: bool) -> usize {
        let start = self.here();
        let short = target.wrapping_sub(start as u32 + 2) as i32;
        if !force32 && fits_i8(short) {
            self.emit(&[0xEB, short as i8 as u8]);
        } else {
            self.bytes.push(0xE9);
            self.data_u32(target.wrapping_sub(start as u32 + 5));
        }
        start
    }
}
