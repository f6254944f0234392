//! Relocation records for address-valued fields inside a code buffer

/// How an embedded 32-bit field reacts when its buffer is moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocKind {
    /// Address of something inside this buffer; grows by the move delta
    SelfRelative,
    /// Displacement from this buffer to a fixed location; shrinks by the move delta
    External,
}

/// A 4-byte little-endian field at `offset` that must be fixed up on every move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relocation {
    pub offset: usize,
    pub kind: RelocKind,
}

impl Relocation {
    pub const WIDTH: usize = 4;

    pub fn new(offset: usize, kind: RelocKind) -> Self {
        Self { offset, kind }
    }

    /// Adjust the field in `bytes` for a buffer that moved by `delta` (mod 2^32)
    pub(crate) fn apply(&self, bytes: &mut [u8], delta: u32) {
        let field = &mut bytes[self.offset..self.offset + Self::WIDTH];
        let value = u32::from_le_bytes([field[0], field[1], field[2], field[3]]);
        let value = match self.kind {
            RelocKind::SelfRelative => value.wrapping_add(delta),
            RelocKind::External => value.wrapping_sub(delta),
        };
        field.copy_from_slice(&value.to_le_bytes());
    }

    /// The same relocation after its buffer was appended at `shift` in a parent
    pub(crate) fn shifted(&self, shift: usize) -> Self {
        Self::new(self.offset + shift, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_self_relative_adds_delta() {
        let mut bytes = [0xAA, 0x10, 0x00, 0x00, 0x00, 0xBB];
        Relocation::new(1, RelocKind::SelfRelative).apply(&mut bytes, 0x0040_0000);
        assert_eq!(bytes, [0xAA, 0x10, 0x00, 0x40, 0x00, 0xBB]);
    }

    #[test]
    fn test_apply_external_subtracts_delta() {
        let mut bytes = 0x0040_1000u32.to_le_bytes();
        Relocation::new(0, RelocKind::External).apply(&mut bytes, 0x1000);
        assert_eq!(u32::from_le_bytes(bytes), 0x0040_0000);
    }

    #[test]
    fn test_apply_wraps_negative_displacements() {
        let mut bytes = 5u32.to_le_bytes();
        Relocation::new(0, RelocKind::External).apply(&mut bytes, 10);
        assert_eq!(i32::from_le_bytes(bytes), -5);
    }
}
