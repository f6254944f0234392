//! Binding code buffers to a live process

use tracing::debug;

use crate::asm::CodeBuffer;
use crate::error::{Error, Result};
use crate::memory::{ReadMemory, WriteMemory};

/// Installs, verifies and restores code buffers in one process
pub struct Installer<'a, P: ReadMemory + WriteMemory + ?Sized> {
    process: &'a P,
}

impl<'a, P: ReadMemory + WriteMemory + ?Sized> Installer<'a, P> {
    pub fn new(process: &'a P) -> Self {
        Self { process }
    }

    /// Allocate exactly `buffer.len()` bytes, move the buffer there and write it
    pub fn install(&self, buffer: &mut CodeBuffer) -> Result<u32> {
        let address = self.process.allocate(buffer.len())?;
        buffer.set_install(address);
        if let Err(e) = self.write_install(buffer) {
            if let Err(free_err) = self.process.free(address) {
                debug!("Failed to free {:#x} after write failure: {}", address, free_err);
            }
            return Err(e);
        }
        debug!("Installed {} bytes at {:#x}", buffer.len(), address);
        Ok(address)
    }

    /// Write the buffer's bytes at its assigned address
    pub fn write_install(&self, buffer: &CodeBuffer) -> Result<u32> {
        if !buffer.is_placed() {
            return Err(Error::NotPlaced);
        }
        self.process.write_bytes(buffer.base(), buffer.as_bytes())?;
        Ok(buffer.base())
    }

    /// Whether the live bytes at the buffer's address equal the buffer
    pub fn verify_install(&self, buffer: &CodeBuffer) -> Result<bool> {
        if !buffer.is_placed() {
            return Err(Error::NotPlaced);
        }
        let live = self.process.read_bytes(buffer.base(), buffer.len())?;
        Ok(live == buffer.as_bytes())
    }

    /// Release a block returned by [`Installer::install`]
    pub fn free_install(&self, address: u32) -> Result<()> {
        self.process.free(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Register;
    use crate::memory::mock::{MOCK_ALLOC_BASE, MockProcessBuilder};

    fn process() -> crate::memory::MockProcess {
        MockProcessBuilder::new(1, "mc2.exe")
            .module(0x0040_0000, 0x1000)
            .write(0x0040_0100, &[0x83, 0xEC, 0x28, 0x56, 0x8B, 0xF1])
            .build()
    }

    #[test]
    fn test_install_relocates_and_writes() {
        let process = process();
        let mut buffer = CodeBuffer::new();
        let flag = buffer.data_u8(0);
        buffer.mov_byte_local(flag, 1);
        buffer.jump_abs(0x0040_0106);

        let address = Installer::new(&process).install(&mut buffer).unwrap();
        assert_eq!(address, MOCK_ALLOC_BASE);
        assert_eq!(buffer.base(), address);
        assert_eq!(process.peek(address, buffer.len()), buffer.as_bytes());
        assert_eq!(
            process.peek(address + 3, 4),
            MOCK_ALLOC_BASE.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn test_install_frees_on_write_failure() {
        let process = process();
        process.fail_write_at(0);
        let mut buffer = CodeBuffer::new();
        buffer.ret();
        assert!(Installer::new(&process).install(&mut buffer).is_err());
        assert_eq!(process.allocation_count(), 0);
    }

    #[test]
    fn test_verify_install_compares_live_bytes() {
        let process = process();
        let installer = Installer::new(&process);

        let mut expected = CodeBuffer::at(0x0040_0100);
        expected.sub_ri(Register::Esp, 0x28, false);
        expected.push_reg(Register::Esi);
        expected.mov_rr(Register::Esi, Register::Ecx);
        assert!(installer.verify_install(&expected).unwrap());

        let mut wrong = CodeBuffer::at(0x0040_0100);
        wrong.push_reg(Register::Esi);
        assert!(!installer.verify_install(&wrong).unwrap());
    }

    #[test]
    fn test_write_install_restores_snapshot() {
        let process = process();
        let installer = Installer::new(&process);
        let mut snapshot = CodeBuffer::at(0x0040_0100);
        snapshot.sub_ri(Register::Esp, 0x28, false);

        let mut patch = CodeBuffer::at(0x0040_0100);
        patch.jump_abs(MOCK_ALLOC_BASE);
        installer.write_install(&patch).unwrap();
        assert!(!installer.verify_install(&snapshot).unwrap());

        installer.write_install(&snapshot).unwrap();
        assert!(installer.verify_install(&snapshot).unwrap());
    }

    #[test]
    fn test_unplaced_buffer_is_rejected() {
        let process = process();
        let mut buffer = CodeBuffer::new();
        buffer.ret();
        let installer = Installer::new(&process);
        assert!(matches!(
            installer.write_install(&buffer),
            Err(Error::NotPlaced)
        ));
        assert!(matches!(
            installer.verify_install(&buffer),
            Err(Error::NotPlaced)
        ));
    }
}
