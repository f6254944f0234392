use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to enumerate processes: {0}")]
    ProcessListFailed(String),

    #[error("Failed to open process {pid}: {message}")]
    ProcessOpenFailed { pid: u32, message: String },

    #[error("Process has exited")]
    ProcessExited,

    #[error("Failed to read process memory at address {address:#x}: {message}")]
    MemoryReadFailed { address: u32, message: String },

    #[error("Failed to write process memory at address {address:#x}: {message}")]
    MemoryWriteFailed { address: u32, message: String },

    #[error("Failed to allocate {size} bytes in process: {message}")]
    AllocationFailed { size: usize, message: String },

    #[error("Failed to free process memory at address {address:#x}: {message}")]
    FreeFailed { address: u32, message: String },

    #[error("Address {0:#x} does not fit in a 32-bit address space")]
    AddressOutOfRange(u64),

    #[error("Code buffer has not been placed at an address")]
    NotPlaced,

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error means the target process is gone or its memory
    /// can no longer be touched
    pub fn is_process_lost(&self) -> bool {
        matches!(
            self,
            Error::ProcessExited | Error::MemoryReadFailed { .. } | Error::MemoryWriteFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_process_lost() {
        assert!(Error::ProcessExited.is_process_lost());
        assert!(
            Error::MemoryReadFailed {
                address: 0x400000,
                message: "partial copy".to_string(),
            }
            .is_process_lost()
        );
        assert!(
            !Error::AllocationFailed {
                size: 64,
                message: "denied".to_string(),
            }
            .is_process_lost()
        );
    }

    #[test]
    fn test_error_formats_address_as_hex() {
        let err = Error::MemoryReadFailed {
            address: 0x630000,
            message: "gone".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to read process memory at address 0x630000: gone"
        );
    }
}
