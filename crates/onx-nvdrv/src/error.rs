//! Device-layer error taxonomy

use thiserror::Error;

use crate::ioctl::NvStatus;
use crate::DeviceAddr;

/// Failures surfaced by the ioctl command handlers.
///
/// Every variant maps onto a wire status code; nothing unwinds across the
/// dispatch surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Payload size does not match the record and count-derived expectation
    #[error("malformed ioctl payload: expected {expected} bytes, got {actual}")]
    MalformedInput { expected: usize, actual: usize },

    /// A memory handle the object table cannot resolve
    #[error("unresolved memory handle 0x{0:08x}")]
    UnresolvedHandle(u32),

    /// Request parameter outside the valid range
    #[error("parameter {0} out of range")]
    BadParameter(u32),

    /// Command needs a bound memory table and none was set
    #[error("session has no memory table bound")]
    NotInitialized,

    /// Attempt to insert an overlapping mapping; caller contract violation
    #[error("mapping overlap at device address 0x{0:x}")]
    Overlap(DeviceAddr),
}

impl DeviceError {
    /// Wire status code reported to the guest for this failure
    pub fn status(&self) -> NvStatus {
        match self {
            DeviceError::MalformedInput { .. } => NvStatus::InvalidSize,
            DeviceError::UnresolvedHandle(_) => NvStatus::BadParameter,
            DeviceError::BadParameter(_) => NvStatus::BadParameter,
            DeviceError::NotInitialized => NvStatus::NotInitialized,
            DeviceError::Overlap(_) => NvStatus::InvalidState,
        }
    }
}

/// Result alias for the command handlers
pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = DeviceError::MalformedInput {
            expected: 16,
            actual: 15,
        };
        assert_eq!(err.status(), NvStatus::InvalidSize);
        assert_eq!(DeviceError::UnresolvedHandle(7).status(), NvStatus::BadParameter);
        assert_eq!(DeviceError::NotInitialized.status(), NvStatus::NotInitialized);
        assert_eq!(DeviceError::Overlap(0x1000).status(), NvStatus::InvalidState);
    }
}
