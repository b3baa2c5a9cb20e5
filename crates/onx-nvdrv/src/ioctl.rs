//! Ioctl command identifiers, status codes, and the cross-call control block

use bitflags::bitflags;

bitflags! {
    /// Transfer direction encoded in the top bits of an ioctl code
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IoctlDirection: u32 {
        /// Payload is read by the driver (guest to device)
        const WRITE = 0b01;
        /// Payload is written by the driver (device to guest)
        const READ = 0b10;
    }
}

/// A raw 32-bit ioctl command code.
///
/// The driver multiplexes commands as `dir:2 | length:14 | group:8 |
/// number:8`: the group selects a command family, the number a command
/// within it, and the length declares the structured payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoctlCommand(pub u32);

impl IoctlCommand {
    /// Raw command code as the guest passed it
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Command number within the group
    pub const fn number(self) -> u32 {
        self.0 & 0xFF
    }

    /// Command group (driver magic byte)
    pub const fn group(self) -> u32 {
        (self.0 >> 8) & 0xFF
    }

    /// Declared payload length in bytes
    pub const fn length(self) -> usize {
        ((self.0 >> 16) & 0x3FFF) as usize
    }

    /// Transfer direction bits
    pub fn direction(self) -> IoctlDirection {
        IoctlDirection::from_bits_truncate(self.0 >> 30)
    }
}

impl From<u32> for IoctlCommand {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Status codes every ioctl entry point returns to the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NvStatus {
    Success = 0,
    NotImplemented = 1,
    NotSupported = 2,
    NotInitialized = 3,
    BadParameter = 4,
    Timeout = 5,
    InsufficientMemory = 6,
    ReadOnlyAttribute = 7,
    InvalidState = 8,
    InvalidAddress = 9,
    InvalidSize = 10,
    BadValue = 11,
    AlreadyAllocated = 13,
    Busy = 14,
}

impl NvStatus {
    /// Numeric code as reported over the wire
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn is_success(self) -> bool {
        self == NvStatus::Success
    }
}

/// Mutable control block threaded through a single ioctl call.
///
/// Carries cross-call state the service layer inspects after dispatch,
/// e.g. whether the response must be deferred until an event signals.
#[derive(Debug, Default, Clone)]
pub struct IoctlCtrl {
    /// Response must be delayed rather than completed inline
    pub must_delay: bool,
    /// Timeout handed back to the service layer for a deferred response
    pub timeout: u32,
}
