//! GPU driver (nvdrv) ioctl emulation for oxidized-nx
//!
//! Reproduces the externally observable behavior of the console's GPU and
//! video-codec device nodes: fixed wire-format record parsing, device
//! virtual address-space bookkeeping, and the ioctl dispatch surface the
//! service layer routes guest requests through. No real hardware driver
//! runs; submissions are resolved against the memory-object table and
//! handed off to the GPU command processor elsewhere.

pub mod address_space;
pub mod devices;
pub mod error;
pub mod ioctl;
pub mod nvmap;
pub mod records;

pub use devices::{NvDevice, NvhostNvdec, NvhostVic};
pub use error::DeviceError;
pub use ioctl::{IoctlCommand, IoctlCtrl, NvStatus};
pub use nvmap::NvmapTable;

/// Address in the device's virtual address space
pub type DeviceAddr = u64;

/// Address in the emulator's own address space
pub type HostAddr = u64;
