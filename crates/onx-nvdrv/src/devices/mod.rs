//! Host-channel device emulations
//!
//! The service layer resolves a guest request to a device instance and
//! invokes one of three entry points, chosen to match the real command's
//! calling convention: plain input/output, input plus an inlined input
//! region, or input plus an inlined region the driver fills as output.

pub mod nvhost_common;
pub mod nvhost_nvdec;
pub mod nvhost_vic;

pub use nvhost_common::{NvhostCommon, ResolvedCmdBuf, ResolvedReloc, SubmittedJob};
pub use nvhost_nvdec::NvhostNvdec;
pub use nvhost_vic::NvhostVic;

use crate::error::{DeviceError, DeviceResult};
use crate::ioctl::{IoctlCommand, IoctlCtrl, NvStatus};

/// Capability surface every emulated device node exposes.
///
/// Entry points take `&self`; shared session state is guarded inside the
/// device so guest cores may issue requests concurrently.
pub trait NvDevice {
    /// Handle an ioctl with a structured payload only
    fn ioctl1(
        &self,
        command: IoctlCommand,
        input: &[u8],
        output: &mut [u8],
        ctrl: &mut IoctlCtrl,
    ) -> NvStatus;

    /// Handle an ioctl whose payload is followed by an inlined input region
    fn ioctl2(
        &self,
        command: IoctlCommand,
        input: &[u8],
        inline_input: &[u8],
        output: &mut [u8],
        ctrl: &mut IoctlCtrl,
    ) -> NvStatus;

    /// Handle an ioctl whose payload is followed by an inlined region the
    /// driver fills as output
    fn ioctl3(
        &self,
        command: IoctlCommand,
        input: &[u8],
        output: &mut [u8],
        inline_output: &mut [u8],
        ctrl: &mut IoctlCtrl,
    ) -> NvStatus;
}

/// Collapse a handler result into the wire status for the guest
pub(crate) fn into_status(device: &str, command: IoctlCommand, result: DeviceResult<()>) -> NvStatus {
    match result {
        Ok(()) => NvStatus::Success,
        Err(err @ DeviceError::Overlap(_)) => {
            tracing::error!(
                target: "nvdrv",
                "{device}: ioctl 0x{:08x} violated an internal invariant: {err}",
                command.raw()
            );
            err.status()
        }
        Err(err) => {
            tracing::debug!(
                target: "nvdrv",
                "{device}: ioctl 0x{:08x} failed: {err}",
                command.raw()
            );
            err.status()
        }
    }
}
