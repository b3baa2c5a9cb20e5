//! Video decoder (NVDEC) channel device

use std::sync::Arc;

use onx_core::config::Config;
use tracing::warn;

use super::nvhost_common::{cmd, NvhostCommon};
use super::{into_status, NvDevice};
use crate::ioctl::{IoctlCommand, IoctlCtrl, NvStatus};
use crate::nvmap::NvmapTable;

/// Syncpoints assigned to the decoder channel
const NVDEC_SYNCPOINTS: [u32; 1] = [15];

/// Emulated `/dev/nvhost-nvdec` device node
pub struct NvhostNvdec {
    common: NvhostCommon,
}

impl NvhostNvdec {
    pub fn new(nvmap: Arc<NvmapTable>, config: &Config) -> Self {
        Self {
            common: NvhostCommon::new("nvdec", nvmap, config, &NVDEC_SYNCPOINTS),
        }
    }

    /// Shared channel state, for the GPU command processor and tests
    pub fn channel(&self) -> &NvhostCommon {
        &self.common
    }
}

impl NvDevice for NvhostNvdec {
    fn ioctl1(
        &self,
        command: IoctlCommand,
        input: &[u8],
        output: &mut [u8],
        _ctrl: &mut IoctlCtrl,
    ) -> NvStatus {
        let result = match (command.group(), command.number()) {
            (cmd::GROUP_CHANNEL, cmd::SUBMIT) => self.common.submit(input, output),
            (cmd::GROUP_CHANNEL, cmd::GET_SYNCPOINT) => self.common.get_syncpoint(input, output),
            (cmd::GROUP_CHANNEL, cmd::GET_WAITBASE) => self.common.get_waitbase(input, output),
            (cmd::GROUP_CHANNEL, cmd::SET_SUBMIT_TIMEOUT) => self.common.set_submit_timeout(input),
            (cmd::GROUP_CHANNEL, cmd::MAP_BUFFER) => self.common.map_buffer(input, output),
            (cmd::GROUP_CHANNEL, cmd::UNMAP_BUFFER) => self.common.unmap_buffer(input, output),
            (cmd::GROUP_HOST, cmd::SET_NVMAP_FD) => self.common.set_nvmap_fd(input),
            _ => {
                warn!(target: "nvdrv", "nvdec: unimplemented ioctl1 0x{:08x}", command.raw());
                return NvStatus::NotImplemented;
            }
        };
        into_status("nvdec", command, result)
    }

    fn ioctl2(
        &self,
        command: IoctlCommand,
        _input: &[u8],
        _inline_input: &[u8],
        _output: &mut [u8],
        _ctrl: &mut IoctlCtrl,
    ) -> NvStatus {
        warn!(target: "nvdrv", "nvdec: unimplemented ioctl2 0x{:08x}", command.raw());
        NvStatus::NotImplemented
    }

    fn ioctl3(
        &self,
        command: IoctlCommand,
        _input: &[u8],
        _output: &mut [u8],
        _inline_output: &mut [u8],
        _ctrl: &mut IoctlCtrl,
    ) -> NvStatus {
        warn!(target: "nvdrv", "nvdec: unimplemented ioctl3 0x{:08x}", command.raw());
        NvStatus::NotImplemented
    }
}
