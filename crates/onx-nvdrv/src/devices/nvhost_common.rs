//! Shared implementation behind the nvhost channel devices
//!
//! Owns the session state every channel command operates on: the bound
//! memory-table fd, the submission timeout, the device syncpoint and
//! waitbase tables, and the device virtual address-space index. Concrete
//! devices select which command codes reach which handler.

use std::sync::Arc;

use onx_core::config::Config;
use onx_core::{nvdrv_debug, nvdrv_trace};
use parking_lot::Mutex;

use crate::address_space::{AddressSpace, BufferMapping};
use crate::error::{DeviceError, DeviceResult};
use crate::nvmap::NvmapTable;
use crate::records::{
    self, CommandBufferEntry, FenceEntry, IdParam, MapBufferEntry, MapBufferHeader, RelocationEntry,
    SetNvmapFd, SetSubmitTimeout, SubmitHeader, SyncptIncrEntry,
};
use crate::{DeviceAddr, HostAddr};

/// Number of syncpoints a channel exposes
pub const MAX_SYNCPOINTS: usize = 192;
/// Number of wait bases a channel exposes
pub const MAX_WAITBASES: usize = 3;

/// Base of the region the map handler bump-allocates from
const MAP_REGION_BASE: DeviceAddr = 0x1000_0000;
/// Device mapping granularity
const MAP_ALIGN: u64 = 0x1000;

/// Channel command groups and numbers, as the guest encodes them
pub mod cmd {
    /// Channel-specific command group
    pub const GROUP_CHANNEL: u32 = 0x00;
    /// Host1x command group
    pub const GROUP_HOST: u32 = 0x48;

    pub const SUBMIT: u32 = 0x01;
    pub const GET_SYNCPOINT: u32 = 0x02;
    pub const GET_WAITBASE: u32 = 0x03;
    pub const SET_SUBMIT_TIMEOUT: u32 = 0x07;
    pub const MAP_BUFFER: u32 = 0x09;
    pub const UNMAP_BUFFER: u32 = 0x0A;

    pub const SET_NVMAP_FD: u32 = 0x01;
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

/// One command buffer resolved to the emulator's address space, ready for
/// the GPU command processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCmdBuf {
    pub host_addr: HostAddr,
    pub offset: u32,
    pub word_count: u32,
}

/// One relocation resolved to a concrete patch address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedReloc {
    /// Command buffer the patch lands in
    pub cmdbuf_host: HostAddr,
    /// Byte offset of the word to patch
    pub cmdbuf_offset: u32,
    /// Resolved address written into the command stream
    pub target_addr: HostAddr,
}

/// A submission after handle resolution, as handed to the GPU command
/// processor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedJob {
    pub command_buffers: Vec<ResolvedCmdBuf>,
    pub relocations: Vec<ResolvedReloc>,
    pub increments: Vec<SyncptIncrEntry>,
}

/// Session state mutated by channel commands; one lock per device instance
struct SessionState {
    nvmap_fd: Option<i32>,
    submit_timeout_ms: u32,
    address_space: AddressSpace,
    /// Syncpoint ids assigned to this channel, by table index
    device_syncpoints: [u32; MAX_SYNCPOINTS],
    /// Current value of each syncpoint, by id
    syncpoint_values: [u32; MAX_SYNCPOINTS],
    waitbases: [u32; MAX_WAITBASES],
    jobs: Vec<SubmittedJob>,
}

/// Shared base of the nvhost channel devices.
///
/// The session lock is held only for a single command's decode-and-mutate
/// step, never across a call into the memory-object table.
pub struct NvhostCommon {
    name: &'static str,
    nvmap: Arc<NvmapTable>,
    state: Mutex<SessionState>,
}

impl NvhostCommon {
    pub fn new(
        name: &'static str,
        nvmap: Arc<NvmapTable>,
        config: &Config,
        syncpoint_ids: &[u32],
    ) -> Self {
        let mut device_syncpoints = [0u32; MAX_SYNCPOINTS];
        device_syncpoints[..syncpoint_ids.len()].copy_from_slice(syncpoint_ids);
        Self {
            name,
            nvmap,
            state: Mutex::new(SessionState {
                nvmap_fd: None,
                submit_timeout_ms: config.nvdrv.submit_timeout_ms,
                address_space: AddressSpace::new(),
                device_syncpoints,
                syncpoint_values: [0u32; MAX_SYNCPOINTS],
                waitbases: [0u32; MAX_WAITBASES],
                jobs: Vec::new(),
            }),
        }
    }

    /// Memory-table fd the session is bound to, if any
    pub fn nvmap_fd(&self) -> Option<i32> {
        self.state.lock().nvmap_fd
    }

    /// Current session submission timeout in milliseconds
    pub fn submit_timeout_ms(&self) -> u32 {
        self.state.lock().submit_timeout_ms
    }

    /// Mapping containing the given device address, if any
    pub fn find_mapping(&self, addr: DeviceAddr) -> Option<BufferMapping> {
        self.state.lock().address_space.find(addr).copied()
    }

    /// Number of live device mappings
    pub fn mapping_count(&self) -> usize {
        self.state.lock().address_space.len()
    }

    /// Current value of a syncpoint
    pub fn syncpoint_value(&self, id: u32) -> u32 {
        let state = self.state.lock();
        state
            .syncpoint_values
            .get(id as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Drain the submissions recorded since the last call, in order
    pub fn take_submitted_jobs(&self) -> Vec<SubmittedJob> {
        std::mem::take(&mut self.state.lock().jobs)
    }

    fn require_bound(&self) -> DeviceResult<()> {
        if self.state.lock().nvmap_fd.is_none() {
            return Err(DeviceError::NotInitialized);
        }
        Ok(())
    }

    /// Bind the session to a memory-object table.
    ///
    /// Re-binding overwrites the fd without resetting existing mappings.
    pub(crate) fn set_nvmap_fd(&self, input: &[u8]) -> DeviceResult<()> {
        records::expect_len(input, SetNvmapFd::SIZE)?;
        let params = SetNvmapFd::decode(input)?;

        let mut state = self.state.lock();
        if state.nvmap_fd.is_some() {
            nvdrv_trace!("{}: re-binding nvmap fd, mappings kept", self.name);
        }
        state.nvmap_fd = Some(params.fd);
        nvdrv_debug!("{}: bound nvmap fd {}", self.name, params.fd);
        Ok(())
    }

    /// Accept a submission: resolve its command buffers, apply relocations,
    /// record requested syncpoint increments, and fill fence thresholds.
    pub(crate) fn submit(&self, input: &[u8], output: &mut [u8]) -> DeviceResult<()> {
        let header = SubmitHeader::decode(input)?;
        let expected = header.payload_size();
        records::expect_len(input, expected)?;
        records::expect_len(output, expected)?;
        self.require_bound()?;

        let mut cursor = SubmitHeader::SIZE;
        let mut cmd_buffers = Vec::with_capacity(header.cmd_buffer_count as usize);
        for _ in 0..header.cmd_buffer_count {
            cmd_buffers.push(CommandBufferEntry::decode(&input[cursor..])?);
            cursor += CommandBufferEntry::SIZE;
        }
        let mut relocations = Vec::with_capacity(header.relocation_count as usize);
        for _ in 0..header.relocation_count {
            relocations.push(RelocationEntry::decode(&input[cursor..])?);
            cursor += RelocationEntry::SIZE;
        }
        let mut increments = Vec::with_capacity(header.syncpt_count as usize);
        for _ in 0..header.syncpt_count {
            increments.push(SyncptIncrEntry::decode(&input[cursor..])?);
            cursor += SyncptIncrEntry::SIZE;
        }
        let mut fences = Vec::with_capacity(header.fence_count as usize);
        for _ in 0..header.fence_count {
            fences.push(FenceEntry::decode(&input[cursor..])?);
            cursor += FenceEntry::SIZE;
        }

        // Reject out-of-range syncpoint ids before any state moves.
        for id in increments
            .iter()
            .map(|incr| incr.syncpt_id)
            .chain(fences.iter().map(|fence| fence.syncpt_id))
        {
            if id as usize >= MAX_SYNCPOINTS {
                return Err(DeviceError::BadParameter(id));
            }
        }

        // Resolve every referenced handle before touching session state so
        // that a miss fails the whole submission with no partial effects.
        let mut resolved = Vec::with_capacity(cmd_buffers.len());
        for entry in &cmd_buffers {
            let object = self
                .nvmap
                .get(entry.mem_id)
                .ok_or(DeviceError::UnresolvedHandle(entry.mem_id))?;
            resolved.push(ResolvedCmdBuf {
                host_addr: object.address,
                offset: entry.offset,
                word_count: entry.word_count,
            });
        }
        let mut patches = Vec::with_capacity(relocations.len());
        for reloc in &relocations {
            let cmdbuf = self
                .nvmap
                .get(reloc.cmdbuf_mem)
                .ok_or(DeviceError::UnresolvedHandle(reloc.cmdbuf_mem))?;
            let target = self
                .nvmap
                .get(reloc.target_mem)
                .ok_or(DeviceError::UnresolvedHandle(reloc.target_mem))?;
            patches.push(ResolvedReloc {
                cmdbuf_host: cmdbuf.address,
                cmdbuf_offset: reloc.cmdbuf_offset,
                target_addr: target.address + u64::from(reloc.target_offset),
            });
        }

        nvdrv_debug!(
            "{}: submit {} cmdbufs, {} relocs, {} incrs, {} fences",
            self.name,
            cmd_buffers.len(),
            relocations.len(),
            increments.len(),
            fences.len()
        );

        let mut state = self.state.lock();
        for incr in &increments {
            let value = &mut state.syncpoint_values[incr.syncpt_id as usize];
            *value = value.wrapping_add(incr.increments);
        }
        let fences_out: Vec<FenceEntry> = fences
            .iter()
            .map(|fence| FenceEntry {
                syncpt_id: fence.syncpt_id,
                value: state.syncpoint_values[fence.syncpt_id as usize],
            })
            .collect();
        state.jobs.push(SubmittedJob {
            command_buffers: resolved,
            relocations: patches,
            increments: increments.clone(),
        });
        drop(state);

        // Echo the decoded records with fence thresholds filled in.
        header.encode_into(output)?;
        let mut cursor = SubmitHeader::SIZE;
        for entry in &cmd_buffers {
            entry.encode_into(&mut output[cursor..])?;
            cursor += CommandBufferEntry::SIZE;
        }
        for reloc in &relocations {
            reloc.encode_into(&mut output[cursor..])?;
            cursor += RelocationEntry::SIZE;
        }
        for incr in &increments {
            incr.encode_into(&mut output[cursor..])?;
            cursor += SyncptIncrEntry::SIZE;
        }
        for fence in &fences_out {
            fence.encode_into(&mut output[cursor..])?;
            cursor += FenceEntry::SIZE;
        }
        Ok(())
    }

    /// Return the syncpoint id at the requested index of the channel table
    pub(crate) fn get_syncpoint(&self, input: &[u8], output: &mut [u8]) -> DeviceResult<()> {
        records::expect_len(input, IdParam::SIZE)?;
        records::expect_len(output, IdParam::SIZE)?;
        let mut params = IdParam::decode(input)?;

        let index = params.param as usize;
        if index >= MAX_SYNCPOINTS {
            return Err(DeviceError::BadParameter(params.param));
        }
        params.value = self.state.lock().device_syncpoints[index];
        nvdrv_trace!("{}: syncpoint[{}] = {}", self.name, index, params.value);
        params.encode_into(output)
    }

    /// Return the wait base value at the requested index
    pub(crate) fn get_waitbase(&self, input: &[u8], output: &mut [u8]) -> DeviceResult<()> {
        records::expect_len(input, IdParam::SIZE)?;
        records::expect_len(output, IdParam::SIZE)?;
        let mut params = IdParam::decode(input)?;

        let index = params.param as usize;
        if index >= MAX_WAITBASES {
            return Err(DeviceError::BadParameter(params.param));
        }
        params.value = self.state.lock().waitbases[index];
        nvdrv_trace!("{}: waitbase[{}] = {}", self.name, index, params.value);
        params.encode_into(output)
    }

    /// Map a batch of memory objects into the device address space.
    ///
    /// Addresses are bump-allocated past the highest live mapping, page
    /// aligned; the chosen device address is written back into each output
    /// entry. An unresolvable handle fails the batch before any mapping is
    /// added.
    pub(crate) fn map_buffer(&self, input: &[u8], output: &mut [u8]) -> DeviceResult<()> {
        let header = MapBufferHeader::decode(input)?;
        let expected = header.payload_size();
        records::expect_len(input, expected)?;
        records::expect_len(output, expected)?;
        self.require_bound()?;

        let mut entries = Vec::with_capacity(header.num_entries as usize);
        let mut cursor = MapBufferHeader::SIZE;
        for _ in 0..header.num_entries {
            entries.push(MapBufferEntry::decode(&input[cursor..])?);
            cursor += MapBufferEntry::SIZE;
        }

        let mut objects = Vec::with_capacity(entries.len());
        for entry in &entries {
            objects.push(
                self.nvmap
                    .get(entry.handle)
                    .ok_or(DeviceError::UnresolvedHandle(entry.handle))?,
            );
        }

        let mut state = self.state.lock();
        let mut out_entries = Vec::with_capacity(entries.len());
        for (entry, object) in entries.iter().zip(&objects) {
            let addr = align_up(
                state.address_space.highest_end().max(MAP_REGION_BASE),
                MAP_ALIGN,
            );
            state
                .address_space
                .add(addr, object.size, object.address, object.allocated)?;
            nvdrv_trace!(
                "{}: mapped handle 0x{:08x} at 0x{:x}..0x{:x}",
                self.name,
                entry.handle,
                addr,
                addr + object.size
            );
            out_entries.push(MapBufferEntry {
                handle: entry.handle,
                address: addr as u32,
            });
        }
        drop(state);

        header.encode_into(output)?;
        let mut cursor = MapBufferHeader::SIZE;
        for entry in &out_entries {
            entry.encode_into(&mut output[cursor..])?;
            cursor += MapBufferEntry::SIZE;
        }
        Ok(())
    }

    /// Unmap a batch of device addresses.
    ///
    /// Entries with no mapping at their address are silently skipped, so a
    /// double unmap is a no-op. Owned backing regions are released through
    /// the memory-object table after the session lock is dropped.
    pub(crate) fn unmap_buffer(&self, input: &[u8], output: &mut [u8]) -> DeviceResult<()> {
        let header = MapBufferHeader::decode(input)?;
        let expected = header.payload_size();
        records::expect_len(input, expected)?;
        records::expect_len(output, expected)?;
        self.require_bound()?;

        let mut entries = Vec::with_capacity(header.num_entries as usize);
        let mut cursor = MapBufferHeader::SIZE;
        for _ in 0..header.num_entries {
            entries.push(MapBufferEntry::decode(&input[cursor..])?);
            cursor += MapBufferEntry::SIZE;
        }

        let mut state = self.state.lock();
        let mut freed = Vec::new();
        for entry in &entries {
            match state.address_space.remove(DeviceAddr::from(entry.address)) {
                Some(mapping) if mapping.is_allocated() => freed.push(entry.handle),
                Some(_) => {}
                None => {
                    nvdrv_trace!(
                        "{}: unmap at 0x{:x} with no mapping, skipped",
                        self.name,
                        entry.address
                    );
                }
            }
        }
        drop(state);

        for handle in freed {
            self.nvmap.free(handle);
        }

        header.encode_into(output)?;
        let mut cursor = MapBufferHeader::SIZE;
        for entry in &entries {
            entry.encode_into(&mut output[cursor..])?;
            cursor += MapBufferEntry::SIZE;
        }
        Ok(())
    }

    /// Override the session submission timeout
    pub(crate) fn set_submit_timeout(&self, input: &[u8]) -> DeviceResult<()> {
        records::expect_len(input, SetSubmitTimeout::SIZE)?;
        let params = SetSubmitTimeout::decode(input)?;

        self.state.lock().submit_timeout_ms = params.timeout_ms;
        nvdrv_debug!("{}: submit timeout {} ms", self.name, params.timeout_ms);
        Ok(())
    }
}
