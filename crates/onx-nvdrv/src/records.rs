//! Fixed wire-format records for the host-channel ioctl surface
//!
//! Layouts are hardware-defined and contractual: every record occupies
//! exactly `SIZE` bytes of little-endian fields with no padding. A decode
//! consumes the declared byte count or fails; an encode emits it exactly.

use crate::error::{DeviceError, DeviceResult};

#[inline]
fn u32_at(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[inline]
fn i32_at(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[inline]
fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn check_len(buf: &[u8], expected: usize) -> DeviceResult<()> {
    if buf.len() < expected {
        return Err(DeviceError::MalformedInput {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Require a payload of exactly `expected` bytes.
///
/// Handlers call this before touching any state so that an ill-sized
/// request produces no output and no tracker mutation.
pub fn expect_len(buf: &[u8], expected: usize) -> DeviceResult<()> {
    if buf.len() != expected {
        return Err(DeviceError::MalformedInput {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Bind the session to a memory-object table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetNvmapFd {
    pub fd: i32,
}

impl SetNvmapFd {
    pub const SIZE: usize = 4;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self { fd: i32_at(buf, 0) })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        buf[0..4].copy_from_slice(&self.fd.to_le_bytes());
        Ok(())
    }
}

/// Submission header: four counts sizing the variable-length tail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitHeader {
    pub cmd_buffer_count: u32,
    pub relocation_count: u32,
    pub syncpt_count: u32,
    pub fence_count: u32,
}

impl SubmitHeader {
    pub const SIZE: usize = 16;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            cmd_buffer_count: u32_at(buf, 0),
            relocation_count: u32_at(buf, 4),
            syncpt_count: u32_at(buf, 8),
            fence_count: u32_at(buf, 12),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.cmd_buffer_count);
        put_u32(buf, 4, self.relocation_count);
        put_u32(buf, 8, self.syncpt_count);
        put_u32(buf, 12, self.fence_count);
        Ok(())
    }

    /// Total payload size for this header's counts, header included
    pub fn payload_size(&self) -> usize {
        Self::SIZE
            + self.cmd_buffer_count as usize * CommandBufferEntry::SIZE
            + self.relocation_count as usize * RelocationEntry::SIZE
            + self.syncpt_count as usize * SyncptIncrEntry::SIZE
            + self.fence_count as usize * FenceEntry::SIZE
    }
}

/// One command buffer in a submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandBufferEntry {
    /// Memory handle the buffer lives in
    pub mem_id: u32,
    /// Byte offset of the first command word
    pub offset: u32,
    /// Number of command words
    pub word_count: u32,
}

impl CommandBufferEntry {
    pub const SIZE: usize = 12;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            mem_id: u32_at(buf, 0),
            offset: u32_at(buf, 4),
            word_count: u32_at(buf, 8),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.mem_id);
        put_u32(buf, 4, self.offset);
        put_u32(buf, 8, self.word_count);
        Ok(())
    }
}

/// Patch request: write a resolved target address into a command buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationEntry {
    pub cmdbuf_mem: u32,
    pub cmdbuf_offset: u32,
    pub target_mem: u32,
    pub target_offset: u32,
}

impl RelocationEntry {
    pub const SIZE: usize = 16;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            cmdbuf_mem: u32_at(buf, 0),
            cmdbuf_offset: u32_at(buf, 4),
            target_mem: u32_at(buf, 8),
            target_offset: u32_at(buf, 12),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.cmdbuf_mem);
        put_u32(buf, 4, self.cmdbuf_offset);
        put_u32(buf, 8, self.target_mem);
        put_u32(buf, 12, self.target_offset);
        Ok(())
    }
}

/// Syncpoint increment requested by a submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncptIncrEntry {
    pub syncpt_id: u32,
    pub increments: u32,
}

impl SyncptIncrEntry {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            syncpt_id: u32_at(buf, 0),
            increments: u32_at(buf, 4),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.syncpt_id);
        put_u32(buf, 4, self.increments);
        Ok(())
    }
}

/// Fence threshold a submission asks the caller to wait on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceEntry {
    pub syncpt_id: u32,
    pub value: u32,
}

impl FenceEntry {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            syncpt_id: u32_at(buf, 0),
            value: u32_at(buf, 4),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.syncpt_id);
        put_u32(buf, 4, self.value);
        Ok(())
    }
}

/// Syncpoint and waitbase query: `param` in, `value` out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdParam {
    pub param: u32,
    pub value: u32,
}

impl IdParam {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            param: u32_at(buf, 0),
            value: u32_at(buf, 4),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.param);
        put_u32(buf, 4, self.value);
        Ok(())
    }
}

/// Map/unmap request header; `data_address` is ignored by the real driver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapBufferHeader {
    pub num_entries: u32,
    pub data_address: u32,
    pub attach_host_ch_das: u32,
}

impl MapBufferHeader {
    pub const SIZE: usize = 12;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            num_entries: u32_at(buf, 0),
            data_address: u32_at(buf, 4),
            attach_host_ch_das: u32_at(buf, 8),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.num_entries);
        put_u32(buf, 4, self.data_address);
        put_u32(buf, 8, self.attach_host_ch_das);
        Ok(())
    }

    /// Total payload size for this header's entry count, header included
    pub fn payload_size(&self) -> usize {
        Self::SIZE + self.num_entries as usize * MapBufferEntry::SIZE
    }
}

/// One handle to map or unmap; the driver fills `address` on map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapBufferEntry {
    pub handle: u32,
    pub address: u32,
}

impl MapBufferEntry {
    pub const SIZE: usize = 8;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            handle: u32_at(buf, 0),
            address: u32_at(buf, 4),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.handle);
        put_u32(buf, 4, self.address);
        Ok(())
    }
}

/// Session submission timeout override
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetSubmitTimeout {
    pub timeout_ms: u32,
}

impl SetSubmitTimeout {
    pub const SIZE: usize = 4;

    pub fn decode(buf: &[u8]) -> DeviceResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            timeout_ms: u32_at(buf, 0),
        })
    }

    pub fn encode_into(&self, buf: &mut [u8]) -> DeviceResult<()> {
        check_len(buf, Self::SIZE)?;
        put_u32(buf, 0, self.timeout_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips() {
        let mut buf = [0u8; 16];

        let fd = SetNvmapFd { fd: -3 };
        fd.encode_into(&mut buf[..4]).unwrap();
        assert_eq!(SetNvmapFd::decode(&buf[..4]).unwrap(), fd);

        let header = SubmitHeader {
            cmd_buffer_count: 1,
            relocation_count: 2,
            syncpt_count: 3,
            fence_count: 4,
        };
        header.encode_into(&mut buf).unwrap();
        assert_eq!(SubmitHeader::decode(&buf).unwrap(), header);

        let cmdbuf = CommandBufferEntry {
            mem_id: 42,
            offset: 0x100,
            word_count: 512,
        };
        cmdbuf.encode_into(&mut buf[..12]).unwrap();
        assert_eq!(CommandBufferEntry::decode(&buf[..12]).unwrap(), cmdbuf);

        let reloc = RelocationEntry {
            cmdbuf_mem: 1,
            cmdbuf_offset: 8,
            target_mem: 2,
            target_offset: 0x40,
        };
        reloc.encode_into(&mut buf).unwrap();
        assert_eq!(RelocationEntry::decode(&buf).unwrap(), reloc);

        let incr = SyncptIncrEntry {
            syncpt_id: 15,
            increments: 2,
        };
        incr.encode_into(&mut buf[..8]).unwrap();
        assert_eq!(SyncptIncrEntry::decode(&buf[..8]).unwrap(), incr);

        let fence = FenceEntry {
            syncpt_id: 15,
            value: 77,
        };
        fence.encode_into(&mut buf[..8]).unwrap();
        assert_eq!(FenceEntry::decode(&buf[..8]).unwrap(), fence);

        let param = IdParam {
            param: 0,
            value: 15,
        };
        param.encode_into(&mut buf[..8]).unwrap();
        assert_eq!(IdParam::decode(&buf[..8]).unwrap(), param);

        let map_header = MapBufferHeader {
            num_entries: 2,
            data_address: 0,
            attach_host_ch_das: 0,
        };
        map_header.encode_into(&mut buf[..12]).unwrap();
        assert_eq!(MapBufferHeader::decode(&buf[..12]).unwrap(), map_header);

        let entry = MapBufferEntry {
            handle: 42,
            address: 0x1000_0000,
        };
        entry.encode_into(&mut buf[..8]).unwrap();
        assert_eq!(MapBufferEntry::decode(&buf[..8]).unwrap(), entry);

        let timeout = SetSubmitTimeout { timeout_ms: 5000 };
        timeout.encode_into(&mut buf[..4]).unwrap();
        assert_eq!(SetSubmitTimeout::decode(&buf[..4]).unwrap(), timeout);
    }

    #[test]
    fn test_little_endian_layout() {
        let header = SubmitHeader {
            cmd_buffer_count: 0x0102_0304,
            relocation_count: 0,
            syncpt_count: 0,
            fence_count: 0,
        };
        let mut buf = [0u8; 16];
        header.encode_into(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        let err = SubmitHeader::decode(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            DeviceError::MalformedInput {
                expected: 16,
                actual: 15
            }
        );

        assert!(SetNvmapFd::decode(&[0u8; 3]).is_err());
        assert!(MapBufferEntry::decode(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_expect_len_rejects_oversize() {
        assert!(expect_len(&[0u8; 4], 4).is_ok());
        assert!(expect_len(&[0u8; 5], 4).is_err());
        assert!(expect_len(&[0u8; 3], 4).is_err());
    }

    #[test]
    fn test_payload_size() {
        let header = SubmitHeader {
            cmd_buffer_count: 1,
            relocation_count: 1,
            syncpt_count: 1,
            fence_count: 0,
        };
        assert_eq!(header.payload_size(), 16 + 12 + 16 + 8);

        let map = MapBufferHeader {
            num_entries: 3,
            ..Default::default()
        };
        assert_eq!(map.payload_size(), 12 + 3 * 8);
    }
}
