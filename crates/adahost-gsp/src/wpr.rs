//! WPR metadata block consumed by the GSP Booter.

use adahost_hal::DmaBuffer;

use crate::Result;

/// "WPR2".
pub const WPR_META_MAGIC: u32 = 0x5750_5232;
pub const WPR_META_SIZE: usize = 4096;
pub const WPR_META_REVISION: u32 = 1;

/// Fixed WPR heap carved for GSP-RM.
pub const GSP_HEAP_SIZE: u64 = 64 << 20;
/// FRTS region size carved by FWSEC.
pub const FRTS_SIZE: u64 = 1 << 20;

// Field offsets within the 4 KiB block.
const OFF_MAGIC: usize = 0x00;
const OFF_REVISION: usize = 0x04;
const OFF_BOOTLOADER_ADDR: usize = 0x08;
const OFF_BOOTLOADER_SIZE: usize = 0x10;
const OFF_RADIX3_ADDR: usize = 0x18;
const OFF_RADIX3_SIZE: usize = 0x20;
const OFF_HEAP_SIZE: usize = 0x28;
const OFF_FRTS_SIZE: usize = 0x30;
const OFF_FW_HEAP_ENABLED: usize = 0x38;
const OFF_PARTITION_RPC: usize = 0x3c;
const OFF_BOOT_BIN_VIRT: usize = 0x40;
const OFF_FW_OFFSET: usize = 0x48;

/// The fields the Booter consumes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WprMeta {
    pub bootloader_addr: u64,
    pub bootloader_size: u64,
    pub radix3_addr: u64,
    pub radix3_size: u64,
    pub gsp_fw_heap_size: u64,
    pub frts_size: u64,
    pub fw_heap_enabled: u32,
    pub partition_rpc: u32,
}

impl WprMeta {
    pub fn new(
        bootloader_addr: u64,
        bootloader_size: u64,
        radix3_addr: u64,
        radix3_size: u64,
    ) -> Self {
        Self {
            bootloader_addr,
            bootloader_size,
            radix3_addr,
            radix3_size,
            gsp_fw_heap_size: GSP_HEAP_SIZE,
            frts_size: FRTS_SIZE,
            fw_heap_enabled: 1,
            partition_rpc: 1,
        }
    }

    /// Serializes the block into `buf`, zeroing everything else.
    pub fn write_to(&self, buf: &mut DmaBuffer) -> Result<()> {
        buf.fill_zero();
        buf.write_u32(OFF_MAGIC, WPR_META_MAGIC)?;
        buf.write_u32(OFF_REVISION, WPR_META_REVISION)?;
        buf.write_u64(OFF_BOOTLOADER_ADDR, self.bootloader_addr)?;
        buf.write_u64(OFF_BOOTLOADER_SIZE, self.bootloader_size)?;
        buf.write_u64(OFF_RADIX3_ADDR, self.radix3_addr)?;
        buf.write_u64(OFF_RADIX3_SIZE, self.radix3_size)?;
        buf.write_u64(OFF_HEAP_SIZE, self.gsp_fw_heap_size)?;
        buf.write_u64(OFF_FRTS_SIZE, self.frts_size)?;
        buf.write_u32(OFF_FW_HEAP_ENABLED, self.fw_heap_enabled)?;
        buf.write_u32(OFF_PARTITION_RPC, self.partition_rpc)?;
        // The whole image is mapped through radix3; the in-image offsets
        // stay zero on Ada.
        buf.write_u64(OFF_BOOT_BIN_VIRT, 0)?;
        buf.write_u64(OFF_FW_OFFSET, 0)?;
        Ok(())
    }

    /// Reads the block back; returns the stored magic alongside the fields.
    pub fn read_from(buf: &DmaBuffer) -> Result<(u32, Self)> {
        let magic = buf.read_u32(OFF_MAGIC)?;
        let meta = Self {
            bootloader_addr: buf.read_u64(OFF_BOOTLOADER_ADDR)?,
            bootloader_size: buf.read_u64(OFF_BOOTLOADER_SIZE)?,
            radix3_addr: buf.read_u64(OFF_RADIX3_ADDR)?,
            radix3_size: buf.read_u64(OFF_RADIX3_SIZE)?,
            gsp_fw_heap_size: buf.read_u64(OFF_HEAP_SIZE)?,
            frts_size: buf.read_u64(OFF_FRTS_SIZE)?,
            fw_heap_enabled: buf.read_u32(OFF_FW_HEAP_ENABLED)?,
            partition_rpc: buf.read_u32(OFF_PARTITION_RPC)?,
        };
        Ok((magic, meta))
    }
}
