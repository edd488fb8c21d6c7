//! NVFW binary-header unwrap, ucode descriptor V3 decoding and the DMEM
//! mapper scan.

use crate::view::{u16_at, u32_at};
use crate::{FalconUcodeInfo, Result, VbiosError};
use tracing::debug;

const NVIDIA_VENDOR_ID: u16 = 0x10de;
/// "DMAP" little-endian.
const DMEM_MAPPER_MAGIC: u32 = 0x5041_4d44;

/// Size of the NVFW binary header preceding some descriptors.
const BIN_HDR_SIZE: usize = 24;
/// Descriptor V3 field block size.
const DESC_SIZE: usize = 44;

/// Unwraps an optional NVFW binary header at `ucode_offset` and decodes the
/// descriptor behind it.
pub(crate) fn extract(data: &[u8], ucode_offset: usize) -> Result<FalconUcodeInfo> {
    let vendor = u16_at(data, ucode_offset)?;
    let version = u16_at(data, ucode_offset + 2)?;

    // A header version outside [1, 16] means this is not a binary header and
    // the descriptor sits right at the entry's offset.
    let (desc_offset, stored_size) = if vendor == NVIDIA_VENDOR_ID && (1..=16).contains(&version) {
        let header_offset = u32_at(data, ucode_offset + 12)? as usize;
        let stored_size = u32_at(data, ucode_offset + BIN_HDR_SIZE)?;
        debug!(version, header_offset, stored_size, "NVFW binary header");
        (ucode_offset + header_offset, stored_size)
    } else {
        (ucode_offset, u32_at(data, ucode_offset)?)
    };

    if desc_offset + DESC_SIZE > data.len() {
        return Err(VbiosError::BadDescriptor("descriptor past end of image"));
    }

    let imem_rel = u32_at(data, desc_offset + 4)? as usize;
    let imem_size = u32_at(data, desc_offset + 8)? as usize;
    let imem_sec_size = u32_at(data, desc_offset + 12)?;
    let dmem_rel = u32_at(data, desc_offset + 16)? as usize;
    let dmem_size = u32_at(data, desc_offset + 20)? as usize;
    let sig_rel = u32_at(data, desc_offset + 24)? as usize;
    let sig_size = u32_at(data, desc_offset + 28)?;
    let boot_vec = u32_at(data, desc_offset + 32)?;
    let data_size = u32_at(data, desc_offset + 36)?;

    let imem_offset = desc_offset + imem_rel;
    let dmem_offset = desc_offset + dmem_rel;
    let sig_offset = desc_offset + sig_rel;

    let in_bounds = |off: usize, len: usize| {
        off.checked_add(len).is_some_and(|end| end <= data.len())
    };
    if !in_bounds(imem_offset, imem_size) {
        return Err(VbiosError::BadDescriptor("IMEM range past end of image"));
    }
    if !in_bounds(dmem_offset, dmem_size) {
        return Err(VbiosError::BadDescriptor("DMEM range past end of image"));
    }
    if !in_bounds(sig_offset, sig_size as usize) {
        return Err(VbiosError::BadDescriptor(
            "signature range past end of image",
        ));
    }

    let stored_size = if stored_size > 0 { stored_size } else { data_size };

    let info = FalconUcodeInfo {
        fw_offset: ucode_offset,
        stored_size,
        imem_offset,
        imem_size,
        imem_sec_size,
        dmem_offset,
        dmem_size,
        sig_offset,
        sig_size,
        boot_vec,
        dmem_mapper_offset: find_dmem_mapper(data, dmem_offset, dmem_size),
    };
    debug!(?info, "FWSEC descriptor decoded");
    Ok(info)
}

/// 4-byte-aligned scan of the DMEM segment for the "DMAP" magic.
fn find_dmem_mapper(data: &[u8], dmem_offset: usize, dmem_size: usize) -> Option<usize> {
    let dmem = data.get(dmem_offset..dmem_offset + dmem_size)?;
    (0..dmem.len().saturating_sub(4))
        .step_by(4)
        .find(|&off| u32::from_le_bytes(dmem[off..off + 4].try_into().unwrap()) == DMEM_MAPPER_MAGIC)
}
