//! Minimal ELF64 walk to locate the `.fwimage` section of the GSP-RM
//! firmware bundle.

use crate::{GspError, Result};

/// Section name carrying the bootable firmware image.
const FW_IMAGE_SECTION: &str = ".fwimage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwImageSection {
    pub offset: usize,
    pub size: usize,
}

fn u16_at(data: &[u8], off: usize) -> Option<u16> {
    Some(u16::from_le_bytes(data.get(off..off + 2)?.try_into().ok()?))
}

fn u32_at(data: &[u8], off: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(off..off + 4)?.try_into().ok()?))
}

fn u64_at(data: &[u8], off: usize) -> Option<u64> {
    Some(u64::from_le_bytes(data.get(off..off + 8)?.try_into().ok()?))
}

/// Validates the ELF identity and walks the section headers for
/// `.fwimage`.
pub fn find_fwimage(data: &[u8]) -> Result<FwImageSection> {
    if data.len() < 64 || &data[0..4] != b"\x7fELF" {
        return Err(GspError::BadFirmware("not an ELF image"));
    }
    if data[4] != 2 {
        return Err(GspError::BadFirmware("not a 64-bit ELF"));
    }
    if data[5] != 1 {
        return Err(GspError::BadFirmware("not little-endian"));
    }

    let bad = || GspError::BadFirmware("bad section header table");
    let sh_off = u64_at(data, 0x28).ok_or_else(bad)? as usize;
    let sh_entsize = u16_at(data, 0x3a).ok_or_else(bad)? as usize;
    let sh_num = u16_at(data, 0x3c).ok_or_else(bad)? as usize;
    let sh_strndx = u16_at(data, 0x3e).ok_or_else(bad)? as usize;
    if sh_entsize < 0x40 || sh_strndx >= sh_num {
        return Err(bad());
    }
    let table_end = sh_num
        .checked_mul(sh_entsize)
        .and_then(|len| sh_off.checked_add(len))
        .ok_or_else(bad)?;
    if table_end > data.len() {
        return Err(GspError::BadFirmware("section headers past end of file"));
    }

    let shdr = |i: usize| sh_off + i * sh_entsize;
    let strtab_off = u64_at(data, shdr(sh_strndx) + 0x18).ok_or_else(bad)? as usize;
    let strtab_size = u64_at(data, shdr(sh_strndx) + 0x20).ok_or_else(bad)? as usize;
    let strtab = data
        .get(strtab_off..strtab_off.saturating_add(strtab_size))
        .ok_or(GspError::BadFirmware("string table past end of file"))?;

    for i in 0..sh_num {
        let name_idx = u32_at(data, shdr(i)).ok_or_else(bad)? as usize;
        let name = strtab
            .get(name_idx..)
            .and_then(|s| s.split(|&b| b == 0).next())
            .unwrap_or(&[]);
        if name == FW_IMAGE_SECTION.as_bytes() {
            let offset = u64_at(data, shdr(i) + 0x18).ok_or_else(bad)? as usize;
            let size = u64_at(data, shdr(i) + 0x20).ok_or_else(bad)? as usize;
            if offset
                .checked_add(size)
                .map_or(true, |end| end > data.len())
            {
                return Err(GspError::BadFirmware("firmware section past end of file"));
            }
            if size == 0 {
                return Err(GspError::BadFirmware("empty firmware section"));
            }
            return Ok(FwImageSection { offset, size });
        }
    }
    Err(GspError::BadFirmware("no .fwimage section"))
}
