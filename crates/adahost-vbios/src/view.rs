//! Bounded little-endian field reads over the VBIOS buffer.

use crate::{Result, VbiosError};

fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(VbiosError::Truncated {
            offset,
            len,
            image_len: data.len(),
        })
}

pub(crate) fn u8_at(data: &[u8], offset: usize) -> Result<u8> {
    Ok(slice_at(data, offset, 1)?[0])
}

pub(crate) fn u16_at(data: &[u8], offset: usize) -> Result<u16> {
    let b = slice_at(data, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub(crate) fn u32_at(data: &[u8], offset: usize) -> Result<u32> {
    let b = slice_at(data, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}
