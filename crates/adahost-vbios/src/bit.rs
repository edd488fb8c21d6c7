//! BIT (BIOS Information Table) header and token enumeration.

use crate::view::{u16_at, u8_at};
use crate::Result;

/// Token id carrying raw PMU-table candidate offsets on Ada.
pub(crate) const TOKEN_PMU_TABLE: u8 = 0x50;
/// Token id of the pre-Ada Falcon ucode table pointer.
pub(crate) const TOKEN_FALCON_DATA: u8 = 0x70;

const BIT_PATTERN: [u8; 6] = [0xff, 0xb8, b'B', b'I', b'T', 0x00];

#[derive(Debug, Clone, Copy)]
pub(crate) struct BitToken {
    pub id: u8,
    pub data_size: u16,
    /// Relative to the base of the ROM image containing the BIT header.
    pub data_offset: u16,
}

/// Byte-scans for the BIT prefix pattern.
pub(crate) fn find(data: &[u8]) -> Option<usize> {
    data.windows(BIT_PATTERN.len())
        .position(|w| w == BIT_PATTERN)
}

/// Enumerates the token list following the BIT header at `bit_offset`.
pub(crate) fn tokens(data: &[u8], bit_offset: usize) -> Result<Vec<BitToken>> {
    let header_size = u8_at(data, bit_offset + 8)? as usize;
    let token_size = u8_at(data, bit_offset + 9)? as usize;
    let token_count = u8_at(data, bit_offset + 10)? as usize;

    let mut out = Vec::with_capacity(token_count);
    let mut offset = bit_offset + header_size;
    for _ in 0..token_count {
        if offset + token_size > data.len() || token_size < 6 {
            break;
        }
        out.push(BitToken {
            id: u8_at(data, offset)?,
            data_size: u16_at(data, offset + 2)?,
            data_offset: u16_at(data, offset + 4)?,
        });
        offset += token_size;
    }
    Ok(out)
}
