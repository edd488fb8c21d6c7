//! PMU lookup table resolution and entry matching.

use crate::bit::{BitToken, TOKEN_FALCON_DATA, TOKEN_PMU_TABLE};
use crate::view::{u16_at, u32_at, u8_at};
use crate::{Result, VbiosError};
use tracing::debug;

/// FWSEC production application id.
const APP_ID_FWSEC_PROD: u16 = 0x85;
/// Probed as a last resort when no FWSEC entry exists.
const APP_ID_DEVINIT: u16 = 0x01;

/// The 6-byte Ada table signature: version 1, header size 6, entry size 6.
const ADA_VERSION: u8 = 1;
const ADA_HEADER_SIZE: u8 = 6;
const ADA_ENTRY_SIZE: u8 = 6;

/// Brute-force scan floor; PMU tables live in the upper part of the image.
const SCAN_FLOOR: usize = 0x9000;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PmuTable {
    pub offset: usize,
    pub header_size: u8,
    pub entry_size: u8,
    pub entry_count: u8,
}

impl PmuTable {
    /// The Ada 6/6 layout stores a 16-bit application id; anything else is
    /// the legacy 1-byte-appId + 1-byte-targetId layout.
    pub fn is_ada_layout(&self) -> bool {
        self.header_size == ADA_HEADER_SIZE && self.entry_size == ADA_ENTRY_SIZE
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PmuEntry {
    pub app_id: u16,
    pub data_offset: u32,
}

fn table_at(data: &[u8], offset: usize) -> Option<PmuTable> {
    if offset + 6 > data.len() {
        return None;
    }
    let table = PmuTable {
        offset,
        header_size: data[offset + 1],
        entry_size: data[offset + 2],
        entry_count: data[offset + 3],
    };
    let ada_signature = data[offset] == ADA_VERSION
        && table.header_size == ADA_HEADER_SIZE
        && table.entry_size == ADA_ENTRY_SIZE
        && (1..=32).contains(&table.entry_count);
    ada_signature.then_some(table)
}

fn plausible_table_at(data: &[u8], offset: usize) -> Option<PmuTable> {
    if let Some(table) = table_at(data, offset) {
        return Some(table);
    }
    if offset + 6 > data.len() {
        return None;
    }
    let table = PmuTable {
        offset,
        header_size: data[offset + 1],
        entry_size: data[offset + 2],
        entry_count: data[offset + 3],
    };
    let plausible = data[offset] <= 10
        && (1..=32).contains(&table.entry_count)
        && (6..=32).contains(&table.entry_size)
        && table.header_size >= 4;
    plausible.then_some(table)
}

fn entry_at(data: &[u8], table: &PmuTable, index: usize) -> Result<PmuEntry> {
    let offset = table.offset + table.header_size as usize + index * table.entry_size as usize;
    if table.is_ada_layout() {
        Ok(PmuEntry {
            app_id: u16_at(data, offset)?,
            data_offset: u32_at(data, offset + 2)?,
        })
    } else {
        Ok(PmuEntry {
            app_id: u8_at(data, offset)? as u16,
            data_offset: u32_at(data, offset + 2)?,
        })
    }
}

fn entries(data: &[u8], table: &PmuTable) -> Vec<PmuEntry> {
    (0..table.entry_count as usize)
        .map_while(|i| entry_at(data, table, i).ok())
        .collect()
}

fn has_fwsec_entry(data: &[u8], table: &PmuTable) -> bool {
    entries(data, table)
        .iter()
        .any(|e| e.app_id == APP_ID_FWSEC_PROD)
}

/// Resolves the PMU lookup table: token 0x50 candidates first (Ada), then
/// the token 0x70 pointer (pre-Ada), then a brute-force scan from 0x9000.
pub(crate) fn resolve_table(
    data: &[u8],
    image_base: usize,
    tokens: &[BitToken],
) -> Result<PmuTable> {
    if let Some(token) = tokens.iter().find(|t| t.id == TOKEN_PMU_TABLE) {
        let candidates_at = image_base + token.data_offset as usize;
        let count = (token.data_size as usize / 4).min(64);
        for i in 0..count {
            let Ok(candidate) = u32_at(data, candidates_at + i * 4) else {
                break;
            };
            if candidate == 0 {
                continue;
            }
            if let Some(table) = table_at(data, candidate as usize) {
                debug!(candidate, index = i, "PMU table via token 0x50");
                return Ok(table);
            }
        }
        debug!("token 0x50 candidates held no PMU table");
    }

    if let Some(token) = tokens.iter().find(|t| t.id == TOKEN_FALCON_DATA) {
        let table_ptr = u32_at(data, image_base + token.data_offset as usize)?;
        let offset = image_base + table_ptr as usize;
        if let Some(table) = plausible_table_at(data, offset) {
            debug!(offset, "PMU table via token 0x70");
            return Ok(table);
        }
        debug!(offset, "token 0x70 table pointer implausible");
    }

    // Last resort: search for the Ada signature with a live FWSEC entry.
    let mut offset = SCAN_FLOOR;
    while offset + 0x100 <= data.len() {
        if let Some(table) = table_at(data, offset) {
            if has_fwsec_entry(data, &table) {
                debug!(offset, "PMU table via brute-force scan");
                return Ok(table);
            }
        }
        offset += 4;
    }

    Err(VbiosError::NoPmuTable)
}

/// Finds the FWSEC entry (application id 0x85/0x0085), probing 0x01 as a
/// last resort.
pub(crate) fn find_fwsec_entry(data: &[u8], table: &PmuTable) -> Result<PmuEntry> {
    let entries = entries(data, table);
    entries
        .iter()
        .find(|e| e.app_id == APP_ID_FWSEC_PROD)
        .or_else(|| entries.iter().find(|e| e.app_id == APP_ID_DEVINIT))
        .copied()
        .ok_or(VbiosError::NoFwsecEntry)
}
