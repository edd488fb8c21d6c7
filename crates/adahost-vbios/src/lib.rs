//! VBIOS parser for the Ada Lovelace bring-up engine.
//!
//! Walks a raw VBIOS image down to the FWSEC microcode the secure bring-up
//! needs: ROM signature scan and PCIR image chain, BIT header and token
//! list, PMU lookup table (token 0x50 on Ada, token 0x70 before, brute-force
//! scan as a last resort), optional NVFW binary header, Falcon ucode
//! descriptor V3 and the "DMAP" mapper block inside the DMEM segment.
//!
//! The on-wire layouts are part of the contract, so every field access is a
//! bounded little-endian read over the buffer rather than a struct cast.
//! All failures are structural: the caller treats them as "no FWSEC in this
//! image" and decides whether the boot can proceed without it.

mod bit;
mod fwsec;
mod pmu;
mod rom;
mod view;

pub use rom::RomImage;

use thiserror::Error;
use tracing::{debug, warn};

pub type Result<T> = std::result::Result<T, VbiosError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VbiosError {
    #[error("read of {len} bytes at {offset:#x} runs past the image ({image_len:#x} bytes)")]
    Truncated {
        offset: usize,
        len: usize,
        image_len: usize,
    },

    #[error("no 0x55AA ROM signature at any 512-byte boundary")]
    NoRomSignature,

    #[error("BIT header not found")]
    NoBitHeader,

    #[error("no PMU lookup table reachable from the BIT tokens or by scan")]
    NoPmuTable,

    #[error("PMU lookup table has no usable FWSEC entry")]
    NoFwsecEntry,

    #[error("falcon ucode descriptor is invalid: {0}")]
    BadDescriptor(&'static str),
}

/// Result of a successful parse: where FWSEC lives inside the VBIOS image.
///
/// All offsets are absolute within the parsed image except
/// `dmem_mapper_offset`, which is relative to `dmem_offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FalconUcodeInfo {
    /// Start of the FWSEC blob; DMA loading starts here.
    pub fw_offset: usize,
    /// Stored byte size of the blob, from the NVFW binary header when
    /// present, otherwise from the descriptor.
    pub stored_size: u32,
    pub imem_offset: usize,
    pub imem_size: usize,
    pub imem_sec_size: u32,
    pub dmem_offset: usize,
    pub dmem_size: usize,
    pub sig_offset: usize,
    pub sig_size: u32,
    pub boot_vec: u32,
    /// Offset of the "DMAP" interface block within the DMEM segment, when
    /// one was found.
    pub dmem_mapper_offset: Option<usize>,
}

/// Parses `data` and extracts the FWSEC ucode descriptor.
///
/// Any structural defect (missing signature, unreachable table, offsets
/// outside the buffer) is reported as an error; none of them are fatal to
/// the caller, which may assume WPR2 was pre-configured by firmware POST.
pub fn extract_fwsec(data: &[u8]) -> Result<FalconUcodeInfo> {
    let scan = rom::scan_images(data)?;
    debug!(
        images = scan.images.len(),
        fwsec_start = ?scan.fwsec_start,
        "vbios image chain walked"
    );

    let bit_offset = bit::find(data).ok_or(VbiosError::NoBitHeader)?;
    let image_base = scan
        .images
        .iter()
        .filter(|img| img.offset <= bit_offset)
        .map(|img| img.offset)
        .next_back()
        .unwrap_or(scan.rom_base);
    debug!(bit_offset, image_base, "BIT header located");

    let tokens = bit::tokens(data, bit_offset)?;
    let table = pmu::resolve_table(data, image_base, &tokens)?;
    debug!(
        offset = table.offset,
        entries = table.entry_count,
        ada = table.is_ada_layout(),
        "PMU lookup table resolved"
    );

    let entry = pmu::find_fwsec_entry(data, &table)?;
    let mut ucode_offset = entry.data_offset as usize;
    if let Some(fwsec_start) = scan.fwsec_start {
        // Offsets inside a dedicated FWSEC ROM image are relative to it.
        if ucode_offset < fwsec_start {
            ucode_offset += fwsec_start;
        }
    }
    debug!(app_id = entry.app_id, ucode_offset, "FWSEC entry matched");

    let info = fwsec::extract(data, ucode_offset)?;
    if info.dmem_mapper_offset.is_none() {
        warn!("no DMAP block in FWSEC DMEM; the PIO strategy cannot patch a command");
    }
    Ok(info)
}
