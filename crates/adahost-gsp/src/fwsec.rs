//! FWSEC-FRTS secure bring-up: carving WPR2 from the top of VRAM.
//!
//! Three strategies share one attempt contract (reset, load, start, verify)
//! and run as a priority list:
//!
//! 1. Boot ROM Heavy-Secure execution of the signed image (the production
//!    path; the only one that passes signature verification).
//! 2. DMA loading of the image followed by a plain start.
//! 3. Pure PIO loading with the DMEM "DMAP" mapper patched to carry the
//!    FRTS command. This bypasses the Boot ROM entirely and fails
//!    signature checks on production parts; it exists for diagnostics.
//!
//! No persistent engine state is assumed between strategies; each begins
//! with a Falcon reset.

use adahost_falcon::{Falcon, FalconEngine, Riscv};
use adahost_hal::Hal;
use adahost_regs as regs;
use tracing::{debug, info, warn};

use crate::{Gsp, Result};

/// FRTS command id written into the DMEM mapper.
const DMEM_MAPPER_CMD_FRTS: u32 = 0x15;
/// The command word sits this far past the "DMAP" magic.
const DMEM_MAPPER_CMD_OFFSET: usize = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    BootRom,
    DmaLoad,
    PatchedPio,
}

impl Gsp {
    /// Reads the WPR2 registers; when the enabled bit is set, composes and
    /// stores the region bounds.
    ///
    /// A zero `WPR2_ADDR_HI` always reads as "not configured", whatever the
    /// LO register holds.
    pub fn check_wpr2(&mut self, hal: &mut dyn Hal) -> bool {
        let hi = hal.read32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_HI);
        if hi & regs::WPR2_ADDR_HI_ENABLED == 0 {
            return false;
        }
        let lo = hal.read32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_LO);
        self.wpr2_hi = (((hi & 0xf_ffff) as u64) << 32) | (lo & 0xfff0_0000) as u64;
        self.wpr2_lo = ((lo & 0xf_ffff) as u64) << 12;
        info!(
            lo = format_args!("{:#x}", self.wpr2_lo),
            hi = format_args!("{:#x}", self.wpr2_hi),
            "WPR2 active"
        );
        true
    }

    /// Reads the VBIOS out of the BAR0 ROM aperture: 1 MiB of 32-bit reads,
    /// unpacked little-endian.
    pub fn read_vbios_from_bar(&mut self, hal: &mut dyn Hal) -> Result<()> {
        info!("reading VBIOS from BAR0 aperture");
        let mut image = vec![0u8; regs::VBIOS_ROM_MAX_SIZE];
        for (i, word) in image.chunks_exact_mut(4).enumerate() {
            let value = hal.read32(regs::VBIOS_ROM_OFFSET + (i * 4) as u32);
            word.copy_from_slice(&value.to_le_bytes());
        }
        if !image
            .chunks(512)
            .take(128)
            .any(|c| c.len() >= 2 && c[0] == 0x55 && c[1] == 0xaa)
        {
            warn!("no ROM signature in the BAR0 aperture image");
        }
        self.load_vbios(hal, &image)
    }

    /// Stages a VBIOS image: a DMA copy for the hardware paths and a host
    /// shadow for the parser.
    pub fn load_vbios(&mut self, hal: &mut dyn Hal, data: &[u8]) -> Result<()> {
        let mut buf = hal.sysmem().alloc_contiguous(data.len())?;
        buf.copy_from_slice(data)?;
        info!(
            len = data.len(),
            phys = format_args!("{:#x}", buf.phys()),
            "VBIOS staged"
        );
        self.vbios_dma = Some(buf);
        self.vbios_image = Some(data.to_vec());
        self.fwsec_info = None;
        Ok(())
    }

    /// Parses the staged VBIOS; a structural failure leaves `fwsec_info`
    /// unset.
    fn parse_vbios(&mut self) -> bool {
        if self.fwsec_info.is_some() {
            return true;
        }
        let Some(image) = self.vbios_image.as_deref() else {
            return false;
        };
        match adahost_vbios::extract_fwsec(image) {
            Ok(info) => {
                info!(?info, "FWSEC located in VBIOS");
                self.fwsec_info = Some(info);
                true
            }
            Err(e) => {
                warn!("VBIOS holds no usable FWSEC: {e}");
                false
            }
        }
    }

    /// Runs FWSEC-FRTS until WPR2 is established or every strategy is
    /// exhausted. Returns whether WPR2 is up.
    pub fn execute_fwsec_frts(&mut self, hal: &mut dyn Hal) -> Result<bool> {
        if self.check_wpr2(hal) {
            info!("WPR2 already configured by firmware POST");
            return Ok(true);
        }

        if self.vbios_image.is_none() {
            self.read_vbios_from_bar(hal)?;
        }
        if !self.parse_vbios() {
            warn!("cannot run FWSEC without a parsed VBIOS");
            return Ok(false);
        }

        for strategy in [Strategy::BootRom, Strategy::DmaLoad, Strategy::PatchedPio] {
            let attempted = self.attempt_fwsec(hal, strategy)?;
            if !attempted {
                continue;
            }
            let code = hal.read32(regs::NV_PBUS_SW_SCRATCH_0E);
            if code != 0 && code != 0xffff_ffff {
                warn!(code = format_args!("{code:#x}"), "FRTS error reported");
            }
            if self.check_wpr2(hal) {
                info!(?strategy, "WPR2 carved");
                return Ok(true);
            }
            debug!(?strategy, "strategy ran but WPR2 stayed down");
        }
        warn!("all FWSEC strategies exhausted without WPR2");
        Ok(false)
    }

    /// One strategy attempt. `Ok(false)` means the attempt could not run or
    /// timed out; hardware state is left reset for the next strategy.
    fn attempt_fwsec(&mut self, hal: &mut dyn Hal, strategy: Strategy) -> Result<bool> {
        let info = match self.fwsec_info {
            Some(info) => info,
            None => return Ok(false),
        };
        let falcon = Falcon::new(FalconEngine::Gsp);
        falcon.reset(hal);

        match strategy {
            Strategy::BootRom => {
                if info.stored_size == 0 {
                    debug!("no stored size; skipping the Boot ROM strategy");
                    return Ok(false);
                }
                let Some(vbios) = self.vbios_dma.as_ref() else {
                    return Ok(false);
                };
                let fw_phys = vbios.phys() + info.fw_offset as u64;
                let riscv = Riscv::new(FalconEngine::Gsp);
                match riscv.boot_rom_execute(hal, fw_phys, 5000, 1000) {
                    Ok(0) => Ok(true),
                    Ok(code) => {
                        warn!(code = format_args!("{code:#x}"), "Boot ROM rejected FWSEC");
                        Ok(true)
                    }
                    Err(e) => {
                        warn!("Boot ROM did not complete: {e}");
                        Ok(false)
                    }
                }
            }
            Strategy::DmaLoad => {
                let Some(vbios) = self.vbios_dma.as_ref() else {
                    return Ok(false);
                };
                if info.stored_size == 0 {
                    return Ok(false);
                }
                // The classic core runs this path.
                if let Err(e) = Riscv::new(FalconEngine::Gsp).select_falcon_core(hal) {
                    warn!("core select not acknowledged: {e}");
                }
                let fw_phys = vbios.phys() + info.fw_offset as u64;
                falcon.load_dma_imem(hal, fw_phys, info.stored_size as usize)?;
                falcon.boot(hal, info.boot_vec);
                match falcon.wait_halt(hal, 1000, 1000) {
                    Ok(report) => {
                        debug!(iterations = report.iterations, "DMA FWSEC halted");
                        Ok(true)
                    }
                    Err(e) => {
                        warn!("DMA-loaded FWSEC never halted: {e}");
                        Ok(false)
                    }
                }
            }
            Strategy::PatchedPio => {
                let Some(image) = self.vbios_image.as_deref() else {
                    return Ok(false);
                };
                if let Err(e) = Riscv::new(FalconEngine::Gsp).select_falcon_core(hal) {
                    warn!("core select not acknowledged: {e}");
                }
                let imem = &image[info.imem_offset..info.imem_offset + info.imem_size];
                let dmem = &image[info.dmem_offset..info.dmem_offset + info.dmem_size];

                let mut patched = dmem.to_vec();
                match info.dmem_mapper_offset {
                    Some(mapper) if mapper + DMEM_MAPPER_CMD_OFFSET + 4 <= patched.len() => {
                        let at = mapper + DMEM_MAPPER_CMD_OFFSET;
                        let old = u32::from_le_bytes(patched[at..at + 4].try_into().unwrap());
                        patched[at..at + 4]
                            .copy_from_slice(&DMEM_MAPPER_CMD_FRTS.to_le_bytes());
                        debug!(
                            old = format_args!("{old:#x}"),
                            "DMEM mapper patched with the FRTS command"
                        );
                    }
                    _ => warn!("no DMEM mapper; loading DMEM unpatched"),
                }

                falcon.load_imem(hal, imem);
                falcon.load_dmem(hal, &patched);
                falcon.boot(hal, info.boot_vec);
                match falcon.wait_halt(hal, 1000, 1000) {
                    Ok(report) => {
                        debug!(iterations = report.iterations, "PIO FWSEC halted");
                        Ok(true)
                    }
                    Err(e) => {
                        warn!("PIO-loaded FWSEC never halted: {e}");
                        Ok(false)
                    }
                }
            }
        }
    }
}
