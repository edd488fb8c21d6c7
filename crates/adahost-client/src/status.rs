//! Register snapshot for diagnostics.

use adahost_hal::Hal;
use adahost_regs as regs;

/// Raw register values a diagnosing caller wants in one read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpuStatus {
    pub pmc_boot0: u32,
    /// Raw `WPR2_ADDR_LO` register value.
    pub wpr2_lo: u32,
    /// Raw `WPR2_ADDR_HI` register value.
    pub wpr2_hi: u32,
    pub wpr2_enabled: bool,
    pub gsp_riscv_cpuctl: u32,
    pub sec2_riscv_cpuctl: u32,
    pub gsp_mailbox0: u32,
    pub gsp_mailbox1: u32,
    /// `PGC6_BSI_SECURE_SCRATCH_14`, the boot-stage scratch.
    pub boot_scratch: u32,
}

pub(crate) fn snapshot(hal: &mut dyn Hal) -> GpuStatus {
    let wpr2_hi = hal.read32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_HI);
    GpuStatus {
        pmc_boot0: hal.read32(regs::NV_PMC_BOOT_0),
        wpr2_lo: hal.read32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_LO),
        wpr2_hi,
        wpr2_enabled: wpr2_hi & regs::WPR2_ADDR_HI_ENABLED != 0,
        gsp_riscv_cpuctl: hal.read32(regs::FALCON_GSP_BASE + regs::RISCV_CPUCTL),
        sec2_riscv_cpuctl: hal.read32(regs::FALCON_SEC2_BASE + regs::RISCV_CPUCTL),
        gsp_mailbox0: hal.read32(regs::FALCON_GSP_BASE + regs::FALCON_MAILBOX0),
        gsp_mailbox1: hal.read32(regs::FALCON_GSP_BASE + regs::FALCON_MAILBOX1),
        boot_scratch: hal.read32(regs::NV_PGC6_BSI_SECURE_SCRATCH_14),
    }
}
