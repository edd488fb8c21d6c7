//! Register catalog for the Ada Lovelace (AD10x) bring-up engine.
//!
//! Symbolic BAR0 byte offsets and bitfields for the register blocks the
//! bring-up sequence programs: PMC, PFB, PBUS/PGC6 scratch, the GSP and SEC2
//! Falcon blocks (including the RISC-V boot-config window that lives inside
//! each Falcon's 4 KiB aperture), and the GSP message-queue pointers.
//!
//! Protocol-level constants (vGPU RPC function ids, RM class ids) live in
//! [`proto`] so the transport and Resource-Manager layers share one source of
//! truth with the register consumers.

pub mod proto;

// PMC (master control).
pub const NV_PMC_BOOT_0: u32 = 0x000000;

pub const PMC_BOOT_0_ARCH_SHIFT: u32 = 20;
pub const PMC_BOOT_0_ARCH_MASK: u32 = 0x1f;
/// Ada Lovelace architecture id in `PMC_BOOT_0`.
pub const ARCH_ADA: u32 = 0x19;

/// Architecture field of a `PMC_BOOT_0` value.
pub const fn pmc_boot0_arch(boot0: u32) -> u32 {
    (boot0 >> PMC_BOOT_0_ARCH_SHIFT) & PMC_BOOT_0_ARCH_MASK
}

// PBUS scratch. FWSEC-FRTS leaves its error code here.
pub const NV_PBUS_SW_SCRATCH_0E: u32 = 0x001454;

// PGC6 scratch.
pub const NV_PGC6_BSI_SECURE_SCRATCH_14: u32 = 0x0011_80f8;
/// GFW (on-die firmware) boot progress register.
pub const NV_PGC6_AON_SECURE_SCRATCH_GROUP_05_0: u32 = 0x0011_8234;
pub const GFW_BOOT_PROGRESS_COMPLETED: u32 = 0xff;

// PFB WPR2 (write-protected region 2) bounds, programmed by FWSEC-FRTS.
pub const NV_PFB_PRI_MMU_WPR2_ADDR_LO: u32 = 0x1f_a824;
pub const NV_PFB_PRI_MMU_WPR2_ADDR_HI: u32 = 0x1f_a828;
/// WPR2 is active when this bit is set in `WPR2_ADDR_HI`.
pub const WPR2_ADDR_HI_ENABLED: u32 = 1 << 31;

// VBIOS ROM aperture inside BAR0.
pub const VBIOS_ROM_OFFSET: u32 = 0x30_0000;
pub const VBIOS_ROM_MAX_SIZE: usize = 0x10_0000;

// Falcon engine bases.
pub const FALCON_GSP_BASE: u32 = 0x11_0000;
pub const FALCON_SEC2_BASE: u32 = 0x84_0000;

// Classic Falcon register offsets, relative to the engine base.
pub const FALCON_MAILBOX0: u32 = 0x040;
pub const FALCON_MAILBOX1: u32 = 0x044;
pub const FALCON_ITFEN: u32 = 0x048;
pub const FALCON_CPUCTL: u32 = 0x100;
pub const FALCON_BOOTVEC: u32 = 0x104;
pub const FALCON_HWCFG: u32 = 0x108;
pub const FALCON_DMACTL: u32 = 0x10c;
pub const FALCON_DMATRFBASE: u32 = 0x110;
pub const FALCON_DMATRFMOFFS: u32 = 0x114;
pub const FALCON_DMATRFFBOFFS: u32 = 0x118;
pub const FALCON_DMATRFCMD: u32 = 0x11c;
pub const FALCON_DMATRFBASE1: u32 = 0x128;
pub const FALCON_HWCFG1: u32 = 0x12c;
pub const FALCON_HWCFG2: u32 = 0xf98;

pub const fn falcon_imemc(port: u32) -> u32 {
    0x180 + port * 16
}
pub const fn falcon_imemd(port: u32) -> u32 {
    0x184 + port * 16
}
pub const fn falcon_dmemc(port: u32) -> u32 {
    0x1c0 + port * 8
}
pub const fn falcon_dmemd(port: u32) -> u32 {
    0x1c4 + port * 8
}

// FBIF (framebuffer interface), relative to the engine base.
pub const fn falcon_fbif_transcfg(slot: u32) -> u32 {
    0x600 + slot * 4
}
pub const FALCON_FBIF_CTL: u32 = 0x624;

// CPUCTL bits.
pub const FALCON_CPUCTL_STARTCPU: u32 = 1 << 1;
pub const FALCON_CPUCTL_HALTED: u32 = 1 << 4;
pub const FALCON_CPUCTL_STOPPED: u32 = 1 << 5;

// ITFEN bits.
pub const FALCON_ITFEN_DTFEN: u32 = 1 << 2;

// HWCFG2 bits.
pub const FALCON_HWCFG2_RISCV: u32 = 1 << 0;
pub const FALCON_HWCFG2_MEM_SCRUBBING: u32 = 1 << 5;

// IMEMC/DMEMC bits. The block index occupies bits 8.. and auto-increment on
// write is bit 24.
pub const FALCON_MEMC_BLK_SHIFT: u32 = 8;
pub const FALCON_MEMC_AINCW: u32 = 1 << 24;
pub const FALCON_MEMC_AINCR: u32 = 1 << 25;

// DMATRFCMD bits.
pub const FALCON_DMATRFCMD_IDLE: u32 = 1 << 1;
pub const FALCON_DMATRFCMD_SEC: u32 = 1 << 2;
pub const FALCON_DMATRFCMD_IMEM: u32 = 1 << 4;
/// 256-byte transfer size encoding in the command's size field.
pub const FALCON_DMATRFCMD_SIZE_256B: u32 = 6 << 8;

// FBIF values.
pub const FALCON_FBIF_TRANSCFG_TARGET_NONCOHERENT: u32 = 0x5;
pub const FALCON_FBIF_CTL_ALLOW_PHYS: u32 = 1 << 6;
pub const FALCON_FBIF_CTL_ALLOW_PHYS_NO_CTX: u32 = 1 << 7;

// DMA granularity of the Falcon transfer engine.
pub const FALCON_DMA_BLOCK_SIZE: usize = 256;

// RISC-V boot-config window, relative to the owning Falcon's base.
pub const RISCV_CPUCTL: u32 = 0x388;
pub const RISCV_BR_RETCODE: u32 = 0x65c;
pub const RISCV_BCR_CTRL: u32 = 0x668;
pub const RISCV_BCR_DMEM_ADDR: u32 = 0x674;

pub const RISCV_CPUCTL_STARTCPU: u32 = 1 << 1;
pub const RISCV_CPUCTL_HALTED: u32 = 1 << 4;
pub const RISCV_CPUCTL_ACTIVE: u32 = 1 << 5;

pub const RISCV_BCR_CTRL_VALID: u32 = 1 << 0;
/// Routes the engine's boot path through the classic Falcon core.
pub const RISCV_BCR_CTRL_CORE_SELECT_FALCON: u32 = 1 << 4;

/// Boot ROM "still in progress" return code; any other non-zero value is an
/// error.
pub const RISCV_BR_RETCODE_BUSY: u32 = 0xbadf_5040;

// GSP message-queue hardware pointers (absolute BAR0 offsets).
pub const fn pgsp_queue_head(index: u32) -> u32 {
    0x11_0c00 + index * 8
}
pub const fn pgsp_queue_tail(index: u32) -> u32 {
    0x11_0c80 + index * 8
}

/// Command queue (host to GSP) index.
pub const GSP_CMDQ_INDEX: u32 = 0;
/// Status queue (GSP to host) index.
pub const GSP_MSGQ_INDEX: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_register_helpers() {
        assert_eq!(falcon_imemc(0), 0x180);
        assert_eq!(falcon_imemd(0), 0x184);
        assert_eq!(falcon_imemc(1), 0x190);
        assert_eq!(falcon_dmemc(0), 0x1c0);
        assert_eq!(falcon_dmemd(1), 0x1cc);
        assert_eq!(falcon_fbif_transcfg(1), 0x604);
        assert_eq!(pgsp_queue_head(0), 0x110c00);
        assert_eq!(pgsp_queue_tail(1), 0x110c88);
    }

    #[test]
    fn pmc_boot0_arch_field() {
        assert_eq!(pmc_boot0_arch(ARCH_ADA << PMC_BOOT_0_ARCH_SHIFT), ARCH_ADA);
        assert_eq!(pmc_boot0_arch(0x019000a1), 0x19);
        assert_eq!(pmc_boot0_arch(0x006000b2), 0x06);
    }
}
