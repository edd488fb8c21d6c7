use adahost_hal::Hal;
use adahost_regs as regs;
use adahost_sim::{BromBehavior, SimGpu};
use pretty_assertions::assert_eq;

const GSP: u32 = regs::FALCON_GSP_BASE;

#[test]
fn imem_port_captures_words_with_auto_increment() {
    let mut sim = SimGpu::new();

    sim.write32(
        GSP + regs::falcon_imemc(0),
        (1 << regs::FALCON_MEMC_BLK_SHIFT) | regs::FALCON_MEMC_AINCW,
    );
    sim.write32(GSP + regs::falcon_imemd(0), 0x0403_0201);
    sim.write32(GSP + regs::falcon_imemd(0), 0x0807_0605);

    assert_eq!(sim.gsp_imem(0x100..0x108), [1, 2, 3, 4, 5, 6, 7, 8]);
}

#[test]
fn dma_transfer_copies_a_block_from_sysmem() {
    let mut sim = SimGpu::new();
    let mem = sim.sysmem();
    let mut src = mem.alloc_contiguous(0x1000).unwrap();
    let pattern: Vec<u8> = (0..=255).collect();
    src.write(0x100, &pattern).unwrap();

    let phys = src.phys();
    sim.write32(GSP + regs::FALCON_DMATRFBASE, (phys >> 8) as u32);
    sim.write32(GSP + regs::FALCON_DMATRFBASE1, (phys >> 40) as u32);
    sim.write32(GSP + regs::FALCON_DMATRFMOFFS, 0x400);
    sim.write32(GSP + regs::FALCON_DMATRFFBOFFS, 0x100);
    sim.write32(
        GSP + regs::FALCON_DMATRFCMD,
        regs::FALCON_DMATRFCMD_IMEM | regs::FALCON_DMATRFCMD_SIZE_256B,
    );

    let cmd = sim.read32(GSP + regs::FALCON_DMATRFCMD);
    assert_ne!(cmd & regs::FALCON_DMATRFCMD_IDLE, 0);
    assert_eq!(sim.gsp_imem(0x400..0x500), &pattern[..]);
}

#[test]
fn brom_trigger_carves_wpr2_when_image_is_reachable() {
    let mut sim = SimGpu::new();
    sim.behavior.brom = BromBehavior::CarveWpr2;
    let mem = sim.sysmem();
    let fw = mem.alloc_contiguous(0x1000).unwrap();

    sim.write32(GSP + regs::RISCV_BCR_DMEM_ADDR, (fw.phys() >> 8) as u32);
    sim.write32(GSP + regs::RISCV_BCR_CTRL, regs::RISCV_BCR_CTRL_VALID);

    assert_ne!(
        sim.read32(GSP + regs::RISCV_CPUCTL) & regs::RISCV_CPUCTL_HALTED,
        0
    );
    assert_eq!(sim.read32(GSP + regs::RISCV_BR_RETCODE), 0);
    assert_ne!(
        sim.read32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_HI) & regs::WPR2_ADDR_HI_ENABLED,
        0
    );
}

#[test]
fn brom_rejects_a_dangling_image_address() {
    let mut sim = SimGpu::new();
    sim.behavior.brom = BromBehavior::CarveWpr2;

    sim.write32(GSP + regs::RISCV_BCR_DMEM_ADDR, 0x1234);
    sim.write32(GSP + regs::RISCV_BCR_CTRL, regs::RISCV_BCR_CTRL_VALID);

    assert_ne!(sim.read32(GSP + regs::RISCV_BR_RETCODE), 0);
    assert_eq!(sim.read32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_HI), 0);
}

#[test]
fn mailbox_reports_init_done_after_active_start() {
    let mut sim = SimGpu::new();
    sim.behavior.init_done_after_reads = Some(2);

    sim.write32(GSP + regs::RISCV_CPUCTL, regs::RISCV_CPUCTL_STARTCPU);
    assert_ne!(
        sim.read32(GSP + regs::RISCV_CPUCTL) & regs::RISCV_CPUCTL_ACTIVE,
        0
    );

    assert_eq!(sim.read32(GSP + regs::FALCON_MAILBOX0), 0);
    assert_eq!(sim.read32(GSP + regs::FALCON_MAILBOX0), 0);
    assert_eq!(
        sim.read32(GSP + regs::FALCON_MAILBOX0),
        regs::proto::MSG_EVENT_GSP_INIT_DONE
    );
}

#[test]
fn rom_aperture_returns_little_endian_words() {
    let mut sim = SimGpu::new();
    sim.set_rom(vec![0x55, 0xaa, 0x12, 0x34, 0x56]);

    assert_eq!(sim.read32(regs::VBIOS_ROM_OFFSET), 0x3412_aa55);
    // Reads past the image tail are zero-padded.
    assert_eq!(sim.read32(regs::VBIOS_ROM_OFFSET + 4), 0x0000_0056);
}
