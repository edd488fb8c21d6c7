use adahost_falcon::{FalconEngine, FalconError, Riscv};
use adahost_hal::Hal;
use adahost_regs as regs;
use adahost_sim::{BromBehavior, SimGpu};
use pretty_assertions::assert_eq;

const GSP: u32 = regs::FALCON_GSP_BASE;

#[test]
fn boot_rom_execute_publishes_the_image_and_returns_zero() {
    let mut sim = SimGpu::new();
    sim.behavior.brom = BromBehavior::CarveWpr2;
    let riscv = Riscv::new(FalconEngine::Gsp);

    let mem = sim.sysmem();
    let fw = mem.alloc_contiguous(0x2000).unwrap();
    let retcode = riscv
        .boot_rom_execute(&mut sim, fw.phys(), 5000, 1000)
        .unwrap();
    assert_eq!(retcode, 0);

    // The image address is published right-shifted by 8 before VALID.
    let log = sim.write_log();
    let addr_pos = log
        .iter()
        .position(|e| *e == (GSP + regs::RISCV_BCR_DMEM_ADDR, (fw.phys() >> 8) as u32))
        .unwrap();
    let valid_pos = log
        .iter()
        .position(|e| *e == (GSP + regs::RISCV_BCR_CTRL, regs::RISCV_BCR_CTRL_VALID))
        .unwrap();
    assert!(addr_pos < valid_pos);
}

#[test]
fn boot_rom_failure_surfaces_the_return_code() {
    let mut sim = SimGpu::new();
    sim.behavior.brom = BromBehavior::Fail(0xdead_0001);
    let riscv = Riscv::new(FalconEngine::Gsp);

    let mem = sim.sysmem();
    let fw = mem.alloc_contiguous(0x1000).unwrap();
    let retcode = riscv
        .boot_rom_execute(&mut sim, fw.phys(), 100, 1000)
        .unwrap();
    assert_eq!(retcode, 0xdead_0001);
}

#[test]
fn boot_rom_timeout_when_it_never_halts() {
    let mut sim = SimGpu::new();
    sim.behavior.brom = BromBehavior::Unresponsive;
    let riscv = Riscv::new(FalconEngine::Gsp);

    let mem = sim.sysmem();
    let fw = mem.alloc_contiguous(0x1000).unwrap();
    let err = riscv
        .boot_rom_execute(&mut sim, fw.phys(), 10, 1000)
        .unwrap_err();
    assert!(matches!(err, FalconError::BootRomTimeout { .. }));
}

#[test]
fn start_programs_bcr_then_cpuctl_and_sees_active() {
    let mut sim = SimGpu::new();
    let riscv = Riscv::new(FalconEngine::Gsp);

    riscv.start(&mut sim, 0x12_3456_7800).unwrap();
    assert!(riscv.is_active(&mut sim));

    let bcr_addr = (0x12_3456_7800u64 >> 8) as u32;
    let log = sim.write_log();
    assert!(log.contains(&(GSP + regs::RISCV_BCR_DMEM_ADDR, bcr_addr)));
    assert!(log.contains(&(
        GSP + regs::RISCV_BCR_CTRL,
        regs::RISCV_BCR_CTRL_VALID | bcr_addr
    )));
    let start_pos = log
        .iter()
        .position(|e| *e == (GSP + regs::RISCV_CPUCTL, regs::RISCV_CPUCTL_STARTCPU))
        .unwrap();
    let bcr_pos = log
        .iter()
        .position(|(r, _)| *r == GSP + regs::RISCV_BCR_CTRL)
        .unwrap();
    assert!(bcr_pos < start_pos);
}

#[test]
fn core_select_is_acknowledged_by_the_valid_bit() {
    let mut sim = SimGpu::new();
    let riscv = Riscv::new(FalconEngine::Gsp);

    riscv.select_falcon_core(&mut sim).unwrap();

    let bcr = sim.read32(GSP + regs::RISCV_BCR_CTRL);
    assert_ne!(bcr & regs::RISCV_BCR_CTRL_CORE_SELECT_FALCON, 0);
    assert_ne!(bcr & regs::RISCV_BCR_CTRL_VALID, 0);
}

#[test]
fn start_times_out_within_its_100ms_budget() {
    let mut sim = SimGpu::new();
    sim.behavior.riscv_starts = false;
    let riscv = Riscv::new(FalconEngine::Gsp);

    let err = riscv.start(&mut sim, 0x1000).unwrap_err();
    match err {
        FalconError::RiscvStart { cpuctl, retcode, .. } => {
            assert_eq!(cpuctl & regs::RISCV_CPUCTL_ACTIVE, 0);
            assert_eq!(retcode, regs::RISCV_BR_RETCODE_BUSY);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(sim.elapsed_us(), 100 * 1000);
}
