use adahost_falcon::{Falcon, FalconEngine};
use adahost_hal::Hal;
use adahost_regs as regs;
use adahost_sim::SimGpu;
use pretty_assertions::assert_eq;

const GSP: u32 = regs::FALCON_GSP_BASE;

#[test]
fn dma_load_programs_the_split_base_and_copies_blocks() {
    let mut sim = SimGpu::new();
    let falcon = Falcon::new(FalconEngine::Gsp);

    let mem = sim.sysmem();
    let mut fw = mem.alloc_contiguous(0x400).unwrap();
    let blob: Vec<u8> = (0..0x400u32).map(|i| (i % 251) as u8).collect();
    fw.copy_from_slice(&blob).unwrap();
    let phys = fw.phys();

    falcon.load_dma_imem(&mut sim, phys, blob.len()).unwrap();

    // The bus base splits at bits 8 and 40; addresses above 4 GiB must land
    // in BASE1, not be truncated into BASE.
    assert!(phys > 0x1_0000_0000);
    let log = sim.write_log();
    assert!(log.contains(&(GSP + regs::FALCON_DMATRFBASE, (phys >> 8) as u32)));
    assert!(log.contains(&(GSP + regs::FALCON_DMATRFBASE1, (phys >> 40) as u32)));
    assert_ne!((phys >> 40) as u32, 0);

    assert_eq!(sim.gsp_imem(0..0x400), &blob[..]);
}

#[test]
fn dma_load_enables_the_fbif_path_first() {
    let mut sim = SimGpu::new();
    let falcon = Falcon::new(FalconEngine::Gsp);
    let mem = sim.sysmem();
    let fw = mem.alloc_contiguous(0x100).unwrap();

    falcon.load_dma_imem(&mut sim, fw.phys(), 0x100).unwrap();

    let log = sim.write_log();
    let pos_of = |reg: u32| log.iter().position(|(r, _)| *r == reg).unwrap();
    let itfen = pos_of(GSP + regs::FALCON_ITFEN);
    let fbif = pos_of(GSP + regs::FALCON_FBIF_CTL);
    let cmd = pos_of(GSP + regs::FALCON_DMATRFCMD);
    assert!(itfen < cmd);
    assert!(fbif < cmd);

    assert!(log.contains(&(
        GSP + regs::FALCON_FBIF_CTL,
        regs::FALCON_FBIF_CTL_ALLOW_PHYS | regs::FALCON_FBIF_CTL_ALLOW_PHYS_NO_CTX
    )));
    assert!(log.contains(&(
        GSP + regs::falcon_fbif_transcfg(0),
        regs::FALCON_FBIF_TRANSCFG_TARGET_NONCOHERENT
    )));
}

#[test]
fn boot_sets_the_vector_then_starts_the_cpu() {
    let mut sim = SimGpu::new();
    let falcon = Falcon::new(FalconEngine::Gsp);

    falcon.boot(&mut sim, 0x1234);

    let log = sim.write_log();
    let vec_pos = log
        .iter()
        .position(|e| *e == (GSP + regs::FALCON_BOOTVEC, 0x1234))
        .unwrap();
    let start_pos = log
        .iter()
        .position(|e| *e == (GSP + regs::FALCON_CPUCTL, regs::FALCON_CPUCTL_STARTCPU))
        .unwrap();
    assert!(vec_pos < start_pos);
}

#[test]
fn wait_halt_succeeds_with_diagnostics() {
    let mut sim = SimGpu::new();
    let falcon = Falcon::new(FalconEngine::Gsp);

    // After a start the model halts immediately, so the first poll wins.
    falcon.boot(&mut sim, 0);
    let report = falcon.wait_halt(&mut sim, 10, 1000).unwrap();
    assert_eq!(report.iterations, 0);
    assert_ne!(report.cpuctl & regs::FALCON_CPUCTL_HALTED, 0);
}

#[test]
fn wait_halt_times_out_on_a_wedged_core() {
    let mut sim = SimGpu::new();
    sim.behavior.falcon_halts = false;
    let falcon = Falcon::new(FalconEngine::Gsp);

    falcon.boot(&mut sim, 0);
    let err = falcon.wait_halt(&mut sim, 50, 1000).unwrap_err();
    match err {
        adahost_falcon::FalconError::HaltTimeout {
            engine,
            iterations,
            cpuctl,
            ..
        } => {
            assert_eq!(engine, "GSP");
            assert_eq!(iterations, 50);
            assert_eq!(cpuctl & regs::FALCON_CPUCTL_HALTED, 0);
        }
        other => panic!("unexpected error {other:?}"),
    }
    // The polling loop burned its whole 50 ms budget.
    assert!(sim.elapsed_us() >= 50_000);
}
