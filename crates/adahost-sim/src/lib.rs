//! Software model of the AD10x BAR0 subset the bring-up engine programs.
//!
//! [`SimGpu`] implements the engine's [`Hal`] and models just enough device
//! behavior to drive every hardware-facing flow in the workspace: Falcon
//! IMEM/DMEM ports with auto-increment, the FBIF/DMATRF copy engine, CPUCTL
//! halt/start, the RISC-V boot-config window with a configurable Boot ROM,
//! WPR2 carving, queue pointer registers, mailboxes and the VBIOS ROM
//! aperture.
//!
//! What the modelled firmware *does* when started is injected through
//! [`SimBehavior`], so each test arranges exactly the outcome it needs (Boot
//! ROM carves WPR2, DMA-loaded FWSEC carves it, a patched DMEM mapper is
//! honored, the RISC-V core refuses to start, ...).

pub mod vbios_image;

pub use vbios_image::{build_rom, RomLayout, RomOptions, TokenMode};

use adahost_hal::{Hal, PciIdentity, SysMem};
use adahost_regs as regs;
use std::collections::BTreeMap;

const IMEM_SIZE: usize = 0x40000;
const DMEM_SIZE: usize = 0x10000;

/// Outcome of triggering the Boot ROM through `BCR_CTRL.VALID` on the GSP
/// RISC-V controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BromBehavior {
    /// Boot ROM verifies the image, runs FWSEC and carves WPR2.
    CarveWpr2,
    /// Boot ROM halts with this non-zero return code.
    Fail(u32),
    /// Boot ROM never halts; pollers run out their budget.
    Unresponsive,
}

/// Configurable device-side behavior.
#[derive(Debug, Clone)]
pub struct SimBehavior {
    pub brom: BromBehavior,
    /// A DMA-loaded FWSEC run carves WPR2 when the Falcon is started.
    pub dma_fwsec_carves_wpr2: bool,
    /// DMEM offset of the "DMAP" block. When set, a PIO-started FWSEC run
    /// carves WPR2 only if the command word at `offset + 0x20` is the FRTS
    /// command id (0x15).
    pub pio_fwsec_mapper_offset: Option<usize>,
    /// The GSP RISC-V core reports ACTIVE after a start request.
    pub riscv_starts: bool,
    /// GSP Falcon MAILBOX0 reports `GSP_INIT_DONE` after this many reads
    /// once the RISC-V core is active.
    pub init_done_after_reads: Option<u32>,
    /// The SEC2 Booter halts with a zero return code.
    pub booter_succeeds: bool,
    /// Number of HWCFG2 reads that still report memory scrubbing.
    pub scrub_busy_reads: u32,
    /// The GSP Falcon halts after a start request. Clearing this models a
    /// wedged core for timeout paths.
    pub falcon_halts: bool,
}

impl Default for SimBehavior {
    fn default() -> Self {
        Self {
            brom: BromBehavior::CarveWpr2,
            dma_fwsec_carves_wpr2: false,
            pio_fwsec_mapper_offset: None,
            riscv_starts: true,
            init_done_after_reads: Some(3),
            booter_succeeds: true,
            scrub_busy_reads: 0,
            falcon_halts: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Engine {
    Gsp,
    Sec2,
}

struct MemPort {
    addr: usize,
    auto_inc: bool,
}

struct RiscvModel {
    cpuctl: u32,
    retcode: u32,
    bcr_ctrl: u32,
    bcr_dmem_addr: u32,
}

struct FalconModel {
    imem: Vec<u8>,
    dmem: Vec<u8>,
    imem_port: MemPort,
    dmem_port: MemPort,
    cpuctl: u32,
    bootvec: u32,
    mailbox: [u32; 2],
    itfen: u32,
    dmactl: u32,
    fbif_ctl: u32,
    transcfg: [u32; 2],
    trfbase: u32,
    trfbase1: u32,
    trfmoffs: u32,
    trffboffs: u32,
    trfcmd: u32,
    dma_loaded: bool,
    riscv: RiscvModel,
}

impl FalconModel {
    fn new() -> Self {
        Self {
            imem: vec![0; IMEM_SIZE],
            dmem: vec![0; DMEM_SIZE],
            imem_port: MemPort {
                addr: 0,
                auto_inc: false,
            },
            dmem_port: MemPort {
                addr: 0,
                auto_inc: false,
            },
            cpuctl: regs::FALCON_CPUCTL_HALTED,
            bootvec: 0,
            mailbox: [0; 2],
            itfen: 0,
            dmactl: 0,
            fbif_ctl: 0,
            transcfg: [0; 2],
            trfbase: 0,
            trfbase1: 0,
            trfmoffs: 0,
            trffboffs: 0,
            trfcmd: regs::FALCON_DMATRFCMD_IDLE,
            dma_loaded: false,
            riscv: RiscvModel {
                cpuctl: regs::RISCV_CPUCTL_HALTED,
                retcode: 0,
                bcr_ctrl: 0,
                bcr_dmem_addr: 0,
            },
        }
    }

    fn dma_src(&self) -> u64 {
        ((self.trfbase1 as u64) << 40) | ((self.trfbase as u64) << 8)
    }
}

/// The device model. Implements [`Hal`] so engine code drives it exactly as
/// it would drive real silicon behind a PCIe BAR0 mapping.
pub struct SimGpu {
    sysmem: SysMem,
    identity: PciIdentity,
    pub behavior: SimBehavior,
    boot0: u32,
    rom: Vec<u8>,
    regfile: BTreeMap<u32, u32>,
    write_log: Vec<(u32, u32)>,
    gsp: FalconModel,
    sec2: FalconModel,
    elapsed_us: u64,
    init_done_countdown: Option<u32>,
}

impl Default for SimGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl SimGpu {
    pub fn new() -> Self {
        Self {
            sysmem: SysMem::new(),
            identity: PciIdentity {
                vendor_id: 0x10de,
                device_id: 0x2684,
                subsystem_vendor_id: 0x10de,
                subsystem_device_id: 0x167c,
                revision: 0xa1,
                bar0_base: 0x8000_0000,
                bar1_base: 0x38_0000_0000,
            },
            behavior: SimBehavior::default(),
            boot0: regs::ARCH_ADA << regs::PMC_BOOT_0_ARCH_SHIFT,
            rom: Vec::new(),
            regfile: BTreeMap::new(),
            write_log: Vec::new(),
            gsp: FalconModel::new(),
            sec2: FalconModel::new(),
            elapsed_us: 0,
            init_done_countdown: None,
        }
    }

    pub fn with_behavior(behavior: SimBehavior) -> Self {
        let mut sim = Self::new();
        sim.behavior = behavior;
        sim
    }

    /// Backs the VBIOS ROM aperture at BAR0 + 0x300000 with `image`.
    pub fn set_rom(&mut self, image: Vec<u8>) {
        self.rom = image;
    }

    pub fn set_boot0(&mut self, boot0: u32) {
        self.boot0 = boot0;
    }

    pub fn set_identity(&mut self, identity: PciIdentity) {
        self.identity = identity;
    }

    /// Every `write32` issued so far, in order.
    pub fn write_log(&self) -> &[(u32, u32)] {
        &self.write_log
    }

    /// Total time spent in `delay_us`.
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    /// IMEM bytes captured for the GSP Falcon.
    pub fn gsp_imem(&self, range: std::ops::Range<usize>) -> &[u8] {
        &self.gsp.imem[range]
    }

    /// DMEM bytes captured for the GSP Falcon.
    pub fn gsp_dmem(&self, range: std::ops::Range<usize>) -> &[u8] {
        &self.gsp.dmem[range]
    }

    fn carve_wpr2(&mut self) {
        self.regfile
            .insert(regs::NV_PFB_PRI_MMU_WPR2_ADDR_HI, 0x8000_0001);
        self.regfile
            .insert(regs::NV_PFB_PRI_MMU_WPR2_ADDR_LO, 0x0030_0000);
        self.regfile.insert(regs::NV_PBUS_SW_SCRATCH_0E, 0);
    }

    fn engine_at(offset: u32) -> Option<(Engine, u32)> {
        // The queue pointer block sits inside the GSP window but is not part
        // of the Falcon core.
        if (0x11_0c00..0x11_0d00).contains(&offset) {
            return None;
        }
        match offset {
            o if (regs::FALCON_GSP_BASE..regs::FALCON_GSP_BASE + 0x1000).contains(&o) => {
                Some((Engine::Gsp, o - regs::FALCON_GSP_BASE))
            }
            o if (regs::FALCON_SEC2_BASE..regs::FALCON_SEC2_BASE + 0x1000).contains(&o) => {
                Some((Engine::Sec2, o - regs::FALCON_SEC2_BASE))
            }
            _ => None,
        }
    }

    fn falcon(&mut self, engine: Engine) -> &mut FalconModel {
        match engine {
            Engine::Gsp => &mut self.gsp,
            Engine::Sec2 => &mut self.sec2,
        }
    }

    /// Falcon start on the GSP engine runs whatever "firmware" the behavior
    /// configuration says was loaded.
    fn run_gsp_falcon(&mut self) {
        if !self.behavior.falcon_halts {
            self.gsp.cpuctl = regs::FALCON_CPUCTL_STARTCPU;
            return;
        }
        let carve = if let Some(mapper) = self.behavior.pio_fwsec_mapper_offset {
            let cmd_off = mapper + 0x20;
            self.gsp.dmem.len() >= cmd_off + 4
                && u32::from_le_bytes(self.gsp.dmem[cmd_off..cmd_off + 4].try_into().unwrap())
                    == 0x15
        } else {
            self.gsp.dma_loaded && self.behavior.dma_fwsec_carves_wpr2
        };
        if carve {
            self.carve_wpr2();
        }
        self.gsp.cpuctl = regs::FALCON_CPUCTL_HALTED;
    }

    fn trigger_brom(&mut self, engine: Engine) {
        if engine != Engine::Gsp {
            return;
        }
        // The Boot ROM fetches the image descriptor from the address the
        // driver published; a dangling address is a hard failure.
        let src = (self.gsp.riscv.bcr_dmem_addr as u64) << 8;
        let mut probe = [0u8; 4];
        let readable = self.sysmem.read_phys(src, &mut probe).is_ok();
        match self.behavior.brom {
            BromBehavior::CarveWpr2 if readable => {
                self.carve_wpr2();
                self.gsp.riscv.cpuctl |= regs::RISCV_CPUCTL_HALTED;
                self.gsp.riscv.retcode = 0;
            }
            BromBehavior::CarveWpr2 => {
                self.gsp.riscv.cpuctl |= regs::RISCV_CPUCTL_HALTED;
                self.gsp.riscv.retcode = 0xbad0_add8;
            }
            BromBehavior::Fail(code) => {
                self.gsp.riscv.cpuctl |= regs::RISCV_CPUCTL_HALTED;
                self.gsp.riscv.retcode = code;
            }
            // A wedged Boot ROM leaves the core running, never halting.
            BromBehavior::Unresponsive => {
                self.gsp.riscv.cpuctl &= !regs::RISCV_CPUCTL_HALTED;
            }
        }
    }

    fn riscv_start(&mut self, engine: Engine) {
        match engine {
            Engine::Gsp => {
                if self.behavior.riscv_starts {
                    self.gsp.riscv.cpuctl = regs::RISCV_CPUCTL_ACTIVE;
                    self.gsp.riscv.retcode = 0;
                    self.init_done_countdown = self.behavior.init_done_after_reads;
                } else {
                    self.gsp.riscv.retcode = regs::RISCV_BR_RETCODE_BUSY;
                }
            }
            Engine::Sec2 => {
                if self.behavior.booter_succeeds {
                    self.sec2.riscv.cpuctl = regs::RISCV_CPUCTL_HALTED;
                    self.sec2.riscv.retcode = 0;
                    self.sec2.mailbox[0] = 0;
                } else {
                    self.sec2.riscv.cpuctl = regs::RISCV_CPUCTL_HALTED;
                    self.sec2.riscv.retcode = 0xb007_dead;
                }
            }
        }
    }

    fn falcon_write(&mut self, engine: Engine, rel: u32, value: u32) {
        match rel {
            regs::FALCON_MAILBOX0 => self.falcon(engine).mailbox[0] = value,
            regs::FALCON_MAILBOX1 => self.falcon(engine).mailbox[1] = value,
            regs::FALCON_ITFEN => self.falcon(engine).itfen = value,
            regs::FALCON_DMACTL => self.falcon(engine).dmactl = value,
            regs::FALCON_BOOTVEC => self.falcon(engine).bootvec = value,
            regs::FALCON_FBIF_CTL => self.falcon(engine).fbif_ctl = value,
            o if o == regs::falcon_fbif_transcfg(0) => self.falcon(engine).transcfg[0] = value,
            o if o == regs::falcon_fbif_transcfg(1) => self.falcon(engine).transcfg[1] = value,
            regs::FALCON_DMATRFBASE => self.falcon(engine).trfbase = value,
            regs::FALCON_DMATRFBASE1 => self.falcon(engine).trfbase1 = value,
            regs::FALCON_DMATRFMOFFS => self.falcon(engine).trfmoffs = value,
            regs::FALCON_DMATRFFBOFFS => self.falcon(engine).trffboffs = value,
            regs::FALCON_DMATRFCMD => self.dma_transfer(engine, value),
            o if o == regs::falcon_imemc(0) => {
                let f = self.falcon(engine);
                f.imem_port.addr = (((value >> regs::FALCON_MEMC_BLK_SHIFT) & 0xfff) as usize) * 256;
                f.imem_port.auto_inc = value & regs::FALCON_MEMC_AINCW != 0;
            }
            o if o == regs::falcon_imemd(0) => {
                let f = self.falcon(engine);
                let a = f.imem_port.addr;
                if a + 4 <= f.imem.len() {
                    f.imem[a..a + 4].copy_from_slice(&value.to_le_bytes());
                }
                if f.imem_port.auto_inc {
                    f.imem_port.addr = a + 4;
                }
            }
            o if o == regs::falcon_dmemc(0) => {
                let f = self.falcon(engine);
                f.dmem_port.addr = (((value >> regs::FALCON_MEMC_BLK_SHIFT) & 0xfff) as usize) * 256;
                f.dmem_port.auto_inc = value & regs::FALCON_MEMC_AINCW != 0;
            }
            o if o == regs::falcon_dmemd(0) => {
                let f = self.falcon(engine);
                let a = f.dmem_port.addr;
                if a + 4 <= f.dmem.len() {
                    f.dmem[a..a + 4].copy_from_slice(&value.to_le_bytes());
                }
                if f.dmem_port.auto_inc {
                    f.dmem_port.addr = a + 4;
                }
            }
            regs::FALCON_CPUCTL => {
                if value == 0 {
                    let f = self.falcon(engine);
                    f.cpuctl = regs::FALCON_CPUCTL_HALTED;
                    f.dma_loaded = false;
                } else if value & regs::FALCON_CPUCTL_STARTCPU != 0 {
                    match engine {
                        Engine::Gsp => self.run_gsp_falcon(),
                        Engine::Sec2 => self.sec2.cpuctl = regs::FALCON_CPUCTL_HALTED,
                    }
                }
            }
            regs::RISCV_CPUCTL => {
                if value & regs::RISCV_CPUCTL_STARTCPU != 0 {
                    self.riscv_start(engine);
                } else if value & regs::RISCV_CPUCTL_HALTED != 0 {
                    self.falcon(engine).riscv.cpuctl |= regs::RISCV_CPUCTL_HALTED;
                }
            }
            regs::RISCV_BCR_DMEM_ADDR => self.falcon(engine).riscv.bcr_dmem_addr = value,
            regs::RISCV_BCR_CTRL => {
                if value & regs::RISCV_BCR_CTRL_VALID != 0 {
                    self.falcon(engine).riscv.bcr_ctrl = value;
                    self.trigger_brom(engine);
                } else {
                    // Core-select requests are acknowledged by latching the
                    // VALID bit.
                    self.falcon(engine).riscv.bcr_ctrl = value | regs::RISCV_BCR_CTRL_VALID;
                }
            }
            _ => {}
        }
    }

    fn dma_transfer(&mut self, engine: Engine, cmd: u32) {
        let sysmem = self.sysmem.clone();
        let f = self.falcon(engine);
        let src = f.dma_src() + f.trffboffs as u64;
        let dst = f.trfmoffs as usize;
        let mut block = [0u8; regs::FALCON_DMA_BLOCK_SIZE];
        if sysmem.read_phys(src, &mut block).is_ok() {
            let mem = if cmd & regs::FALCON_DMATRFCMD_IMEM != 0 {
                &mut f.imem
            } else {
                &mut f.dmem
            };
            if dst + block.len() <= mem.len() {
                mem[dst..dst + block.len()].copy_from_slice(&block);
            }
            f.dma_loaded = true;
        }
        f.trfcmd = cmd | regs::FALCON_DMATRFCMD_IDLE;
    }

    fn falcon_read(&mut self, engine: Engine, rel: u32) -> u32 {
        match rel {
            regs::FALCON_MAILBOX0 => {
                if engine == Engine::Gsp {
                    if let Some(n) = self.init_done_countdown {
                        if n == 0 {
                            self.gsp.mailbox[0] = adahost_regs::proto::MSG_EVENT_GSP_INIT_DONE;
                        } else {
                            self.init_done_countdown = Some(n - 1);
                        }
                    }
                }
                self.falcon(engine).mailbox[0]
            }
            regs::FALCON_MAILBOX1 => self.falcon(engine).mailbox[1],
            regs::FALCON_CPUCTL => self.falcon(engine).cpuctl,
            regs::FALCON_BOOTVEC => self.falcon(engine).bootvec,
            regs::FALCON_HWCFG2 => {
                if self.behavior.scrub_busy_reads > 0 {
                    self.behavior.scrub_busy_reads -= 1;
                    regs::FALCON_HWCFG2_MEM_SCRUBBING
                } else {
                    0
                }
            }
            regs::FALCON_DMATRFCMD => self.falcon(engine).trfcmd,
            regs::FALCON_DMATRFBASE => self.falcon(engine).trfbase,
            regs::FALCON_DMATRFBASE1 => self.falcon(engine).trfbase1,
            regs::FALCON_ITFEN => self.falcon(engine).itfen,
            regs::RISCV_CPUCTL => self.falcon(engine).riscv.cpuctl,
            regs::RISCV_BR_RETCODE => self.falcon(engine).riscv.retcode,
            regs::RISCV_BCR_CTRL => self.falcon(engine).riscv.bcr_ctrl,
            regs::RISCV_BCR_DMEM_ADDR => self.falcon(engine).riscv.bcr_dmem_addr,
            _ => 0,
        }
    }
}

impl Hal for SimGpu {
    fn read32(&mut self, offset: u32) -> u32 {
        if offset == regs::NV_PMC_BOOT_0 {
            return self.boot0;
        }
        if (regs::VBIOS_ROM_OFFSET..regs::VBIOS_ROM_OFFSET + regs::VBIOS_ROM_MAX_SIZE as u32)
            .contains(&offset)
        {
            let base = (offset - regs::VBIOS_ROM_OFFSET) as usize;
            let mut word = [0u8; 4];
            for (i, b) in word.iter_mut().enumerate() {
                *b = self.rom.get(base + i).copied().unwrap_or(0);
            }
            return u32::from_le_bytes(word);
        }
        if let Some((engine, rel)) = Self::engine_at(offset) {
            return self.falcon_read(engine, rel);
        }
        self.regfile.get(&offset).copied().unwrap_or(0)
    }

    fn write32(&mut self, offset: u32, value: u32) {
        self.write_log.push((offset, value));
        if let Some((engine, rel)) = Self::engine_at(offset) {
            self.falcon_write(engine, rel, value);
        } else {
            self.regfile.insert(offset, value);
        }
    }

    fn delay_us(&mut self, us: u64) {
        self.elapsed_us += us;
    }

    fn sysmem(&self) -> SysMem {
        self.sysmem.clone()
    }

    fn pci_identity(&self) -> PciIdentity {
        self.identity
    }
}
