//! Falcon and RISC-V microcontroller programming.
//!
//! [`Falcon`] drives a classic Falcon core at its BAR0 base: reset, scrub
//! wait, PIO and DMA ucode loading, boot-vector start and bounded halt
//! polling. [`Riscv`] drives the RISC-V boot-config window that shares the
//! same aperture: publishing an image to the Boot ROM through
//! `BCR_DMEM_ADDR`/`BCR_CTRL` and starting the core.
//!
//! All MMIO goes through the [`Hal`] facade; release fences order memory
//! writes ahead of the control-register stores that make the hardware
//! consume them.

use std::sync::atomic::{fence, Ordering};

use adahost_hal::Hal;
use adahost_regs as regs;
use thiserror::Error;
use tracing::{debug, trace, warn};

pub type Result<T> = std::result::Result<T, FalconError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FalconError {
    #[error("{engine} did not halt within {iterations} polls (CPUCTL={cpuctl:#010x} MBOX0={mailbox0:#010x})")]
    HaltTimeout {
        engine: &'static str,
        iterations: u32,
        cpuctl: u32,
        mailbox0: u32,
    },

    #[error("{engine} DMA transfer at IMEM offset {offset:#x} never went idle (CMD={cmd:#010x})")]
    DmaTimeout {
        engine: &'static str,
        offset: usize,
        cmd: u32,
    },

    #[error("{engine} memory scrub did not finish (HWCFG2={hwcfg2:#010x})")]
    ScrubTimeout { engine: &'static str, hwcfg2: u32 },

    #[error(
        "{engine} RISC-V core not active (CPUCTL={cpuctl:#010x} BR_RETCODE={retcode:#010x})"
    )]
    RiscvStart {
        engine: &'static str,
        cpuctl: u32,
        retcode: u32,
    },

    #[error("{engine} Boot ROM did not halt (CPUCTL={cpuctl:#010x})")]
    BootRomTimeout { engine: &'static str, cpuctl: u32 },

    #[error("{engine} core select was not acknowledged (BCR_CTRL={bcr_ctrl:#010x})")]
    CoreSelectTimeout { engine: &'static str, bcr_ctrl: u32 },
}

/// The two secure engines the bring-up sequence programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FalconEngine {
    Gsp,
    Sec2,
}

impl FalconEngine {
    pub const fn base(self) -> u32 {
        match self {
            FalconEngine::Gsp => regs::FALCON_GSP_BASE,
            FalconEngine::Sec2 => regs::FALCON_SEC2_BASE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            FalconEngine::Gsp => "GSP",
            FalconEngine::Sec2 => "SEC2",
        }
    }
}

/// Diagnostics from a successful halt wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaltReport {
    pub iterations: u32,
    pub cpuctl: u32,
}

/// Classic Falcon core controller.
#[derive(Debug, Clone, Copy)]
pub struct Falcon {
    engine: FalconEngine,
}

impl Falcon {
    pub const fn new(engine: FalconEngine) -> Self {
        Self { engine }
    }

    pub const fn engine(&self) -> FalconEngine {
        self.engine
    }

    fn reg(&self, offset: u32) -> u32 {
        self.engine.base() + offset
    }

    /// Resets the core and gives it 100 µs to settle. A core that does not
    /// report HALTED afterwards is logged, not treated as fatal.
    pub fn reset(&self, hal: &mut dyn Hal) {
        debug!(engine = self.engine.name(), "falcon reset");
        hal.write32(self.reg(regs::FALCON_CPUCTL), 0);
        hal.delay_us(100);
        let cpuctl = hal.read32(self.reg(regs::FALCON_CPUCTL));
        if cpuctl & regs::FALCON_CPUCTL_HALTED == 0 {
            warn!(
                engine = self.engine.name(),
                cpuctl = format_args!("{cpuctl:#010x}"),
                "falcon not halted after reset"
            );
        }
    }

    /// Waits for the IMEM/DMEM scrubber that runs after reset.
    pub fn wait_scrub_done(&self, hal: &mut dyn Hal) -> Result<()> {
        for _ in 0..1000 {
            let hwcfg2 = hal.read32(self.reg(regs::FALCON_HWCFG2));
            if hwcfg2 & regs::FALCON_HWCFG2_MEM_SCRUBBING == 0 {
                return Ok(());
            }
            hal.delay_us(10);
        }
        let hwcfg2 = hal.read32(self.reg(regs::FALCON_HWCFG2));
        Err(FalconError::ScrubTimeout {
            engine: self.engine.name(),
            hwcfg2,
        })
    }

    fn load_pio(&self, hal: &mut dyn Hal, ctrl: u32, data_reg: u32, data: &[u8]) {
        for (block, chunk) in data.chunks(256).enumerate() {
            hal.write32(
                self.reg(ctrl),
                ((block as u32) << regs::FALCON_MEMC_BLK_SHIFT) | regs::FALCON_MEMC_AINCW,
            );
            for word in chunk.chunks(4) {
                let mut bytes = [0u8; 4];
                bytes[..word.len()].copy_from_slice(word);
                hal.write32(self.reg(data_reg), u32::from_le_bytes(bytes));
            }
        }
    }

    /// PIO-loads instruction memory through the IMEMC/IMEMD port.
    pub fn load_imem(&self, hal: &mut dyn Hal, data: &[u8]) {
        trace!(engine = self.engine.name(), len = data.len(), "PIO IMEM load");
        self.load_pio(hal, regs::falcon_imemc(0), regs::falcon_imemd(0), data);
    }

    /// PIO-loads data memory through the DMEMC/DMEMD port.
    pub fn load_dmem(&self, hal: &mut dyn Hal, data: &[u8]) {
        trace!(engine = self.engine.name(), len = data.len(), "PIO DMEM load");
        self.load_pio(hal, regs::falcon_dmemc(0), regs::falcon_dmemd(0), data);
    }

    /// DMA-loads `size` bytes of IMEM from bus address `phys`.
    ///
    /// Resets the core, routes the FBIF at non-coherent system memory with
    /// physical addressing, splits the base across `DMATRFBASE`/`BASE1`
    /// (bits 8.. and 40.. respectively) and transfers 256-byte blocks,
    /// polling each for idle.
    pub fn load_dma_imem(&self, hal: &mut dyn Hal, phys: u64, size: usize) -> Result<()> {
        debug!(
            engine = self.engine.name(),
            phys = format_args!("{phys:#x}"),
            size,
            "DMA IMEM load"
        );
        self.reset(hal);

        hal.write32(self.reg(regs::FALCON_ITFEN), regs::FALCON_ITFEN_DTFEN);
        hal.write32(
            self.reg(regs::falcon_fbif_transcfg(0)),
            regs::FALCON_FBIF_TRANSCFG_TARGET_NONCOHERENT,
        );
        hal.write32(
            self.reg(regs::falcon_fbif_transcfg(1)),
            regs::FALCON_FBIF_TRANSCFG_TARGET_NONCOHERENT,
        );
        hal.write32(
            self.reg(regs::FALCON_FBIF_CTL),
            regs::FALCON_FBIF_CTL_ALLOW_PHYS | regs::FALCON_FBIF_CTL_ALLOW_PHYS_NO_CTX,
        );

        hal.write32(self.reg(regs::FALCON_DMATRFBASE), (phys >> 8) as u32);
        hal.write32(self.reg(regs::FALCON_DMATRFBASE1), (phys >> 40) as u32);

        let mut offset = 0usize;
        while offset < size {
            hal.write32(self.reg(regs::FALCON_DMATRFMOFFS), offset as u32);
            hal.write32(self.reg(regs::FALCON_DMATRFFBOFFS), offset as u32);
            let cmd = regs::FALCON_DMATRFCMD_IMEM | regs::FALCON_DMATRFCMD_SIZE_256B;
            hal.write32(self.reg(regs::FALCON_DMATRFCMD), cmd);

            let mut idle = false;
            for _ in 0..1000 {
                let status = hal.read32(self.reg(regs::FALCON_DMATRFCMD));
                if status & regs::FALCON_DMATRFCMD_IDLE != 0 {
                    idle = true;
                    break;
                }
                hal.delay_us(10);
            }
            if !idle {
                let cmd = hal.read32(self.reg(regs::FALCON_DMATRFCMD));
                return Err(FalconError::DmaTimeout {
                    engine: self.engine.name(),
                    offset,
                    cmd,
                });
            }
            offset += regs::FALCON_DMA_BLOCK_SIZE;
        }
        Ok(())
    }

    /// Programs the boot vector and starts the core. The fence keeps any
    /// preceding IMEM/DMEM stores ahead of the start request.
    pub fn boot(&self, hal: &mut dyn Hal, boot_vec: u32) {
        debug!(
            engine = self.engine.name(),
            boot_vec = format_args!("{boot_vec:#x}"),
            "falcon start"
        );
        hal.write32(self.reg(regs::FALCON_BOOTVEC), boot_vec);
        fence(Ordering::Release);
        hal.write32(self.reg(regs::FALCON_CPUCTL), regs::FALCON_CPUCTL_STARTCPU);
    }

    /// Polls CPUCTL for HALTED, `step_us` apart, at most `tries` times.
    pub fn wait_halt(&self, hal: &mut dyn Hal, tries: u32, step_us: u64) -> Result<HaltReport> {
        for i in 0..tries {
            let cpuctl = hal.read32(self.reg(regs::FALCON_CPUCTL));
            if cpuctl & regs::FALCON_CPUCTL_HALTED != 0 {
                trace!(engine = self.engine.name(), iterations = i, "falcon halted");
                return Ok(HaltReport {
                    iterations: i,
                    cpuctl,
                });
            }
            hal.delay_us(step_us);
        }
        let cpuctl = hal.read32(self.reg(regs::FALCON_CPUCTL));
        let mailbox0 = self.mailbox0(hal);
        Err(FalconError::HaltTimeout {
            engine: self.engine.name(),
            iterations: tries,
            cpuctl,
            mailbox0,
        })
    }

    pub fn mailbox0(&self, hal: &mut dyn Hal) -> u32 {
        hal.read32(self.reg(regs::FALCON_MAILBOX0))
    }

    pub fn mailbox1(&self, hal: &mut dyn Hal) -> u32 {
        hal.read32(self.reg(regs::FALCON_MAILBOX1))
    }

    pub fn set_mailbox0(&self, hal: &mut dyn Hal, value: u32) {
        hal.write32(self.reg(regs::FALCON_MAILBOX0), value);
    }

    pub fn set_mailbox1(&self, hal: &mut dyn Hal, value: u32) {
        hal.write32(self.reg(regs::FALCON_MAILBOX1), value);
    }

    pub fn cpuctl(&self, hal: &mut dyn Hal) -> u32 {
        hal.read32(self.reg(regs::FALCON_CPUCTL))
    }
}

/// RISC-V boot-config controller sharing a Falcon's aperture.
#[derive(Debug, Clone, Copy)]
pub struct Riscv {
    engine: FalconEngine,
}

impl Riscv {
    pub const fn new(engine: FalconEngine) -> Self {
        Self { engine }
    }

    fn reg(&self, offset: u32) -> u32 {
        self.engine.base() + offset
    }

    pub fn cpuctl(&self, hal: &mut dyn Hal) -> u32 {
        hal.read32(self.reg(regs::RISCV_CPUCTL))
    }

    pub fn retcode(&self, hal: &mut dyn Hal) -> u32 {
        hal.read32(self.reg(regs::RISCV_BR_RETCODE))
    }

    pub fn is_halted(&self, hal: &mut dyn Hal) -> bool {
        self.cpuctl(hal) & regs::RISCV_CPUCTL_HALTED != 0
    }

    pub fn is_active(&self, hal: &mut dyn Hal) -> bool {
        self.cpuctl(hal) & regs::RISCV_CPUCTL_ACTIVE != 0
    }

    /// Selects the classic Falcon core as the engine's boot target and
    /// waits for the hardware to acknowledge the switch.
    pub fn select_falcon_core(&self, hal: &mut dyn Hal) -> Result<()> {
        hal.write32(
            self.reg(regs::RISCV_BCR_CTRL),
            regs::RISCV_BCR_CTRL_CORE_SELECT_FALCON,
        );
        for _ in 0..100 {
            let bcr_ctrl = hal.read32(self.reg(regs::RISCV_BCR_CTRL));
            if bcr_ctrl & regs::RISCV_BCR_CTRL_VALID != 0 {
                return Ok(());
            }
            hal.delay_us(10);
        }
        let bcr_ctrl = hal.read32(self.reg(regs::RISCV_BCR_CTRL));
        Err(FalconError::CoreSelectTimeout {
            engine: self.engine.name(),
            bcr_ctrl,
        })
    }

    /// Requests a halt of the core.
    pub fn request_halt(&self, hal: &mut dyn Hal) {
        let cpuctl = self.cpuctl(hal);
        hal.write32(
            self.reg(regs::RISCV_CPUCTL),
            cpuctl | regs::RISCV_CPUCTL_HALTED,
        );
        hal.delay_us(100);
    }

    /// Hands an image at bus address `phys` to the Boot ROM and waits for it
    /// to halt. Returns the Boot ROM return code; zero means the image was
    /// verified and executed.
    pub fn boot_rom_execute(
        &self,
        hal: &mut dyn Hal,
        phys: u64,
        tries: u32,
        step_us: u64,
    ) -> Result<u32> {
        debug!(
            engine = self.engine.name(),
            phys = format_args!("{phys:#x}"),
            "Boot ROM trigger"
        );
        hal.write32(self.reg(regs::RISCV_BCR_DMEM_ADDR), (phys >> 8) as u32);
        fence(Ordering::Release);
        hal.write32(self.reg(regs::RISCV_BCR_CTRL), regs::RISCV_BCR_CTRL_VALID);

        for _ in 0..tries {
            if self.is_halted(hal) {
                let retcode = self.retcode(hal);
                debug!(
                    engine = self.engine.name(),
                    retcode = format_args!("{retcode:#010x}"),
                    "Boot ROM halted"
                );
                return Ok(retcode);
            }
            hal.delay_us(step_us);
        }
        Err(FalconError::BootRomTimeout {
            engine: self.engine.name(),
            cpuctl: self.cpuctl(hal),
        })
    }

    /// Programs the boot-config registers with `dmem_phys` and starts the
    /// core, then polls ACTIVE for 100 × 1 ms.
    ///
    /// `BR_RETCODE` 0xbadf5040 while polling means the boot is still in
    /// progress; any other non-zero value is logged as a boot error.
    pub fn start(&self, hal: &mut dyn Hal, dmem_phys: u64) -> Result<()> {
        let bcr_addr = (dmem_phys >> 8) as u32;
        debug!(
            engine = self.engine.name(),
            bcr_addr = format_args!("{bcr_addr:#010x}"),
            "RISC-V start"
        );
        hal.write32(self.reg(regs::RISCV_BCR_DMEM_ADDR), bcr_addr);
        hal.write32(
            self.reg(regs::RISCV_BCR_CTRL),
            regs::RISCV_BCR_CTRL_VALID | bcr_addr,
        );
        fence(Ordering::Release);
        hal.write32(self.reg(regs::RISCV_CPUCTL), regs::RISCV_CPUCTL_STARTCPU);

        for i in 0..100 {
            let cpuctl = self.cpuctl(hal);
            if cpuctl & regs::RISCV_CPUCTL_ACTIVE != 0 {
                debug!(engine = self.engine.name(), iterations = i, "RISC-V active");
                return Ok(());
            }
            let retcode = self.retcode(hal);
            if retcode != 0 && retcode != regs::RISCV_BR_RETCODE_BUSY {
                warn!(
                    engine = self.engine.name(),
                    retcode = format_args!("{retcode:#010x}"),
                    iteration = i,
                    "boot error reported while waiting for ACTIVE"
                );
            }
            hal.delay_us(1000);
        }

        let cpuctl = self.cpuctl(hal);
        let retcode = self.retcode(hal);
        Err(FalconError::RiscvStart {
            engine: self.engine.name(),
            cpuctl,
            retcode,
        })
    }

    pub const fn engine(&self) -> FalconEngine {
        self.engine
    }
}

impl FalconEngine {
    pub const fn riscv(self) -> Riscv {
        Riscv::new(self)
    }

    pub const fn falcon(self) -> Falcon {
        Falcon::new(self)
    }
}
