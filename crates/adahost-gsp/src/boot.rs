//! Boot orchestration: firmware staging, WPR metadata, the SEC2 Booter
//! hand-off and the RISC-V start.

use adahost_falcon::{Falcon, FalconEngine, Riscv};
use adahost_hal::Hal;
use adahost_regs as regs;
use adahost_regs::proto;
use tracing::{debug, info, warn};

use crate::{elf, BootStage, Gsp, GspError, Radix3Table, Result, WprMeta};

impl Gsp {
    /// Stages the GSP bootloader blob.
    pub fn load_bootloader(&mut self, hal: &mut dyn Hal, data: &[u8]) -> Result<()> {
        let mut buf = hal.sysmem().alloc_contiguous(data.len())?;
        buf.copy_from_slice(data)?;
        info!(
            len = data.len(),
            phys = format_args!("{:#x}", buf.phys()),
            "bootloader staged"
        );
        self.bootloader = Some(buf);
        Ok(())
    }

    /// Stages the SEC2 Booter blob.
    pub fn load_booter(&mut self, hal: &mut dyn Hal, data: &[u8]) -> Result<()> {
        if data.len() < 256 {
            return Err(GspError::BadFirmware("booter image too small"));
        }
        let mut buf = hal.sysmem().alloc_contiguous(data.len())?;
        buf.copy_from_slice(data)?;
        info!(
            len = data.len(),
            phys = format_args!("{:#x}", buf.phys()),
            "booter staged"
        );
        self.booter = Some(buf);
        Ok(())
    }

    /// Unwraps the GSP-RM firmware ELF, stages its `.fwimage` section and
    /// builds the radix3 table over it.
    pub fn load_firmware(&mut self, hal: &mut dyn Hal, data: &[u8]) -> Result<()> {
        let section = elf::find_fwimage(data)?;
        info!(
            offset = format_args!("{:#x}", section.offset),
            size = format_args!("{:#x}", section.size),
            ".fwimage located"
        );
        let sysmem = hal.sysmem();
        let mut fw = sysmem.alloc_contiguous(section.size)?;
        fw.copy_from_slice(&data[section.offset..section.offset + section.size])?;
        let radix3 = Radix3Table::build(&sysmem, &fw)?;
        self.firmware = Some(fw);
        self.radix3 = Some(radix3);
        Ok(())
    }

    /// Assembles the 4 KiB WPR metadata block from whatever was staged.
    pub fn setup_wpr_meta(&mut self) -> Result<()> {
        let meta = WprMeta::new(
            self.bootloader.as_ref().map_or(0, |b| b.phys()),
            self.bootloader.as_ref().map_or(0, |b| b.len() as u64),
            self.radix3.as_ref().map_or(0, |r| r.root_phys()),
            self.radix3.as_ref().map_or(0, |r| r.len_bytes() as u64),
        );
        meta.write_to(&mut self.wpr_meta)?;
        info!(
            bootloader = format_args!("{:#x}", meta.bootloader_addr),
            radix3 = format_args!("{:#x}", meta.radix3_addr),
            "WPR metadata written"
        );
        Ok(())
    }

    /// Waits for the on-die firmware boot to finish. A timeout is logged,
    /// not fatal: some boards never report progress here.
    pub fn wait_gfw_boot(&mut self, hal: &mut dyn Hal) {
        for _ in 0..200 {
            let progress = hal.read32(regs::NV_PGC6_AON_SECURE_SCRATCH_GROUP_05_0) & 0xff;
            if progress == regs::GFW_BOOT_PROGRESS_COMPLETED {
                return;
            }
            hal.delay_us(10_000);
        }
        warn!("GFW boot progress never reported completion");
    }

    /// Resets SEC2. The RISC-V side not halting is logged and tolerated.
    fn reset_sec2(&mut self, hal: &mut dyn Hal) -> bool {
        Falcon::new(FalconEngine::Sec2).reset(hal);
        let riscv = Riscv::new(FalconEngine::Sec2);
        if !riscv.is_halted(hal) {
            debug!("SEC2 RISC-V not halted after reset, requesting halt");
            riscv.request_halt(hal);
        }
        let halted = riscv.is_halted(hal);
        if !halted {
            warn!("SEC2 RISC-V still running after halt request");
        }
        halted
    }

    /// Runs the SEC2 Booter: WPR metadata address through the mailboxes,
    /// Booter image through the boot-config window.
    pub fn execute_booter(&mut self, hal: &mut dyn Hal) -> Result<()> {
        let booter_phys = match self.booter.as_ref() {
            Some(b) => b.phys(),
            None => return Err(GspError::BadFirmware("no booter staged")),
        };
        info!(
            phys = format_args!("{booter_phys:#x}"),
            "executing booter on SEC2"
        );

        let falcon = Falcon::new(FalconEngine::Sec2);
        falcon.set_mailbox0(hal, self.wpr_meta.phys() as u32);
        falcon.set_mailbox1(hal, (self.wpr_meta.phys() >> 32) as u32);

        let bcr_addr = (booter_phys >> 8) as u32;
        hal.write32(
            FalconEngine::Sec2.base() + regs::RISCV_BCR_DMEM_ADDR,
            bcr_addr,
        );
        hal.write32(
            FalconEngine::Sec2.base() + regs::RISCV_BCR_CTRL,
            bcr_addr | regs::RISCV_BCR_CTRL_VALID,
        );
        let riscv = Riscv::new(FalconEngine::Sec2);
        let cpuctl = riscv.cpuctl(hal);
        hal.write32(
            FalconEngine::Sec2.base() + regs::RISCV_CPUCTL,
            cpuctl | regs::RISCV_CPUCTL_STARTCPU,
        );

        for _ in 0..200 {
            if riscv.is_halted(hal) {
                let retcode = riscv.retcode(hal);
                let mailbox0 = falcon.mailbox0(hal);
                debug!(
                    retcode = format_args!("{retcode:#x}"),
                    mailbox0 = format_args!("{mailbox0:#x}"),
                    "booter halted"
                );
                if retcode == 0 || mailbox0 == 0 {
                    return Ok(());
                }
                return Err(GspError::Falcon(adahost_falcon::FalconError::RiscvStart {
                    engine: "SEC2",
                    cpuctl: riscv.cpuctl(hal),
                    retcode,
                }));
            }
            hal.delay_us(1000);
        }
        Err(GspError::Falcon(adahost_falcon::FalconError::HaltTimeout {
            engine: "SEC2",
            iterations: 200,
            cpuctl: riscv.cpuctl(hal),
            mailbox0: falcon.mailbox0(hal),
        }))
    }

    /// The full boot sequence. Success means the RISC-V core is running;
    /// the ready transition is driven by [`Gsp::wait_for_init_done`].
    pub fn boot(&mut self, hal: &mut dyn Hal) -> Result<()> {
        let riscv_ctl = hal.read32(regs::FALCON_GSP_BASE + regs::RISCV_CPUCTL);
        let falcon_ctl = hal.read32(regs::FALCON_GSP_BASE + regs::FALCON_CPUCTL);
        let wpr2_hi = hal.read32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_HI);
        info!(
            riscv_ctl = format_args!("{riscv_ctl:#010x}"),
            falcon_ctl = format_args!("{falcon_ctl:#010x}"),
            wpr2_hi = format_args!("{wpr2_hi:#010x}"),
            "boot sequence starting"
        );

        self.wait_gfw_boot(hal);

        // Stage: engine resets.
        Falcon::new(FalconEngine::Gsp).reset(hal);
        if !self.reset_sec2(hal) {
            // Tolerated; nothing downstream depends on SEC2 unless a Booter
            // runs, and that path re-checks.
            debug!("continuing past SEC2 reset failure");
        }
        self.stage = BootStage::FalconReset;

        // Stage: FWSEC-FRTS. Proceeding without WPR2 is allowed (debug-mode
        // parts), so a clean "false" only warns.
        match self.execute_fwsec_frts(hal) {
            Ok(true) => {}
            Ok(false) => warn!("WPR2 not established; continuing in debug mode"),
            Err(e) => return Err(GspError::at_stage(BootStage::FwsecDone, e)),
        }
        self.stage = BootStage::FwsecDone;

        // Stage: WPR metadata.
        self.setup_wpr_meta()
            .map_err(|e| GspError::at_stage(BootStage::WprMetaReady, e))?;
        self.stage = BootStage::WprMetaReady;

        // Stage: SEC2 Booter, when one was staged. Failure falls through to
        // a direct start.
        if self.booter.is_some() {
            if let Err(e) = self.execute_booter(hal) {
                warn!("booter failed, attempting direct RISC-V start: {e}");
            }
        }
        self.stage = BootStage::BooterRan;

        // Stage: RISC-V start.
        let riscv = Riscv::new(FalconEngine::Gsp);
        if let Err(e) = riscv.start(hal, self.wpr_meta.phys()) {
            let retcode = riscv.retcode(hal);
            let cpuctl = riscv.cpuctl(hal);
            let scratch14 = hal.read32(regs::NV_PGC6_BSI_SECURE_SCRATCH_14);
            let mailbox0 = Falcon::new(FalconEngine::Gsp).mailbox0(hal);
            warn!(
                cpuctl = format_args!("{cpuctl:#010x}"),
                retcode = format_args!("{retcode:#010x}"),
                scratch14 = format_args!("{scratch14:#010x}"),
                mailbox0 = format_args!("{mailbox0:#010x}"),
                "RISC-V start failed"
            );
            return Err(GspError::at_stage(BootStage::RiscvStarted, e.into()));
        }
        self.stage = BootStage::RiscvStarted;
        info!("boot sequence initiated, GSP is coming up");
        Ok(())
    }

    /// Polls the GSP mailbox at 10 ms cadence for `GSP_INIT_DONE`.
    pub fn wait_for_init_done(&mut self, hal: &mut dyn Hal, timeout_ms: u32) -> Result<()> {
        let falcon = Falcon::new(FalconEngine::Gsp);
        let mut elapsed = 0;
        while elapsed < timeout_ms {
            if falcon.mailbox0(hal) == proto::MSG_EVENT_GSP_INIT_DONE {
                info!("GSP_INIT_DONE received");
                self.gsp_ready = true;
                self.stage = BootStage::GspReady;
                return Ok(());
            }
            hal.delay_us(10_000);
            elapsed += 10;
        }
        Err(GspError::InitDoneTimeout { timeout_ms })
    }
}
