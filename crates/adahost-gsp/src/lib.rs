//! GSP bring-up engine for Ada Lovelace GPUs.
//!
//! [`Gsp`] owns everything between "cold Falcons" and "GSP-RM answering
//! RPCs": the FWSEC-FRTS secure bring-up that carves WPR2 from the top of
//! VRAM, the radix3 page table describing the firmware image to the Booter,
//! the WPR metadata block, the SEC2 Booter hand-off, the RISC-V start, and
//! the pair of ring queues carrying the RPC protocol afterwards.
//!
//! The boot sequence is an explicit state machine ([`BootStage`]); a failed
//! stage is recorded and surfaced with its stage code instead of cascading
//! booleans. DMA buffers are owned by this struct and released in reverse
//! acquisition order on drop.

mod boot;
mod elf;
mod fwsec;
mod queue;
mod radix3;
mod rm;
mod rpc;
mod wpr;

pub use elf::FwImageSection;
pub use queue::{crc32, RingQueue, DequeuedFrame, FRAME_HEADER_SIZE, QUEUE_SIZE, RING_ALIGN};
pub use radix3::{Radix3Table, GSP_PAGE_SIZE, RADIX3_ENTRIES};
pub use rpc::{RpcHeader, RPC_HEADER_SIZE};
pub use wpr::{WprMeta, FRTS_SIZE, GSP_HEAP_SIZE, WPR_META_MAGIC, WPR_META_SIZE};

use adahost_falcon::FalconError;
use adahost_hal::{DmaBuffer, Hal, HalError};
use adahost_vbios::FalconUcodeInfo;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GspError>;

#[derive(Debug, Error)]
pub enum GspError {
    #[error(transparent)]
    Hal(#[from] HalError),

    #[error(transparent)]
    Falcon(#[from] FalconError),

    #[error("command queue full: need {need} bytes, {free} free")]
    QueueFull { need: usize, free: usize },

    #[error("frame {seq} failed its checksum")]
    FrameChecksum { seq: u32 },

    #[error("no response for function {function:#x} within {timeout_ms} ms")]
    RpcTimeout { function: u32, timeout_ms: u32 },

    #[error("GSP_INIT_DONE not observed within {timeout_ms} ms")]
    InitDoneTimeout { timeout_ms: u32 },

    #[error("GSP is not ready for RPC traffic")]
    NotReady,

    #[error("RM returned status {status:#x} for function {function:#x}")]
    RmStatus { status: u32, function: u32 },

    #[error("firmware image rejected: {0}")]
    BadFirmware(&'static str),

    #[error("boot failed at stage {stage:?}")]
    Stage {
        stage: BootStage,
        #[source]
        source: Box<GspError>,
    },
}

impl GspError {
    /// Per-stage negative failure code, as surfaced to diagnostics.
    pub fn failure_code(&self) -> i32 {
        match self {
            GspError::Stage { stage, .. } => stage.failure_code(),
            _ => -1,
        }
    }

    pub(crate) fn at_stage(stage: BootStage, source: GspError) -> Self {
        GspError::Stage {
            stage,
            source: Box::new(source),
        }
    }
}

/// Stages of the boot state machine. A boot failure is reported against the
/// stage it could not enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootStage {
    Fresh,
    FalconReset,
    /// FWSEC either carved WPR2 or the orchestrator decided to proceed
    /// without it.
    FwsecDone,
    WprMetaReady,
    /// The SEC2 Booter ran, or no Booter was loaded.
    BooterRan,
    RiscvStarted,
    /// `GSP_INIT_DONE` observed; RPC traffic is allowed.
    GspReady,
}

impl BootStage {
    pub fn failure_code(self) -> i32 {
        match self {
            BootStage::Fresh => -1,
            BootStage::FalconReset => -2,
            BootStage::FwsecDone => -3,
            BootStage::WprMetaReady => -4,
            BootStage::BooterRan => -5,
            BootStage::RiscvStarted | BootStage::GspReady => -6,
        }
    }
}

/// GSP bring-up state: staging buffers, queue transport and boot progress.
///
/// Buffer ownership: every [`DmaBuffer`] here has this struct as its single
/// owner; the declaration order makes teardown run in reverse order of
/// acquisition.
pub struct Gsp {
    // Dropped in reverse declaration order: transport last.
    radix3: Option<Radix3Table>,
    firmware: Option<DmaBuffer>,
    booter: Option<DmaBuffer>,
    bootloader: Option<DmaBuffer>,
    vbios_dma: Option<DmaBuffer>,
    /// Host shadow of the VBIOS image for parsing.
    vbios_image: Option<Vec<u8>>,
    fwsec_info: Option<FalconUcodeInfo>,
    wpr_meta: DmaBuffer,
    statq: RingQueue,
    cmdq: RingQueue,

    stage: BootStage,
    gsp_ready: bool,
    last_handle: u32,
    wpr2_lo: u64,
    wpr2_hi: u64,
}

/// First handle is `HANDLE_BASE + 1`; zero is never minted.
const HANDLE_BASE: u32 = 0xba5e_0000;

impl Gsp {
    /// Allocates the connection-lifetime DMA state: both ring queues and the
    /// WPR metadata page.
    pub fn new(hal: &mut dyn Hal) -> Result<Self> {
        let sysmem = hal.sysmem();
        let cmdq = RingQueue::new(&sysmem, adahost_regs::GSP_CMDQ_INDEX)?;
        let statq = RingQueue::new(&sysmem, adahost_regs::GSP_MSGQ_INDEX)?;
        let wpr_meta = sysmem.alloc_contiguous(WPR_META_SIZE)?;
        tracing::info!(
            cmdq = format_args!("{:#x}", cmdq.base_phys()),
            statq = format_args!("{:#x}", statq.base_phys()),
            wpr_meta = format_args!("{:#x}", wpr_meta.phys()),
            "gsp transport allocated"
        );
        Ok(Self {
            radix3: None,
            firmware: None,
            booter: None,
            bootloader: None,
            vbios_dma: None,
            vbios_image: None,
            fwsec_info: None,
            wpr_meta,
            statq,
            cmdq,
            stage: BootStage::Fresh,
            gsp_ready: false,
            last_handle: HANDLE_BASE,
            wpr2_lo: 0,
            wpr2_hi: 0,
        })
    }

    pub fn stage(&self) -> BootStage {
        self.stage
    }

    pub fn is_ready(&self) -> bool {
        self.gsp_ready
    }

    /// Mints a connection-unique, strictly increasing, never-zero handle.
    pub fn next_handle(&mut self) -> u32 {
        self.last_handle += 1;
        self.last_handle
    }

    pub fn fwsec_info(&self) -> Option<&FalconUcodeInfo> {
        self.fwsec_info.as_ref()
    }

    pub fn radix3(&self) -> Option<&Radix3Table> {
        self.radix3.as_ref()
    }

    pub fn wpr_meta_phys(&self) -> u64 {
        self.wpr_meta.phys()
    }

    pub fn cmdq_base_phys(&self) -> u64 {
        self.cmdq.base_phys()
    }

    pub fn statq_base_phys(&self) -> u64 {
        self.statq.base_phys()
    }

    /// Reads back the serialized WPR metadata block.
    pub fn read_wpr_meta(&self) -> Result<(u32, WprMeta)> {
        WprMeta::read_from(&self.wpr_meta)
    }

    /// Bus address of the staged VBIOS image, when one is loaded.
    pub fn vbios_phys(&self) -> Option<u64> {
        self.vbios_dma.as_ref().map(|b| b.phys())
    }

    pub fn bootloader_phys(&self) -> Option<u64> {
        self.bootloader.as_ref().map(|b| b.phys())
    }

    pub fn booter_phys(&self) -> Option<u64> {
        self.booter.as_ref().map(|b| b.phys())
    }

    /// Composed WPR2 low bound, valid after a successful WPR2 check.
    pub fn wpr2_lo(&self) -> u64 {
        self.wpr2_lo
    }

    /// Composed WPR2 high bound, valid after a successful WPR2 check.
    pub fn wpr2_hi(&self) -> u64 {
        self.wpr2_hi
    }
}
