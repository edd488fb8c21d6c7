//! Client facade over the bring-up engine.
//!
//! A [`Client`] owns the HAL and the GSP state, tracks the connection state
//! machine (`Disconnected → Connected → GspBooted → GspReady`) and exposes
//! the surface a consumer drives: firmware staging, FWSEC execution, boot,
//! status snapshots, VRAM allocation and command submission through a
//! GPFIFO compute channel.

mod channel;
mod config;
mod status;
mod vaspace;

pub use channel::Channel;
pub use config::Configuration;
pub use status::GpuStatus;
pub use vaspace::VaSpace;

use std::path::{Path, PathBuf};

use adahost_gsp::{Gsp, GspError};
use adahost_hal::{Hal, HalError};
use adahost_regs as regs;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client disabled by configuration")]
    Disabled,

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("GSP is not ready")]
    NotReady,

    #[error("no compute channel")]
    NoChannel,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("firmware file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Gsp(#[from] GspError),

    #[error(transparent)]
    Hal(#[from] HalError),
}

/// Connection state machine, driven by `connect`, `boot` and the arrival of
/// `GSP_INIT_DONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    GspBooted,
    GspReady,
}

/// VRAM offsets are handed out 64 KiB aligned.
const VRAM_ALIGN: u64 = 0x10000;

pub struct Client<H: Hal> {
    hal: H,
    config: Configuration,
    state: ConnectionState,
    gsp: Option<Gsp>,
    vaspace: Option<VaSpace>,
    channel: Option<Channel>,
    h_client: u32,
    h_device: u32,
    vram_next: u64,
}

impl<H: Hal> Client<H> {
    pub fn new(hal: H, config: Configuration) -> Self {
        Self {
            hal,
            config,
            state: ConnectionState::Disconnected,
            gsp: None,
            vaspace: None,
            channel: None,
            h_client: 0,
            h_device: 0,
            vram_next: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state >= ConnectionState::Connected
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Identifies the chip and allocates the connection-lifetime transport.
    pub fn connect(&mut self) -> Result<()> {
        if self.config.disabled {
            return Err(ClientError::Disabled);
        }
        if self.gsp.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let boot0 = self.hal.read32(regs::NV_PMC_BOOT_0);
        let arch = regs::pmc_boot0_arch(boot0);
        info!(
            boot0 = format_args!("{boot0:#010x}"),
            arch = format_args!("{arch:#x}"),
            "connecting"
        );
        if arch != regs::ARCH_ADA {
            warn!(
                arch = format_args!("{arch:#x}"),
                "not an Ada Lovelace part; expected 0x19"
            );
        }

        let mut gsp = Gsp::new(&mut self.hal)?;
        self.h_client = gsp.next_handle();
        self.h_device = gsp.next_handle();
        self.gsp = Some(gsp);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    /// Tears down the channel, VA space and GSP state in reverse order.
    pub fn disconnect(&mut self) {
        if let (Some(mut channel), Some(gsp)) = (self.channel.take(), self.gsp.as_mut()) {
            let _ = channel.destroy(&mut self.hal, gsp);
        }
        if let (Some(mut vaspace), Some(gsp)) = (self.vaspace.take(), self.gsp.as_mut()) {
            let _ = vaspace.destroy(&mut self.hal, gsp);
        }
        self.gsp = None;
        self.state = ConnectionState::Disconnected;
        info!("disconnected");
    }

    pub fn load_vbios(&mut self, data: &[u8]) -> Result<()> {
        let hal = &mut self.hal;
        self.gsp
            .as_mut()
            .ok_or(ClientError::NotConnected)?
            .load_vbios(hal, data)?;
        Ok(())
    }

    pub fn load_bootloader(&mut self, data: &[u8]) -> Result<()> {
        let hal = &mut self.hal;
        self.gsp
            .as_mut()
            .ok_or(ClientError::NotConnected)?
            .load_bootloader(hal, data)?;
        Ok(())
    }

    pub fn load_booter(&mut self, data: &[u8]) -> Result<()> {
        let hal = &mut self.hal;
        self.gsp
            .as_mut()
            .ok_or(ClientError::NotConnected)?
            .load_booter(hal, data)?;
        Ok(())
    }

    /// Stages the GSP-RM firmware ELF.
    pub fn load_firmware(&mut self, data: &[u8]) -> Result<()> {
        let hal = &mut self.hal;
        self.gsp
            .as_mut()
            .ok_or(ClientError::NotConnected)?
            .load_firmware(hal, data)?;
        Ok(())
    }

    /// Reads the firmware ELF from `path`, honouring the configuration's
    /// path override.
    pub fn load_firmware_file(&mut self, path: &Path) -> Result<()> {
        let path = self
            .config
            .gsp_firmware_path
            .clone()
            .unwrap_or_else(|| path.to_path_buf());
        let data = std::fs::read(&path).map_err(|source| ClientError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), len = data.len(), "firmware file read");
        self.load_firmware(&data)
    }

    /// Runs FWSEC-FRTS; returns whether WPR2 is established.
    pub fn execute_fwsec(&mut self) -> Result<bool> {
        let hal = &mut self.hal;
        Ok(self
            .gsp
            .as_mut()
            .ok_or(ClientError::NotConnected)?
            .execute_fwsec_frts(hal)?)
    }

    /// Runs the boot sequence up to the RISC-V start.
    pub fn boot(&mut self) -> Result<()> {
        let hal = &mut self.hal;
        self.gsp
            .as_mut()
            .ok_or(ClientError::NotConnected)?
            .boot(hal)?;
        self.state = ConnectionState::GspBooted;
        Ok(())
    }

    /// Blocks until `GSP_INIT_DONE`, then reports the host system info.
    pub fn wait_ready(&mut self, timeout_ms: u32) -> Result<()> {
        let gsp = self.gsp.as_mut().ok_or(ClientError::NotConnected)?;
        gsp.wait_for_init_done(&mut self.hal, timeout_ms)?;
        gsp.send_system_info(&mut self.hal)?;
        self.state = ConnectionState::GspReady;
        Ok(())
    }

    /// Registers the default VA space.
    pub fn create_vaspace(&mut self) -> Result<()> {
        if self.state < ConnectionState::GspReady {
            return Err(ClientError::NotReady);
        }
        let (h_client, h_device) = (self.h_client, self.h_device);
        let hal = &mut self.hal;
        let gsp = self.gsp.as_mut().ok_or(ClientError::NotConnected)?;
        self.vaspace = Some(VaSpace::new(hal, gsp, h_client, h_device)?);
        Ok(())
    }

    /// Creates the GPFIFO compute channel.
    pub fn create_channel(&mut self) -> Result<()> {
        if self.state < ConnectionState::GspReady {
            return Err(ClientError::NotReady);
        }
        let (h_client, h_device) = (self.h_client, self.h_device);
        let hal = &mut self.hal;
        let gsp = self.gsp.as_mut().ok_or(ClientError::NotConnected)?;
        self.channel = Some(Channel::new(hal, gsp, h_client, h_device)?);
        Ok(())
    }

    pub fn vaspace(&self) -> Option<&VaSpace> {
        self.vaspace.as_ref()
    }

    pub fn vaspace_mut(&mut self) -> Option<&mut VaSpace> {
        self.vaspace.as_mut()
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Allocates VRAM through RM and returns its 64 KiB aligned offset.
    /// A zero return would mean failure on the flat FFI surface, so offset
    /// zero is never handed out.
    pub fn alloc_vram(&mut self, size: u64) -> Result<u64> {
        if size == 0 {
            return Err(ClientError::InvalidArgument("zero-size vram allocation"));
        }
        if self.state < ConnectionState::GspReady {
            return Err(ClientError::NotReady);
        }
        let (h_client, h_device) = (self.h_client, self.h_device);
        let hal = &mut self.hal;
        let gsp = self.gsp.as_mut().ok_or(ClientError::NotConnected)?;

        let h_memory = gsp.next_handle();
        let mut params = [0u8; 24];
        params[8..16].copy_from_slice(&size.to_le_bytes());
        gsp.rm_alloc(
            hal,
            h_client,
            h_device,
            h_memory,
            adahost_regs::proto::CLASS_MEMORY_LOCAL_USER,
            &params,
        )?;

        self.vram_next += VRAM_ALIGN;
        let offset = self.vram_next;
        self.vram_next += (size + VRAM_ALIGN - 1) & !(VRAM_ALIGN - 1);
        info!(size, offset = format_args!("{offset:#x}"), "vram allocated");
        Ok(offset)
    }

    /// Pushes a trivial GPFIFO entry; a doorbell smoke test.
    pub fn submit_command(&mut self, cmd: u32) -> Result<()> {
        let channel = self.channel.as_ref().ok_or(ClientError::NoChannel)?;
        channel.submit(cmd as u64, 0)?;
        Ok(())
    }

    /// Snapshot of the registers a diagnosing caller wants to see.
    pub fn status(&mut self) -> GpuStatus {
        status::snapshot(&mut self.hal)
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn gsp(&self) -> Option<&Gsp> {
        self.gsp.as_ref()
    }
}
