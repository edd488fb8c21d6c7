//! Hardware access facade for the AD10x bring-up engine.
//!
//! The engine's only external inputs are a BAR0 window, a physically
//! contiguous DMA allocator and a microsecond delay; this crate is that
//! boundary. Everything above it ([`adahost-falcon`], [`adahost-gsp`],
//! [`adahost-client`]) programs hardware exclusively through the [`Hal`]
//! trait, so the same code drives real silicon behind a PCIe mapping or the
//! in-repo device model from `adahost-sim`.
//!
//! DMA memory is modelled as a bus address space ([`SysMem`]) handing out
//! scoped [`DmaBuffer`] regions: host-visible bytes pinned at a stable bus
//! address for the lifetime of the value, released on drop on every exit
//! path.

mod sysmem;

pub use sysmem::{DmaBuffer, DmaRegion, SysMem};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HalError>;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("dma allocation of {len} bytes failed: {reason}")]
    DmaAlloc { len: usize, reason: &'static str },

    #[error("dma access out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },

    #[error("no dma region at bus address {phys:#x}")]
    NoSuchRegion { phys: u64 },
}

/// PCI identity of the function behind BAR0, as reported to the GSP in the
/// system-info RPC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PciIdentity {
    pub vendor_id: u16,
    pub device_id: u16,
    pub subsystem_vendor_id: u16,
    pub subsystem_device_id: u16,
    pub revision: u8,
    /// BAR0 (MMIO registers) bus base address.
    pub bar0_base: u64,
    /// BAR1 (framebuffer aperture) bus base address.
    pub bar1_base: u64,
}

/// Host services consumed by the bring-up engine.
///
/// `read32`/`write32` access a 32-bit little-endian register at a byte offset
/// within BAR0. `delay_us` is the engine's only suspension point; all
/// hardware waits are bounded polling loops built on it.
pub trait Hal {
    fn read32(&mut self, offset: u32) -> u32;
    fn write32(&mut self, offset: u32, value: u32);
    fn delay_us(&mut self, us: u64);

    /// The DMA address space backing this device's bus-master traffic.
    fn sysmem(&self) -> SysMem;

    fn pci_identity(&self) -> PciIdentity;
}
