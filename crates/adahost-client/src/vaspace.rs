//! GPU virtual address space: a bump allocator over a registered
//! `FERMI_VASPACE_A` object.

use adahost_gsp::Gsp;
use adahost_hal::{DmaBuffer, DmaRegion, Hal};
use adahost_regs::proto;
use tracing::{debug, info, warn};

use crate::Result;

/// Default virtual range, well above the 4 GiB line.
const VA_START: u64 = 0x10_0000_0000;
const VA_LIMIT: u64 = 0xff_ffff_ffff;

/// Root page directory size.
const PDE_SIZE: usize = 0x4000;

const BIG_PAGE_SIZE: u32 = 0x10000;

pub struct VaSpace {
    h_client: u32,
    h_device: u32,
    h_vaspace: u32,
    pde: DmaBuffer,
    va_start: u64,
    va_limit: u64,
    next_va: u64,
}

impl VaSpace {
    /// Allocates the root page directory and registers the VA space with
    /// RM.
    pub fn new(hal: &mut dyn Hal, gsp: &mut Gsp, h_client: u32, h_device: u32) -> Result<Self> {
        let pde = hal.sysmem().alloc_contiguous(PDE_SIZE)?;
        let h_vaspace = gsp.next_handle();

        // {index, flags, vaStart, vaLimit, vaBase, vaSize, bigPageSize}
        let mut params = [0u8; 48];
        params[8..16].copy_from_slice(&VA_START.to_le_bytes());
        params[16..24].copy_from_slice(&VA_LIMIT.to_le_bytes());
        params[24..32].copy_from_slice(&VA_START.to_le_bytes());
        params[32..40].copy_from_slice(&(VA_LIMIT - VA_START).to_le_bytes());
        params[40..44].copy_from_slice(&BIG_PAGE_SIZE.to_le_bytes());
        gsp.rm_alloc(
            hal,
            h_client,
            h_device,
            h_vaspace,
            proto::CLASS_FERMI_VASPACE_A,
            &params,
        )?;

        info!(
            handle = format_args!("{h_vaspace:#x}"),
            pde = format_args!("{:#x}", pde.phys()),
            "VA space registered"
        );
        Ok(Self {
            h_client,
            h_device,
            h_vaspace,
            pde,
            va_start: VA_START,
            va_limit: VA_LIMIT,
            next_va: VA_START,
        })
    }

    pub fn handle(&self) -> u32 {
        self.h_vaspace
    }

    pub fn pde_phys(&self) -> u64 {
        self.pde.phys()
    }

    pub fn va_start(&self) -> u64 {
        self.va_start
    }

    /// Bump-allocates a virtual range for `region` and returns its base.
    /// Returns zero when the space is exhausted, which callers treat as
    /// failure.
    pub fn map(&mut self, region: &dyn DmaRegion, alignment: u64) -> u64 {
        let alignment = alignment.max(1);
        let size = region.region_len() as u64;
        let va = (self.next_va + alignment - 1) & !(alignment - 1);
        match va.checked_add(size) {
            Some(end) if end <= self.va_limit => {
                self.next_va = end;
                debug!(
                    va = format_args!("{va:#x}"),
                    size,
                    phys = ?region.phys_at(0),
                    "mapped"
                );
                va
            }
            _ => {
                warn!(size, "virtual address space exhausted");
                0
            }
        }
    }

    /// Releases the RM object. The page directory goes away with `self`.
    pub fn destroy(&mut self, hal: &mut dyn Hal, gsp: &mut Gsp) -> Result<()> {
        if self.h_vaspace != 0 {
            gsp.rm_free(hal, self.h_client, self.h_device, self.h_vaspace)?;
            self.h_vaspace = 0;
        }
        Ok(())
    }
}
