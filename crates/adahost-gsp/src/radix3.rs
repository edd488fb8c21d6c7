//! Three-level sparse page table describing the GSP firmware image to the
//! Booter.
//!
//! Layout is one contiguous allocation of `[root][L1 pages][L2 pages]`,
//! 512 eight-byte entries per page, each entry `physAddr | 1`. Leaf entries
//! query the source descriptor per page because firmware memory is allowed
//! to be non-contiguous.

use adahost_hal::{DmaBuffer, DmaRegion, SysMem};
use tracing::debug;

use crate::{GspError, Result};

pub const GSP_PAGE_SIZE: usize = 4096;
/// 64-bit entries per table page.
pub const RADIX3_ENTRIES: usize = GSP_PAGE_SIZE / 8;

const ENTRY_VALID: u64 = 1;

/// A built radix3 table, pinned for as long as the Booter may walk it.
pub struct Radix3Table {
    table: DmaBuffer,
    num_pages: usize,
    l1_pages: usize,
    l2_pages: usize,
}

impl Radix3Table {
    /// Builds the table over `region`.
    pub fn build(sysmem: &SysMem, region: &dyn DmaRegion) -> Result<Self> {
        let size = region.region_len();
        if size == 0 {
            return Err(GspError::BadFirmware("empty firmware region"));
        }
        let num_pages = size.div_ceil(GSP_PAGE_SIZE);
        let l2_pages = num_pages.div_ceil(RADIX3_ENTRIES);
        let l1_pages = l2_pages.div_ceil(RADIX3_ENTRIES);
        if l1_pages > RADIX3_ENTRIES {
            return Err(GspError::BadFirmware("firmware exceeds radix3 reach"));
        }

        let total = (1 + l1_pages + l2_pages) * GSP_PAGE_SIZE;
        let mut table = sysmem.alloc_contiguous(total)?;

        let root_phys = table.phys();
        let l1_phys = root_phys + GSP_PAGE_SIZE as u64;
        let l2_phys = l1_phys + (l1_pages * GSP_PAGE_SIZE) as u64;

        for i in 0..l1_pages {
            let entry = (l1_phys + (i * GSP_PAGE_SIZE) as u64) | ENTRY_VALID;
            table.write_u64(i * 8, entry)?;
        }
        for i in 0..l2_pages {
            let entry = (l2_phys + (i * GSP_PAGE_SIZE) as u64) | ENTRY_VALID;
            table.write_u64(GSP_PAGE_SIZE + i * 8, entry)?;
        }
        let l2_base = (1 + l1_pages) * GSP_PAGE_SIZE;
        for i in 0..num_pages {
            let page_phys = region
                .phys_at(i * GSP_PAGE_SIZE)
                .ok_or(GspError::BadFirmware("firmware page without bus address"))?;
            table.write_u64(l2_base + i * 8, page_phys | ENTRY_VALID)?;
        }

        debug!(
            root = format_args!("{root_phys:#x}"),
            num_pages,
            l1_pages,
            l2_pages,
            total,
            "radix3 table built"
        );
        Ok(Self {
            table,
            num_pages,
            l1_pages,
            l2_pages,
        })
    }

    /// Bus address of the root page, as placed into the WPR metadata.
    pub fn root_phys(&self) -> u64 {
        self.table.phys()
    }

    pub fn len_bytes(&self) -> usize {
        (1 + self.l1_pages + self.l2_pages) * GSP_PAGE_SIZE
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn l1_pages(&self) -> usize {
        self.l1_pages
    }

    pub fn l2_pages(&self) -> usize {
        self.l2_pages
    }

    /// Reads one entry: level 0 is the root, 1 the L1 run, 2 the L2 run.
    /// Indexes run across the whole level, not per page.
    pub fn entry(&self, level: u8, index: usize) -> u64 {
        let page_base = match level {
            0 => 0,
            1 => GSP_PAGE_SIZE,
            _ => (1 + self.l1_pages) * GSP_PAGE_SIZE,
        };
        self.table.read_u64(page_base + index * 8).unwrap_or(0)
    }
}
