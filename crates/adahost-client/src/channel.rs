//! GPFIFO compute channel: ring, UserD doorbell and submission.

use std::sync::atomic::{fence, Ordering};
use std::sync::Mutex;

use adahost_gsp::Gsp;
use adahost_hal::{DmaBuffer, Hal};
use adahost_regs::proto;
use tracing::{debug, info};

use crate::Result;

/// GPFIFO entries in the ring.
const GPFIFO_ENTRIES: u32 = 4096;
/// `{address: u64, length: u32, flags: u32}`.
const GPFIFO_ENTRY_SIZE: usize = 16;
/// Entry flag asking the engine to fetch the pushbuffer.
const GPFIFO_FLAG_FETCH: u32 = 1;

/// State behind the submission lock: the ring, the doorbell page and the
/// software put pointer.
struct Ring {
    gpfifo: DmaBuffer,
    userd: DmaBuffer,
    put: u32,
}

pub struct Channel {
    h_client: u32,
    h_device: u32,
    h_subdevice: u32,
    h_channel: u32,
    h_userd_mem: u32,
    /// `submit` is the one path designed for concurrent callers.
    ring: Mutex<Ring>,
}

impl Channel {
    /// Allocates the subdevice, registers the UserD page and creates the
    /// GPFIFO channel.
    pub fn new(hal: &mut dyn Hal, gsp: &mut Gsp, h_client: u32, h_device: u32) -> Result<Self> {
        let h_subdevice = gsp.next_handle();
        gsp.rm_alloc(hal, h_client, h_device, h_subdevice, proto::CLASS_SUBDEVICE, &[])?;

        let sysmem = hal.sysmem();
        let mut gpfifo = sysmem.alloc_contiguous(GPFIFO_ENTRIES as usize * GPFIFO_ENTRY_SIZE)?;
        gpfifo.fill_zero();
        let mut userd = sysmem.alloc_contiguous(proto::GSP_PAGE_SIZE)?;
        userd.fill_zero();

        // Register the UserD backing store so the channel can point at it.
        // {type, size, address}
        let h_userd_mem = gsp.next_handle();
        let mut mem_params = [0u8; 24];
        mem_params[0..4].copy_from_slice(&proto::CLASS_MEMORY_SYSTEM.to_le_bytes());
        mem_params[8..16].copy_from_slice(&(proto::GSP_PAGE_SIZE as u64).to_le_bytes());
        mem_params[16..24].copy_from_slice(&userd.phys().to_le_bytes());
        gsp.rm_alloc(
            hal,
            h_client,
            h_device,
            h_userd_mem,
            proto::CLASS_MEMORY_SYSTEM,
            &mem_params,
        )?;

        // {ampMode, engineType, gpFifoOffset, gpFifoEntries, flags,
        //  hUserdMemory, userdOffset}. The put/get exchange runs through
        // UserD, so the in-band ring offset stays zero.
        let h_channel = gsp.next_handle();
        let mut chan_params = [0u8; 40];
        chan_params[0..4].copy_from_slice(&1u32.to_le_bytes());
        chan_params[4..8].copy_from_slice(&proto::ENGINE_TYPE_COMPUTE.to_le_bytes());
        chan_params[16..20].copy_from_slice(&GPFIFO_ENTRIES.to_le_bytes());
        chan_params[24..28].copy_from_slice(&h_userd_mem.to_le_bytes());
        gsp.rm_alloc(
            hal,
            h_client,
            h_subdevice,
            h_channel,
            proto::CLASS_CHANNEL_GPFIFO_ADA,
            &chan_params,
        )?;

        info!(
            handle = format_args!("{h_channel:#x}"),
            gpfifo = format_args!("{:#x}", gpfifo.phys()),
            userd = format_args!("{:#x}", userd.phys()),
            "compute channel created"
        );
        Ok(Self {
            h_client,
            h_device,
            h_subdevice,
            h_channel,
            h_userd_mem,
            ring: Mutex::new(Ring {
                gpfifo,
                userd,
                put: 0,
            }),
        })
    }

    pub fn handle(&self) -> u32 {
        self.h_channel
    }

    pub fn gpfifo_phys(&self) -> u64 {
        self.ring.lock().unwrap().gpfifo.phys()
    }

    pub fn userd_phys(&self) -> u64 {
        self.ring.lock().unwrap().userd.phys()
    }

    pub fn put(&self) -> u32 {
        self.ring.lock().unwrap().put
    }

    /// Publishes a pushbuffer span to the engine: entry store, fence,
    /// advance put, doorbell store, fence.
    pub fn submit(&self, gpu_addr: u64, length: u32) -> Result<()> {
        let mut ring = self.ring.lock().unwrap();
        let slot = ring.put as usize * GPFIFO_ENTRY_SIZE;
        ring.gpfifo.write_u64(slot, gpu_addr)?;
        ring.gpfifo.write_u32(slot + 8, length)?;
        ring.gpfifo.write_u32(slot + 12, GPFIFO_FLAG_FETCH)?;

        // The entry must be visible before the doorbell moves.
        fence(Ordering::Release);

        ring.put = (ring.put + 1) % GPFIFO_ENTRIES;
        let put = ring.put;
        ring.userd.write_u32(0, put)?;
        fence(Ordering::Release);

        debug!(
            gpu_addr = format_args!("{gpu_addr:#x}"),
            length, put, "gpfifo submit"
        );
        Ok(())
    }

    /// Frees the channel objects in reverse creation order.
    pub fn destroy(&mut self, hal: &mut dyn Hal, gsp: &mut Gsp) -> Result<()> {
        if self.h_channel != 0 {
            gsp.rm_free(hal, self.h_client, self.h_subdevice, self.h_channel)?;
            self.h_channel = 0;
        }
        if self.h_userd_mem != 0 {
            gsp.rm_free(hal, self.h_client, self.h_device, self.h_userd_mem)?;
            self.h_userd_mem = 0;
        }
        if self.h_subdevice != 0 {
            gsp.rm_free(hal, self.h_client, self.h_device, self.h_subdevice)?;
            self.h_subdevice = 0;
        }
        Ok(())
    }
}
