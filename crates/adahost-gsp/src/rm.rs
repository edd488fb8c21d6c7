//! Resource-Manager client: alloc/control/free wrappers over the RPC
//! transport, plus the system-info and registry helpers.

use adahost_hal::Hal;
use adahost_regs::proto;
use tracing::{debug, warn};

use crate::{Gsp, GspError, Result};

/// `{hClient, hParent, hObject, hClass, status}`.
const ALLOC_HEADER_SIZE: usize = 20;
/// `{hClient, hObject, cmd, flags, status, paramsSize}`.
const CONTROL_HEADER_SIZE: usize = 24;
/// Registry entries carry a fixed 64-byte key.
const REGISTRY_KEY_SIZE: usize = 64;

/// Parameter buffers up to this size are built on the stack.
const STACK_BUF_SIZE: usize = 256;

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

impl Gsp {
    fn send_with_status(
        &mut self,
        hal: &mut dyn Hal,
        function: u32,
        buf: &[u8],
        status_offset: usize,
    ) -> Result<()> {
        self.send_rpc(hal, function, buf)?;
        let status = u32::from_le_bytes(buf[status_offset..status_offset + 4].try_into().unwrap());
        if status != 0 {
            warn!(
                function = format_args!("{function:#x}"),
                status = format_args!("{status:#x}"),
                "RM call failed"
            );
            return Err(GspError::RmStatus { status, function });
        }
        Ok(())
    }

    /// Allocates an RM object of `h_class` under `h_parent`.
    pub fn rm_alloc(
        &mut self,
        hal: &mut dyn Hal,
        h_client: u32,
        h_parent: u32,
        h_object: u32,
        h_class: u32,
        params: &[u8],
    ) -> Result<()> {
        let len = ALLOC_HEADER_SIZE + params.len();
        let mut stack = [0u8; STACK_BUF_SIZE];
        let mut heap;
        let buf: &mut [u8] = if len <= STACK_BUF_SIZE {
            &mut stack[..len]
        } else {
            heap = vec![0u8; len];
            &mut heap
        };

        put_u32(buf, 0, h_client);
        put_u32(buf, 4, h_parent);
        put_u32(buf, 8, h_object);
        put_u32(buf, 12, h_class);
        put_u32(buf, 16, 0); // status
        buf[ALLOC_HEADER_SIZE..].copy_from_slice(params);

        debug!(
            h_object = format_args!("{h_object:#x}"),
            h_class = format_args!("{h_class:#x}"),
            "rmAlloc"
        );
        let buf = &*buf;
        self.send_with_status(hal, proto::MSG_FUNCTION_GSP_RM_ALLOC, buf, 16)
    }

    /// Issues an RM control command against `h_object`.
    pub fn rm_control(
        &mut self,
        hal: &mut dyn Hal,
        h_client: u32,
        h_object: u32,
        cmd: u32,
        params: &[u8],
    ) -> Result<()> {
        let len = CONTROL_HEADER_SIZE + params.len();
        let mut stack = [0u8; STACK_BUF_SIZE];
        let mut heap;
        let buf: &mut [u8] = if len <= STACK_BUF_SIZE {
            &mut stack[..len]
        } else {
            heap = vec![0u8; len];
            &mut heap
        };

        put_u32(buf, 0, h_client);
        put_u32(buf, 4, h_object);
        put_u32(buf, 8, cmd);
        put_u32(buf, 12, 0); // flags
        put_u32(buf, 16, 0); // status
        put_u32(buf, 20, params.len() as u32);
        buf[CONTROL_HEADER_SIZE..].copy_from_slice(params);

        debug!(
            h_object = format_args!("{h_object:#x}"),
            cmd = format_args!("{cmd:#x}"),
            "rmControl"
        );
        let buf = &*buf;
        self.send_with_status(hal, proto::MSG_FUNCTION_GSP_RM_CONTROL, buf, 16)
    }

    /// Frees an RM object. No status is inspected.
    pub fn rm_free(
        &mut self,
        hal: &mut dyn Hal,
        h_client: u32,
        h_parent: u32,
        h_object: u32,
    ) -> Result<()> {
        let mut buf = [0u8; 12];
        put_u32(&mut buf, 0, h_client);
        put_u32(&mut buf, 4, h_parent);
        put_u32(&mut buf, 8, h_object);
        debug!(h_object = format_args!("{h_object:#x}"), "rmFree");
        self.send_rpc(hal, proto::MSG_FUNCTION_FREE, &buf)
    }

    /// Reports the host's PCI identity and BAR bases to the GSP. This is
    /// the one call permitted before `GSP_INIT_DONE`.
    pub fn send_system_info(&mut self, hal: &mut dyn Hal) -> Result<()> {
        let id = hal.pci_identity();
        let mut buf = [0u8; 32];
        put_u64(&mut buf, 0, id.bar0_base);
        put_u64(&mut buf, 8, id.bar1_base);
        put_u32(&mut buf, 16, id.vendor_id as u32 | ((id.device_id as u32) << 16));
        put_u32(
            &mut buf,
            20,
            id.subsystem_vendor_id as u32 | ((id.subsystem_device_id as u32) << 16),
        );
        put_u32(&mut buf, 24, id.revision as u32);
        debug!(
            device = format_args!("{:#06x}", id.device_id),
            "sending system info"
        );
        self.send_rpc(hal, proto::MSG_FUNCTION_GSP_SET_SYSTEM_INFO, &buf)
    }

    /// Sets a GSP registry key. Keys longer than 63 bytes are truncated.
    pub fn set_registry(&mut self, hal: &mut dyn Hal, key: &str, value: u32) -> Result<()> {
        let mut buf = [0u8; REGISTRY_KEY_SIZE + 4];
        let key_bytes = key.as_bytes();
        let len = key_bytes.len().min(REGISTRY_KEY_SIZE - 1);
        buf[..len].copy_from_slice(&key_bytes[..len]);
        put_u32(&mut buf, REGISTRY_KEY_SIZE, value);
        debug!(key, value, "setRegistry");
        self.send_rpc(hal, proto::MSG_FUNCTION_SET_REGISTRY, &buf)
    }
}
