//! Protocol constants shared by the RPC transport and the Resource-Manager
//! client: vGPU message function ids, event ids and RM class numbers.

/// "VRPC" message signature carried by every RPC header.
pub const RPC_SIGNATURE_VALID: u32 = 0x4350_5256;
/// Header version 3, in the top byte.
pub const RPC_HEADER_VERSION: u32 = 3 << 24;

// vGPU message functions (host to GSP).
pub const MSG_FUNCTION_FREE: u32 = 0x0a;
pub const MSG_FUNCTION_GSP_RM_CONTROL: u32 = 0x4c;
pub const MSG_FUNCTION_SET_REGISTRY: u32 = 0x4d;
pub const MSG_FUNCTION_GSP_RM_ALLOC: u32 = 0x67;
pub const MSG_FUNCTION_GSP_SET_SYSTEM_INFO: u32 = 0x70;

// vGPU events (GSP to host).
pub const MSG_EVENT_GSP_INIT_DONE: u32 = 0x1001;

// RM object classes.
pub const CLASS_MEMORY_SYSTEM: u32 = 0x003e;
pub const CLASS_MEMORY_LOCAL_USER: u32 = 0x0040;
pub const CLASS_SUBDEVICE: u32 = 0x2080;
pub const CLASS_FERMI_VASPACE_A: u32 = 0x90f1;
pub const CLASS_CHANNEL_GPFIFO_ADA: u32 = 0xc86f;

/// Engine selector for compute channels.
pub const ENGINE_TYPE_COMPUTE: u32 = 1;

/// GSP pages are always 4 KiB, independent of the host page size.
pub const GSP_PAGE_SIZE: usize = 4096;
