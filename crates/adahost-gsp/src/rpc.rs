//! RPC message framing and the blocking response wait.

use adahost_hal::Hal;
use adahost_regs::proto;
use tracing::{debug, warn};

use crate::{Gsp, GspError, Result};

/// `{signature, headerVersion, rpcResult, rpcResultPriv, function, length}`.
pub const RPC_HEADER_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcHeader {
    pub signature: u32,
    pub header_version: u32,
    pub rpc_result: u32,
    pub rpc_result_priv: u32,
    pub function: u32,
    /// Total message size including this header.
    pub length: u32,
}

impl RpcHeader {
    /// Decodes a header when the signature matches; anything else is not an
    /// RPC message.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < RPC_HEADER_SIZE {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes(data[i..i + 4].try_into().unwrap());
        let header = Self {
            signature: word(0),
            header_version: word(4),
            rpc_result: word(8),
            rpc_result_priv: word(12),
            function: word(16),
            length: word(20),
        };
        (header.signature == proto::RPC_SIGNATURE_VALID).then_some(header)
    }
}

fn encode_message(function: u32, params: &[u8]) -> Vec<u8> {
    let length = (RPC_HEADER_SIZE + params.len()) as u32;
    let mut message = Vec::with_capacity(length as usize);
    message.extend_from_slice(&proto::RPC_SIGNATURE_VALID.to_le_bytes());
    message.extend_from_slice(&proto::RPC_HEADER_VERSION.to_le_bytes());
    message.extend_from_slice(&0u32.to_le_bytes());
    message.extend_from_slice(&0u32.to_le_bytes());
    message.extend_from_slice(&function.to_le_bytes());
    message.extend_from_slice(&length.to_le_bytes());
    message.extend_from_slice(params);
    message
}

impl Gsp {
    /// Builds and enqueues an RPC message. There is no inline response wait;
    /// responses are matched later by [`Gsp::wait_rpc_response`].
    ///
    /// Only the system-info call is allowed before `GSP_INIT_DONE`.
    pub fn send_rpc(&mut self, hal: &mut dyn Hal, function: u32, params: &[u8]) -> Result<()> {
        if !self.gsp_ready && function != proto::MSG_FUNCTION_GSP_SET_SYSTEM_INFO {
            return Err(GspError::NotReady);
        }
        let message = encode_message(function, params);
        let seq = self.cmdq.enqueue(hal, &message)?;
        debug!(
            function = format_args!("{function:#x}"),
            seq,
            len = message.len(),
            "rpc sent"
        );
        Ok(())
    }

    /// Polls the status queue until a message with `function` arrives,
    /// copying its parameters into `response`. Returns the parameter byte
    /// count.
    ///
    /// Asynchronous `GSP_INIT_DONE` events observed while polling flip the
    /// ready flag; bad-checksum frames are dropped without retry.
    pub fn wait_rpc_response(
        &mut self,
        hal: &mut dyn Hal,
        function: u32,
        response: &mut [u8],
        timeout_ms: u32,
    ) -> Result<usize> {
        let mut frame = vec![0u8; 2 * adahost_regs::proto::GSP_PAGE_SIZE];
        for _ in 0..timeout_ms.saturating_mul(10) {
            match self.statq.dequeue(hal, &mut frame) {
                Ok(Some(got)) => {
                    let Some(header) = RpcHeader::parse(&frame[..got.len]) else {
                        warn!(seq = got.seq, "status frame without RPC signature");
                        continue;
                    };
                    if header.function == proto::MSG_EVENT_GSP_INIT_DONE {
                        debug!("async GSP_INIT_DONE observed");
                        self.gsp_ready = true;
                        if function == proto::MSG_EVENT_GSP_INIT_DONE {
                            return Ok(0);
                        }
                        continue;
                    }
                    if header.function == function {
                        let params = (header.length as usize)
                            .saturating_sub(RPC_HEADER_SIZE)
                            .min(got.len.saturating_sub(RPC_HEADER_SIZE));
                        let copy = params.min(response.len());
                        response[..copy]
                            .copy_from_slice(&frame[RPC_HEADER_SIZE..RPC_HEADER_SIZE + copy]);
                        return Ok(copy);
                    }
                    debug!(
                        function = format_args!("{:#x}", header.function),
                        "unmatched status message skipped"
                    );
                }
                Ok(None) => {}
                Err(GspError::FrameChecksum { seq }) => {
                    warn!(seq, "dropping corrupt status frame");
                }
                Err(e) => return Err(e),
            }
            hal.delay_us(100);
        }
        Err(GspError::RpcTimeout {
            function,
            timeout_ms,
        })
    }
}
