use std::io;

use thiserror::Error;

/// Fatal faults: anything that forces a queue pair or the whole transport
/// to tear down. These never carry peer-visible semantics — contrast with
/// [`NvmeStatusCode`], which is a wire value returned to the host.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An `ibverbs`/`rdma_cm` call failed.
    #[error("I/O error from the RDMA stack")]
    Io(#[from] io::Error),

    /// A completion queue entry reported a non-success status.
    #[error("fatal work completion on {0:?}: {1}")]
    WorkCompletion(crate::transport::poller::CqKind, crate::WcStatus),

    /// A work completion arrived with an opcode that cannot occur on the CQ
    /// it was polled from (e.g. `WC_RECV` on the send CQ).
    #[error("unexpected opcode {0:?} on {1:?}")]
    UnexpectedOpcode(crate::WcOpcode, crate::transport::poller::CqKind),

    /// Queue pair or memory-region creation failed during CONNECT.
    #[error("failed to construct queue pair: {0}")]
    QueuePairCreation(String),

    /// No RDMA-capable device was found at `transport_init` time.
    #[error("no usable RDMA devices found")]
    NoDevices,

    /// The connection-manager event channel reported a device-removal event.
    #[error("RDMA device removed")]
    DeviceRemoval,
}

/// NVMe status codes the transport can set on a completion capsule without
/// involving the (out-of-scope) command executor. Subset actually produced
/// by this core; the rest of the NVMe status space is the executor's
/// concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum NvmeStatusCode {
    Success = 0x00,
    InvalidSglSegDescriptor = 0x0D,
    SglDescriptorTypeInvalid = 0x0E,
    DataSglLengthInvalid = 0x12,
    InvalidSglOffset = 0x16,
}

impl NvmeStatusCode {
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, NvmeStatusCode::Success)
    }
}
