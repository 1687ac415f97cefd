//! NVMe-oF RDMA transport core (spec §1-§9): capsule wire formats, the
//! per-connection request state machine, registered-memory pools, the
//! acceptor, and the stable vtable surface the out-of-scope session layer
//! drives this crate through.
//!
//! Submodules are private; this module re-exports the pieces external
//! callers actually need so the public surface reads as one flat
//! `transport::` namespace rather than requiring callers to know which
//! file a type lives in.

mod acceptor;
mod capsule;
mod config;
mod error;
mod exec;
mod pool;
mod poller;
mod queue_pair;
mod request;
mod session;
mod vtable;

pub use acceptor::Acceptor;
pub use capsule::{
    CommandCapsule, CompletionCapsule, ParsedSgl, SglDescriptor, SglDescriptorSubtype,
    SglDescriptorType, TransferDirection, CAPSULE_HEADER_SIZE, COMPLETION_SIZE,
};
pub use config::{ConfigError, TransportConfig, ACCEPTOR_BACKLOG, MAX_IN_CAPSULE_DATA_SIZE};
pub use error::{NvmeStatusCode, TransportError};
pub use exec::{CommandExecutor, ConnHandle, NvmfRequest, RequestData};
pub use poller::CqKind;
pub use queue_pair::QueuePair;
pub use session::{SessionHandle, SessionTrCtx};
pub use vtable::{
    conn_fini, conn_poll, listen_addr_discover, req_complete, req_release, DiscoveryAddressFamily,
    DiscoveryEntry, DiscoveryRdmaCms, DiscoveryRdmaProviderType, DiscoveryRdmaQpType,
    DiscoverySecureChannel, DiscoveryTransportType, Transport, DISCOVERY_TRADDR_LEN,
    DISCOVERY_TRSVCID_LEN,
};
