//! An NVMe-oF RDMA transport core: a safe RDMA verbs wrapping plus the
//! connection, queue-pair and request machinery needed to serve NVMe
//! capsules over an RDMA fabric.
//!
//! Low-level RDMA functionality lives in the [`rdma`] mod, which provides
//! mostly-safe wrappers of RDMA resources and data-plane operations.
//! Higher-level wrappings of RDMA resources are in the [`wrap`] mod.
//! The transport itself - queue pairs, admission control, the acceptor and
//! its poll group - is in the [`transport`] mod.
//!
//! **WARNING: The interfaces are unstable and up to change!**

#[cfg(not(target_os = "linux"))]
compile_error!("this crate currently only supports Linux");

/// Bindings of C interfaces.
pub mod bindings;

/// Shared utility functions.
mod utils;

/// RDMA functionalities.
/// Not to be publicly exposed, instead `pub use` necessary items.
mod rdma;

pub use rdma::context::*;
pub use rdma::cq::*;
pub use rdma::gid::*;
pub use rdma::mr::*;
pub use rdma::nic::*;
pub use rdma::pd::*;
pub use rdma::qp::*;
pub use rdma::wr::*;

/// Type aliases for RDMA-related operations.
pub use rdma::type_alias;

/// Higher-level wrappings of RDMA resources.
pub mod wrap;

/// NVMe-oF RDMA transport: queue pairs, requests, admission control, acceptor.
pub mod transport;
