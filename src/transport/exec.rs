//! The (out-of-scope) NVMe command executor interface (spec §1
//! "external collaborators", §9 "Pointer-aliasing tricks").
//!
//! The original couples a public, executor-visible request struct with the
//! transport's private per-request state by embedding the former as the
//! first field of the latter and recovering the outer struct via pointer
//! arithmetic on a known offset. Rust has no sound equivalent of that
//! trick, so this crate splits the two halves for real: [`NvmfRequest`] is
//! the value handed to the executor, and it carries just enough identity
//! (a connection handle plus a slot index) for [`Transport::req_complete`]
//! and [`Transport::req_release`] to find the matching
//! [`super::request::Request`] back inside its owning
//! [`super::queue_pair::QueuePair`] by direct field access — no pointer
//! arithmetic involved.

use std::cell::RefCell;
use std::rc::Rc;
use std::slice;

use super::capsule::{CommandCapsule, TransferDirection};
use super::queue_pair::QueuePair;

/// Non-owning handle to the queue pair a request belongs to (spec §9:
/// "request holds a non-owning back-pointer to its connection"). `Rc`
/// rather than a raw back-pointer because the executor may hold this
/// across an arbitrary number of poll ticks before calling back.
pub type ConnHandle = Rc<RefCell<QueuePair>>;

/// A request's payload location, borrowed from whichever registered buffer
/// the transport assigned during SGL parsing (in-capsule slot or session
/// bounce chunk). Exposed as a raw pointer/length rather than a borrowed
/// slice because the owning [`QueuePair`] is behind a `RefCell` that the
/// executor must be free to leave un-borrowed while it works.
///
/// # Safety
/// Valid only until the matching `req_complete`/`req_release` call; the
/// transport does not reuse or move the underlying buffer before then.
pub struct RequestData {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the pointee is a registered RDMA buffer owned by the QP/session
// pool, not any Rust-tracked aliasing state; the single-threaded-per-QP
// scheduling model (spec §5) is what actually prevents concurrent access.
unsafe impl Send for RequestData {}

impl RequestData {
    pub(crate) fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    pub(crate) fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            &[]
        } else {
            // SAFETY: see struct-level safety comment.
            unsafe { slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.len == 0 {
            &mut []
        } else {
            // SAFETY: see struct-level safety comment.
            unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
        }
    }
}

/// The request handle passed to [`CommandExecutor::exec`]: everything the
/// executor needs to interpret and run one NVMe command, plus the identity
/// it must echo back via [`super::vtable::req_complete`] or
/// [`super::vtable::req_release`].
pub struct NvmfRequest {
    pub cid: u16,
    pub opcode: u8,
    pub nsid: u32,
    pub cdw10: [u32; 6],
    pub dir: TransferDirection,
    pub data: RequestData,

    pub(crate) conn: ConnHandle,
    pub(crate) slot: u16,
}

impl NvmfRequest {
    pub(crate) fn from_capsule(
        conn: ConnHandle,
        slot: u16,
        cmd: &CommandCapsule,
        dir: TransferDirection,
        data: RequestData,
    ) -> Self {
        Self {
            cid: cmd.cid,
            opcode: cmd.opcode,
            nsid: cmd.nsid,
            cdw10: cmd.cdw10,
            dir,
            data,
            conn,
            slot,
        }
    }
}

/// The (out-of-scope) command executor this transport hands assembled
/// requests to. Implemented by the NVMe session/subsystem layer; modeled
/// here only as the interface boundary spec §1 describes.
///
/// Implementations may call `req_complete`/`req_release` synchronously
/// from within [`CommandExecutor::exec`] (e.g. a pure in-memory test
/// double) or asynchronously from a completely different point in time —
/// the transport does not assume either. What it does assume is that the
/// call happens on the same core the owning queue pair is pinned to (spec
/// §5's shared-nothing scheduling model).
pub trait CommandExecutor {
    fn exec(&self, req: NvmfRequest);
}
