//! Session-scoped transport state (spec §3 "Session", §4.G `session_init`).
//!
//! The NVMe controller/session object itself is out of scope (owned by the
//! session/subsystem layer); this module only provides the
//! [`SessionTrCtx`] the transport attaches to that session's `trctx` slot,
//! plus the minimal [`SessionHandle`] trait the out-of-scope session type
//! must implement so the transport can reach that slot without knowing
//! anything else about the session.

use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::rdma::pd::Pd;

use super::pool::SessionPool;

/// The transport-owned piece of a session: the large-I/O bounce pool shared
/// by every queue pair of that session (spec §3, §5 "shared resources").
///
/// Wrapped in `Rc<RefCell<_>>` rather than behind a lock: sessions are
/// pinned to one core (spec §5), so every queue pair that shares this
/// `SessionTrCtx` runs on the same core and never contends with another
/// thread for the `RefCell` borrow.
pub struct SessionTrCtx {
    pool: RefCell<SessionPool>,
}

impl SessionTrCtx {
    /// Allocate and register the per-session bounce pool against `pd`, the
    /// protection domain of the connection that first establishes this
    /// session (spec §4.G `session_init`: "registers its pool against the
    /// first connection's protection domain").
    pub fn new(pd: &Pd, max_queue_depth: u16, max_io_size: u32) -> io::Result<Rc<Self>> {
        let pool = SessionPool::new(pd, max_queue_depth, max_io_size)?;
        Ok(Rc::new(Self {
            pool: RefCell::new(pool),
        }))
    }

    pub(super) fn pool(&self) -> &RefCell<SessionPool> {
        &self.pool
    }

    /// Whether the bounce pool currently has a free chunk.
    pub fn has_free_buffer(&self) -> bool {
        !self.pool.borrow().is_empty()
    }
}

/// The interface the (out-of-scope) session/subsystem layer exposes to this
/// transport: a single slot the transport may install its
/// [`SessionTrCtx`] into, per spec §3's "the transport attaches a
/// `SessionTrCtx` to the session's `trctx` slot".
///
/// Implemented by the session type external to this crate; modeled here
/// only as a trait object boundary, per spec §1's "external collaborators,
/// referenced only by interface".
pub trait SessionHandle {
    /// Read-only access to the transport's slot, `None` until
    /// `session_init` runs.
    fn trctx(&self) -> Option<&Rc<SessionTrCtx>>;

    /// Install (or clear, for `session_fini`) the transport's slot.
    fn set_trctx(&mut self, trctx: Option<Rc<SessionTrCtx>>);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeSession {
        trctx: Option<Rc<SessionTrCtx>>,
    }

    impl SessionHandle for FakeSession {
        fn trctx(&self) -> Option<&Rc<SessionTrCtx>> {
            self.trctx.as_ref()
        }

        fn set_trctx(&mut self, trctx: Option<Rc<SessionTrCtx>>) {
            self.trctx = trctx;
        }
    }

    #[test]
    fn slot_starts_empty() {
        let session = FakeSession { trctx: None };
        assert!(session.trctx().is_none());
    }
}
