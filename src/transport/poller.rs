//! The single per-connection poll tick (spec §4.D, §5 "cooperative
//! scheduling").
//!
//! Everything here is driven externally: nothing in this crate ever blocks
//! or spawns a thread, so `conn_poll` is the entire surface that advances a
//! connection's state machine on a given tick.

use super::exec::{CommandExecutor, ConnHandle};
use super::error::TransportError;

/// Which completion queue a work completion came from, named for
/// [`TransportError`]'s fatal-completion variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CqKind {
    Send,
    Recv,
}

/// Drain one queue pair's send and receive completion queues, advance every
/// request that can be advanced, and hand newly-ready requests to
/// `executor`.
///
/// Returns the number of `CommandExecutor::exec` invocations performed on
/// this tick. An `Err` means the connection hit a condition spec §7
/// classifies as transport-fatal; the caller must tear the connection down
/// (`Transport::conn_fini`) rather than poll it again.
pub fn conn_poll(
    conn: &ConnHandle,
    executor: &dyn CommandExecutor,
) -> Result<u32, TransportError> {
    let ready = {
        let mut qp = conn.borrow_mut();
        let mut ready = qp.drain_send_cq()?;
        let budget = qp.recv_budget();
        ready.extend(qp.drain_recv_cq(budget)?);
        ready
    };

    let n = ready.len() as u32;
    for req in ready {
        executor.exec(req);
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cq_kind_is_plain_data() {
        assert_eq!(CqKind::Send, CqKind::Send);
        assert_ne!(CqKind::Send, CqKind::Recv);
    }
}
