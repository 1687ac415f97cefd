//! The acceptor: a single listening `rdma_cm_id`, queue-depth negotiation
//! on CONNECT, and the pre-CONNECT connection list (spec §4.F).

use std::cell::RefCell;
use std::ffi::c_void;
use std::net::Ipv4Addr;
use std::ptr::{self, NonNull};
use std::rc::Rc;

use libc::{sockaddr, sockaddr_in};

use crate::bindings::{
    rdma_accept, rdma_ack_cm_event, rdma_bind_addr, rdma_cm_event, rdma_cm_event_type,
    rdma_cm_id, rdma_conn_param, rdma_create_event_channel, rdma_create_id,
    rdma_destroy_event_channel, rdma_destroy_id, rdma_event_channel, rdma_get_cm_event,
    rdma_listen, rdma_port_space, rdma_reject,
};
use crate::rdma::context::IbvContext;
use crate::utils::interop::from_c_ret;

use super::config::{TransportConfig, ACCEPTOR_BACKLOG};
use super::error::{NvmeStatusCode, TransportError};
use super::exec::{CommandExecutor, ConnHandle};
use super::poller::conn_poll;
use super::queue_pair::QueuePair;

/// NVMe-oF RDMA CM "connect" private data: the host's advertised queue
/// sizes (spec §6 "CONNECT (host -> target): first bytes contain `hrqsize`,
/// `hsqsize`").
#[repr(C)]
#[derive(Clone, Copy)]
struct RdmaCmReq {
    recfmt: u16,
    qid: u16,
    hrqsize: u16,
    hsqsize: u16,
    cntlid: u16,
    _reserved: [u8; 22],
}

/// NVMe-oF RDMA CM "accept" private data (spec §6 "ACCEPT").
#[repr(C)]
#[derive(Clone, Copy)]
struct RdmaCmRep {
    recfmt: u16,
    crqsize: u16,
    _reserved: [u8; 28],
}

/// NVMe-oF RDMA CM "reject" private data (spec §6 "REJECT").
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct RdmaCmRej {
    status: RejectStatus,
}

#[repr(C)]
#[derive(Clone, Copy, Default)]
struct RejectStatus {
    sc: u16,
}

fn nvmf_min(values: impl IntoIterator<Item = u32>) -> u32 {
    values.into_iter().min().expect("at least one value")
}

/// Query the local NIC limits relevant to depth negotiation from an
/// inbound `rdma_cm_id`'s already-resolved verbs context.
fn query_local_limits(cm_id: *mut rdma_cm_id) -> Result<(u32, u32), TransportError> {
    let fail = |e: std::io::Error| TransportError::QueuePairCreation(e.to_string());
    // SAFETY: `cm_id` came from a CONNECT_REQUEST event; librdmacm has
    // already resolved `verbs` by the time that event is delivered.
    let raw_ctx = unsafe { (*cm_id).verbs };
    let raw_ctx = NonNull::new(raw_ctx)
        .ok_or_else(|| TransportError::QueuePairCreation("cm_id has no verbs context".to_owned()))?;
    let ctx = IbvContext::from(raw_ctx);
    let attr = ctx.query_device().map_err(fail)?;
    Ok((attr.max_qp_wr.max(0) as u32, attr.max_qp_rd_atom.max(0) as u32))
}

/// One accepted connection's negotiated depths (spec §4.F "compute
/// effective limits").
struct NegotiatedDepths {
    max_queue_depth: u16,
    max_rw_depth: u16,
}

fn negotiate_depths(
    cfg: &TransportConfig,
    cm_id: *mut rdma_cm_id,
    rdma_param: &rdma_conn_param,
) -> Result<NegotiatedDepths, TransportError> {
    let (local_max_qp_wr, local_max_rd_atom) = query_local_limits(cm_id)?;

    let mut max_queue_depth = nvmf_min([cfg.max_queue_depth as u32, local_max_qp_wr]);
    let mut max_rw_depth = nvmf_min([
        cfg.max_rw_depth as u32,
        local_max_rd_atom,
        rdma_param.initiator_depth as u32,
    ]);

    if !rdma_param.private_data.is_null()
        && rdma_param.private_data_len as usize >= std::mem::size_of::<RdmaCmReq>()
    {
        // SAFETY: length checked above; the host's private data is a plain
        // POD struct per the NVMe-oF RDMA binding spec.
        let req = unsafe { &*(rdma_param.private_data as *const RdmaCmReq) };
        log::trace!(
            "host advertised hrqsize={} hsqsize={}",
            req.hrqsize,
            req.hsqsize
        );
        max_queue_depth = nvmf_min([max_queue_depth, req.hrqsize as u32, req.hsqsize as u32]);
    }

    log::debug!(
        "negotiated queue depth {} (local limit {}), rw depth {} (local limit {})",
        max_queue_depth,
        local_max_qp_wr,
        max_rw_depth,
        local_max_rd_atom
    );

    Ok(NegotiatedDepths {
        max_queue_depth: max_queue_depth as u16,
        max_rw_depth: max_rw_depth as u16,
    })
}

fn build_listen_sockaddr(addr: Ipv4Addr, port: u16) -> sockaddr_in {
    sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from(addr).to_be(),
        },
        sin_zero: [0; 8],
    }
}

/// Tag a freshly-accepted `rdma_cm_id` with a non-owning pointer to its
/// [`QueuePair`], so a later CM event for the same id can recover the
/// connection without a side-table (spec §9: the work-request `wr_id`
/// round-trip through an opaque C slot, rendered here for CM identifiers
/// instead of work requests).
fn tag_cm_id(cm_id: *mut rdma_cm_id, conn: &ConnHandle) {
    // SAFETY: `cm_id` is exclusively owned by `conn`'s `QueuePair` at this
    // point; setting `context` does not alias any other live reference.
    unsafe { (*cm_id).context = Rc::as_ptr(conn) as *mut c_void };
}

/// Recover the [`ConnHandle`] tagged onto `cm_id` by [`tag_cm_id`], if any.
///
/// # Safety
/// `cm_id` must either be untagged (`context == NULL`) or have been tagged
/// by `tag_cm_id` with a [`ConnHandle`] that is still alive.
unsafe fn conn_handle_from_cm_id(cm_id: *mut rdma_cm_id) -> Option<ConnHandle> {
    let ctx = (*cm_id).context;
    if ctx.is_null() {
        return None;
    }
    let raw = ctx as *const RefCell<QueuePair>;
    Rc::increment_strong_count(raw);
    Some(Rc::from_raw(raw))
}

/// Listens on a single IPv4 address, negotiates queue depths on CONNECT,
/// and owns the pre-CONNECT connection list (spec §3 "Link into the global
/// pre-CONNECT list", §4.F).
pub struct Acceptor {
    channel: *mut rdma_event_channel,
    listen_id: *mut rdma_cm_id,
    config: TransportConfig,
    pending: Vec<ConnHandle>,
    destroyed: bool,
}

impl Acceptor {
    /// Create the listening event channel and `rdma_cm_id`, bind to the
    /// configured address, and start listening with a fixed backlog of 10
    /// (spec §4.F, §6 "Transport registration / listening").
    pub fn init(config: &TransportConfig) -> Result<Self, TransportError> {
        let fail = |e: std::io::Error| TransportError::QueuePairCreation(e.to_string());

        // SAFETY: FFI.
        let channel = unsafe { rdma_create_event_channel() };
        let channel = NonNull::new(channel)
            .ok_or_else(|| TransportError::QueuePairCreation("rdma_create_event_channel failed".to_owned()))?
            .as_ptr();

        // SAFETY: `channel` was just created and is non-null.
        let fd = unsafe { (*channel).fd };
        // SAFETY: FFI; sets O_NONBLOCK so `rdma_get_cm_event` never blocks
        // the acceptor's poll tick (spec §5 "acceptor's CM fd... set
        // non-blocking").
        let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK) };
        if ret < 0 {
            // SAFETY: owned, not yet used elsewhere.
            unsafe { rdma_destroy_event_channel(channel) };
            return Err(fail(std::io::Error::last_os_error()));
        }

        let mut listen_id: *mut rdma_cm_id = ptr::null_mut();
        // SAFETY: FFI; `channel` outlives this call.
        let ret = unsafe {
            rdma_create_id(channel, &mut listen_id, ptr::null_mut(), rdma_port_space::RDMA_PS_TCP)
        };
        if let Err(e) = from_c_ret(ret) {
            // SAFETY: `channel` was never handed to a successfully created id.
            unsafe { rdma_destroy_event_channel(channel) };
            return Err(fail(e));
        }

        let mut addr = build_listen_sockaddr(config.listen_addr, config.listen_port);
        // SAFETY: FFI; `addr` lives for the duration of the call.
        let ret = unsafe { rdma_bind_addr(listen_id, &mut addr as *mut sockaddr_in as *mut sockaddr) };
        if let Err(e) = from_c_ret(ret) {
            // SAFETY: partially constructed; nothing else references these yet.
            unsafe {
                rdma_destroy_id(listen_id);
                rdma_destroy_event_channel(channel);
            }
            return Err(fail(e));
        }

        // SAFETY: FFI.
        let ret = unsafe { rdma_listen(listen_id, ACCEPTOR_BACKLOG) };
        if let Err(e) = from_c_ret(ret) {
            // SAFETY: same as above.
            unsafe {
                rdma_destroy_id(listen_id);
                rdma_destroy_event_channel(channel);
            }
            return Err(fail(e));
        }

        log::info!(
            "acceptor listening on {}:{} (backlog {})",
            config.listen_addr,
            config.listen_port,
            ACCEPTOR_BACKLOG
        );

        Ok(Self {
            channel,
            listen_id,
            config: config.clone(),
            pending: Vec::new(),
            destroyed: false,
        })
    }

    /// One acceptor poll tick: drain the pre-CONNECT list, then the CM
    /// event channel (spec §4.F, in that order).
    ///
    /// `on_established_connect` is called once per connection the moment it
    /// leaves the pre-CONNECT list after processing its first capsule (the
    /// Fabric Connect); `on_established_disconnect` is called for a
    /// disconnect-bucket event on a connection that already has a session
    /// attached. This crate does not model the out-of-scope reactor that
    /// would otherwise own steady-state polling or dispatch teardown to the
    /// session's owning core, so the caller receives the handle directly in
    /// both cases and is responsible for what happens next.
    pub fn poll(
        &mut self,
        executor: &dyn CommandExecutor,
        on_established_connect: &mut dyn FnMut(ConnHandle),
        on_established_disconnect: &mut dyn FnMut(ConnHandle),
    ) -> Result<(), TransportError> {
        self.poll_pending(executor, on_established_connect);
        self.drain_cm_events(executor, on_established_disconnect)
    }

    fn poll_pending(
        &mut self,
        executor: &dyn CommandExecutor,
        on_established_connect: &mut dyn FnMut(ConnHandle),
    ) {
        let pending = std::mem::take(&mut self.pending);
        let mut still_pending = Vec::with_capacity(pending.len());
        for conn in pending {
            match conn_poll(&conn, executor) {
                Ok(0) => still_pending.push(conn),
                Ok(n) => {
                    log::debug!("pre-CONNECT connection processed {n} capsule(s); assuming CONNECT");
                    on_established_connect(conn);
                }
                Err(e) => {
                    log::warn!("fatal error polling pre-CONNECT connection: {e}");
                    conn.borrow_mut().destroy();
                }
            }
        }
        self.pending = still_pending;
    }

    fn drain_cm_events(
        &mut self,
        executor: &dyn CommandExecutor,
        on_established_disconnect: &mut dyn FnMut(ConnHandle),
    ) -> Result<(), TransportError> {
        loop {
            let mut event: *mut rdma_cm_event = ptr::null_mut();
            // SAFETY: FFI.
            let ret = unsafe { rdma_get_cm_event(self.channel, &mut event) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() != std::io::ErrorKind::WouldBlock {
                    log::warn!("acceptor event channel error: {err}");
                }
                return Ok(());
            }

            // SAFETY: `rdma_get_cm_event` returned 0, so `event` is valid.
            let ev = unsafe { &*event };
            let kind = ev.event;
            let id = ev.id;

            use rdma_cm_event_type::*;
            match kind {
                RDMA_CM_EVENT_CONNECT_REQUEST => {
                    if let Err(e) = self.handle_connect_request(ev) {
                        log::warn!("failed to process CONNECT_REQUEST: {e}");
                    }
                    // SAFETY: event was returned by `rdma_get_cm_event` and
                    // not yet acked.
                    unsafe { rdma_ack_cm_event(event) };
                }
                RDMA_CM_EVENT_ESTABLISHED => {
                    // SAFETY: same as above.
                    unsafe { rdma_ack_cm_event(event) };
                }
                RDMA_CM_EVENT_ADDR_CHANGE
                | RDMA_CM_EVENT_DISCONNECTED
                | RDMA_CM_EVENT_DEVICE_REMOVAL
                | RDMA_CM_EVENT_TIMEWAIT_EXIT => {
                    // Ack before any teardown, matching the upstream
                    // discipline of acking a disconnect event before
                    // `rdma_destroy_id` runs.
                    // SAFETY: same as above.
                    unsafe { rdma_ack_cm_event(event) };
                    self.handle_disconnect(id, on_established_disconnect);
                }
                other => {
                    log::debug!("unhandled acceptor CM event {other}");
                    // SAFETY: same as above.
                    unsafe { rdma_ack_cm_event(event) };
                }
            }
        }
    }

    fn handle_connect_request(&mut self, event: &rdma_cm_event) -> Result<(), TransportError> {
        let cm_id = event.id;
        // SAFETY: `event.param` is a union of `conn`/`ud`; `CONNECT_REQUEST`
        // events populate the `conn` variant.
        let rdma_param = unsafe { event.param.conn };

        let depths = match negotiate_depths(&self.config, cm_id, &rdma_param) {
            Ok(d) => d,
            Err(e) => {
                self.reject(cm_id, NvmeStatusCode::SglDescriptorTypeInvalid);
                return Err(e);
            }
        };

        let conn = match QueuePair::new(
            cm_id,
            depths.max_queue_depth,
            depths.max_rw_depth,
            self.config.max_io_size,
            self.config.in_capsule_data_size,
        ) {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("queue pair construction failed during CONNECT: {e}");
                self.reject(cm_id, NvmeStatusCode::SglDescriptorTypeInvalid);
                return Err(e);
            }
        };

        tag_cm_id(cm_id, &conn);
        self.pending.push(conn.clone());

        let accept_data = RdmaCmRep {
            recfmt: 0,
            crqsize: depths.max_queue_depth,
            _reserved: [0; 28],
        };
        let mut conn_param = rdma_param;
        conn_param.private_data = &accept_data as *const RdmaCmRep as *const c_void;
        conn_param.private_data_len = std::mem::size_of::<RdmaCmRep>() as u8;
        if event_is_tcp(cm_id) {
            conn_param.responder_resources = 0;
            conn_param.initiator_depth = depths.max_rw_depth as u8;
        }

        // SAFETY: FFI; `conn_param` and the `accept_data` it points into
        // live for the duration of this call.
        let ret = unsafe { rdma_accept(cm_id, &conn_param) };
        if let Err(e) = from_c_ret(ret) {
            log::warn!("rdma_accept failed: {e}");
            self.pending.retain(|c| !Rc::ptr_eq(c, &conn));
            conn.borrow_mut().destroy();
            return Err(TransportError::Io(e));
        }

        log::debug!(
            "accepted connection, negotiated queue depth {} rw depth {}",
            depths.max_queue_depth,
            depths.max_rw_depth
        );
        Ok(())
    }

    fn reject(&self, cm_id: *mut rdma_cm_id, sc: NvmeStatusCode) {
        let reject_data = RdmaCmRej {
            status: RejectStatus { sc: sc as u16 },
        };
        // SAFETY: FFI; `reject_data` lives for the duration of the call.
        unsafe {
            rdma_reject(
                cm_id,
                &reject_data as *const RdmaCmRej as *const c_void,
                std::mem::size_of::<RdmaCmRej>() as u8,
            )
        };
    }

    fn handle_disconnect(&mut self, cm_id: *mut rdma_cm_id, on_established_disconnect: &mut dyn FnMut(ConnHandle)) {
        // SAFETY: `cm_id` is either untagged or tagged by `tag_cm_id` with a
        // still-alive handle, since the tagging connection's `QueuePair`
        // owns `cm_id` for its entire lifetime.
        let Some(conn) = (unsafe { conn_handle_from_cm_id(cm_id) }) else {
            log::debug!("disconnect event for an untagged cm_id");
            return;
        };

        let has_session = conn.borrow().session().is_some();
        if has_session {
            on_established_disconnect(conn);
        } else {
            self.pending.retain(|c| !Rc::ptr_eq(c, &conn));
            conn.borrow_mut().destroy();
        }
    }

    /// Tear the acceptor down: destroy every still-pending connection, then
    /// the listening id and event channel (spec §4.G `acceptor_fini`).
    pub fn fini(mut self) {
        self.destroy();
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        for conn in self.pending.drain(..) {
            conn.borrow_mut().destroy();
        }
        // SAFETY: both are exclusively owned by this acceptor and have not
        // been destroyed before (guarded by `destroyed`).
        unsafe {
            rdma_destroy_id(self.listen_id);
            rdma_destroy_event_channel(self.channel);
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn event_is_tcp(cm_id: *mut rdma_cm_id) -> bool {
    // SAFETY: `cm_id` is a valid, live `rdma_cm_id` for the duration of
    // event processing.
    unsafe { (*cm_id).ps == rdma_port_space::RDMA_PS_TCP }
}
