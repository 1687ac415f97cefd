//! The per-connection queue pair: its creation over an accepted `rdma_cm_id`
//! (spec §4.B), the request state machine driving RECV/SEND/RDMA Read/Write
//! posting (spec §4.C), and the pending-queue drains that resume parked
//! requests (spec §4.D, §4.E).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};
use std::rc::{Rc, Weak};

use crate::bindings::{
    ibv_qp, ibv_qp_cap, ibv_qp_init_attr, ibv_recv_wr, ibv_send_wr, ibv_post_recv, ibv_post_send,
    rdma_cm_id, rdma_create_qp, rdma_destroy_id, rdma_destroy_qp,
};
use crate::rdma::context::{Context, IbvContext};
use crate::rdma::cq::Cq;
use crate::rdma::mr::{MrRemote, MrSlice, Slicing};
use crate::rdma::pd::Pd;
use crate::rdma::qp::QpType;
use crate::rdma::wr::{RecvWr, SendWr, SendWrDetails};
use crate::utils::interop::from_c_ret;

use super::capsule::{parse_sgl, CommandCapsule, TransferDirection};
use super::error::{NvmeStatusCode, TransportError};
use super::exec::{ConnHandle, NvmfRequest, RequestData};
use super::poller::CqKind;
use super::pool::QpArrays;
use super::request::{PendingQueue, Request, RequestState};
use super::session::SessionTrCtx;

/// `max_send_sge`/`max_recv_sge` this transport asks for: one SGE per SEND
/// or RDMA Read/Write (the completion capsule or a single contiguous data
/// buffer), two per RECV (the command capsule half and the in-capsule data
/// half).
const TX_SGE: u32 = 1;
const RX_SGE: u32 = 2;

/// Derive a command's data transfer direction from its opcode's low two
/// bits, per the NVMe base spec's data-transfer encoding. SGL parsing
/// ([`parse_sgl`]) deliberately does not do this itself (capsule.rs's
/// `parse_sgl` takes direction as an input), so the one call site that needs
/// it lives here, next to where RECV completions are first classified.
fn data_direction(opcode: u8) -> TransferDirection {
    match opcode & 0x3 {
        0b01 => TransferDirection::HostToCtrl,
        0b10 => TransferDirection::CtrlToHost,
        _ => TransferDirection::None,
    }
}

/// One accepted RDMA connection: a queue pair plus its registered arrays,
/// request slots, and admission-control bookkeeping (spec §4.A-§4.E).
pub struct QueuePair {
    cm_id: *mut rdma_cm_id,
    qp: *mut ibv_qp,
    scq: Cq,
    rcq: Cq,
    pd: Pd,
    arrays: QpArrays,
    requests: Vec<Request>,

    max_queue_depth: u16,
    max_rw_depth: u16,
    in_capsule_data_size: u32,
    max_io_size: u32,

    cur_queue_depth: u16,
    cur_rdma_rw_depth: u16,
    sq_head: u16,
    sq_head_max: u16,

    pending_data_buf_queue: VecDeque<u16>,
    pending_rdma_rw_queue: VecDeque<u16>,

    session: Option<Rc<SessionTrCtx>>,
    self_weak: Weak<RefCell<QueuePair>>,
    destroyed: bool,
}

impl QueuePair {
    /// Build a queue pair over an accepted (but not yet `rdma_accept`ed)
    /// `rdma_cm_id`, per spec §4.B. Registers its arrays against a PD
    /// allocated for the connection's device and posts one RECV per slot.
    pub fn new(
        cm_id: *mut rdma_cm_id,
        max_queue_depth: u16,
        max_rw_depth: u16,
        max_io_size: u32,
        in_capsule_data_size: u32,
    ) -> Result<ConnHandle, TransportError> {
        let fail = |e: io::Error| TransportError::QueuePairCreation(e.to_string());

        // SAFETY: `cm_id` came from a CONNECT_REQUEST event; librdmacm has
        // already populated `verbs` by the time that event is delivered.
        let raw_ctx = unsafe { (*cm_id).verbs };
        let raw_ctx = NonNull::new(raw_ctx).ok_or_else(|| {
            TransportError::QueuePairCreation("cm_id has no verbs context".to_owned())
        })?;
        let ibv_ctx = IbvContext::from(raw_ctx);
        let attr = ibv_ctx.query_device().map_err(fail)?;

        // `Context::drop` closes the device, which would be wrong here: this
        // context is opened and owned by librdmacm, and is closed by
        // `rdma_destroy_id`, not by us. Wrapping it in `ManuallyDrop` lets
        // this module reuse `Pd::new`/`Cq::new`/`Mr::reg` (and their Arc
        // bookkeeping) without taking on a close we must not perform; the
        // price is one permanently un-decremented `Arc` strong count per
        // connection, not a leaked `ibv_context`.
        let ctx = ManuallyDrop::new(Context::new(ibv_ctx, attr));

        let pd = Pd::new(&ctx).map_err(fail)?;
        let scq = Cq::new(&ctx, 2 * max_queue_depth as u32).map_err(fail)?;
        let rcq = Cq::new(&ctx, max_queue_depth as u32).map_err(fail)?;

        // SAFETY: zero-initializing `ibv_qp_init_attr` is valid; every field
        // this transport cares about is set explicitly below.
        let mut init_attr: ibv_qp_init_attr = unsafe { std::mem::zeroed() };
        init_attr.send_cq = scq.as_raw();
        init_attr.recv_cq = rcq.as_raw();
        init_attr.cap = ibv_qp_cap {
            max_send_wr: 2 * max_queue_depth as u32,
            max_recv_wr: max_queue_depth as u32,
            max_send_sge: TX_SGE,
            max_recv_sge: RX_SGE,
            max_inline_data: 0,
        };
        init_attr.qp_type = u32::from(QpType::Rc);
        init_attr.sq_sig_all = 0;

        // SAFETY: FFI; `cm_id` and `pd` are valid for the duration of this call.
        let ret = unsafe { rdma_create_qp(cm_id, pd.as_raw(), &mut init_attr) };
        from_c_ret(ret).map_err(fail)?;

        // SAFETY: `rdma_create_qp` just populated `cm_id->qp` on success.
        let qp = unsafe { (*cm_id).qp };

        let arrays = QpArrays::new(&pd, max_queue_depth, in_capsule_data_size).map_err(fail)?;
        let requests = (0..max_queue_depth).map(Request::new).collect();

        let conn = Rc::new_cyclic(|weak| {
            RefCell::new(QueuePair {
                cm_id,
                qp,
                scq,
                rcq,
                pd,
                arrays,
                requests,
                max_queue_depth,
                max_rw_depth,
                in_capsule_data_size,
                max_io_size,
                cur_queue_depth: 0,
                cur_rdma_rw_depth: 0,
                sq_head: 0,
                sq_head_max: max_queue_depth.saturating_sub(1),
                pending_data_buf_queue: VecDeque::new(),
                pending_rdma_rw_queue: VecDeque::new(),
                session: None,
                self_weak: weak.clone(),
                destroyed: false,
            })
        });

        {
            let mut qp_mut = conn.borrow_mut();
            for i in 0..max_queue_depth {
                qp_mut.post_recv_slot(i).map_err(fail)?;
            }
        }

        Ok(conn)
    }

    #[inline]
    pub fn max_queue_depth(&self) -> u16 {
        self.max_queue_depth
    }

    #[inline]
    pub fn cur_queue_depth(&self) -> u16 {
        self.cur_queue_depth
    }

    /// Number of RECVs this tick's `drain_recv_cq` may consume, per spec
    /// §4.D: "capped so that the queue pair never admits more than
    /// `max_queue_depth` requests".
    #[inline]
    pub fn recv_budget(&self) -> u16 {
        self.max_queue_depth - self.cur_queue_depth
    }

    /// Attach the session-scoped bounce pool this queue pair's session
    /// negotiated (spec §4.G `session_init`).
    pub fn attach_session(&mut self, session: Rc<SessionTrCtx>) {
        self.session = Some(session);
    }

    pub fn session(&self) -> Option<&Rc<SessionTrCtx>> {
        self.session.as_ref()
    }

    /// The protection domain this connection's arrays and QP are registered
    /// against, needed by `session_init` to register the session-scoped
    /// bounce pool against the first connection's PD (spec §4.G).
    pub(crate) fn pd(&self) -> &Pd {
        &self.pd
    }

    fn conn_handle(&self) -> ConnHandle {
        self.self_weak
            .upgrade()
            .expect("queue pair self-handle dropped while still in use")
    }

    // ---- low-level posting -------------------------------------------

    fn post_raw_send(&self, wr: &ibv_send_wr) -> io::Result<()> {
        let mut bad_wr = ptr::null_mut();
        // SAFETY: FFI; `wr`'s SGL stays alive for the call via the caller's
        // borrow of the owning `SendWr`.
        let ret = unsafe { ibv_post_send(self.qp, wr as *const _ as *mut _, &mut bad_wr) };
        from_c_ret(ret)
    }

    fn post_raw_recv(&self, wr: &ibv_recv_wr) -> io::Result<()> {
        let mut bad_wr = ptr::null_mut();
        // SAFETY: FFI; `wr`'s SGL stays alive for the call via the caller's
        // borrow of the owning `RecvWr`.
        let ret = unsafe { ibv_post_recv(self.qp, wr as *const _ as *mut _, &mut bad_wr) };
        from_c_ret(ret)
    }

    /// Re-post the RECV for slot `i` (spec §4.A, P6: every RECV carries
    /// exactly two SGEs, one per registered array).
    fn post_recv_slot(&self, i: u16) -> io::Result<()> {
        let cmd_sge = self.arrays.cmd_sge(i);
        let buf_sge = self.arrays.buf_sge(i);
        let wr = RecvWr::new(&[cmd_sge, buf_sge], i as u64);
        self.post_raw_recv(&wr.to_wr())
    }

    fn post_send_completion(&self, i: u16) -> io::Result<()> {
        let cpl_sge = self.arrays.cpl_sge(i);
        let wr = SendWr::new(
            &[cpl_sge],
            i as u64,
            true,
            SendWrDetails::SendRc {
                imm: None,
                inline: false,
            },
        );
        self.post_raw_send(&wr.to_wr())
    }

    fn post_send_wr(&self, i: u16, local: &MrSlice<'_>, details: SendWrDetails<'_>) -> io::Result<()> {
        let wr = SendWr::new(std::slice::from_ref(local), i as u64, true, details);
        self.post_raw_send(&wr.to_wr())
    }

    /// Submit the RDMA Read (host-to-controller) or Write (controller-to-
    /// host) for a keyed request, against either the slot's own in-capsule
    /// buffer (small payload) or its session bounce chunk (large payload).
    fn post_rdma(&self, idx: u16) -> io::Result<()> {
        let req = &self.requests[idx as usize];
        let (addr, rkey) = req
            .remote
            .expect("rdma submission requires a keyed remote address");
        let length = req.length;
        let remote = MrRemote::new(addr, length as usize, rkey);
        let details = match req.dir {
            TransferDirection::HostToCtrl => SendWrDetails::Read { src: remote },
            TransferDirection::CtrlToHost => SendWrDetails::Write {
                dst: remote,
                imm: None,
            },
            TransferDirection::None => {
                unreachable!("rdma submission implies a keyed data direction")
            }
        };

        if let Some(chunk) = &req.bounce {
            let session = self
                .session
                .as_ref()
                .expect("bounce chunk implies an attached session");
            let pool_ref = session.pool().borrow();
            let local = pool_ref.chunk_sge(chunk, length);
            self.post_send_wr(idx, &local, details)
        } else {
            let mut local = self.arrays.buf_sge(idx);
            local.resize(length as usize);
            self.post_send_wr(idx, &local, details)
        }
    }

    // ---- request classification and dispatch --------------------------

    /// Build the [`NvmfRequest`] for slot `idx` and move it to `Exec`.
    fn hand_to_executor(&mut self, idx: u16) -> NvmfRequest {
        let length = self.requests[idx as usize].length as usize;
        let data = if let Some(chunk) = self.requests[idx as usize].bounce.as_ref() {
            let session = self
                .session
                .as_ref()
                .expect("bounce chunk implies an attached session");
            let pool_ref = session.pool().borrow();
            let slice = pool_ref.chunk_sge(chunk, length as u32);
            RequestData::new(NonNull::<u8>::from(slice).as_ptr(), length)
        } else if let Some(offset) = self.requests[idx as usize].in_capsule_offset {
            let slice = self.arrays.buf_sge_at(idx, offset, length as u32);
            RequestData::new(NonNull::<u8>::from(slice).as_ptr(), length)
        } else if length > 0 {
            // Small keyed transfer: bounced through the slot's own
            // in-capsule buffer rather than a session chunk.
            let mut slice = self.arrays.buf_sge(idx);
            slice.resize(length);
            RequestData::new(NonNull::<u8>::from(slice).as_ptr(), length)
        } else {
            RequestData::empty()
        };

        self.requests[idx as usize].state = RequestState::Exec;
        let dir = self.requests[idx as usize].dir;
        // SAFETY: the RECV for this slot completed before classification, so
        // its command capsule is initialized and not concurrently written.
        let cmd = unsafe { self.arrays.command(idx) };
        NvmfRequest::from_capsule(self.conn_handle(), idx, cmd, dir, data)
    }

    /// Submit the RDMA Read/Write for a `Ready` keyed request now, or park
    /// it on `pending_rdma_rw_queue` if RW-depth admission is exhausted
    /// (spec §4.D, §5 "never exceed `max_rw_depth` outstanding").
    fn submit_or_enqueue_rdma(&mut self, idx: u16) -> Result<(), TransportError> {
        if self.cur_rdma_rw_depth < self.max_rw_depth {
            self.post_rdma(idx).map_err(TransportError::Io)?;
            self.cur_rdma_rw_depth += 1;
            self.requests[idx as usize].state = match self.requests[idx as usize].dir {
                TransferDirection::HostToCtrl => RequestState::XferIn,
                _ => RequestState::XferOut,
            };
        } else {
            self.requests[idx as usize].state = RequestState::WaitRw;
            self.requests[idx as usize].pending_queue = PendingQueue::RdmaRw;
            self.pending_rdma_rw_queue.push_back(idx);
        }
        Ok(())
    }

    /// Classify a `Parsed` request and either hand it to the executor,
    /// submit its RDMA transfer, or park it on a pending queue, per the
    /// transition table in spec §4.C.
    fn classify_and_dispatch(
        &mut self,
        idx: u16,
        ready: &mut Vec<NvmfRequest>,
    ) -> Result<(), TransportError> {
        let keyed = self.requests[idx as usize].remote.is_some();
        if !keyed {
            // `TransferDirection::None` or an already-resident in-capsule
            // SGL: no RDMA transfer needed before execution.
            self.requests[idx as usize].state = RequestState::Ready;
            let req = self.hand_to_executor(idx);
            ready.push(req);
            return Ok(());
        }

        let needs_bounce = self.requests[idx as usize].bounce.is_none()
            && self.requests[idx as usize].length > self.in_capsule_data_size;
        if needs_bounce {
            let chunk = self
                .session
                .as_ref()
                .and_then(|s| s.pool().borrow_mut().take());
            match chunk {
                Some(chunk) => self.requests[idx as usize].bounce = Some(chunk),
                None => {
                    self.requests[idx as usize].state = RequestState::WaitBuf;
                    self.requests[idx as usize].pending_queue = PendingQueue::DataBuf;
                    self.pending_data_buf_queue.push_back(idx);
                    return Ok(());
                }
            }
        }

        self.requests[idx as usize].state = RequestState::Ready;
        if self.requests[idx as usize].dir == TransferDirection::HostToCtrl {
            self.submit_or_enqueue_rdma(idx)
        } else {
            let req = self.hand_to_executor(idx);
            ready.push(req);
            Ok(())
        }
    }

    /// Finish a request's lifecycle: release its bounce buffer (if any),
    /// advance `sq_head` exactly once, assemble the completion capsule, and
    /// re-post both the RECV and the completion SEND (spec §4.C,
    /// `COMPLETING` action).
    fn complete_request(&mut self, idx: u16) -> Result<(), TransportError> {
        self.requests[idx as usize].state = RequestState::Completing;
        if let Some(chunk) = self.requests[idx as usize].bounce.take() {
            if let Some(session) = &self.session {
                session.pool().borrow_mut().give_back(chunk);
            }
        }

        self.sq_head = if self.sq_head == self.sq_head_max {
            0
        } else {
            self.sq_head + 1
        };
        let status = self.requests[idx as usize].status;
        // SAFETY: the slot's prior RECV/SEND have both completed by the time
        // a request reaches `Completing`, so no other borrow is live.
        let cpl = unsafe { self.arrays.completion_mut(idx) };
        cpl.sqhd = self.sq_head;
        cpl.set_status(status);

        self.post_recv_slot(idx).map_err(TransportError::Io)?;
        self.post_send_completion(idx).map_err(TransportError::Io)?;
        Ok(())
    }

    /// Drain any requests parked on `pending_data_buf_queue` while a bounce
    /// buffer is available, re-entering classification for each (spec
    /// §4.D: "WAIT_BUF -> buffer freed -> PARSED -> re-classify").
    fn drain_pending_data_buf(&mut self, ready: &mut Vec<NvmfRequest>) -> Result<(), TransportError> {
        loop {
            let Some(&idx) = self.pending_data_buf_queue.front() else {
                break;
            };
            let chunk = match self
                .session
                .as_ref()
                .and_then(|s| s.pool().borrow_mut().take())
            {
                Some(chunk) => chunk,
                None => break,
            };
            self.pending_data_buf_queue.pop_front();
            self.requests[idx as usize].bounce = Some(chunk);
            self.requests[idx as usize].pending_queue = PendingQueue::None;
            self.classify_and_dispatch(idx, ready)?;
        }
        Ok(())
    }

    /// Drain any requests parked on `pending_rdma_rw_queue` while RW-depth
    /// budget is available.
    fn drain_pending_rdma_rw(&mut self) -> Result<(), TransportError> {
        while self.cur_rdma_rw_depth < self.max_rw_depth {
            let Some(idx) = self.pending_rdma_rw_queue.pop_front() else {
                break;
            };
            self.requests[idx as usize].pending_queue = PendingQueue::None;
            self.submit_or_enqueue_rdma(idx)?;
        }
        Ok(())
    }

    // ---- completion queue drains ---------------------------------------

    /// Drain the send CQ: SEND completions advance requests to `Idle`, RDMA
    /// Write completions finish the request, RDMA Read completions hand the
    /// request to the executor. Any non-success status or unexpected
    /// opcode is transport-fatal (spec §4.D, §7).
    pub(crate) fn drain_send_cq(&mut self) -> Result<Vec<NvmfRequest>, TransportError> {
        let mut ready = Vec::new();
        let wcs = self.scq.poll_some(self.scq.capacity()).map_err(TransportError::Io)?;
        for wc in wcs {
            let bytes_or_status = wc.ok();
            let idx = wc.wr_id() as u16;
            match bytes_or_status {
                Err(status) => {
                    return Err(TransportError::WorkCompletion(CqKind::Send, status));
                }
                Ok(_) => match wc.opcode() {
                    crate::WcOpcode::Send => {
                        self.requests[idx as usize].reset();
                        self.cur_queue_depth -= 1;
                    }
                    crate::WcOpcode::RdmaWrite => {
                        self.cur_rdma_rw_depth -= 1;
                        self.complete_request(idx)?;
                    }
                    crate::WcOpcode::RdmaRead => {
                        self.cur_rdma_rw_depth -= 1;
                        let req = self.hand_to_executor(idx);
                        ready.push(req);
                    }
                    opcode => {
                        return Err(TransportError::UnexpectedOpcode(opcode, CqKind::Send));
                    }
                },
            }
            self.drain_pending_rdma_rw()?;
        }
        Ok(ready)
    }

    /// Drain up to `budget` RECVs off the recv CQ, parsing and classifying
    /// each newly-arrived command (spec §4.D: "capped so the queue pair
    /// never admits more than `max_queue_depth` requests").
    pub(crate) fn drain_recv_cq(&mut self, budget: u16) -> Result<Vec<NvmfRequest>, TransportError> {
        let mut ready = Vec::new();
        if budget == 0 {
            return Ok(ready);
        }
        let wcs = self
            .rcq
            .capacity()
            .min(budget as u32)
            .pipe(|n| self.rcq.poll_some(n))
            .map_err(TransportError::Io)?;
        for wc in wcs {
            match wc.ok() {
                Err(status) => return Err(TransportError::WorkCompletion(CqKind::Recv, status)),
                Ok(bytes) => {
                    if wc.opcode() != crate::WcOpcode::Recv {
                        return Err(TransportError::UnexpectedOpcode(wc.opcode(), CqKind::Recv));
                    }
                    let idx = wc.wr_id() as u16;
                    if bytes < super::capsule::CAPSULE_HEADER_SIZE {
                        return Err(TransportError::WorkCompletion(
                            CqKind::Recv,
                            crate::WcStatus::LocLenErr,
                        ));
                    }
                    self.cur_queue_depth += 1;
                    // SAFETY: this RECV just completed; the command capsule
                    // it wrote is fully initialized and exclusively ours
                    // until classification hands it off.
                    let cmd: CommandCapsule = unsafe { *self.arrays.command(idx) };
                    // SAFETY: same slot, same completed RECV.
                    unsafe { self.arrays.completion_mut(idx).reset(cmd.cid) };

                    let dir = data_direction(cmd.opcode);
                    let req = &mut self.requests[idx as usize];
                    req.cid = cmd.cid;
                    match parse_sgl(&cmd.sgl, self.in_capsule_data_size, self.max_io_size) {
                        Ok(parsed) => req.apply_parsed_sgl(parsed, dir),
                        Err(status) => req.fail(status),
                    }
                    self.classify_and_dispatch(idx, &mut ready)?;
                }
            }
        }
        self.drain_pending_data_buf(&mut ready)?;
        Ok(ready)
    }

    // ---- executor callbacks --------------------------------------------

    /// `req_complete`: the executor finished running slot `idx` with
    /// `status`. Controller-to-host commands push their result out via RDMA
    /// Write before completing; everything else completes immediately
    /// (spec §4.C `EXEC` row).
    pub(crate) fn req_complete(
        &mut self,
        idx: u16,
        status: NvmeStatusCode,
    ) -> Result<(), TransportError> {
        self.requests[idx as usize].status = status;
        if status.is_success() && self.requests[idx as usize].dir == TransferDirection::CtrlToHost
        {
            self.submit_or_enqueue_rdma(idx)
        } else {
            self.complete_request(idx)
        }
    }

    /// `req_release`: a hard reset or forced teardown is discarding this
    /// request. Skips the RECV repost and completion SEND entirely (the
    /// connection is going away, so nothing will ever read them) and only
    /// undoes the admission-control accounting. Idempotent (spec R2).
    pub(crate) fn req_release(&mut self, idx: u16) {
        let req = &mut self.requests[idx as usize];
        if req.released {
            return;
        }
        req.released = true;
        let bounce = req.bounce.take();
        let pending_queue = req.pending_queue;
        if let PendingQueue::DataBuf = pending_queue {
            self.pending_data_buf_queue.retain(|&i| i != idx);
        } else if let PendingQueue::RdmaRw = pending_queue {
            self.pending_rdma_rw_queue.retain(|&i| i != idx);
        }
        if let Some(chunk) = bounce {
            if let Some(session) = &self.session {
                session.pool().borrow_mut().give_back(chunk);
            }
        }
        if self.cur_queue_depth > 0 {
            self.cur_queue_depth -= 1;
        }
    }

    /// Tear the queue pair down: destroy the QP and the CM identifier.
    /// Idempotent (spec §4.F connection teardown may be triggered by either
    /// a CM event or a fatal poll result).
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        // SAFETY: `cm_id`/its QP are exclusively owned by this queue pair,
        // and have not been destroyed before (guarded by `destroyed`).
        unsafe {
            rdma_destroy_qp(self.cm_id);
            rdma_destroy_id(self.cm_id);
        }
    }
}

impl Drop for QueuePair {
    fn drop(&mut self) {
        self.destroy();
    }
}

trait Pipe: Sized {
    fn pipe<T>(self, f: impl FnOnce(Self) -> T) -> T {
        f(self)
    }
}
impl Pipe for u32 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_direction_decodes_low_bits() {
        assert_eq!(data_direction(0b00), TransferDirection::None);
        assert_eq!(data_direction(0b01), TransferDirection::HostToCtrl);
        assert_eq!(data_direction(0b10), TransferDirection::CtrlToHost);
        // Bidirectional transfers are out of scope for this core; treat as
        // no transport-managed transfer.
        assert_eq!(data_direction(0b11), TransferDirection::None);
    }

    #[test]
    fn sq_head_wraps_at_max() {
        let mut sq_head: u16 = 127;
        let sq_head_max: u16 = 127;
        sq_head = if sq_head == sq_head_max { 0 } else { sq_head + 1 };
        assert_eq!(sq_head, 0);
    }
}
