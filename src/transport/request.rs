//! Per-request state machine (spec §4.C).

use super::capsule::{ParsedSgl, TransferDirection};
use super::error::NvmeStatusCode;
use super::pool::BounceChunk;

/// Lifecycle state of one request slot, named after the transitions table
/// in spec §4.C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Slot is free; its RECV has not yet completed.
    Idle,
    /// RECV completed; SGL not yet classified.
    Parsed,
    /// Classified, no data transfer blocked on a resource; ready for the
    /// executor (if not already handed off) or for RDMA submission.
    Ready,
    /// Waiting on `pending_data_buf_queue` for a session bounce buffer.
    WaitBuf,
    /// RDMA Read in flight (pulling host data in before execution).
    XferIn,
    /// Waiting on `pending_rdma_rw_queue` for RW-depth budget.
    WaitRw,
    /// Handed to the (out-of-scope) executor; awaiting `req_complete`.
    Exec,
    /// RDMA Write in flight (pushing result data out after execution).
    XferOut,
    /// All data transfer done; assembling/sending the completion capsule.
    Completing,
}

/// Which pending queue, if any, a request currently occupies. Spec
/// invariant 3: a request is in at most one of these at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingQueue {
    None,
    DataBuf,
    RdmaRw,
}

/// Per-slot request bookkeeping. Bound to a fixed slot index within a
/// [`super::queue_pair::QueuePair`]; the three capsule/buffer slots
/// themselves live in [`super::pool::QpArrays`] and are looked up by the
/// same index rather than referenced directly, which is this crate's
/// rendering of spec §9's "opaque `wr_id`... becomes an explicit
/// request-slot index" redesign note.
pub struct Request {
    pub slot: u16,
    pub state: RequestState,
    pub cid: u16,
    pub dir: TransferDirection,
    pub status: NvmeStatusCode,

    /// Resolved remote address/rkey for a keyed SGL, set during parsing and
    /// consumed when the RDMA Read/Write is actually submitted.
    pub remote: Option<(u64, u32)>,
    /// Total payload length for this command (0 if none).
    pub length: u32,
    /// In-capsule offset for the `OFFSET` SGL subtype; `None` for keyed
    /// transfers or no-data commands.
    pub in_capsule_offset: Option<u32>,

    /// Bounce buffer held by this request, if its payload exceeded
    /// `in_capsule_data_size`. Spec invariant 4: present iff a chunk was
    /// taken and not yet returned.
    pub bounce: Option<BounceChunk>,

    pub pending_queue: PendingQueue,

    /// Set by `req_release` (hard reset): skip straight to the post-SEND
    /// ack path without invoking any further callbacks.
    pub released: bool,
}

impl Request {
    pub fn new(slot: u16) -> Self {
        Self {
            slot,
            state: RequestState::Idle,
            cid: 0,
            dir: TransferDirection::None,
            status: NvmeStatusCode::Success,
            remote: None,
            length: 0,
            in_capsule_offset: None,
            bounce: None,
            pending_queue: PendingQueue::None,
            released: false,
        }
    }

    /// Reset to `Idle` for slot reuse, per the COMPLETING→IDLE transition.
    pub fn reset(&mut self) {
        debug_assert!(self.bounce.is_none(), "bounce buffer leaked on reset");
        self.state = RequestState::Idle;
        self.dir = TransferDirection::None;
        self.status = NvmeStatusCode::Success;
        self.remote = None;
        self.length = 0;
        self.in_capsule_offset = None;
        self.pending_queue = PendingQueue::None;
        self.released = false;
    }

    /// Apply the outcome of SGL parsing, entering `Parsed` with enough
    /// state to classify a transfer plan. Call sites resolve
    /// [`ParsedSgl`] into the direction-aware fields here because the SGL
    /// itself does not say whether the command is a host-to-controller
    /// write or controller-to-host read (that comes from the opcode).
    pub fn apply_parsed_sgl(&mut self, parsed: ParsedSgl, dir_if_nonzero: TransferDirection) {
        self.state = RequestState::Parsed;
        match parsed {
            ParsedSgl::Empty => {
                self.dir = TransferDirection::None;
                self.length = 0;
            }
            ParsedSgl::Keyed { addr, length, rkey } => {
                self.dir = dir_if_nonzero;
                self.length = length;
                self.remote = Some((addr, rkey));
            }
            ParsedSgl::InCapsule { offset, length } => {
                self.dir = dir_if_nonzero;
                self.length = length;
                self.in_capsule_offset = Some(offset);
            }
        }
    }

    pub fn fail(&mut self, status: NvmeStatusCode) {
        self.state = RequestState::Parsed;
        self.dir = TransferDirection::None;
        self.status = status;
    }
}
