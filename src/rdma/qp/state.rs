use crate::bindings::*;

/// Queue pair state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QpState {
    /// Just created, before any `ibv_modify_qp` call.
    Reset,

    /// Ready to receive modify calls that set up addressing, but not yet
    /// able to send or receive any data.
    Init,

    /// Ready to receive. Addressing is resolved; the QP can receive.
    Rtr,

    /// Ready to send. The QP can both send and receive.
    Rts,

    /// Send queue drained.
    Sqd,

    /// Send queue error.
    Sqe,

    /// The QP has hit a fatal error and must be reset before reuse.
    Err,

    /// The reported state is not one of the known `ibv_qp_state` values.
    Unknown,
}

impl From<u32> for QpState {
    fn from(state: u32) -> Self {
        match state {
            ibv_qp_state::IBV_QPS_RESET => QpState::Reset,
            ibv_qp_state::IBV_QPS_INIT => QpState::Init,
            ibv_qp_state::IBV_QPS_RTR => QpState::Rtr,
            ibv_qp_state::IBV_QPS_RTS => QpState::Rts,
            ibv_qp_state::IBV_QPS_SQD => QpState::Sqd,
            ibv_qp_state::IBV_QPS_SQE => QpState::Sqe,
            ibv_qp_state::IBV_QPS_ERR => QpState::Err,
            _ => QpState::Unknown,
        }
    }
}

impl QpState {
    /// Determine whether the QP can post send work requests in this state.
    pub const fn can_send(self) -> bool {
        matches!(self, Self::Rts | Self::Sqd)
    }

    /// Determine whether the QP can post receive work requests in this state.
    pub const fn can_recv(self) -> bool {
        matches!(self, Self::Rtr | Self::Rts | Self::Sqd)
    }
}
