//! Hand-declared `extern "C"` surface for `librdmacm`'s connection-manager
//! API (`<rdma/rdma_cma.h>`).
//!
//! The struct/enum types themselves (`rdma_cm_id`, `rdma_event_channel`,
//! `rdma_conn_param`, `rdma_cm_event`, `rdma_port_space`,
//! `rdma_cm_event_type`, and `rdma_cm_id`'s embedded `rdma_route`/`rdma_addr`)
//! are *not* hand-written: `build.rs` feeds `<rdma/rdma_cma.h>` through the
//! same `bindgen` pass that generates the `ibv_*` family from `verbs.h` (see
//! that file's header comment), so `rdma_cm_id.verbs`/`.qp`/`.pd` share the
//! exact same generated `ibv_context`/`ibv_qp`/`ibv_pd` types the rest of
//! this crate uses, and the struct's field order/offsets come straight from
//! the system header instead of being guessed. Only the function
//! signatures are declared here, since `bindgen` was not asked to generate
//! them (this crate already has its own calling convention for `from_c_ret`
//! et al.).

use libc::{c_int, c_void, sockaddr};

use super::{
    ibv_pd, ibv_qp_init_attr, rdma_cm_event, rdma_cm_id, rdma_conn_param, rdma_event_channel,
    rdma_port_space,
};

extern "C" {
    pub fn rdma_create_event_channel() -> *mut rdma_event_channel;
    pub fn rdma_destroy_event_channel(channel: *mut rdma_event_channel);

    pub fn rdma_create_id(
        channel: *mut rdma_event_channel,
        id: *mut *mut rdma_cm_id,
        context: *mut c_void,
        ps: rdma_port_space::Type,
    ) -> c_int;
    pub fn rdma_destroy_id(id: *mut rdma_cm_id) -> c_int;

    pub fn rdma_bind_addr(id: *mut rdma_cm_id, addr: *mut sockaddr) -> c_int;
    pub fn rdma_listen(id: *mut rdma_cm_id, backlog: c_int) -> c_int;

    pub fn rdma_get_cm_event(
        channel: *mut rdma_event_channel,
        event: *mut *mut rdma_cm_event,
    ) -> c_int;
    pub fn rdma_ack_cm_event(event: *mut rdma_cm_event) -> c_int;

    pub fn rdma_create_qp(
        id: *mut rdma_cm_id,
        pd: *mut ibv_pd,
        qp_init_attr: *mut ibv_qp_init_attr,
    ) -> c_int;
    pub fn rdma_destroy_qp(id: *mut rdma_cm_id);

    pub fn rdma_accept(id: *mut rdma_cm_id, conn_param: *const rdma_conn_param) -> c_int;
    pub fn rdma_reject(
        id: *mut rdma_cm_id,
        private_data: *const c_void,
        private_data_len: u8,
    ) -> c_int;
    pub fn rdma_disconnect(id: *mut rdma_cm_id) -> c_int;

    pub fn rdma_get_local_addr(id: *mut rdma_cm_id) -> *mut sockaddr;
    pub fn rdma_get_peer_addr(id: *mut rdma_cm_id) -> *mut sockaddr;

    pub fn rdma_getaddrinfo(
        node: *const libc::c_char,
        service: *const libc::c_char,
        hints: *const c_void,
        res: *mut *mut c_void,
    ) -> c_int;
}
