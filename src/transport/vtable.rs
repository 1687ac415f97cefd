//! The transport's stable interface (spec §4.G): the functions and the
//! process-wide [`Transport`] singleton the out-of-scope session/subsystem
//! layer drives this crate through.
//!
//! Named after the `struct spdk_nvmf_transport_ops` vtable this core's
//! upstream counterpart registers itself under: `transport_init`,
//! `transport_fini`, `acceptor_init`/`_poll`/`_fini`, `session_init`/`_fini`,
//! `req_complete`, `req_release`, `conn_poll`, `conn_fini`,
//! `listen_addr_discover`. This crate models that vtable as a mix of
//! methods on [`Transport`] (anything that needs the transport's own state)
//! and free functions (anything that only needs a connection or request
//! handle, since those already carry everything required).

use crate::rdma::nic::IbvDeviceList;

use super::acceptor::Acceptor;
use super::config::TransportConfig;
use super::error::{NvmeStatusCode, TransportError};
use super::exec::{CommandExecutor, ConnHandle, NvmfRequest};
use super::session::{SessionHandle, SessionTrCtx};

/// Fixed field widths NVMe-oF discovery log entries use for ASCII transport
/// address fields (spec §6 "fixed-width NUL-padded ASCII `trsvcid`/`traddr`
/// fields").
pub const DISCOVERY_TRADDR_LEN: usize = 256;
pub const DISCOVERY_TRSVCID_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryTransportType {
    Rdma = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryAddressFamily {
    Ipv4 = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySecureChannel {
    NotSpecified = 0,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRdmaQpType {
    Reliable = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRdmaProviderType {
    None = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRdmaCms {
    RdmaCm = 1,
}

/// One RDMA discovery log page entry (spec §6).
pub struct DiscoveryEntry {
    pub trtype: DiscoveryTransportType,
    pub adrfam: DiscoveryAddressFamily,
    pub treq_secure_channel: DiscoverySecureChannel,
    pub trsvcid: [u8; DISCOVERY_TRSVCID_LEN],
    pub traddr: [u8; DISCOVERY_TRADDR_LEN],
    pub rdma_qptype: DiscoveryRdmaQpType,
    pub rdma_prtype: DiscoveryRdmaProviderType,
    pub rdma_cms: DiscoveryRdmaCms,
}

fn write_ascii_field(field: &mut [u8], s: &str) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(field.len());
    field[..n].copy_from_slice(&bytes[..n]);
}

/// `listen_addr_discover`: describe this transport's listening address as a
/// discovery log entry (spec §6).
pub fn listen_addr_discover(config: &TransportConfig) -> DiscoveryEntry {
    let mut entry = DiscoveryEntry {
        trtype: DiscoveryTransportType::Rdma,
        adrfam: DiscoveryAddressFamily::Ipv4,
        treq_secure_channel: DiscoverySecureChannel::NotSpecified,
        trsvcid: [0; DISCOVERY_TRSVCID_LEN],
        traddr: [0; DISCOVERY_TRADDR_LEN],
        rdma_qptype: DiscoveryRdmaQpType::Reliable,
        rdma_prtype: DiscoveryRdmaProviderType::None,
        rdma_cms: DiscoveryRdmaCms::RdmaCm,
    };
    write_ascii_field(&mut entry.trsvcid, &config.listen_port.to_string());
    write_ascii_field(&mut entry.traddr, &config.listen_addr.to_string());
    entry
}

/// `req_complete`: hand a finished result back to the transport so it can
/// post the completion (and, for controller-to-host transfers, the RDMA
/// Write that precedes it).
pub fn req_complete(req: NvmfRequest, status: NvmeStatusCode) -> Result<(), TransportError> {
    req.conn.borrow_mut().req_complete(req.slot, status)
}

/// `req_release`: discard a request without completing it (hard reset or
/// forced teardown). Idempotent (spec R2).
pub fn req_release(req: NvmfRequest) {
    req.conn.borrow_mut().req_release(req.slot);
}

/// `conn_poll`: drive one poll tick for a single connection.
pub fn conn_poll(conn: &ConnHandle, executor: &dyn CommandExecutor) -> Result<u32, TransportError> {
    super::poller::conn_poll(conn, executor)
}

/// `conn_fini`: tear a connection down. Idempotent.
pub fn conn_fini(conn: &ConnHandle) {
    conn.borrow_mut().destroy();
}

/// The process-wide transport instance: configuration, the number of RDMA
/// devices discovered at `transport_init` time, and the (optional, since it
/// is only started if at least one device exists) [`Acceptor`].
pub struct Transport {
    config: TransportConfig,
    devices_found: usize,
    acceptor: Option<Acceptor>,
}

impl Transport {
    /// `transport_init`: validate `config` and probe for RDMA devices.
    /// Returns a transport with no acceptor yet; call
    /// [`Transport::acceptor_init`] to start listening.
    pub fn init(config: TransportConfig) -> Result<Self, TransportError> {
        config
            .validate()
            .map_err(|e| TransportError::QueuePairCreation(e.to_string()))?;

        let devices_found = IbvDeviceList::new().map(|l| l.len()).unwrap_or(0);
        log::info!("transport init: {devices_found} RDMA device(s) found");

        Ok(Self {
            config,
            devices_found,
            acceptor: None,
        })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn devices_found(&self) -> usize {
        self.devices_found
    }

    /// `acceptor_init`: start listening, unless no RDMA device was found at
    /// `transport_init` time, in which case this is a no-op (there is
    /// nothing a listening socket could ever hand off to).
    pub fn acceptor_init(&mut self) -> Result<(), TransportError> {
        if self.devices_found == 0 {
            log::warn!("no RDMA devices found; acceptor not started");
            return Ok(());
        }
        self.acceptor = Some(Acceptor::init(&self.config)?);
        Ok(())
    }

    /// `acceptor_poll`: one acceptor poll tick, a no-op if the acceptor was
    /// never started. `on_established_connect` is called once per connection
    /// as it leaves the pre-CONNECT list (spec §4.F); the caller is
    /// responsible for folding it into steady-state polling from there.
    pub fn acceptor_poll(
        &mut self,
        executor: &dyn CommandExecutor,
        on_established_connect: &mut dyn FnMut(ConnHandle),
        on_established_disconnect: &mut dyn FnMut(ConnHandle),
    ) -> Result<(), TransportError> {
        match &mut self.acceptor {
            Some(acceptor) => {
                acceptor.poll(executor, on_established_connect, on_established_disconnect)
            }
            None => Ok(()),
        }
    }

    /// `acceptor_fini`: stop listening and destroy every still-pending
    /// connection.
    pub fn acceptor_fini(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.fini();
        }
    }

    /// `transport_fini`: tear the whole transport down. Consuming `self`
    /// drops the acceptor (if any), which tears itself down on `Drop`.
    pub fn transport_fini(self) {}

    /// `session_init`: register the session-scoped bounce pool against
    /// `first_conn`'s protection domain and install it into both the
    /// session's slot and the connection (spec §4.G).
    pub fn session_init(
        &self,
        session: &mut dyn SessionHandle,
        first_conn: &ConnHandle,
    ) -> Result<(), TransportError> {
        let trctx = {
            let qp = first_conn.borrow();
            SessionTrCtx::new(qp.pd(), self.config.max_queue_depth, self.config.max_io_size)
                .map_err(TransportError::Io)?
        };
        session.set_trctx(Some(trctx.clone()));
        first_conn.borrow_mut().attach_session(trctx);
        Ok(())
    }

    /// `session_fini`: drop the transport's reference to the session's
    /// bounce pool. The pool itself is freed once every connection that
    /// shared it has also let go of its `Rc`.
    pub fn session_fini(&self, session: &mut dyn SessionHandle) {
        session.set_trctx(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_config() -> TransportConfig {
        TransportConfig {
            max_queue_depth: 64,
            max_rw_depth: 16,
            max_io_size: 65536,
            in_capsule_data_size: 4096,
            listen_addr: Ipv4Addr::new(127, 0, 0, 1),
            listen_port: 4420,
        }
    }

    #[test]
    fn discovery_entry_pads_ascii_fields_with_nul() {
        let entry = listen_addr_discover(&test_config());
        assert_eq!(&entry.traddr[..9], b"127.0.0.1");
        assert_eq!(entry.traddr[9], 0);
        assert_eq!(&entry.trsvcid[..4], b"4420");
        assert_eq!(entry.trsvcid[4], 0);
    }
}
