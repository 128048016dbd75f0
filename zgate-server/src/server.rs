//! Accept loop and per-connection worker threads.

use crate::conf;
use crate::session::Session;

use ipnet::IpNet;
use zcatalog::Catalog;

use std::net::{IpAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read timeout on session sockets, so workers notice the shutdown
/// flag.
const SESSION_READ_TIMEOUT: Duration = Duration::from_secs(1);

pub struct ZServer {
    tcp_listener: TcpListener,
    catalog: Arc<dyn Catalog>,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    session_counter: usize,
}

impl ZServer {
    pub fn new(
        tcp_listener: TcpListener,
        catalog: Arc<dyn Catalog>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        ZServer {
            tcp_listener,
            catalog,
            shutdown,
            workers: Vec::new(),
            session_counter: 0,
        }
    }

    /// Accept connections until the shutdown flag is raised or the
    /// listener dies.  One thread per accepted connection.
    pub fn run(mut self) -> Result<(), String> {
        self.tcp_listener
            .set_nonblocking(true)
            .map_err(|e| format!("listener setup failed: {e}"))?;

        log::info!(
            "server listening on {}",
            self.tcp_listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                log::info!("shutdown flag set; leaving accept loop");
                break;
            }

            let (tcp_stream, peer_addr) = match self.tcp_listener.accept() {
                Ok(parts) => parts,
                Err(e) => match e.kind() {
                    std::io::ErrorKind::WouldBlock => {
                        // Nothing to process; do some housekeeping.
                        self.reap_workers();
                        std::thread::sleep(ACCEPT_POLL_INTERVAL);
                        continue;
                    }
                    _ => return Err(format!("accept() failed: {e}")),
                },
            };

            if !addr_allowed(&peer_addr.ip(), &conf::global().allowed_ips) {
                // Silent rejection; the peer just sees a closed socket.
                log::warn!("rejecting connection from {peer_addr}");
                continue;
            }

            self.session_counter += 1;
            let session_id = self.session_counter;

            // Undo the listener's non-blocking mode on the accepted
            // socket, then bound reads so the worker can observe
            // shutdown.
            if let Err(e) = tcp_stream
                .set_nonblocking(false)
                .and_then(|_| tcp_stream.set_read_timeout(Some(SESSION_READ_TIMEOUT)))
            {
                log::error!("cannot configure client socket: {e}");
                continue;
            }

            let catalog = self.catalog.clone();
            let shutdown = self.shutdown.clone();

            let handle = std::thread::spawn(move || {
                let mut session =
                    Session::new(session_id, tcp_stream, peer_addr, catalog, shutdown);

                if let Err(e) = session.listen() {
                    log::error!("{session} exited unexpectedly: {e}");
                }

                // Attempt to shut down the TCP stream regardless of
                // how the conversation ended.
                session.shutdown();
            });

            self.workers.push(handle);
        }

        // Give active sessions a moment to notice the flag and leave.
        for handle in self.workers.drain(..) {
            handle.join().ok();
        }

        Ok(())
    }

    /// Drop handles for workers that have already finished.
    fn reap_workers(&mut self) {
        let mut active = Vec::new();
        for handle in self.workers.drain(..) {
            if handle.is_finished() {
                handle.join().ok();
            } else {
                active.push(handle);
            }
        }
        self.workers = active;
    }
}

/// True when the whitelist is empty or some network contains the
/// address.
pub fn addr_allowed(addr: &IpAddr, allowed: &[IpNet]) -> bool {
    allowed.is_empty() || allowed.iter().any(|net| net.contains(addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_allowed() {
        let nets: Vec<IpNet> = vec!["10.0.0.0/8".parse().unwrap(), "::1/128".parse().unwrap()];

        assert!(addr_allowed(&"10.9.8.7".parse().unwrap(), &nets));
        assert!(addr_allowed(&"::1".parse().unwrap(), &nets));
        assert!(!addr_allowed(&"192.168.0.1".parse().unwrap(), &nets));

        // Empty whitelist allows everyone.
        assert!(addr_allowed(&"192.168.0.1".parse().unwrap(), &[]));
    }
}
