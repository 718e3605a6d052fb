//! Snapshot server answering gap-fill and replay requests

use crate::store::TradeStore;
use anyhow::{Context, Result};
use common::messages::{GAP_REQUEST_FILL, GAP_REQUEST_REPLAY_ALL};
use common::{GapRequest, StopFlag};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Poll interval for the non-blocking accept loop and the per-client
/// read timeout; bounds how long a stop request can go unnoticed.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Serves recovery clients over stream sockets, one thread per accepted
/// connection. A connection stays open for further requests until the
/// client closes it.
pub struct SnapshotServer {
    store: Arc<TradeStore>,
    listener: TcpListener,
    stop: StopFlag,
}

impl SnapshotServer {
    /// Bind the serving socket.
    pub fn bind(store: Arc<TradeStore>, port: u16, stop: StopFlag) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .with_context(|| format!("binding snapshot server on port {port}"))?;
        listener.set_nonblocking(true)?;
        info!("snapshot server listening on {}", listener.local_addr()?);
        Ok(Self {
            store,
            listener,
            stop,
        })
    }

    /// Address the server actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept and serve clients until stopped.
    pub fn run(&self) -> Result<()> {
        let mut clients: Vec<thread::JoinHandle<()>> = Vec::new();
        while !self.stop.is_stopped() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("snapshot client {peer} connected");
                    let store = Arc::clone(&self.store);
                    let stop = self.stop.clone();
                    clients.push(thread::spawn(move || {
                        if let Err(e) = serve_client(stream, &store, &stop) {
                            warn!("snapshot client {peer} failed: {e}");
                        } else {
                            info!("snapshot client {peer} disconnected");
                        }
                    }));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => warn!("snapshot accept failed: {e}"),
            }
        }
        for client in clients {
            let _ = client.join();
        }
        Ok(())
    }
}

/// Handle one client connection until it closes or the server stops.
fn serve_client(mut stream: TcpStream, store: &TradeStore, stop: &StopFlag) -> Result<()> {
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    let mut frame = [0u8; GapRequest::WIRE_SIZE];
    loop {
        if !read_frame(&mut stream, &mut frame, stop)? {
            return Ok(());
        }
        match GapRequest::decode(&frame) {
            Ok(request) if request.kind == GAP_REQUEST_FILL => {
                serve_gap(&mut stream, store, &request)?;
            }
            Ok(request) if request.kind == GAP_REQUEST_REPLAY_ALL => {
                info!("replaying all {} records", store.len());
                for record in store.records() {
                    stream.write_all(&record.encode())?;
                }
            }
            Ok(_) | Err(_) => {
                // Unknown request kinds are logged and ignored; the
                // connection stays usable.
                warn!("ignoring unknown snapshot request frame");
            }
        }
    }
}

/// Fill `frame` with the next request.
///
/// Returns `Ok(false)` on a clean disconnect or a stop request;
/// partial frames otherwise ride out read timeouts until complete.
fn read_frame(stream: &mut TcpStream, frame: &mut [u8], stop: &StopFlag) -> Result<bool> {
    let mut filled = 0;
    while filled < frame.len() {
        if stop.is_stopped() {
            return Ok(false);
        }
        match stream.read(&mut frame[filled..]) {
            Ok(0) => {
                if filled != 0 {
                    warn!("client closed inside a request frame ({filled} bytes)");
                }
                return Ok(false);
            }
            Ok(n) => filled += n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Stream the requested inclusive range back-to-back.
fn serve_gap(stream: &mut TcpStream, store: &TradeStore, request: &GapRequest) -> Result<()> {
    info!(
        "serving gap request [{}, {}]",
        request.start_seq, request.end_seq
    );
    if request.start_seq > request.end_seq || request.end_seq >= store.len() as u64 {
        warn!(
            "invalid gap request [{}, {}] against store of {}",
            request.start_seq,
            request.end_seq,
            store.len()
        );
        return Ok(());
    }
    for sequence in request.start_seq..=request.end_seq {
        let record = store
            .get(sequence as usize)
            .expect("validated range is inside the store");
        stream.write_all(&record.encode())?;
    }
    Ok(())
}
