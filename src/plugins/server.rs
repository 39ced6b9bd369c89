//! TCP server for external plugins
//!
//! Runs on its own tokio runtime so the rest of the crate stays synchronous.
//! Three kinds of tasks share a broadcast channel of encoded lines:
//!
//! - the accept loop, spawning one task per client
//! - client tasks, writing every broadcast line and forwarding whatever the
//!   client sends to [`PluginServer::incoming`]
//! - the batch task, flushing registered frames every batch interval

use crate::config::PluginSettings;
use crate::error::{Result, SerialVisError};
use crate::plugins::protocol::{encode_frames, encode_raw};
use crate::types::Frame;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{broadcast, watch};

/// Lines buffered per client before it starts missing messages
const CLIENT_BACKLOG: usize = 1024;
const READ_BUFFER_SIZE: usize = 4096;

type Line = Arc<String>;

/// Cloneable producer side of the server
#[derive(Debug, Clone)]
pub struct PluginHandle {
    frames_tx: Sender<Frame>,
    lines_tx: broadcast::Sender<Line>,
}

impl PluginHandle {
    /// Queue a frame for the next batch
    pub fn register_frame(&self, frame: &Frame) {
        if self.lines_tx.receiver_count() == 0 {
            return;
        }
        let _ = self.frames_tx.send(frame.clone());
    }

    /// Send raw device bytes to all clients right away
    pub fn send_raw(&self, bytes: &[u8]) {
        if self.lines_tx.receiver_count() == 0 {
            return;
        }
        let _ = self.lines_tx.send(Arc::new(encode_raw(bytes)));
    }

    /// Number of connected clients
    pub fn client_count(&self) -> usize {
        self.lines_tx.receiver_count()
    }
}

/// A running plugin server
pub struct PluginServer {
    runtime: Option<Runtime>,
    local_addr: SocketAddr,
    handle: PluginHandle,
    incoming_rx: Receiver<Vec<u8>>,
    shutdown_tx: watch::Sender<bool>,
}

impl PluginServer {
    /// Bind the listener and start serving
    pub fn start(settings: &PluginSettings) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("serialvis-plugins")
            .enable_all()
            .build()?;

        let listener = runtime
            .block_on(TcpListener::bind(settings.bind_address.as_str()))
            .map_err(|e| {
                SerialVisError::Io(e).with_context(format!(
                    "Failed to bind plugin server to {}",
                    settings.bind_address
                ))
            })?;
        let local_addr = listener.local_addr()?;

        let (lines_tx, _) = broadcast::channel::<Line>(CLIENT_BACKLOG);
        let (frames_tx, frames_rx) = unbounded();
        let (incoming_tx, incoming_rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        runtime.spawn(accept_loop(
            listener,
            lines_tx.clone(),
            incoming_tx,
            shutdown_rx.clone(),
        ));
        runtime.spawn(batch_loop(
            settings.batch_interval(),
            frames_rx,
            lines_tx.clone(),
            shutdown_rx,
        ));

        tracing::info!("Plugin server listening on {}", local_addr);
        Ok(Self {
            runtime: Some(runtime),
            local_addr,
            handle: PluginHandle {
                frames_tx,
                lines_tx,
            },
            incoming_rx,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn handle(&self) -> PluginHandle {
        self.handle.clone()
    }

    /// Bytes written by plugins, to be forwarded to the device
    pub fn incoming(&self) -> &Receiver<Vec<u8>> {
        &self.incoming_rx
    }

    pub fn client_count(&self) -> usize {
        self.handle.client_count()
    }

    /// Stop all tasks and close client connections
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_millis(500));
            tracing::info!("Plugin server on {} stopped", self.local_addr);
        }
    }
}

impl Drop for PluginServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    lines_tx: broadcast::Sender<Line>,
    incoming_tx: Sender<Vec<u8>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::info!("Plugin client connected: {}", peer);
                    tokio::spawn(serve_client(
                        stream,
                        peer,
                        lines_tx.subscribe(),
                        incoming_tx.clone(),
                        shutdown_rx.clone(),
                    ));
                }
                Err(e) => tracing::warn!("Plugin accept failed: {}", e),
            },
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn serve_client(
    stream: TcpStream,
    peer: SocketAddr,
    mut lines_rx: broadcast::Receiver<Line>,
    incoming_tx: Sender<Vec<u8>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            line = lines_rx.recv() => match line {
                Ok(line) => {
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        tracing::debug!("Plugin client {} write failed: {}", peer, e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Plugin client {} missed {} messages", peer, missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    let _ = incoming_tx.send(buf[..n].to_vec());
                }
                Err(e) => {
                    tracing::debug!("Plugin client {} read failed: {}", peer, e);
                    break;
                }
            },
            _ = shutdown_rx.changed() => break,
        }
    }

    tracing::info!("Plugin client disconnected: {}", peer);
}

async fn batch_loop(
    period: Duration,
    frames_rx: Receiver<Frame>,
    lines_tx: broadcast::Sender<Line>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frames: Vec<Frame> = frames_rx.try_iter().collect();
                if frames.is_empty() || lines_tx.receiver_count() == 0 {
                    continue;
                }
                tracing::trace!("Sending batch of {} frames to plugins", frames.len());
                let _ = lines_tx.send(Arc::new(encode_frames(&frames)));
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}
