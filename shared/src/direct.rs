//! Direct mode: one long-lived TCP connection carrying framed [`Message`]s.
//!
//! The socket is split into a writer task fed through an mpsc queue and a
//! reader task that forwards decoded messages as [`TransportEvent`]s. Either
//! side noticing the connection is gone reports [`TransportEvent::Closed`]
//! exactly once; nothing is retried.

use crate::codec::{encode_frame, FrameError, FrameReader};
use crate::error::NetplayError;
use crate::protocol::Message;
use crate::shutdown::{LoopHandle, Shutdown, ShutdownSignal};
use log::{debug, info, trace, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(Message),
    Closed(String),
}

/// Reports closure to the owner once, whichever task sees it first.
struct CloseLatch<E> {
    closed: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<E>,
}

impl<E> Clone for CloseLatch<E> {
    fn clone(&self) -> Self {
        Self {
            closed: Arc::clone(&self.closed),
            events: self.events.clone(),
        }
    }
}

impl<E: From<TransportEvent>> CloseLatch<E> {
    fn report(&self, reason: String) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Direct connection closed: {}", reason);
            let _ = self.events.send(E::from(TransportEvent::Closed(reason)));
        }
    }
}

pub struct DirectTransport {
    peer: SocketAddr,
    outgoing: mpsc::UnboundedSender<Message>,
    closed: Arc<AtomicBool>,
    shutdown: Shutdown,
    handles: Vec<LoopHandle>,
}

impl DirectTransport {
    /// Dials the host. Events arrive on the returned receiver.
    pub async fn connect(
        addr: SocketAddr,
        idle_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), NetplayError> {
        let stream = TcpStream::connect(addr).await?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Self::spawn(stream, idle_timeout, events_tx)?;
        Ok((transport, events_rx))
    }

    /// Takes over an established stream and starts its reader and writer.
    /// Events are converted into the owner's event type.
    pub fn spawn<E>(
        stream: TcpStream,
        idle_timeout: Duration,
        events: mpsc::UnboundedSender<E>,
    ) -> Result<Self, NetplayError>
    where
        E: From<TransportEvent> + Send + 'static,
    {
        let peer = stream.peer_addr()?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not disable Nagle for {}: {}", peer, e);
        }
        let (read_half, write_half) = stream.into_split();

        let closed = Arc::new(AtomicBool::new(false));
        let latch = CloseLatch {
            closed: Arc::clone(&closed),
            events,
        };
        let shutdown = Shutdown::new();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        let handles = vec![
            LoopHandle::spawn(
                "direct writer",
                write_loop(write_half, outgoing_rx, latch.clone()),
            ),
            LoopHandle::spawn(
                "direct reader",
                read_loop(read_half, idle_timeout, latch, shutdown.signal()),
            ),
        ];

        debug!("Direct transport up with {}", peer);
        Ok(Self {
            peer,
            outgoing,
            closed,
            shutdown,
            handles,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Queues a message for the writer task.
    pub fn send(&self, message: Message) -> Result<(), NetplayError> {
        if self.is_closed() {
            return Err(NetplayError::TransportClosed {
                reason: format!("connection to {} is closed", self.peer),
            });
        }
        self.outgoing
            .send(message)
            .map_err(|_| NetplayError::TransportClosed {
                reason: "writer stopped".to_string(),
            })
    }

    /// Flushes queued messages, closes the socket and waits for both tasks.
    /// A deliberate close does not produce a `Closed` event.
    pub async fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.trigger();
        drop(self.outgoing);
        for handle in self.handles {
            handle.join().await;
        }
    }
}

async fn write_loop<E: From<TransportEvent>>(
    mut writer: OwnedWriteHalf,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    latch: CloseLatch<E>,
) {
    while let Some(message) = outgoing.recv().await {
        let frame = match encode_frame(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping unencodable {} message: {}", message.kind(), e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(&frame).await {
            latch.report(format!("send failed: {}", e));
            return;
        }
        trace!("Sent {} ({} bytes)", message.kind(), frame.len());
    }
    let _ = writer.shutdown().await;
}

async fn read_loop<E: From<TransportEvent>>(
    reader: OwnedReadHalf,
    idle_timeout: Duration,
    latch: CloseLatch<E>,
    mut shutdown: ShutdownSignal,
) {
    let mut frames = FrameReader::new(reader);
    let mut stalled = false;

    loop {
        let result = tokio::select! {
            _ = shutdown.triggered() => return,
            result = tokio::time::timeout(idle_timeout, frames.read_frame()) => result,
        };

        match result {
            Err(_) => {
                if !stalled {
                    warn!("No data from peer for {:?}, connection stalled", idle_timeout);
                    stalled = true;
                }
            }
            Ok(Ok(message)) => {
                if stalled {
                    info!("Peer connection resumed");
                    stalled = false;
                }
                trace!("Received {}", message.kind());
                if latch
                    .events
                    .send(E::from(TransportEvent::Message(message)))
                    .is_err()
                {
                    debug!("Event receiver dropped, stopping reader");
                    return;
                }
            }
            Ok(Err(e)) => {
                let reason = match e {
                    FrameError::EndOfStream { .. } => "peer closed the connection".to_string(),
                    other => other.to_string(),
                };
                latch.report(reason);
                return;
            }
        }
    }
}
