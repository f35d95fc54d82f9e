//! # Concentrator TCP Channel
//!
//! Hosts a `Concentrator` on a TCP listener. Clients send IEEE C37.118 command frames
//! and receive configuration, header and data frames on the same connection.
//!
//! ## Key Components
//!
//! - `ClientRegistry`: The `FrameChannel` of a served concentrator. Keeps one outbound
//!   queue per connected client.
//! - `run_command_listener`: Accepts clients and feeds their messages to
//!   `Concentrator::handle_command`.
//! - `run_publisher`: Calls `Concentrator::process_tick` at the configured frame rate.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pdc_core::concentrator::{Concentrator, ConcentratorSettings, SystemClock};
//! use pdc_core::concentrator::events::NullEventSink;
//! use pdc_core::pdc_server::{run_command_listener, run_publisher, ClientRegistry};
//!
//! # async fn serve() -> pdc_core::error::Result<()> {
//! let registry = Arc::new(ClientRegistry::new());
//! let concentrator = Arc::new(Concentrator::new(
//!     ConcentratorSettings::new(235),
//!     Arc::new(SystemClock),
//!     Arc::new(NullEventSink),
//!     registry.clone(),
//! ));
//! let (_shutdown_tx, shutdown) = tokio::sync::watch::channel(false);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:4712").await?;
//! tokio::spawn(run_publisher(concentrator.clone(), shutdown.clone()));
//! run_command_listener(listener, concentrator, registry, shutdown).await
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::concentrator::channel::{ClientId, FrameChannel};
use crate::concentrator::manager::Concentrator;
use crate::error::{ConcentratorError, Result};

const SYNC_BYTE: u8 = 0xAA;
const FRAME_HEADER_SIZE: usize = 4;
const READ_BUFFER_SIZE: usize = 4096;

/// Frames a client may have queued before further frames to it are dropped. About four
/// seconds of a 240 frames per second stream.
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 1024;

/// Outbound queues of the connected clients, keyed by client id.
///
/// Queues are bounded. A client that stops reading loses frames instead of growing
/// its queue.
#[derive(Debug)]
pub struct ClientRegistry {
    capacity: usize,
    clients: Mutex<HashMap<ClientId, mpsc::Sender<Bytes>>>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CLIENT_QUEUE_CAPACITY)
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose client queues hold at most `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        ClientRegistry {
            capacity: capacity.max(1),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a client and returns its id with the receiving end of its queue.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let client_id = Uuid::new_v4();
        self.clients.lock().insert(client_id, tx);
        (client_id, rx)
    }

    pub fn remove(&self, client_id: ClientId) {
        self.clients.lock().remove(&client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }
}

impl FrameChannel for ClientRegistry {
    fn send_to(&self, client: ClientId, image: &[u8]) -> Result<()> {
        let clients = self.clients.lock();
        let sender = clients
            .get(&client)
            .ok_or(ConcentratorError::UnknownClient(client))?;
        sender
            .try_send(Bytes::copy_from_slice(image))
            .map_err(|error| match error {
                TrySendError::Full(_) => ConcentratorError::ClientBacklog(client),
                TrySendError::Closed(_) => ConcentratorError::UnknownClient(client),
            })
    }

    fn broadcast(&self, image: &[u8]) -> usize {
        let image = Bytes::copy_from_slice(image);
        let mut clients = self.clients.lock();
        let mut reached = 0;
        // Writers that have gone away are pruned here.
        clients.retain(|client, sender| match sender.try_send(image.clone()) {
            Ok(()) => {
                reached += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Client {} is not keeping up, frame dropped", client);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        reached
    }
}

/// Splits the next complete message off the front of `buffer`.
///
/// A message starting with the SYNC byte is complete once FRAMESIZE bytes are
/// buffered. Bytes that do not start with SYNC are returned as one message up to the
/// next SYNC byte so the dispatcher can report them.
///
/// # Returns
///
/// `None` while the buffered bytes do not yet hold a whole message.
pub fn next_message(buffer: &mut BytesMut) -> Option<BytesMut> {
    if buffer.is_empty() {
        return None;
    }
    if buffer[0] != SYNC_BYTE {
        let end = buffer[1..]
            .iter()
            .position(|byte| *byte == SYNC_BYTE)
            .map(|offset| offset + 1)
            .unwrap_or(buffer.len());
        return Some(buffer.split_to(end));
    }
    if buffer.len() < FRAME_HEADER_SIZE {
        return None;
    }
    let frame_size = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
    if frame_size < FRAME_HEADER_SIZE {
        let end = buffer.len();
        return Some(buffer.split_to(end));
    }
    if buffer.len() < frame_size {
        return None;
    }
    Some(buffer.split_to(frame_size))
}

/// Accepts command channel clients until `shutdown` flips.
///
/// # Parameters
///
/// * `listener`: A bound listener.
/// * `concentrator`: Receives every inbound message.
/// * `registry`: The concentrator's `FrameChannel`; clients are added on connect and
///   removed on disconnect.
/// * `shutdown`: Stops accepting and closes every client when changed.
pub async fn run_command_listener(
    listener: TcpListener,
    concentrator: Arc<Concentrator>,
    registry: Arc<ClientRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    info!("Command channel listening on {}", listener.local_addr()?);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, addr)) => {
                    info!("Client connected from {}", addr);
                    tokio::spawn(serve_client(
                        socket,
                        addr.to_string(),
                        concentrator.clone(),
                        registry.clone(),
                        shutdown.clone(),
                    ));
                }
                Err(error) => warn!("Failed to accept command channel client: {}", error),
            },
            _ = shutdown.changed() => {
                info!("Command channel shutting down");
                break;
            }
        }
    }
    Ok(())
}

async fn serve_client(
    socket: TcpStream,
    connection_id: String,
    concentrator: Arc<Concentrator>,
    registry: Arc<ClientRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (client_id, mut outbound) = registry.register();
    let (mut reader, mut writer) = socket.into_split();

    let writer_connection = connection_id.clone();
    tokio::spawn(async move {
        while let Some(image) = outbound.recv().await {
            if let Err(error) = writer.write_all(&image).await {
                warn!("Failed to send frame to {}: {}", writer_connection, error);
                break;
            }
        }
    });

    let mut buffer = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        tokio::select! {
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) => break,
                Ok(_) => {
                    while let Some(message) = next_message(&mut buffer) {
                        debug!("{} bytes received from {}", message.len(), connection_id);
                        concentrator.handle_command(client_id, &connection_id, &message);
                    }
                }
                Err(error) => {
                    warn!("Failed to read from {}: {}", connection_id, error);
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    // Dropping the queue lets the writer drain what is left and exit.
    registry.remove(client_id);
    info!("Client {} disconnected", connection_id);
}

/// Publishes ready frames every `1 / FramesPerSecond` seconds until `shutdown` flips.
pub async fn run_publisher(concentrator: Arc<Concentrator>, mut shutdown: watch::Receiver<bool>) {
    let frames_per_second = concentrator.settings().frames_per_second.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(
        1.0 / frames_per_second as f64,
    ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                concentrator.process_tick();
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Publisher stopped");
}
