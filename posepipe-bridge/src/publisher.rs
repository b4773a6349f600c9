//! Signal publisher: broadcasts records to every connected peer

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::record::{SignalRecord, RECORD_LEN};
use bytes::BytesMut;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_PEERS: usize = 64;

struct Peer {
    addr: SocketAddr,
    writer: AbortHandle,
}

struct PublisherInner {
    local_addr: SocketAddr,
    config: BridgeConfig,
    peers: RwLock<HashMap<Uuid, Peer>>,
    /// Each peer's writer holds its own receiver. A receiver that falls more
    /// than `queue_capacity` records behind skips the oldest ones.
    records: broadcast::Sender<SignalRecord>,
    sequence: AtomicU32,
    published: AtomicU64,
    dropped: AtomicU64,
    shutdown: watch::Sender<bool>,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a listening publisher. Clones share the same socket and peers;
/// the listener keeps running until [`Publisher::shutdown`].
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("local_addr", &self.inner.local_addr)
            .field("peers", &self.peer_count())
            .finish()
    }
}

impl Publisher {
    /// Bind `config.listen_addr` and start accepting peers in the background.
    /// Independent of any pipeline's streaming state.
    pub async fn listen(config: BridgeConfig) -> Result<Self, BridgeError> {
        config.validate().map_err(BridgeError::Config)?;

        let listener = TcpListener::bind(&config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (records, _) = broadcast::channel(config.queue_capacity);

        let inner = Arc::new(PublisherInner {
            local_addr,
            config,
            peers: RwLock::new(HashMap::new()),
            records,
            sequence: AtomicU32::new(0),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            shutdown: shutdown_tx,
            accept_task: Mutex::new(None),
        });

        let task = tokio::spawn(accept_loop(listener, inner.clone(), shutdown_rx));
        *inner.accept_task.lock() = Some(task);

        info!("Signal publisher listening on {}", local_addr);
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn peer_count(&self) -> usize {
        self.inner.peers.read().len()
    }

    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        self.inner.peers.read().values().map(|p| p.addr).collect()
    }

    /// Records published so far
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Records skipped by peers that fell behind, summed over all peers
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Sequence number the next record will carry
    pub fn next_sequence(&self) -> u32 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        !*self.inner.shutdown.borrow()
    }

    /// Stamp `value` with the next sequence number and hand it to every
    /// connected peer. Never blocks: a slow peer loses its oldest pending
    /// record instead.
    pub fn publish(&self, value: f32) -> Result<SignalRecord, BridgeError> {
        if !self.is_running() {
            return Err(BridgeError::Closed);
        }
        if !value.is_finite() {
            return Err(BridgeError::Protocol(format!(
                "Refusing to publish non-finite value {}",
                value
            )));
        }

        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        let record = SignalRecord::now(sequence, value);
        // No receivers just means nobody is connected yet
        let _ = self.inner.records.send(record);
        self.inner.published.fetch_add(1, Ordering::Relaxed);
        Ok(record)
    }

    /// Stop accepting, close every peer connection and reject further
    /// publishes. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }

        let peers: Vec<Peer> = self.inner.peers.write().drain().map(|(_, p)| p).collect();

        if let Some(task) = self.inner.accept_task.lock().take() {
            task.abort();
        }

        info!(
            "Signal publisher on {} shut down ({} peers closed)",
            self.inner.local_addr,
            peers.len()
        );
    }
}

impl PublisherInner {
    fn attach(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr, shutdown: watch::Receiver<bool>) {
        if self.peers.read().len() >= MAX_PEERS {
            warn!("Maximum peer limit reached ({}), rejecting {}", MAX_PEERS, addr);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let id = Uuid::new_v4();
        let (read_half, write_half) = stream.into_split();

        let records = self.records.subscribe();
        let writer_inner = self.clone();
        let writer_shutdown = shutdown.clone();
        let writer = tokio::spawn(async move {
            write_records(write_half, records, &writer_inner.dropped, id, writer_shutdown).await;
            writer_inner.detach(id);
        });

        self.peers.write().insert(
            id,
            Peer {
                addr,
                writer: writer.abort_handle(),
            },
        );
        info!("Peer {} connected from {}", id, addr);

        let reader_inner = self.clone();
        let read_buffer_size = self.config.read_buffer_size;
        tokio::spawn(async move {
            watch_peer(read_half, read_buffer_size, id, shutdown).await;
            reader_inner.detach(id);
        });
    }

    fn detach(&self, id: Uuid) {
        if let Some(peer) = self.peers.write().remove(&id) {
            peer.writer.abort();
            info!("Peer {} ({}) disconnected", id, peer.addr);
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    inner: Arc<PublisherInner>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => inner.attach(stream, addr, shutdown.clone()),
                Err(e) => {
                    warn!("Accept failed on {}: {}", inner.local_addr, e);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }
    debug!("Accept loop on {} exited", inner.local_addr);
}

async fn write_records(
    mut writer: OwnedWriteHalf,
    mut records: broadcast::Receiver<SignalRecord>,
    dropped: &AtomicU64,
    id: Uuid,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = BytesMut::with_capacity(RECORD_LEN);
    loop {
        let record = tokio::select! {
            _ = shutdown.changed() => break,
            received = records.recv() => match received {
                Ok(record) => record,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    dropped.fetch_add(skipped, Ordering::Relaxed);
                    debug!("Peer {} is behind, skipped {} records", id, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        };

        buf.clear();
        record.encode(&mut buf);
        if let Err(e) = writer.write_all(&buf).await {
            debug!("Write to peer {} failed: {}", id, e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Peers never send application data; reading only detects the disconnect
async fn watch_peer(
    mut reader: OwnedReadHalf,
    buffer_size: usize,
    id: Uuid,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            read = reader.read(&mut buf) => match read {
                Ok(0) => return,
                Ok(n) => debug!("Ignoring {} bytes sent by peer {}", n, id),
                Err(e) => {
                    debug!("Read from peer {} failed: {}", id, e);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn ephemeral_config() -> BridgeConfig {
        BridgeConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_publish_without_peers_advances_sequence() {
        let publisher = Publisher::listen(ephemeral_config()).await.unwrap();
        let first = publisher.publish(0.1).unwrap();
        let second = publisher.publish(0.2).unwrap();
        assert_eq!(first.sequence, 0);
        assert_eq!(second.sequence, 1);
        assert_eq!(publisher.published_count(), 2);
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_publish_rejects_non_finite() {
        let publisher = Publisher::listen(ephemeral_config()).await.unwrap();
        assert!(matches!(
            publisher.publish(f32::NAN),
            Err(BridgeError::Protocol(_))
        ));
        assert_eq!(publisher.next_sequence(), 0);
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_fails() {
        let publisher = Publisher::listen(ephemeral_config()).await.unwrap();
        publisher.shutdown();
        publisher.shutdown();
        assert!(!publisher.is_running());
        assert!(matches!(publisher.publish(0.5), Err(BridgeError::Closed)));
    }

    #[tokio::test]
    async fn test_lagging_receiver_skips_oldest_records() {
        let config = BridgeConfig {
            queue_capacity: 2,
            ..ephemeral_config()
        };
        let publisher = assert_ok!(Publisher::listen(config).await);
        let mut records = publisher.inner.records.subscribe();
        for i in 0..5 {
            assert_ok!(publisher.publish(i as f32));
        }

        assert!(matches!(
            records.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(records.recv().await.unwrap().sequence, 3);
        assert_eq!(records.recv().await.unwrap().sequence, 4);
        publisher.shutdown();
    }

    #[tokio::test]
    async fn test_listen_rejects_invalid_config() {
        let mut config = ephemeral_config();
        config.queue_capacity = 0;
        assert!(matches!(
            Publisher::listen(config).await,
            Err(BridgeError::Config(_))
        ));
    }
}
