//! Reconnecting subscriber used by the consuming (game) process

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::record::{is_newer, RecordDecoder, SignalRecord};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters describing what the subscriber has seen so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub received: u64,
    pub malformed: u64,
    pub stale: u64,
    pub connections: u64,
}

#[derive(Default)]
struct Counters {
    connected: AtomicBool,
    received: AtomicU64,
    malformed: AtomicU64,
    stale: AtomicU64,
    connections: AtomicU64,
}

enum ConnectionEnd {
    Shutdown,
    Closed,
    Failed(std::io::Error),
}

/// Connects to a publisher and keeps retrying with exponential backoff
/// whenever the connection drops or cannot be established.
pub struct Subscriber {
    addr: String,
    latest: watch::Receiver<Option<SignalRecord>>,
    records: mpsc::Receiver<SignalRecord>,
    counters: Arc<Counters>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Subscriber {
    /// Start connecting to `addr` in the background. Returns immediately;
    /// a publisher that is not up yet is simply retried.
    pub fn connect(addr: impl Into<String>, config: &BridgeConfig) -> Result<Self, BridgeError> {
        config.validate().map_err(BridgeError::Config)?;

        let addr = addr.into();
        let (latest_tx, latest_rx) = watch::channel(None);
        let (records_tx, records_rx) = mpsc::channel(config.subscriber_buffer);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        let task = tokio::spawn(run(
            addr.clone(),
            config.clone(),
            counters.clone(),
            latest_tx,
            records_tx,
            shutdown_rx,
        ));

        Ok(Self {
            addr,
            latest: latest_rx,
            records: records_rx,
            counters,
            shutdown: shutdown_tx,
            task: Some(task),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Most recent accepted record; what a game loop applies each tick
    pub fn latest(&self) -> Option<SignalRecord> {
        *self.latest.borrow()
    }

    pub fn latest_value(&self) -> Option<f32> {
        self.latest().map(|r| r.value)
    }

    /// Receiver notified whenever a newer record is accepted
    pub fn watch_latest(&self) -> watch::Receiver<Option<SignalRecord>> {
        self.latest.clone()
    }

    /// Next accepted record in arrival order. `None` once shut down.
    pub async fn recv(&mut self) -> Option<SignalRecord> {
        self.records.recv().await
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<SignalRecord> {
        tokio::time::timeout(timeout, self.records.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn is_connected(&self) -> bool {
        self.counters.connected.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            received: self.counters.received.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            stale: self.counters.stale.load(Ordering::Relaxed),
            connections: self.counters.connections.load(Ordering::Relaxed),
        }
    }

    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

async fn run(
    addr: String,
    config: BridgeConfig,
    counters: Arc<Counters>,
    latest: watch::Sender<Option<SignalRecord>>,
    records: mpsc::Sender<SignalRecord>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = config.reconnect_initial();
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            result = TcpStream::connect(&addr) => result,
        };

        match connected {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY: {}", e);
                }
                counters.connected.store(true, Ordering::SeqCst);
                counters.connections.fetch_add(1, Ordering::Relaxed);
                info!("Subscribed to publisher at {}", addr);
                backoff = config.reconnect_initial();
                attempt = 0;

                let end = read_records(
                    stream,
                    config.read_buffer_size,
                    &counters,
                    &latest,
                    &records,
                    &mut shutdown,
                )
                .await;
                counters.connected.store(false, Ordering::SeqCst);

                match end {
                    ConnectionEnd::Shutdown => break,
                    ConnectionEnd::Closed => warn!("Publisher at {} closed the connection", addr),
                    ConnectionEnd::Failed(e) => warn!("Lost connection to {}: {}", addr, e),
                }
            }
            Err(e) => {
                attempt += 1;
                debug!("Connect attempt {} to {} failed: {}", attempt, addr, e);
            }
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.reconnect_max());
    }

    debug!("Subscriber for {} stopped", addr);
}

/// Read one connection until it ends. The sequence high-water mark is
/// per connection: a restarted publisher counts from zero again.
async fn read_records(
    mut stream: TcpStream,
    buffer_size: usize,
    counters: &Counters,
    latest: &watch::Sender<Option<SignalRecord>>,
    records: &mpsc::Sender<SignalRecord>,
    shutdown: &mut watch::Receiver<bool>,
) -> ConnectionEnd {
    let mut decoder = RecordDecoder::new();
    let mut last_sequence: Option<u32> = None;
    let mut buf = vec![0u8; buffer_size];

    loop {
        let n = tokio::select! {
            _ = shutdown.changed() => return ConnectionEnd::Shutdown,
            read = stream.read(&mut buf) => match read {
                Ok(0) => return ConnectionEnd::Closed,
                Ok(n) => n,
                Err(e) => return ConnectionEnd::Failed(e),
            }
        };

        decoder.extend(&buf[..n]);
        while let Some(decoded) = decoder.next_record() {
            let record = match decoded {
                Ok(record) => record,
                Err(e) => {
                    counters.malformed.fetch_add(1, Ordering::Relaxed);
                    warn!("Discarding malformed record: {}", e);
                    continue;
                }
            };

            if let Some(last) = last_sequence {
                if !is_newer(record.sequence, last) {
                    counters.stale.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        "Discarding record {} received after {}",
                        record.sequence, last
                    );
                    continue;
                }
            }

            last_sequence = Some(record.sequence);
            counters.received.fetch_add(1, Ordering::Relaxed);
            latest.send_replace(Some(record));
            if records.try_send(record).is_err() {
                debug!("Record buffer full, record {} only kept as latest", record.sequence);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_invalid_config() {
        let mut config = BridgeConfig::default();
        config.subscriber_buffer = 0;
        assert!(matches!(
            Subscriber::connect("127.0.0.1:1", &config),
            Err(BridgeError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_publisher_keeps_retrying() {
        let config = BridgeConfig {
            reconnect_initial_ms: 5,
            reconnect_max_ms: 20,
            ..BridgeConfig::default()
        };
        // Port 1 is reserved and refuses connections on loopback
        let subscriber = Subscriber::connect("127.0.0.1:1", &config).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!subscriber.is_connected());
        assert_eq!(subscriber.latest(), None);
        assert_eq!(subscriber.stats().connections, 0);
        subscriber.shutdown().await;
    }
}
