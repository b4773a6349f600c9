//! Configuration for posepipe-bridge

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Port shared by the pose-tracking process and the game process
pub const DEFAULT_PORT: u16 = 9876;

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the publisher listens on / the subscriber connects to
    pub listen_addr: String,
    /// Pending records kept per peer before the oldest is dropped
    pub queue_capacity: usize,
    /// First reconnect delay of the subscriber
    pub reconnect_initial_ms: u64,
    /// Upper bound for the subscriber's exponential backoff
    pub reconnect_max_ms: u64,
    /// Socket read buffer size
    pub read_buffer_size: usize,
    /// Records buffered for `Subscriber::recv` consumers
    pub subscriber_buffer: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            queue_capacity: 8,
            reconnect_initial_ms: 100,
            reconnect_max_ms: 5000,
            read_buffer_size: 1024,
            subscriber_buffer: 256,
        }
    }
}

impl BridgeConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.trim().is_empty() {
            return Err("Listen address cannot be empty".to_string());
        }

        if self.queue_capacity == 0 || self.queue_capacity > 65_536 {
            return Err("Queue capacity must be between 1 and 65536".to_string());
        }

        if self.reconnect_initial_ms == 0 {
            return Err("Initial reconnect delay must be greater than 0".to_string());
        }

        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err("Maximum reconnect delay must not be below the initial delay".to_string());
        }

        if self.read_buffer_size < crate::record::RECORD_LEN {
            return Err(format!(
                "Read buffer must hold at least one record ({} bytes)",
                crate::record::RECORD_LEN
            ));
        }

        if self.subscriber_buffer == 0 {
            return Err("Subscriber buffer must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }
}
