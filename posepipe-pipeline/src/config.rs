//! Configuration for posepipe-pipeline

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stream driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound for passes per second; `None` runs as fast as the source
    /// delivers frames
    pub target_fps: Option<u32>,
    /// Longest a blocking source read may delay a stop request
    pub poll_interval_ms: u64,
    /// Status events buffered for the control side
    pub event_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target_fps: None,
            poll_interval_ms: 100,
            event_capacity: 256,
        }
    }
}

impl StreamConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(fps) = self.target_fps {
            if fps == 0 || fps > 240 {
                return Err("Target frame rate must be between 1 and 240".to_string());
            }
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms > 1000 {
            return Err("Poll interval must be between 1 and 1000 ms".to_string());
        }

        if self.event_capacity == 0 {
            return Err("Event capacity must be at least 1".to_string());
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Minimum time between pass starts, if paced
    pub fn frame_interval(&self) -> Option<Duration> {
        self.target_fps
            .filter(|fps| *fps > 0)
            .map(|fps| Duration::from_nanos(1_000_000_000 / u64::from(fps)))
    }
}
