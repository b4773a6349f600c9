//! posepipe-bridge: exports a pipeline signal to an external process over TCP
//!
//! The publisher side lives in the pose-tracking process and broadcasts a
//! fixed 16-byte record to every connected peer. The subscriber side is what
//! the consuming game uses to follow the latest value.

pub mod config;
pub mod error;
pub mod publisher;
pub mod record;
pub mod subscriber;

pub use config::{BridgeConfig, DEFAULT_PORT};
pub use error::BridgeError;
pub use publisher::Publisher;
pub use record::{RecordDecoder, SignalRecord, RECORD_LEN};
pub use subscriber::{Subscriber, SubscriberStats};
