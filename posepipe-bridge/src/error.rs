//! Error types for posepipe-bridge

use thiserror::Error;
use posepipe_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bridge closed")]
    Closed,
}

impl From<BridgeError> for CoreError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(e) => CoreError::resource(format!("Bridge IO error: {}", e)),
            BridgeError::Protocol(msg) => CoreError::Protocol(msg),
            BridgeError::Config(msg) => CoreError::Configuration(msg),
            BridgeError::Closed => CoreError::resource("Bridge closed"),
        }
    }
}
