use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("bluetooth adapter error: {0}")]
    Adapter(String),
    #[error("peripheral {0} not found")]
    NotFound(String),
    #[error("operation timeout")]
    Timeout,
    #[error("peripheral disconnected")]
    Disconnected,
    #[error("not connected")]
    NotConnected,
    #[error("gatt error: {0}")]
    Gatt(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
