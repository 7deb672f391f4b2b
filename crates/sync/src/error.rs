use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("clock offset unavailable until the ping handshake completes")]
    Unsynced,
}
