use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubsyncError {
    #[error("configuration error: {0}")]
    Config(String),
}

pub type HubsyncResult<T> = Result<T, HubsyncError>;
