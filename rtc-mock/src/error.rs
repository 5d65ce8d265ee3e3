use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("negotiation: {0}")]
    ErrNegotiation(String),
    #[error("data channel '{0}' is not open")]
    ErrChannelUnavailable(String),
    #[error("peer session failed")]
    ErrSessionFailed,
    #[error("mock service is not running")]
    ErrServiceNotRunning,
    #[error("mock service is already running")]
    ErrServiceAlreadyRunning,
    #[error("peer script is already bound to a session")]
    ErrScriptAlreadyBound,

    #[error("rtc: {0}")]
    Rtc(#[from] rtc::shared::error::Error),
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn negotiation(err: impl std::fmt::Display) -> Self {
        Error::ErrNegotiation(err.to_string())
    }
}
