use std::{io, net::SocketAddr};

use thiserror::Error;

/// Fatal startup failures. Anything that happens after the listener is bound
/// is handled locally and never tears the server down.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Why a single session ended. None of these affect other sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Protocol violation: the peer sent more than `limit` bytes without a
    /// line terminator.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// Protocol violation: a line that is not valid UTF-8.
    #[error("line is not valid utf-8")]
    InvalidUtf8,

    /// The registration line was empty or over-long; the connection is
    /// closed without the peer ever entering the registry.
    #[error("registration rejected: {reason}")]
    NameRejected { reason: &'static str },

    #[error("i/o failure talking to peer")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Abrupt peer disconnects are the normal way sessions end; they are
    /// logged at a lower level than genuine protocol trouble.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            SessionError::Io(err) if matches!(
                err.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            )
        )
    }
}
