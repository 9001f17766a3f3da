//! Per-layer error enums: plain enums with a `Display` impl and `From`
//! conversions at the boundaries that need them, no `thiserror`.

use std::error::Error;
use std::fmt;
use std::io;

/// Errors from the link layer. A failed integrity check or a frame
/// addressed to another MAC is recovered from silently inside
/// `SimpleLink::receive` and never surfaces as one of these; `LinkError`
/// exists only for the unrecoverable path.
#[derive(Debug)]
pub enum LinkError {
    /// The physical socket reported an I/O fault.
    Io(io::Error),
    /// The socket's read timeout elapsed with nothing to receive. Not a
    /// fault: it exists purely so a blocked receive loop further up can
    /// periodically recheck a cooperative shutdown flag.
    Timeout,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkError::Io(e) => write!(f, "link I/O error: {}", e),
            LinkError::Timeout => f.write_str("read timed out"),
        }
    }
}

impl Error for LinkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LinkError::Io(e) => Some(e),
            LinkError::Timeout => None,
        }
    }
}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        LinkError::Io(e)
    }
}

/// Errors from the network layer.
#[derive(Debug)]
pub enum NetworkError {
    /// No route to `dst_vip`: raised only on a host whose routing table
    /// somehow lacks an entry for a non-local VIP, which cannot happen in
    /// this fixed star topology but is kept as a defined failure mode for
    /// a mock-route scenario.
    NoRoute(String),
    Link(LinkError),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkError::NoRoute(vip) => write!(f, "no route to {}", vip),
            NetworkError::Link(e) => write!(f, "network layer link error: {}", e),
        }
    }
}

impl Error for NetworkError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NetworkError::Link(e) => Some(e),
            NetworkError::NoRoute(_) => None,
        }
    }
}

impl From<LinkError> for NetworkError {
    fn from(e: LinkError) -> Self {
        NetworkError::Link(e)
    }
}

/// Errors surfaced by the reliable transport. Only retry exhaustion and
/// explicit shutdown/FIN are ever surfaced upward; channel loss and
/// duplicate segments are absorbed below this type.
#[derive(Debug)]
pub enum TransportError {
    /// The retry ceiling (`Config::retry_ceiling`) was reached while
    /// waiting for an ACK. The connection that raised this is no longer
    /// usable and has been removed from the transport's connection table.
    RetryExhausted,
    /// The peer sent `fin: true` (or the transport itself is shutting
    /// down): a normal end-of-stream, not a fault.
    EndOfStream,
    /// The transport has been shut down; no further operations are valid.
    ShutDown,
    Network(NetworkError),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::RetryExhausted => f.write_str("retry ceiling reached, connection dead"),
            TransportError::EndOfStream => f.write_str("end of stream (FIN received)"),
            TransportError::ShutDown => f.write_str("transport has been shut down"),
            TransportError::Network(e) => write!(f, "transport network error: {}", e),
        }
    }
}

impl Error for TransportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TransportError::Network(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NetworkError> for TransportError {
    fn from(e: NetworkError) -> Self {
        TransportError::Network(e)
    }
}

/// Errors surfaced at the application layer. A malformed payload is
/// logged and dropped, not torn down into one of these variants;
/// `AppError` exists for the cases that do need to propagate (recipient
/// unknown, connection gone).
#[derive(Debug)]
pub enum AppError {
    UnknownRecipient(String),
    /// The client rejected an outgoing action because the background
    /// connect to the server has not completed yet (resolved here as
    /// reject-not-buffer).
    NotConnected,
    Transport(TransportError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::UnknownRecipient(name) => write!(f, "no such recipient: {}", name),
            AppError::NotConnected => f.write_str("not connected to the server yet"),
            AppError::Transport(e) => write!(f, "application transport error: {}", e),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Transport(e) => Some(e),
            AppError::UnknownRecipient(_) | AppError::NotConnected => None,
        }
    }
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        AppError::Transport(e)
    }
}
