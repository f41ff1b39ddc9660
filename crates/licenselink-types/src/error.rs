//! Error taxonomy shared by every role.
//!
//! Each crate keeps its own `thiserror` enum; all of them classify into an
//! [`ErrorKind`] so the server boundaries can log one consistent category.

use std::fmt;

/// Coarse failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Read/write failure on a connection, including timeouts and EOF.
    Io,
    /// Cryptographic failure. Folded into `InvalidLicense` at the protocol boundary.
    Crypto,
    /// Unexpected command, malformed count or frame.
    Protocol,
    /// Temporary artifact create/delete failure, compiler failure.
    Resource,
    /// The presented license could not be redeemed.
    InvalidLicense,
    /// The requested library is not registered.
    LibUnknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io => write!(f, "IO_ERROR"),
            ErrorKind::Crypto => write!(f, "CRYPTO_ERROR"),
            ErrorKind::Protocol => write!(f, "PROTOCOL_ERROR"),
            ErrorKind::Resource => write!(f, "RESOURCE_ERROR"),
            ErrorKind::InvalidLicense => write!(f, "INVALID_LICENSE"),
            ErrorKind::LibUnknown => write!(f, "LIB_UNKNOWN"),
        }
    }
}
