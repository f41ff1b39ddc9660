//! Authority error types.

use crate::compiler::CompileError;
use crate::crypto::CryptoError;
use licenselink_types::ErrorKind;
use licenselink_wire::WireError;
use thiserror::Error;

/// Errors raised by the license authority and the SWH server.
#[derive(Error, Debug)]
pub enum AuthorityError {
    /// The requested library is not registered.
    #[error("Unknown library: {0}")]
    LibUnknown(String),

    /// A license request asked for a non-positive number of licenses.
    #[error("Invalid license count: {0}")]
    InvalidCount(i32),

    /// The presented license cannot be redeemed. Never carries the reason.
    #[error("Invalid license")]
    InvalidLicense,

    /// Wrapping a freshly issued token failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The compiler collaborator failed.
    #[error("Compilation failed: {0}")]
    Compile(#[from] CompileError),

    /// The redeemer reported that the artifact did not reach its destination.
    #[error("Delivery not confirmed by redeemer")]
    DeliveryRejected,

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthorityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthorityError::LibUnknown(_) => ErrorKind::LibUnknown,
            AuthorityError::InvalidCount(_) => ErrorKind::Protocol,
            AuthorityError::InvalidLicense => ErrorKind::InvalidLicense,
            AuthorityError::Crypto(_) => ErrorKind::Crypto,
            AuthorityError::Compile(_) => ErrorKind::Resource,
            AuthorityError::DeliveryRejected => ErrorKind::Io,
            AuthorityError::Wire(e) => e.kind(),
            AuthorityError::Io(_) => ErrorKind::Io,
        }
    }
}

/// Alias for authority results.
pub type AuthorityResult<T> = Result<T, AuthorityError>;
