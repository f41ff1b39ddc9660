//! licenselink wire protocol.
//!
//! Every role pair (Developer/SWH, Developer/Linker, Linker/SWH) talks over a
//! reliable byte stream using a handful of big-endian primitives: 32-bit
//! signed ints, one-byte booleans, length-prefixed UTF-8 strings and
//! length-prefixed named payloads.
//!
//! ## Architecture
//!
//! - **WireStream**: primitive codec with per-operation timeouts
//! - **Command / typed messages**: the requests each exchange opens with
//! - **connect**: bounded outbound TCP connection

pub mod codec;
pub mod message;
pub mod transport;

pub use codec::{WireError, WireStream, MAX_STRING_LEN};
pub use message::{Command, DependencyDecl, IssuedLicense, LicenseRequest, VerifyRequest};
pub use transport::{connect, BoxedTransport, Transport};
