//! Linker role.
//!
//! A Developer opens one [`LinkSession`] per connection. The Linker redeems
//! every declared license against its home Software House, appends the
//! released artifacts and the Developer's own files to a private archive,
//! and delivers the finished archive only if every step succeeded.

pub mod archive;
pub mod connector;
pub mod error;
pub mod server;
pub mod session;

pub use archive::{normalize_entry_point, ArchiveBuilder, MANIFEST_PATH};
pub use connector::{SwhConnector, TcpConnector};
pub use error::{ArchiveError, SessionError};
pub use server::Linker;
pub use session::{LinkSession, SessionReport};
