//! Software House (SWH) side of licenselink.
//!
//! The SWH owns a catalog of licensable libraries. It issues license tokens
//! whose RSA-wrapped form is the only credential a holder can present, and
//! on redemption compiles the bound library and releases the artifact.
//!
//! ## Architecture
//!
//! - **crypto**: RSA wrap/unwrap of hex tokens
//! - **LicenseStore**: the keyed registry of unconsumed licenses
//! - **LicenseAuthority**: catalog, issuance and two-phase redemption
//! - **Compiler**: the external compiler collaborator
//! - **SoftwareHouse**: TCP listener serving `REQ` and `VER`

pub mod authority;
pub mod compiler;
pub mod crypto;
pub mod error;
pub mod server;
pub mod store;

pub use authority::{LicenseAuthority, Redemption};
pub use compiler::{CommandCompiler, CompileError, Compiler, PrebuiltCompiler};
pub use crypto::{CryptoError, KeyPair};
pub use error::{AuthorityError, AuthorityResult};
pub use server::SoftwareHouse;
pub use store::LicenseStore;
