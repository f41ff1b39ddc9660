//! Core types for licenselink.
//!
//! Shared by the Software House, the Linker and the Developer client: the
//! library/license/artifact data model, the error taxonomy every role maps
//! its failures into, and the configuration structs loaded at bootstrap.

pub mod config;
pub mod error;
pub mod license;

pub use error::ErrorKind;
pub use license::{Artifact, Library, License};
