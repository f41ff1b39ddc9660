//! Command implementations by role.

pub mod developer;
pub mod serve;
