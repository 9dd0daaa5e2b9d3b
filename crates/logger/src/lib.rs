//! Shared tracing setup for the sitewatch binaries.

mod tracing;

pub use self::tracing::init_with_level;
