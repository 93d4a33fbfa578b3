//! Shared tracing setup for the Beacon binaries.

mod tracing;

pub use self::tracing::{init_tracing, init_tracing_with_level, try_init_tracing};
