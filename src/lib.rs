//! Embedded Workers — lifecycle management for script workers embedded in a host app.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod worker;
