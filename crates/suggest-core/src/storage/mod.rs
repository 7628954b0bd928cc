//! Reference implementations of the storage traits declared in
//! [`crate::store`]. Each trait has exactly one implementation here;
//! callers embedding this crate elsewhere are free to supply their own.

#[cfg(feature = "sqlite-store")]
mod migrations;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

pub mod memory_session;
