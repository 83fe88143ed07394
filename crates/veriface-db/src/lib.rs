//! veriface-db — Session provider.
//!
//! An explicitly constructed [`Database`] context replaces a process-wide
//! engine: build it at startup, call [`Database::init_db`] once, then hand out
//! one [`Session`] per unit of work.

pub mod database;
pub mod models;

pub use database::{Database, DbError, Location, PoolOptions, Session};
