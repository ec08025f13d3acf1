//! Shared database access

pub mod init;

pub use init::{init_database_pool, init_schema};
