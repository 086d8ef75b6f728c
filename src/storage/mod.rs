//! Storage module for the local SQLite preferences database.

mod database;

pub use database::Database;
