//! SQLite persistence for leads, conversation history, and issued quotes.

pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
