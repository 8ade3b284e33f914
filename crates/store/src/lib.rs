//! SQLite durable store for the image inventory.
//!
//! This crate holds the authoritative, durable copy of every image record.
//! The volatile cache in front of it is rebuilt from here on startup, and
//! usage statistics accumulated in the cache are periodically flushed back.
//!
//! Lookups return [`Option`]: a missing row is a normal outcome (callers fall
//! back or report the image as unavailable), not an error.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::repo::Repository;
