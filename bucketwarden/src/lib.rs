// bucketwarden/src/lib.rs
//! # bucketwarden server
//!
//! Thin HTTP application around `bucketwarden-core`: option parsing, logger
//! setup, client construction and the push endpoint.

pub mod bootstrap;
pub mod cli;
pub mod logger;
pub mod server;

pub use server::router;
