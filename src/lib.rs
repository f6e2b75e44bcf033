//! A small web editor for objects in a blob store.
//!
//! Operators authenticate with HTTP Basic, pick a bucket, pick an object and
//! edit it in place. Reads for editing are always pinned to the object's
//! latest generation, and writes are verified after they are finalized.

pub mod auth;
pub mod browser;
pub mod cli;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod editor;
pub mod error;
pub mod logging;
pub mod request_handler;
pub mod router;
pub mod server;
pub mod sniff;
pub mod store;
pub(crate) mod web;
pub mod writer;

#[cfg(test)]
mod tests;
