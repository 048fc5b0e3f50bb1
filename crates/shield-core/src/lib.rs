//! Core types and trait definitions for the SOS dispatch system.
//!
//! This crate is deliberately free of runtime, HTTP, and database
//! dependencies. Every platform capability the orchestrator needs (dialing,
//! geolocation, messaging, audio) is described here as a trait and supplied
//! by the embedding application.

// Native `async fn` in traits is used for `KvStore`; the returned futures
// carry explicit `Send` bounds.
#![allow(async_fn_in_trait)]

pub mod contact;
pub mod episode;
pub mod error;
pub mod help;
pub mod location;
pub mod message;
pub mod network;
pub mod ports;
pub mod settings;
pub mod store;

pub use error::{BoxError, Error, Result};
