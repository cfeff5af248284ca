#![deny(missing_docs)]
//! An in-memory, multithreaded key-value store (ramdb) that maps [`String`] keys to [`String`]
//! values with per key expiration, served over an encrypted custom protocol.
//!
//! This crate provides the [`MemStore`] engine, the [`RamDbServer`] that exposes it on a TCP
//! socket and the [`RamDbClient`] that talks to it, as well as a [`ramdb-server`] and
//! [`ramdb-client`] executable.
//!
//! ## Supported Storage Operations
//! The engine supports five types of operations (a.k.a "commands"):
//!
//! - `GET` the live value associated with a key
//! - `SET` a key/value pair with a time to live
//! - `DELETE` a key/value pair
//! - `INCREMENT` / `DECREMENT` the decimal number stored at a key, atomically
//!
//! On top of these the client builds a cooperative distributed lock ([`RamDbClient::lock`] /
//! [`RamDbClient::unlock`]): a lock is a `SET` on a reserved key that only succeeds when the key
//! is absent.
//!
//! ## MemStore
//! [`MemStore`] is the implementor of the [`RamEngine`] trait. It keeps one record per key,
//! holding both the value and its absolute deadline, in a sharded concurrent map. Expired
//! records are never returned but are only removed when overwritten, deleted or purged.
//! Nothing is persisted.
//!
//! ## Client / Server
//! Every accepted connection becomes a session on the server's [`ThreadPool`]; the pool size caps
//! how many sessions run at once and the rest wait in its queue.
//! A session greets the client, exchanges RSA public keys, checks the single configured
//! username/password and then serves commands until the client sends `CLOSE` or disconnects.
//!
//! ## Custom Protocol
//! Messages are length prefixed frames. After the key exchange every frame is RSA-OAEP
//! encrypted with the recipient's public key. The decrypted text follows the
//! `KEYWORD <arg> <arg>` format described in the [`command`] module. A request that fails to
//! parse gets an `ERROR` reply and the session carries on.
//!
//! [`String`]: https://doc.rust-lang.org/std/string/struct.String.html
//! [`ramdb-server`]: ./ramdb-server.rs
//! [`ramdb-client`]: ./ramdb-client.rs

pub use client::RamDbClient;
pub use config::{Credentials, ServerConfig};
pub use engine::{Accumulate, MemStore, RamEngine};
pub use error::{RamDbError, Result};
pub use server::RamDbServer;
pub use thread_pool::{RayonThreadPool, SharedQueueThreadPool, ThreadPool};
pub use typed::WireValue;

pub use rust_decimal::Decimal;

pub mod channel;
mod client;
pub mod command;
pub mod config;
mod engine;
mod error;
mod server;
mod session;
pub mod thread_pool;
mod typed;
