//! # Collection Actor
//!
//! This crate provides the per-appliance resource cache used by the load-balancer control
//! plane. Every resource collection of every appliance (pools, monitors, certificates,
//! virtual servers, ...) is owned by one actor task that keeps two indices:
//!
//! - **system index**: declared name → source uuid
//! - **source index**: source uuid → full record
//!
//! Callers never touch the maps directly. They hold a cloneable [`CollectionClient`] and
//! exchange messages with the actor over an `mpsc` channel, receiving each answer on a
//! `oneshot` channel. Because the actor processes one request at a time, the two indices
//! are always consistent with each other.
//!
//! ## Architecture Overview
//!
//! 1. **Entity Layer** ([`CollectionEntity`]) - what a cached record must expose
//! 2. **Runtime Layer** ([`CollectionActor`]) - the message loop that owns the indices
//! 3. **Interface Layer** ([`CollectionClient`]) - type-safe async handle
//!
//! ```rust
//! use collection_actor::{CollectionActor, CollectionEntity};
//!
//! #[derive(Clone, Debug)]
//! struct Pool { name: String, uuid: String }
//!
//! impl CollectionEntity for Pool {
//!     const KIND: &'static str = "pool";
//!     fn name(&self) -> &str { &self.name }
//!     fn source_uuid(&self) -> &str { &self.uuid }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, client) = CollectionActor::<Pool>::new(32);
//!     tokio::spawn(actor.run());
//!
//!     client.populate(vec![Pool { name: "web".into(), uuid: "pool-1".into() }]).await.unwrap();
//!     let pool = client.by_name("web").await.unwrap().unwrap();
//!     assert_eq!(pool.uuid, "pool-1");
//! }
//! ```
//!
//! ## Testing
//!
//! The [`mock`] module offers a `MockCollection` with fluent expectations and raw channel
//! helpers, so adapter logic can be tested without a running actor.

pub mod actor;
pub mod client;
pub mod entity;
pub mod error;
pub mod message;
pub mod mock;

pub use actor::CollectionActor;
pub use client::CollectionClient;
pub use entity::CollectionEntity;
pub use error::CacheError;
pub use message::{CollectionRequest, Response};
