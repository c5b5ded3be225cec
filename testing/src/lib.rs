//! # Streamia Testing
//!
//! Test doubles for the Streamia event backbone:
//!
//! - [`InMemoryEventBus`]: a faithful topic-exchange emulation (bindings
//!   with `*`/`#` wildcards, fan-out of exactly one copy per matching queue,
//!   FIFO per queue) with acknowledgement bookkeeping for assertions.
//! - [`InMemoryStore`]: a filterable record store standing in for each
//!   service's document collection, so saga handlers can be exercised
//!   without a database.
//!
//! Both are synchronous under the hood and deterministic, which keeps saga
//! tests fast and free of broker containers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// In-memory topic-exchange emulation.
pub mod event_bus;

/// Filterable in-memory record store.
pub mod store;

pub use event_bus::InMemoryEventBus;
pub use store::InMemoryStore;
