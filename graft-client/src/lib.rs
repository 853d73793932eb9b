//! Session client for the remote graph store.
//!
//! The [`GraphStore`] trait is the seam between the reconciliation
//! engine and the network: the engine only ever sees this trait, and
//! its tests substitute an in-memory implementation. [`HttpGraphStore`]
//! is the real client: JSON over HTTP with a bearer token acquired at
//! session start, refreshed single-flight on expiry or 401, and bounded
//! exponential backoff on transient failures.

mod error;
mod http;
mod store;

pub use error::{ClientError, ClientResult};
pub use http::{HttpGraphStore, StoreConfig};
pub use store::{GraphStore, RemoteEntity, RemoteRelation, RemoteRelationType};
