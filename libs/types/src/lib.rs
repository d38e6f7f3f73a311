//! # Weft Action Catalog
//!
//! Closed set of typed actions exchanged between peers, the shared message
//! header they all start with, and the catalog that maps a header's
//! `action_kind` back to a concrete type.
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Action, Catalog, Ping};
//!
//! let catalog = Catalog::default();
//! let bytes = catalog.encode(&Ping::new(1, 1_700_000_000_000).into()).unwrap();
//!
//! let action = catalog.decode(&bytes).unwrap();
//! assert!(matches!(action, Action::Ping(_)));
//! ```
//!
//! ## Integration Points
//!
//! - **Codec**: every action implements `codec::Wire`; encoding seals an
//!   FNV-1a hash of the payload into the header
//! - **Actor Dispatcher**: peeks `action_kind` to route datagrams, then uses
//!   [`Catalog::dispatch_by_value`] / [`Catalog::dispatch_by_ref`]

pub mod actions;
pub mod catalog;
pub mod error;
pub mod header;

pub use actions::{
    decode_action, encode_action, Action, ActionBody, HandshakeRequest, Ping, TransferCorrupted,
    TransferOk,
};
pub use catalog::{Catalog, CatalogEntry};
pub use error::{CatalogError, CatalogResult};
pub use header::{next_message_id, ActionKind, MessageHeader};
