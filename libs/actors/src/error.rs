//! Dispatcher errors

use network::TransportError;
use std::net::SocketAddr;
use thiserror::Error;
use types::CatalogError;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Datagram names an action kind outside the catalog
    #[error("Unknown action kind {kind} from {sender}")]
    UnknownAction { kind: u32, sender: SocketAddr },

    #[error("No actor named '{name}'")]
    UnknownActor { name: String },

    #[error("Actor '{name}' is already registered")]
    DuplicateActor { name: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl DispatchError {
    pub fn unknown_actor(name: impl Into<String>) -> Self {
        Self::UnknownActor { name: name.into() }
    }

    pub fn duplicate_actor(name: impl Into<String>) -> Self {
        Self::DuplicateActor { name: name.into() }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
