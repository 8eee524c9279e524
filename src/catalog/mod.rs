//! The flavor catalog: records, validation and the shared collection.

mod record;
mod store;

use thiserror::Error;

pub use record::{FlavorPatch, FlavorRecord};
pub use store::FlavorCatalog;

/// Errors returned by catalog operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Flavor '{0}' not found")]
    NotFound(String),

    #[error("Flavor '{0}' already exists")]
    Conflict(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
