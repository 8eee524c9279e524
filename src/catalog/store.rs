//! In-memory flavor collection.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use super::record::{payload_object, required_name, required_stock, FlavorPatch, FlavorRecord};
use super::CatalogError;

/// The flavor collection.
///
/// Every operation takes the lock exactly once, so the uniqueness check and
/// id assignment of a create cannot interleave with another mutation.
#[derive(Debug, Default)]
pub struct FlavorCatalog {
    flavors: Mutex<Vec<FlavorRecord>>,
}

impl FlavorCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding the three stock flavors.
    pub fn with_defaults() -> Self {
        Self::from_records(vec![
            FlavorRecord { id: 1, name: "Chocolate".to_string(), stock: 150 },
            FlavorRecord { id: 2, name: "Banana".to_string(), stock: 400 },
            FlavorRecord { id: 3, name: "Chocolate Chip".to_string(), stock: 250 },
        ])
    }

    pub fn from_records(records: Vec<FlavorRecord>) -> Self {
        Self {
            flavors: Mutex::new(records),
        }
    }

    /// All flavors in insertion order.
    pub fn list(&self) -> Vec<FlavorRecord> {
        self.flavors.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.flavors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.flavors.lock().is_empty()
    }

    /// Look a flavor up by name, ignoring case.
    pub fn get(&self, name: &str) -> Result<FlavorRecord, CatalogError> {
        let flavors = self.flavors.lock();
        position(&flavors, name)
            .map(|idx| flavors[idx].clone())
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }

    /// Add a flavor from a request body.
    ///
    /// Checks run in this order: `name` present and valid, name not taken,
    /// `stock` present and valid.
    pub fn create_from_payload(&self, payload: &Value) -> Result<FlavorRecord, CatalogError> {
        let fields = payload_object(payload)?;
        let name = required_name(fields)?;

        let mut flavors = self.flavors.lock();
        if position(&flavors, &name).is_some() {
            return Err(CatalogError::Conflict(name));
        }
        let stock = required_stock(fields)?;

        Ok(insert(&mut flavors, name, stock))
    }

    /// Apply an update body to the flavor called `name`.
    ///
    /// An unknown flavor is reported before the body is looked at.
    pub fn update_from_payload(&self, name: &str, payload: &Value) -> Result<FlavorRecord, CatalogError> {
        let mut flavors = self.flavors.lock();
        let idx = position(&flavors, name).ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        let patch = FlavorPatch::from_payload(payload)?;
        apply(&mut flavors, idx, patch)
    }

    /// Remove the flavor called `name`.
    pub fn delete(&self, name: &str) -> Result<FlavorRecord, CatalogError> {
        let mut flavors = self.flavors.lock();
        let idx = position(&flavors, name).ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        let removed = flavors.remove(idx);
        debug!(id = removed.id, name = %removed.name, "Deleted flavor");
        Ok(removed)
    }
}

fn position(flavors: &[FlavorRecord], name: &str) -> Option<usize> {
    flavors.iter().position(|f| f.has_name(name))
}

fn insert(flavors: &mut Vec<FlavorRecord>, name: String, stock: i64) -> FlavorRecord {
    let id = flavors.iter().map(|f| f.id).max().map_or(1, |max| max + 1);
    let record = FlavorRecord { id, name, stock };
    debug!(id = record.id, name = %record.name, stock = record.stock, "Created flavor");
    flavors.push(record.clone());
    record
}

fn apply(flavors: &mut [FlavorRecord], idx: usize, patch: FlavorPatch) -> Result<FlavorRecord, CatalogError> {
    if let Some(new_name) = &patch.name {
        let taken = flavors
            .iter()
            .enumerate()
            .any(|(i, f)| i != idx && f.has_name(new_name));
        if taken {
            return Err(CatalogError::Conflict(new_name.clone()));
        }
    }

    let record = &mut flavors[idx];
    if let Some(name) = patch.name {
        record.name = name;
    }
    if let Some(stock) = patch.stock {
        record.stock = stock;
    }
    debug!(id = record.id, name = %record.name, stock = record.stock, "Updated flavor");
    Ok(record.clone())
}
