//! Flavor records and request payload validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::CatalogError;

/// A flavor in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlavorRecord {
    /// Unique, monotonically assigned identifier
    pub id: u64,
    /// Display name, unique case-insensitively
    pub name: String,
    /// Units in stock
    pub stock: i64,
}

impl FlavorRecord {
    /// Case-insensitive name comparison used for every lookup.
    pub fn has_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// A partial update. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlavorPatch {
    pub name: Option<String>,
    pub stock: Option<i64>,
}

impl FlavorPatch {
    /// Validate an update body.
    ///
    /// The body must be a non-empty JSON object; `name`, when present, must be
    /// a non-blank string and `stock` an integer. Other fields are ignored.
    pub fn from_payload(payload: &Value) -> Result<Self, CatalogError> {
        let fields = payload_object(payload)?;
        if fields.is_empty() {
            return Err(CatalogError::InvalidInput("update body is empty".to_string()));
        }

        let name = fields.get("name").map(name_value).transpose()?;
        let stock = fields.get("stock").map(stock_value).transpose()?;

        Ok(Self { name, stock })
    }
}

/// The payload must be a JSON object.
pub(crate) fn payload_object(payload: &Value) -> Result<&Map<String, Value>, CatalogError> {
    match payload {
        Value::Object(fields) => Ok(fields),
        Value::Null => Err(CatalogError::InvalidInput("request body is missing".to_string())),
        _ => Err(CatalogError::InvalidInput("request body must be a JSON object".to_string())),
    }
}

pub(crate) fn required_name(fields: &Map<String, Value>) -> Result<String, CatalogError> {
    match fields.get("name") {
        Some(value) => name_value(value),
        None => Err(CatalogError::InvalidInput("field 'name' is required".to_string())),
    }
}

pub(crate) fn required_stock(fields: &Map<String, Value>) -> Result<i64, CatalogError> {
    match fields.get("stock") {
        Some(value) => stock_value(value),
        None => Err(CatalogError::InvalidInput("field 'stock' is required".to_string())),
    }
}

fn name_value(value: &Value) -> Result<String, CatalogError> {
    match value {
        Value::String(name) if !name.trim().is_empty() => Ok(name.clone()),
        Value::String(_) => Err(CatalogError::InvalidInput("field 'name' must not be blank".to_string())),
        _ => Err(CatalogError::InvalidInput("field 'name' must be a string".to_string())),
    }
}

fn stock_value(value: &Value) -> Result<i64, CatalogError> {
    value
        .as_i64()
        .ok_or_else(|| CatalogError::InvalidInput("field 'stock' must be an integer".to_string()))
}
