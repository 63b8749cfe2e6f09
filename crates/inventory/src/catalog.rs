//! Catalog and topology entities: items, locations, zones and bins.
//!
//! These are referenced by the ledger, orders and picking, but are mutated
//! independently through plain create/list/delete operations.

use serde::{Deserialize, Serialize};

use wms_core::{BinId, DomainError, DomainResult, Entity, ItemId, LocationId, ZoneId};

/// A stock-keeping unit. Identity for users is the SKU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub sku: String,
    pub name: String,
    pub description: String,
}

impl Item {
    pub fn new(sku: &str, name: &str, description: &str) -> DomainResult<Self> {
        let sku = DomainError::require_identifier("sku", sku)?;
        let name = DomainError::require_identifier("item name", name)?;
        Ok(Self {
            id: ItemId::new(),
            sku: sku.to_string(),
            name: name.to_string(),
            description: description.trim().to_string(),
        })
    }

    /// The description is the only attribute that may change once an item is
    /// referenced by movements or order lines.
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.trim().to_string();
        self
    }

    pub fn to_ref(&self) -> ItemRef {
        ItemRef {
            id: self.id,
            sku: self.sku.clone(),
        }
    }
}

impl Entity for Item {
    type Id = ItemId;
    const KIND: &'static str = "item";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A physical storage location. Identity for users is the code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub code: String,
    pub name: String,
}

impl Location {
    pub fn new(code: &str, name: &str) -> DomainResult<Self> {
        let code = DomainError::require_identifier("location code", code)?;
        let name = DomainError::require_identifier("location name", name)?;
        Ok(Self {
            id: LocationId::new(),
            code: code.to_string(),
            name: name.to_string(),
        })
    }

    pub fn to_ref(&self) -> LocationRef {
        LocationRef {
            id: self.id,
            code: self.code.clone(),
        }
    }
}

impl Entity for Location {
    type Id = LocationId;
    const KIND: &'static str = "location";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A zone groups bins inside one location. Codes are unique per location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub location_id: LocationId,
    pub code: String,
    pub name: String,
}

impl Zone {
    pub fn new(location: &Location, code: &str, name: &str) -> DomainResult<Self> {
        let code = DomainError::require_identifier("zone code", code)?;
        Ok(Self {
            id: ZoneId::new(),
            location_id: location.id,
            code: code.to_string(),
            name: name.trim().to_string(),
        })
    }
}

impl Entity for Zone {
    type Id = ZoneId;
    const KIND: &'static str = "zone";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A bin inside a zone of a location. Codes are unique per location.
///
/// Bins hold a many-to-many set of items ("items stored here"); the
/// assignment itself lives in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    pub id: BinId,
    pub location_id: LocationId,
    pub zone_id: ZoneId,
    pub code: String,
    pub name: String,
}

impl Bin {
    pub fn new(location: &Location, zone: &Zone, code: &str, name: &str) -> DomainResult<Self> {
        let code = DomainError::require_identifier("bin code", code)?;
        if zone.location_id != location.id {
            return Err(DomainError::validation(format!(
                "zone {} does not belong to location {}",
                zone.code, location.code
            )));
        }
        Ok(Self {
            id: BinId::new(),
            location_id: location.id,
            zone_id: zone.id,
            code: code.to_string(),
            name: name.trim().to_string(),
        })
    }

    /// A bin may only be removed once no item is assigned to it.
    pub fn ensure_deletable(&self, assigned_items: usize) -> DomainResult<()> {
        if assigned_items > 0 {
            return Err(DomainError::conflict(format!(
                "bin {} still holds {assigned_items} item(s)",
                self.code
            )));
        }
        Ok(())
    }

    pub fn to_ref(&self) -> BinRef {
        BinRef {
            id: self.id,
            code: self.code.clone(),
        }
    }
}

impl Entity for Bin {
    type Id = BinId;
    const KIND: &'static str = "bin";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Lightweight item reference carried by lines and movements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: ItemId,
    pub sku: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: LocationId,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinRef {
    pub id: BinId,
    pub code: String,
}
