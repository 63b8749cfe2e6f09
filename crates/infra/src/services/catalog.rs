//! Catalog and topology maintenance.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument};

use wms_core::{DomainError, Entity};
use wms_inventory::{Bin, Item, Location, Zone};

use super::{require_item, require_location};
use crate::audit::{AuditTrail, to_details};
use crate::error::{ServiceResult, conflict_on, conflict_on_reference};
use crate::store::{StoreTx, WarehouseStore, constraints};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn WarehouseStore>,
    audit: Option<AuditTrail>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self { store, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn audit<T: Serialize + Sync>(
        &self,
        tx: &mut dyn StoreTx,
        action: &str,
        entity: &str,
        entity_ref: &str,
        details: &T,
    ) -> ServiceResult<()> {
        if let Some(audit) = &self.audit {
            audit
                .record_change(tx, action, entity, entity_ref, to_details(details)?, Utc::now())
                .await?;
        }
        Ok(())
    }

    // --- items ---------------------------------------------------------------

    #[instrument(skip(self), err)]
    pub async fn create_item(&self, sku: &str, name: &str, description: &str) -> ServiceResult<Item> {
        let item = Item::new(sku, name, description)?;
        let mut tx = self.store.begin().await?;
        tx.insert_item(&item).await.map_err(|e| {
            conflict_on(e, constraints::ITEM_SKU, || {
                format!("item {} already exists", item.sku)
            })
        })?;
        self.audit(tx.as_mut(), "catalog.item.created", Item::KIND, &item.sku, &item)
            .await?;
        tx.commit().await?;

        info!(sku = %item.sku, "item created");
        Ok(item)
    }

    #[instrument(skip(self), err)]
    pub async fn get_item(&self, sku: &str) -> ServiceResult<Item> {
        let mut tx = self.store.begin().await?;
        require_item(tx.as_mut(), sku).await
    }

    #[instrument(skip(self), err)]
    pub async fn list_items(&self) -> ServiceResult<Vec<Item>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_items().await?)
    }

    /// The description is the only mutable attribute of an item.
    #[instrument(skip(self), err)]
    pub async fn update_item_description(&self, sku: &str, description: &str) -> ServiceResult<Item> {
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?.with_description(description);
        tx.update_item_description(item.id, &item.description)
            .await?;
        self.audit(tx.as_mut(), "catalog.item.updated", Item::KIND, &item.sku, &item)
            .await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Items referenced by movements, order lines or bins cannot be deleted.
    #[instrument(skip(self), err)]
    pub async fn delete_item(&self, sku: &str) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let item = require_item(tx.as_mut(), sku).await?;
        tx.delete_item(item.id).await.map_err(|e| {
            conflict_on_reference(e, || format!("item {} is still referenced", item.sku))
        })?;
        self.audit(tx.as_mut(), "catalog.item.deleted", Item::KIND, &item.sku, &item)
            .await?;
        tx.commit().await?;

        info!(sku = %item.sku, "item deleted");
        Ok(())
    }

    // --- locations -----------------------------------------------------------

    #[instrument(skip(self), err)]
    pub async fn create_location(&self, code: &str, name: &str) -> ServiceResult<Location> {
        let location = Location::new(code, name)?;
        let mut tx = self.store.begin().await?;
        tx.insert_location(&location).await.map_err(|e| {
            conflict_on(e, constraints::LOCATION_CODE, || {
                format!("location {} already exists", location.code)
            })
        })?;
        self.audit(
            tx.as_mut(),
            "catalog.location.created",
            Location::KIND,
            &location.code,
            &location,
        )
        .await?;
        tx.commit().await?;

        info!(code = %location.code, "location created");
        Ok(location)
    }

    #[instrument(skip(self), err)]
    pub async fn get_location(&self, code: &str) -> ServiceResult<Location> {
        let mut tx = self.store.begin().await?;
        require_location(tx.as_mut(), code).await
    }

    #[instrument(skip(self), err)]
    pub async fn list_locations(&self) -> ServiceResult<Vec<Location>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_locations().await?)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_location(&self, code: &str) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), code).await?;
        tx.delete_location(location.id).await.map_err(|e| {
            conflict_on_reference(e, || {
                format!("location {} still has zones, bins or stock history", location.code)
            })
        })?;
        self.audit(
            tx.as_mut(),
            "catalog.location.deleted",
            Location::KIND,
            &location.code,
            &location,
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    // --- zones ---------------------------------------------------------------

    #[instrument(skip(self), err)]
    pub async fn create_zone(&self, location_code: &str, code: &str, name: &str) -> ServiceResult<Zone> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let zone = Zone::new(&location, code, name)?;
        tx.insert_zone(&zone).await.map_err(|e| {
            conflict_on(e, constraints::ZONE_CODE, || {
                format!("zone {} already exists in location {}", zone.code, location.code)
            })
        })?;
        let zone_ref = format!("{}/{}", location.code, zone.code);
        self.audit(tx.as_mut(), "catalog.zone.created", Zone::KIND, &zone_ref, &zone)
            .await?;
        tx.commit().await?;
        Ok(zone)
    }

    #[instrument(skip(self), err)]
    pub async fn list_zones(&self, location_code: &str) -> ServiceResult<Vec<Zone>> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        Ok(tx.list_zones(location.id).await?)
    }

    /// A zone that still contains bins cannot be deleted.
    #[instrument(skip(self), err)]
    pub async fn delete_zone(&self, location_code: &str, code: &str) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let zone = require_zone(tx.as_mut(), &location, code).await?;
        let zone_ref = format!("{}/{}", location.code, zone.code);
        tx.delete_zone(zone.id).await.map_err(|e| {
            conflict_on_reference(e, || format!("zone {zone_ref} still contains bins"))
        })?;
        self.audit(tx.as_mut(), "catalog.zone.deleted", Zone::KIND, &zone_ref, &zone)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    // --- bins ----------------------------------------------------------------

    #[instrument(skip(self), err)]
    pub async fn create_bin(
        &self,
        location_code: &str,
        zone_code: &str,
        code: &str,
        name: &str,
    ) -> ServiceResult<Bin> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let zone = require_zone(tx.as_mut(), &location, zone_code).await?;
        let bin = Bin::new(&location, &zone, code, name)?;
        tx.insert_bin(&bin).await.map_err(|e| {
            conflict_on(e, constraints::BIN_CODE, || {
                format!("bin {} already exists in location {}", bin.code, location.code)
            })
        })?;
        let bin_ref = format!("{}/{}", location.code, bin.code);
        self.audit(tx.as_mut(), "catalog.bin.created", Bin::KIND, &bin_ref, &bin)
            .await?;
        tx.commit().await?;

        info!(bin = %bin_ref, zone = %zone.code, "bin created");
        Ok(bin)
    }

    #[instrument(skip(self), err)]
    pub async fn list_bins(&self, location_code: &str) -> ServiceResult<Vec<Bin>> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        Ok(tx.list_bins(location.id).await?)
    }

    /// A bin that still holds items cannot be deleted.
    #[instrument(skip(self), err)]
    pub async fn delete_bin(&self, location_code: &str, code: &str) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let bin = require_bin(tx.as_mut(), &location, code).await?;
        let assigned = tx.bin_items(bin.id).await?;
        bin.ensure_deletable(assigned.len())?;

        let bin_ref = format!("{}/{}", location.code, bin.code);
        tx.delete_bin(bin.id).await.map_err(|e| {
            conflict_on_reference(e, || format!("bin {bin_ref} is still referenced"))
        })?;
        self.audit(tx.as_mut(), "catalog.bin.deleted", Bin::KIND, &bin_ref, &bin)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Record that `sku` is stored in the bin. Assigning twice is a no-op.
    #[instrument(skip(self), err)]
    pub async fn assign_item(&self, location_code: &str, bin_code: &str, sku: &str) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let bin = require_bin(tx.as_mut(), &location, bin_code).await?;
        let item = require_item(tx.as_mut(), sku).await?;

        if tx.assign_item_to_bin(bin.id, item.id).await? {
            let bin_ref = format!("{}/{}", location.code, bin.code);
            self.audit(
                tx.as_mut(),
                "catalog.bin.item_assigned",
                Bin::KIND,
                &bin_ref,
                &item.to_ref(),
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn unassign_item(&self, location_code: &str, bin_code: &str, sku: &str) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let bin = require_bin(tx.as_mut(), &location, bin_code).await?;
        let item = require_item(tx.as_mut(), sku).await?;

        if !tx.unassign_item_from_bin(bin.id, item.id).await? {
            return Err(DomainError::not_found(
                "bin assignment",
                format!("{} in {}/{}", item.sku, location.code, bin.code),
            )
            .into());
        }
        let bin_ref = format!("{}/{}", location.code, bin.code);
        self.audit(
            tx.as_mut(),
            "catalog.bin.item_unassigned",
            Bin::KIND,
            &bin_ref,
            &item.to_ref(),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Items stored in the bin, ordered by SKU.
    #[instrument(skip(self), err)]
    pub async fn bin_items(&self, location_code: &str, bin_code: &str) -> ServiceResult<Vec<Item>> {
        let mut tx = self.store.begin().await?;
        let location = require_location(tx.as_mut(), location_code).await?;
        let bin = require_bin(tx.as_mut(), &location, bin_code).await?;
        Ok(tx.bin_items(bin.id).await?)
    }
}

async fn require_zone(tx: &mut dyn StoreTx, location: &Location, code: &str) -> ServiceResult<Zone> {
    let code = DomainError::require_identifier("zone code", code)?;
    tx.zone_by_code(location.id, code)
        .await?
        .ok_or_else(|| DomainError::not_found(Zone::KIND, format!("{}/{}", location.code, code)).into())
}

async fn require_bin(tx: &mut dyn StoreTx, location: &Location, code: &str) -> ServiceResult<Bin> {
    let code = DomainError::require_identifier("bin code", code)?;
    tx.bin_by_code(location.id, code)
        .await?
        .ok_or_else(|| DomainError::not_found(Bin::KIND, format!("{}/{}", location.code, code)).into())
}
