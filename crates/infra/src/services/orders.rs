use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use wms_core::{Aggregate, DomainError, Entity, OrderId, OrderLineId, Quantity};
use wms_inventory::{Balances, StockMovement};
use wms_orders::{
    AddLine, CancelOrder, CreateOrder, Order, OrderCommand, OrderEvent, OrderLine, OrderStatus,
    OrderType, PostOrder,
};

use super::{clamp_limit, require_item, require_location};
use crate::audit::AuditTrail;
use crate::error::{ServiceError, ServiceResult, conflict_on};
use crate::store::{StoreTx, WarehouseStore, constraints};

/// Order lifecycle: create, add lines, post to the ledger, cancel.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn WarehouseStore>,
    audit: Option<AuditTrail>,
}

impl OrderService {
    pub fn new(store: Arc<dyn WarehouseStore>) -> Self {
        Self { store, audit: None }
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn audit_events(
        &self,
        tx: &mut dyn StoreTx,
        order_number: &str,
        events: &[OrderEvent],
    ) -> ServiceResult<()> {
        if let Some(audit) = &self.audit {
            audit
                .record_all(tx, Order::KIND, order_number, events)
                .await?;
        }
        Ok(())
    }

    /// Create a DRAFT order. A taken order number is a `Conflict`.
    #[instrument(skip(self), err)]
    pub async fn create(&self, order_number: &str, order_type: OrderType) -> ServiceResult<Order> {
        let id = OrderId::new();
        let mut order = Order::empty(id);
        let events = order.execute(&OrderCommand::Create(CreateOrder {
            order_id: id,
            order_number: order_number.to_string(),
            order_type,
            occurred_at: Utc::now(),
        }))?;

        let mut tx = self.store.begin().await?;
        tx.insert_order(&order).await.map_err(|e| {
            conflict_on(e, constraints::ORDER_NUMBER, || {
                format!("order {} already exists", order.order_number())
            })
        })?;
        self.audit_events(tx.as_mut(), order.order_number(), &events)
            .await?;
        tx.commit().await?;

        info!(order_id = %id, order_number = %order.order_number(), %order_type, "order created");
        Ok(order)
    }

    pub async fn create_inbound(&self, order_number: &str) -> ServiceResult<Order> {
        self.create(order_number, OrderType::Inbound).await
    }

    pub async fn create_outbound(&self, order_number: &str) -> ServiceResult<Order> {
        self.create(order_number, OrderType::Outbound).await
    }

    /// Add a line to a DRAFT order. Stock is not checked here.
    #[instrument(skip(self), err)]
    pub async fn add_line(
        &self,
        order_number: &str,
        sku: &str,
        location_code: &str,
        quantity: i64,
    ) -> ServiceResult<OrderLine> {
        let mut tx = self.store.begin().await?;
        let mut order = load_order_for_update(tx.as_mut(), order_number).await?;
        order.ensure_draft("add a line to")?;
        Quantity::new(quantity)?;

        let item = require_item(tx.as_mut(), sku).await?;
        let location = require_location(tx.as_mut(), location_code).await?;

        let events = order.execute(&OrderCommand::AddLine(AddLine {
            line_id: OrderLineId::new(),
            item: item.to_ref(),
            location: location.to_ref(),
            quantity,
            occurred_at: Utc::now(),
        }))?;

        let line = events
            .iter()
            .find_map(|event| match event {
                OrderEvent::LineAdded(e) => Some(e.line.clone()),
                _ => None,
            })
            .ok_or_else(|| {
                ServiceError::Internal(format!(
                    "AddLine on order {} emitted no LineAdded event",
                    order.order_number()
                ))
            })?;
        tx.insert_order_line(*order.id(), &line).await?;

        self.audit_events(tx.as_mut(), order.order_number(), &events)
            .await?;
        tx.commit().await?;

        info!(order_number = %order.order_number(), line_no = line.line_no, sku = %line.item.sku, "order line added");
        Ok(line)
    }

    /// Post a DRAFT order: one ledger movement per line, all or nothing.
    ///
    /// The order row is locked first, then the stock of every item on the
    /// order in ascending item order, so concurrent postings cannot deadlock
    /// on each other. Balances are read after the locks are held.
    #[instrument(skip(self), err)]
    pub async fn post(&self, order_number: &str) -> ServiceResult<Vec<StockMovement>> {
        let mut tx = self.store.begin().await?;
        let mut order = load_order_for_update(tx.as_mut(), order_number).await?;
        order.ensure_draft("post")?;

        let keys = order.stock_keys();
        let mut locked = None;
        for key in &keys {
            if locked != Some(key.item_id) {
                tx.lock_item_stock(key.item_id).await?;
                locked = Some(key.item_id);
            }
        }
        let mut balances = Balances::new();
        for key in keys {
            balances.insert(key, tx.stock_at(key.item_id, key.location_id).await?);
        }

        let events = order.execute(&OrderCommand::Post(PostOrder {
            balances,
            occurred_at: Utc::now(),
        }))?;

        let mut movements = Vec::new();
        for event in &events {
            if let OrderEvent::OrderPosted(e) = event {
                for movement in &e.movements {
                    tx.insert_movement(movement).await?;
                }
                movements.extend(e.movements.iter().cloned());
            }
        }
        tx.update_order_status(*order.id(), OrderStatus::Posted)
            .await?;
        self.audit_events(tx.as_mut(), order.order_number(), &events)
            .await?;
        tx.commit().await?;

        info!(
            order_number = %order.order_number(),
            order_type = %order.order_type(),
            movements = movements.len(),
            "order posted"
        );
        Ok(movements)
    }

    /// Cancel a DRAFT order. No ledger effect.
    #[instrument(skip(self), err)]
    pub async fn cancel(&self, order_number: &str) -> ServiceResult<Order> {
        let mut tx = self.store.begin().await?;
        let mut order = load_order_for_update(tx.as_mut(), order_number).await?;

        let events = order.execute(&OrderCommand::Cancel(CancelOrder {
            occurred_at: Utc::now(),
        }))?;

        tx.update_order_status(*order.id(), OrderStatus::Cancelled)
            .await?;
        self.audit_events(tx.as_mut(), order.order_number(), &events)
            .await?;
        tx.commit().await?;

        info!(order_number = %order.order_number(), "order cancelled");
        Ok(order)
    }

    #[instrument(skip(self), err)]
    pub async fn get(&self, order_number: &str) -> ServiceResult<Order> {
        let number = DomainError::require_identifier("order number", order_number)?;
        let mut tx = self.store.begin().await?;
        tx.order_by_number(number)
            .await?
            .ok_or_else(|| DomainError::not_found(Order::KIND, number).into())
    }

    /// Most recent orders first. `limit` defaults to 50 and is capped at 200.
    #[instrument(skip(self), err)]
    pub async fn list(&self, limit: Option<usize>) -> ServiceResult<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        Ok(tx.list_orders(clamp_limit(limit)).await?)
    }
}

pub(super) async fn load_order_for_update(
    tx: &mut dyn StoreTx,
    order_number: &str,
) -> ServiceResult<Order> {
    let number = DomainError::require_identifier("order number", order_number)?;
    tx.order_by_number_for_update(number)
        .await?
        .ok_or_else(|| DomainError::not_found(Order::KIND, number).into())
}
